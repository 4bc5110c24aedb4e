//! Request handler: envelope validation → fallback routing → response shaping

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::envelope::{EnvelopeBuilder, InboundPayload, ResponseEnvelope};
use crate::error::HandlerError;
use crate::providers::{FallbackResult, FallbackRouter};

/// One handler per process; shared read-only across requests
pub struct RequestHandler {
    envelope: EnvelopeBuilder,
    router: FallbackRouter,
}

impl RequestHandler {
    pub fn new(envelope: EnvelopeBuilder, router: FallbackRouter) -> Self {
        Self { envelope, router }
    }

    pub fn envelope(&self) -> &EnvelopeBuilder {
        &self.envelope
    }

    pub fn router(&self) -> &FallbackRouter {
        &self.router
    }

    pub async fn handle(&self, payload: InboundPayload) -> ResponseEnvelope {
        self.handle_with_cancel(payload, &CancellationToken::new())
            .await
    }

    /// Handle one request. Always produces a response envelope, including
    /// when something below the handler panics.
    pub async fn handle_with_cancel(
        &self,
        payload: InboundPayload,
        cancel: &CancellationToken,
    ) -> ResponseEnvelope {
        let request_id = Uuid::new_v4();
        let span = info_span!("request", %request_id);

        async move {
            let result = AssertUnwindSafe(self.process(payload, cancel))
                .catch_unwind()
                .await
                .unwrap_or_else(|cause| {
                    Err(HandlerError::Internal(panic_detail(cause.as_ref())))
                });

            match result {
                Ok(envelope) => envelope,
                Err(err) => {
                    match &err {
                        HandlerError::Validation(e) => warn!("Rejected request: {}", e),
                        HandlerError::Exhausted(_) | HandlerError::Internal(_) => {
                            error!("{}", err)
                        }
                    }
                    self.envelope.error(&err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn process(
        &self,
        payload: InboundPayload,
        cancel: &CancellationToken,
    ) -> Result<ResponseEnvelope, HandlerError> {
        let input = self.envelope.validate(&payload)?;
        let prompt = self.envelope.prompt(&input);

        match self.router.route_with_cancel(&prompt, cancel).await {
            FallbackResult::Completed { output, provider } => {
                info!("Completed with {}", provider.identifier);
                self.envelope
                    .success(&input, &output, &provider.identifier)
            }
            FallbackResult::Exhausted { last_error } => Err(HandlerError::Exhausted(last_error)),
        }
    }
}

/// Best-effort description of a panic payload
pub fn panic_detail(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    use crate::providers::router::tests::ScriptedClient;
    use crate::providers::{ProviderAdapter, ProviderFamily, ProviderRegistry, ProviderSpec};

    fn handler(specs: &[(&str, ProviderFamily)], client: Arc<ScriptedClient>) -> RequestHandler {
        let registry = ProviderRegistry::new(
            specs
                .iter()
                .map(|(id, family)| ProviderSpec::new(*id, *family))
                .collect(),
        )
        .unwrap();
        let router = FallbackRouter::new(registry, ProviderAdapter::default(), client);
        RequestHandler::new(
            EnvelopeBuilder::default().with_cors_allow_origin("*"),
            router,
        )
    }

    fn two_candidates() -> [(&'static str, ProviderFamily); 2] {
        [
            ("m1", ProviderFamily::AnthropicMessages),
            ("m2", ProviderFamily::TitanText),
        ]
    }

    #[tokio::test]
    async fn test_coffee_shop_tagline_falls_back_to_titan() {
        let client = Arc::new(
            ScriptedClient::new()
                .fail("m1", "simulated transport error")
                .respond("m2", json!({"results": [{"outputText": "Wake Up. Stand Out."}]})),
        );
        let handler = handler(&two_candidates(), client.clone());

        let response = handler
            .handle(InboundPayload::Object(
                json!({"input": "write a tagline for a coffee shop"}),
            ))
            .await;

        assert_eq!(response.status_code, 200);
        assert_eq!(
            response.json_body().unwrap(),
            json!({
                "input": "write a tagline for a coffee shop",
                "output": "Wake Up. Stand Out.",
                "model": "m2",
            })
        );
        assert_eq!(client.calls(), vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_500_with_last_detail() {
        let client = Arc::new(
            ScriptedClient::new()
                .respond("m1", json!({"content": []}))
                .respond("m2", json!({"unexpected": true})),
        );
        let handler = handler(&two_candidates(), client);

        let response = handler
            .handle(InboundPayload::Text(r#"{"input":"anything"}"#.to_string()))
            .await;

        assert_eq!(response.status_code, 500);
        let error = response.json_body().unwrap()["error"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(error.starts_with("All models failed."), "{error}");
        assert!(error.contains("Model m2 returned an empty response."), "{error}");
    }

    #[tokio::test]
    async fn test_empty_input_never_contacts_providers() {
        let client = Arc::new(ScriptedClient::new());
        let handler = handler(&two_candidates(), client.clone());

        for payload in [
            InboundPayload::Object(json!({"input": "   "})),
            InboundPayload::Object(json!({})),
            InboundPayload::Text(r#"{"input":""}"#.to_string()),
        ] {
            let response = handler.handle(payload).await;
            assert_eq!(response.status_code, 400);
            assert_eq!(
                response.json_body().unwrap(),
                json!({"error": "Input text is missing or empty."})
            );
        }
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_never_contacts_providers() {
        let client = Arc::new(ScriptedClient::new());
        let handler = handler(&two_candidates(), client.clone());

        let response = handler
            .handle(InboundPayload::Text("%%% not json %%%".to_string()))
            .await;

        assert_eq!(response.status_code, 400);
        assert_eq!(
            response.json_body().unwrap(),
            json!({"error": "Invalid JSON in request body."})
        );
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_is_wrapped_before_routing() {
        let client = Arc::new(
            ScriptedClient::new().respond("m1", json!({"content": [{"text": "ok"}]})),
        );
        let handler = handler(&[("m1", ProviderFamily::AnthropicMessages)], client.clone());

        let response = handler
            .handle(InboundPayload::Object(json!({"input": "  spaced  "})))
            .await;
        assert_eq!(response.status_code, 200);
        assert_eq!(response.json_body().unwrap()["input"], "spaced");
        assert_eq!(response.headers["Access-Control-Allow-Origin"], "*");

        let payloads = client.payloads();
        assert_eq!(payloads.len(), 1);
        let text = payloads[0].1["messages"][0]["content"][0]["text"]
            .as_str()
            .unwrap();
        assert!(text.contains("You are Harmony AI"), "{text}");
        assert!(text.contains("Task: spaced"), "{text}");
        assert!(!text.contains("{input}"), "{text}");
    }

    #[tokio::test]
    async fn test_titan_fallback_receives_wrapped_prompt() {
        let client = Arc::new(
            ScriptedClient::new()
                .fail("m1", "simulated transport error")
                .respond("m2", json!({"results": [{"outputText": "Sip happens."}]})),
        );
        let handler = handler(&two_candidates(), client.clone());

        let response = handler
            .handle(InboundPayload::Object(json!({"input": "coffee tagline"})))
            .await;
        assert_eq!(response.status_code, 200);

        let payloads = client.payloads();
        let (id, titan) = &payloads[1];
        assert_eq!(id, "m2");
        let text = titan["inputText"].as_str().unwrap();
        assert!(text.contains("Harmony AI"), "{text}");
        assert!(text.contains("Task: coffee tagline"), "{text}");
        assert_eq!(titan["textGenerationConfig"]["maxTokenCount"], 4000);
        assert!(titan["textGenerationConfig"]["temperature"].is_f64());
    }

    #[tokio::test]
    async fn test_panic_below_handler_is_internal_error() {
        let client = Arc::new(ScriptedClient::new().panic_on("m1"));
        let handler = handler(&two_candidates(), client.clone());

        let response = handler
            .handle(InboundPayload::Object(json!({"input": "boom"})))
            .await;

        assert_eq!(response.status_code, 500);
        assert_eq!(response.headers["Access-Control-Allow-Origin"], "*");
        assert_eq!(
            response.json_body().unwrap(),
            json!({"error": "An internal server error occurred: transport exploded"})
        );
        assert_eq!(client.calls(), vec!["m1"]);
    }

    #[test]
    fn test_panic_detail_reads_common_payloads() {
        assert_eq!(panic_detail(&"static"), "static");
        assert_eq!(panic_detail(&String::from("owned")), "owned");
        assert_eq!(panic_detail(&42u8), "unknown panic");
    }

    #[tokio::test]
    async fn test_cancelled_request_is_500() {
        let client = Arc::new(
            ScriptedClient::new().respond("m1", json!({"content": [{"text": "ok"}]})),
        );
        let handler = handler(&[("m1", ProviderFamily::AnthropicMessages)], client);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let response = handler
            .handle_with_cancel(InboundPayload::Object(json!({"input": "x"})), &cancel)
            .await;
        assert_eq!(response.status_code, 500);
    }
}
