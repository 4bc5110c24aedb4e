//! Inbound validation, prompt building and outbound response shaping

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{CATCH_ALL_ERROR_BODY, HandlerError, ValidationError};

/// Placeholder replaced by the validated input text
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Persona preamble used when none is configured
pub const DEFAULT_PREAMBLE: &str = "
You are Harmony AI, the intelligent marketing strategist behind Harmony Marketing Hub.
Respond in a sharp, concise, and business-oriented tone.

Task: {input}
";

/// Inbound request as delivered by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum InboundPayload {
    /// Already decoded by the front door
    Object(Value),
    /// Serialized body still to be decoded
    Text(String),
}

impl InboundPayload {
    /// Interpret a Lambda proxy event.
    ///
    /// A string `body` still needs decoding, any other `body` is taken as
    /// already parsed, and an event without `body` is itself the payload.
    pub fn from_event(event: Value) -> Self {
        match event {
            Value::Object(mut map) => match map.remove("body") {
                Some(Value::String(body)) => Self::Text(body),
                Some(Value::Null) => Self::Object(Value::Object(Default::default())),
                Some(body) => Self::Object(body),
                None => Self::Object(Value::Object(map)),
            },
            other => Self::Object(other),
        }
    }

    /// Raw bytes from an HTTP body; invalid UTF-8 is replaced and then fails
    /// decoding like any other malformed body.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::Text(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Trimmed, non-empty task text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedInput {
    text: String,
}

impl ValidatedInput {
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Validate an inbound payload. Performs no I/O.
pub fn validate(payload: &InboundPayload) -> Result<ValidatedInput, ValidationError> {
    match payload {
        InboundPayload::Object(value) => input_field(value),
        InboundPayload::Text(raw) => {
            let value: Value =
                serde_json::from_str(raw).map_err(|_| ValidationError::MalformedBody)?;
            input_field(&value)
        }
    }
}

fn input_field(value: &Value) -> Result<ValidatedInput, ValidationError> {
    let object = value.as_object().ok_or(ValidationError::MalformedBody)?;
    let text = object
        .get("input")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();

    if text.is_empty() {
        return Err(ValidationError::EmptyInput);
    }
    Ok(ValidatedInput {
        text: text.to_string(),
    })
}

/// Persona/style template wrapped around every task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_PREAMBLE)
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Substitute the input; a template without the placeholder gets the
    /// input appended after it.
    pub fn render(&self, input: &ValidatedInput) -> String {
        let prompt = if self.template.contains(INPUT_PLACEHOLDER) {
            self.template.replace(INPUT_PLACEHOLDER, input.text())
        } else {
            format!("{}{}", self.template, input.text())
        };
        debug!("Built prompt ({} chars)", prompt.len());
        prompt
    }
}

/// Transport-neutral response: status, headers and a serialized JSON body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl ResponseEnvelope {
    /// Body decoded as JSON, for callers that want fields rather than text
    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

#[derive(Serialize)]
struct SuccessBody<'a> {
    input: &'a str,
    output: &'a str,
    model: &'a str,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

/// Builds prompts and shapes responses with a stable schema
#[derive(Debug, Clone, Default)]
pub struct EnvelopeBuilder {
    template: PromptTemplate,
    cors_allow_origin: Option<String>,
}

impl EnvelopeBuilder {
    pub fn new(template: PromptTemplate) -> Self {
        Self {
            template,
            cors_allow_origin: None,
        }
    }

    /// Add `Access-Control-Allow-Origin` to every response; empty disables it
    pub fn with_cors_allow_origin(mut self, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        self.cors_allow_origin = (!origin.is_empty()).then_some(origin);
        self
    }

    pub fn cors_allow_origin(&self) -> Option<&str> {
        self.cors_allow_origin.as_deref()
    }

    pub fn validate(&self, payload: &InboundPayload) -> Result<ValidatedInput, ValidationError> {
        validate(payload)
    }

    pub fn prompt(&self, input: &ValidatedInput) -> String {
        self.template.render(input)
    }

    fn headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        if let Some(origin) = &self.cors_allow_origin {
            headers.insert("Access-Control-Allow-Origin".to_string(), origin.clone());
        }
        headers
    }

    /// 200 with `{input, output, model}`
    pub fn success(
        &self,
        input: &ValidatedInput,
        output: &str,
        model: &str,
    ) -> Result<ResponseEnvelope, HandlerError> {
        let body = serde_json::to_string(&SuccessBody {
            input: input.text(),
            output,
            model,
        })
        .map_err(|e| HandlerError::Internal(e.to_string()))?;

        Ok(ResponseEnvelope {
            status_code: 200,
            headers: self.headers(),
            body,
        })
    }

    /// Error response with `{error}`. Never fails: if the message cannot be
    /// rendered the generic catch-all body is used.
    pub fn error(&self, err: &HandlerError) -> ResponseEnvelope {
        let message = err.to_string();
        let body = serde_json::to_string(&ErrorBody { error: &message }).unwrap_or_else(|e| {
            error!("Failed to serialize error body: {}", e);
            CATCH_ALL_ERROR_BODY.to_string()
        });

        ResponseEnvelope {
            status_code: err.status_code(),
            headers: self.headers(),
            body,
        }
    }

    /// Last-resort 500 response
    pub fn catch_all(&self) -> ResponseEnvelope {
        ResponseEnvelope {
            status_code: 500,
            headers: self.headers(),
            body: CATCH_ALL_ERROR_BODY.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_object_trims() {
        let payload = InboundPayload::Object(json!({"input": "  write a tagline  "}));
        assert_eq!(validate(&payload).unwrap().text(), "write a tagline");
    }

    #[test]
    fn test_validate_text_body() {
        let payload = InboundPayload::Text(r#"{"input":"hello"}"#.to_string());
        assert_eq!(validate(&payload).unwrap().text(), "hello");
    }

    #[test]
    fn test_validate_empty_or_missing_input() {
        for value in [
            json!({}),
            json!({"input": ""}),
            json!({"input": "   \n\t"}),
            json!({"input": null}),
            json!({"input": 42}),
            json!({"other": "field"}),
        ] {
            assert_eq!(
                validate(&InboundPayload::Object(value.clone())),
                Err(ValidationError::EmptyInput),
                "{value}"
            );
        }
    }

    #[test]
    fn test_validate_malformed_body() {
        for raw in ["not json at all", "", "{\"input\": ", "[1, 2]", "\"just a string\""] {
            assert_eq!(
                validate(&InboundPayload::Text(raw.to_string())),
                Err(ValidationError::MalformedBody),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_from_event_shapes() {
        assert_eq!(
            InboundPayload::from_event(json!({"body": "{\"input\":\"x\"}"})),
            InboundPayload::Text("{\"input\":\"x\"}".to_string())
        );
        assert_eq!(
            InboundPayload::from_event(json!({"body": {"input": "x"}})),
            InboundPayload::Object(json!({"input": "x"}))
        );
        assert_eq!(
            InboundPayload::from_event(json!({"input": "direct"})),
            InboundPayload::Object(json!({"input": "direct"}))
        );
        assert_eq!(
            validate(&InboundPayload::from_event(json!({"body": null}))),
            Err(ValidationError::EmptyInput)
        );
    }

    #[test]
    fn test_from_bytes_invalid_utf8_is_malformed() {
        let payload = InboundPayload::from_bytes(&[0xff, 0xfe, 0x00]);
        assert_eq!(validate(&payload), Err(ValidationError::MalformedBody));
    }

    #[test]
    fn test_prompt_embeds_input_in_preamble() {
        let builder = EnvelopeBuilder::default();
        let input = validate(&InboundPayload::Object(json!({"input": "launch plan"}))).unwrap();
        let prompt = builder.prompt(&input);
        assert!(prompt.contains("Harmony AI"));
        assert!(prompt.contains("Task: launch plan"));
        assert!(!prompt.contains(INPUT_PLACEHOLDER));
    }

    #[test]
    fn test_template_without_placeholder_appends() {
        let template = PromptTemplate::new("Be brief. ");
        let input = validate(&InboundPayload::Object(json!({"input": "hi"}))).unwrap();
        assert_eq!(template.render(&input), "Be brief. hi");
    }

    #[test]
    fn test_success_envelope() {
        let builder = EnvelopeBuilder::default().with_cors_allow_origin("*");
        let input = validate(&InboundPayload::Object(json!({"input": "q"}))).unwrap();
        let envelope = builder.success(&input, "a", "m2").unwrap();

        assert_eq!(envelope.status_code, 200);
        assert_eq!(envelope.headers["Content-Type"], "application/json");
        assert_eq!(envelope.headers["Access-Control-Allow-Origin"], "*");
        assert_eq!(
            envelope.json_body().unwrap(),
            json!({"input": "q", "output": "a", "model": "m2"})
        );
    }

    #[test]
    fn test_error_envelope_without_cors() {
        let builder = EnvelopeBuilder::default().with_cors_allow_origin("");
        let envelope = builder.error(&HandlerError::from(ValidationError::MalformedBody));

        assert_eq!(envelope.status_code, 400);
        assert!(!envelope.headers.contains_key("Access-Control-Allow-Origin"));
        assert_eq!(
            envelope.json_body().unwrap(),
            json!({"error": "Invalid JSON in request body."})
        );
    }

    #[test]
    fn test_envelope_serializes_lambda_shape() {
        let envelope = EnvelopeBuilder::default().catch_all();
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["statusCode"], 500);
        assert!(value["headers"].is_object());
        assert_eq!(value["body"], CATCH_ALL_ERROR_BODY);
    }
}
