//! Invocation client seam and the Bedrock runtime HTTP implementation

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

/// Outcome of a single invocation. Transport faults of every kind collapse
/// into `Failure`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    Success { body: Vec<u8> },
    Failure { detail: String },
}

impl InvocationOutcome {
    pub fn failure(detail: impl Into<String>) -> Self {
        Self::Failure {
            detail: detail.into(),
        }
    }
}

/// Performs the call to a model endpoint. One attempt per call, no retries.
#[async_trait]
pub trait InvocationClient: Send + Sync {
    /// Human-readable transport name (e.g. "bedrock")
    fn name(&self) -> &str;

    /// Send a serialized payload to the endpoint behind `identifier`
    async fn invoke(&self, identifier: &str, payload: &[u8]) -> InvocationOutcome;
}

/// Default Bedrock runtime endpoint for a region
pub fn default_endpoint(region: &str) -> String {
    format!("https://bedrock-runtime.{}.amazonaws.com", region)
}

/// Calls `POST {endpoint}/model/{identifier}/invoke` with bearer-token auth
pub struct BedrockHttpClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl std::fmt::Debug for BedrockHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BedrockHttpClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("authenticated", &self.api_key.is_some())
            .finish()
    }
}

impl BedrockHttpClient {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid invocation endpoint: {}", endpoint))?;
        if endpoint.cannot_be_a_base() {
            return Err(anyhow!(
                "Invocation endpoint {} cannot carry a path",
                endpoint
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    /// Invocation URL with the identifier encoded as a single path segment,
    /// so ARNs containing `/` stay intact.
    pub fn invoke_url(&self, identifier: &str) -> Option<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend(["model", identifier, "invoke"]);
        Some(url)
    }

    async fn send(&self, url: Url, payload: &[u8]) -> Result<Vec<u8>> {
        let mut request = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .body(payload.to_vec());
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("Failed to send request to model endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Model invocation failed with status {}: {}",
                status,
                error_text
            ));
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read model response body")?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl InvocationClient for BedrockHttpClient {
    fn name(&self) -> &str {
        "bedrock"
    }

    async fn invoke(&self, identifier: &str, payload: &[u8]) -> InvocationOutcome {
        let Some(url) = self.invoke_url(identifier) else {
            return InvocationOutcome::failure(format!(
                "Cannot build invocation URL for {}",
                identifier
            ));
        };

        debug!("Invoking {} ({} byte payload)", identifier, payload.len());

        match self.send(url, payload).await {
            Ok(body) => InvocationOutcome::Success { body },
            Err(e) => InvocationOutcome::failure(format!("{:#}", e)),
        }
    }
}
