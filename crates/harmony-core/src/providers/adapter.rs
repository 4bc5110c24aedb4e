//! Per-family request payloads and response text extraction

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::family::ProviderFamily;

/// Generation parameters shared by every candidate in the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f64,
    /// Version tag sent with Anthropic Messages payloads
    pub anthropic_version: String,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 4000,
            temperature: 0.7,
            anthropic_version: "bedrock-2023-05-31".to_string(),
        }
    }
}

/// Result of payload construction for one candidate
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Request body to hand to the invocation client
    Body(Value),
    /// The family has no schema; move on without invoking
    Skip,
}

/// Build the request body for a family. Pure and deterministic.
pub fn build_payload(family: ProviderFamily, prompt: &str, params: &GenerationParams) -> Payload {
    match family {
        ProviderFamily::AnthropicMessages => Payload::Body(anthropic_payload(prompt, params)),
        ProviderFamily::TitanText | ProviderFamily::NovaText => {
            Payload::Body(text_generation_payload(prompt, params))
        }
        ProviderFamily::Unsupported => Payload::Skip,
    }
}

fn anthropic_payload(prompt: &str, params: &GenerationParams) -> Value {
    json!({
        "anthropic_version": params.anthropic_version,
        "max_tokens": params.max_tokens,
        "messages": [{
            "role": "user",
            "content": [{ "type": "text", "text": prompt }],
        }],
    })
}

fn text_generation_payload(prompt: &str, params: &GenerationParams) -> Value {
    json!({
        "inputText": prompt,
        "textGenerationConfig": {
            "maxTokenCount": params.max_tokens,
            "temperature": params.temperature,
        },
    })
}

/// One way of locating generated text in a response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// `content[0].text`
    ContentList,
    /// `results[0].outputText`
    ResultsList,
    /// top-level `output_text`
    OutputText,
    /// `output.message.content[0].text`
    OutputMessage,
}

impl ExtractionStrategy {
    /// Locate the text field, tolerating absent keys, wrong types and empty lists
    pub fn apply<'a>(&self, body: &'a Value) -> Option<&'a str> {
        match self {
            Self::ContentList => first_field(body.get("content")?, "text"),
            Self::ResultsList => first_field(body.get("results")?, "outputText"),
            Self::OutputText => body.get("output_text")?.as_str(),
            Self::OutputMessage => first_field(body.pointer("/output/message/content")?, "text"),
        }
    }
}

fn first_field<'a>(list: &'a Value, key: &str) -> Option<&'a str> {
    list.as_array()?.first()?.get(key)?.as_str()
}

/// Ordered extraction strategies for each supported family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionPlan {
    pub anthropic_messages: Vec<ExtractionStrategy>,
    pub titan_text: Vec<ExtractionStrategy>,
    pub nova_text: Vec<ExtractionStrategy>,
}

impl Default for ExtractionPlan {
    fn default() -> Self {
        use ExtractionStrategy::*;
        Self {
            anthropic_messages: vec![ContentList],
            titan_text: vec![ResultsList, OutputText],
            nova_text: vec![ResultsList, OutputText, OutputMessage],
        }
    }
}

impl ExtractionPlan {
    pub fn strategies(&self, family: ProviderFamily) -> &[ExtractionStrategy] {
        match family {
            ProviderFamily::AnthropicMessages => &self.anthropic_messages,
            ProviderFamily::TitanText => &self.titan_text,
            ProviderFamily::NovaText => &self.nova_text,
            ProviderFamily::Unsupported => &[],
        }
    }
}

/// Extract trimmed, non-empty text using the strategies in order.
///
/// A strategy that finds only whitespace does not stop the search.
pub fn extract_text(body: &Value, strategies: &[ExtractionStrategy]) -> Option<String> {
    strategies
        .iter()
        .filter_map(|s| s.apply(body))
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

/// Family-polymorphic mapping used by the fallback router
#[derive(Debug, Clone, Default)]
pub struct ProviderAdapter {
    params: GenerationParams,
    extraction: ExtractionPlan,
}

impl ProviderAdapter {
    pub fn new(params: GenerationParams, extraction: ExtractionPlan) -> Self {
        Self { params, extraction }
    }

    pub fn build_payload(&self, family: ProviderFamily, prompt: &str) -> Payload {
        build_payload(family, prompt, &self.params)
    }

    /// Parse a raw response body; undecodable bodies yield `None`
    pub fn extract_text(&self, family: ProviderFamily, raw: &[u8]) -> Option<String> {
        let body: Value = serde_json::from_slice(raw).ok()?;
        extract_text(&body, self.extraction.strategies(family))
    }
}
