//! Provider families and identifier-based family detection

use serde::{Deserialize, Serialize};

/// Closed set of request/response schemas the adapter knows how to speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFamily {
    /// Anthropic Messages API as hosted on Bedrock
    AnthropicMessages,
    /// Amazon Titan text generation
    TitanText,
    /// Amazon Nova text generation
    NovaText,
    /// No known schema; the candidate is skipped without being contacted
    Unsupported,
}

/// Substring rules consulted when no custom rule matches. First match wins.
const BUILTIN_RULES: &[(&str, ProviderFamily)] = &[
    ("anthropic", ProviderFamily::AnthropicMessages),
    ("claude", ProviderFamily::AnthropicMessages),
    ("titan", ProviderFamily::TitanText),
    ("nova", ProviderFamily::NovaText),
];

impl ProviderFamily {
    /// Detect the family of a model identifier or ARN using the built-in rules
    pub fn detect(identifier: &str) -> Self {
        let lower = identifier.to_lowercase();
        BUILTIN_RULES
            .iter()
            .find(|(pattern, _)| lower.contains(pattern))
            .map(|(_, family)| *family)
            .unwrap_or(Self::Unsupported)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnthropicMessages => "anthropic_messages",
            Self::TitanText => "titan_text",
            Self::NovaText => "nova_text",
            Self::Unsupported => "unsupported",
        }
    }

    /// Whether the adapter can build a payload for this family
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

impl std::fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured substring → family mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionRule {
    pub pattern: String,
    pub family: ProviderFamily,
}

/// Family detection with optional custom rules ahead of the built-in ones
#[derive(Debug, Clone, Default)]
pub struct FamilyDetector {
    rules: Vec<DetectionRule>,
}

impl FamilyDetector {
    pub fn new(rules: Vec<DetectionRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|r| DetectionRule {
                pattern: r.pattern.to_lowercase(),
                family: r.family,
            })
            .collect();
        Self { rules }
    }

    /// Custom rules are matched case-insensitively in declaration order,
    /// then the built-in rules apply.
    pub fn detect(&self, identifier: &str) -> ProviderFamily {
        let lower = identifier.to_lowercase();
        self.rules
            .iter()
            .find(|r| !r.pattern.is_empty() && lower.contains(&r.pattern))
            .map(|r| r.family)
            .unwrap_or_else(|| ProviderFamily::detect(identifier))
    }
}

/// One fallback candidate: an opaque model identifier and its family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub identifier: String,
    pub family: ProviderFamily,
}

impl ProviderSpec {
    pub fn new(identifier: impl Into<String>, family: ProviderFamily) -> Self {
        Self {
            identifier: identifier.into(),
            family,
        }
    }

    /// Build a spec whose family is detected from the identifier
    pub fn detected(identifier: impl Into<String>, detector: &FamilyDetector) -> Self {
        let identifier = identifier.into();
        let family = detector.detect(&identifier);
        Self { identifier, family }
    }
}
