use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use harmony_core::envelope::DEFAULT_PREAMBLE;
use harmony_core::providers::invoker::default_endpoint;
use harmony_core::providers::{
    DetectionRule, ExtractionPlan, ExtractionStrategy, FamilyDetector, GenerationParams,
    ProviderFamily, ProviderRegistry, ProviderSpec,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarmonyConfig {
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Fallback chain, most preferred first
    pub providers: Vec<ProviderEntry>,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub invocation: InvocationConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

// ── Prompt / generation ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Persona template; `{input}` is replaced by the task text
    #[serde(default = "default_preamble")]
    pub preamble: String,
}

fn default_preamble() -> String {
    DEFAULT_PREAMBLE.to_string()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            preamble: default_preamble(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_anthropic_version")]
    pub anthropic_version: String,
}

fn default_max_tokens() -> u32 {
    4000
}
fn default_temperature() -> f64 {
    0.7
}
fn default_anthropic_version() -> String {
    "bedrock-2023-05-31".to_string()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            anthropic_version: default_anthropic_version(),
        }
    }
}

impl GenerationConfig {
    pub fn to_params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            anthropic_version: self.anthropic_version.clone(),
        }
    }
}

// ── Providers ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Model identifier or inference-profile ARN
    pub id: String,
    /// Explicit family; detected from `id` when absent
    #[serde(default)]
    pub family: Option<ProviderFamily>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Extra substring rules checked before the built-in ones
    #[serde(default)]
    pub rules: Vec<DetectionRule>,
}

/// Per-family override of the response extraction order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default)]
    pub anthropic_messages: Option<Vec<ExtractionStrategy>>,
    #[serde(default)]
    pub titan_text: Option<Vec<ExtractionStrategy>>,
    #[serde(default)]
    pub nova_text: Option<Vec<ExtractionStrategy>>,
}

impl ExtractionConfig {
    pub fn to_plan(&self) -> ExtractionPlan {
        let defaults = ExtractionPlan::default();
        ExtractionPlan {
            anthropic_messages: self
                .anthropic_messages
                .clone()
                .unwrap_or(defaults.anthropic_messages),
            titan_text: self.titan_text.clone().unwrap_or(defaults.titan_text),
            nova_text: self.nova_text.clone().unwrap_or(defaults.nova_text),
        }
    }
}

// ── Invocation ──────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct InvocationConfig {
    #[serde(default = "default_region")]
    pub region: String,
    /// Overrides the regional Bedrock runtime endpoint
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bearer token; empty sends unauthenticated requests (e.g. to a local proxy)
    #[serde(default)]
    pub api_key: String,
    /// Per-call transport timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Budget for a whole fallback pass; unset means no overall deadline
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl std::fmt::Debug for InvocationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationConfig")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("api_key", &mask_secret(&self.api_key))
            .field("timeout_secs", &self.timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

fn default_region() -> String {
    "eu-central-1".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
            request_timeout_secs: None,
        }
    }
}

impl InvocationConfig {
    pub fn resolved_endpoint(&self) -> String {
        self.endpoint
            .clone()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| default_endpoint(&self.region))
    }
}

// ── Gateway ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Value of `Access-Control-Allow-Origin`; empty omits the header
    #[serde(default = "default_cors_allow_origin")]
    pub cors_allow_origin: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_cors_allow_origin() -> String {
    "*".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_allow_origin: default_cors_allow_origin(),
        }
    }
}

impl GatewayConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .with_context(|| format!("Invalid gateway bind address: {}", self.bind))
    }
}

/// Mask a secret string for safe display in Debug output / logs.
/// Shows first 3 and last 4 chars for keys longer than 7 chars, otherwise "***".
fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".harmony")
}

impl HarmonyConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        warn_if_world_readable(&path);

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `harmony init` first.",
                path.display()
            )
        })?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    /// Parse config text after `${VAR}` expansion and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Self = toml::from_str(&expanded)?;

        if config.providers.is_empty() {
            return Err(anyhow!("At least one [[providers]] entry is required"));
        }
        if let Some(entry) = config.providers.iter().find(|p| p.id.trim().is_empty()) {
            return Err(anyhow!(
                "Provider entry with empty id (family {:?})",
                entry.family
            ));
        }

        if !config.invocation.api_key.is_empty() && content.contains(&config.invocation.api_key) {
            warn!(
                "Invocation API key is hardcoded in config file. For security, use environment variables: api_key = \"${{AWS_BEARER_TOKEN_BEDROCK}}\""
            );
        }

        Ok(config)
    }

    /// Registry in declared order; explicit families win over detection
    pub fn registry(&self) -> Result<ProviderRegistry> {
        let detector = FamilyDetector::new(self.detection.rules.clone());
        let specs = self
            .providers
            .iter()
            .map(|entry| match entry.family {
                Some(family) => ProviderSpec::new(entry.id.clone(), family),
                None => ProviderSpec::detected(entry.id.clone(), &detector),
            })
            .collect();
        ProviderRegistry::new(specs)
    }

    /// TOML with secrets masked, for display
    pub fn to_display_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        shown.invocation.api_key = mask_secret(&self.invocation.api_key);
        toml::to_string_pretty(&shown).context("Failed to render config")
    }
}

#[cfg(unix)]
fn warn_if_world_readable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = std::fs::metadata(path) {
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            warn!(
                "Config file {:?} is readable by other users ({:o}). It may contain secrets. Fix with: chmod 600 {:?}",
                path,
                mode & 0o777,
                path
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_world_readable(_path: &Path) {}

/// Allowlist of environment variable names that may be expanded in config files.
/// This prevents an attacker who can modify the config from reading arbitrary env vars.
const ALLOWED_ENV_VARS: &[&str] = &[
    "AWS_BEARER_TOKEN_BEDROCK",
    "AWS_REGION",
    "HARMONY_ENDPOINT",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while let Some(start) = result[pos..].find("${") {
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            // Leave the ${VAR} unexpanded so it's obvious
            pos = abs_start + end + 1;
            continue;
        }

        let value = std::env::var(&var_name).unwrap_or_default();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value.len();
    }
    result
}
