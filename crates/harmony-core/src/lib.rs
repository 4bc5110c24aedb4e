//! harmony-core - multi-provider fallback engine
//!
//! This crate provides:
//! - Provider families with per-family payload building and text extraction
//! - A priority-ordered provider registry
//! - An invocation client seam plus a Bedrock runtime HTTP client
//! - A fallback router that tries candidates in order until one yields text
//! - Envelope building: input validation, prompt templating, response shaping

pub mod envelope;
pub mod error;
pub mod handler;
pub mod providers;

// Re-export main types for convenience
pub use envelope::{EnvelopeBuilder, InboundPayload, PromptTemplate, ResponseEnvelope};
pub use error::{HandlerError, ValidationError};
pub use handler::RequestHandler;
pub use providers::{
    BedrockHttpClient, ExtractionPlan, FallbackResult, FallbackRouter, GenerationParams,
    InvocationClient, InvocationOutcome, ProviderAdapter, ProviderFamily, ProviderRegistry,
    ProviderSpec,
};
