//! Multi-provider fallback layer
//!
//! Candidates live in a [`ProviderRegistry`] in priority order. The
//! [`FallbackRouter`] walks them one at a time, using the [`ProviderAdapter`]
//! to speak each [`ProviderFamily`]'s schema and an [`InvocationClient`] to
//! reach the endpoint.

pub mod adapter;
pub mod family;
pub mod invoker;
pub mod registry;
pub mod router;

pub use adapter::{ExtractionPlan, ExtractionStrategy, GenerationParams, Payload, ProviderAdapter};
pub use family::{DetectionRule, FamilyDetector, ProviderFamily, ProviderSpec};
pub use invoker::{BedrockHttpClient, InvocationClient, InvocationOutcome};
pub use registry::ProviderRegistry;
pub use router::{FallbackResult, FallbackRouter};
