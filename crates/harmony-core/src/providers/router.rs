//! Fallback router: tries candidates in registry order until one yields text

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::adapter::{Payload, ProviderAdapter};
use super::family::ProviderSpec;
use super::invoker::{InvocationClient, InvocationOutcome};
use super::registry::ProviderRegistry;

/// Reported when no candidate was ever contacted
pub const NO_PROVIDER_ATTEMPTED: &str = "No models were available or all failed.";

/// Terminal value of one routing pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackResult {
    Completed { output: String, provider: ProviderSpec },
    Exhausted { last_error: String },
}

/// Routes a prompt across the registry with sequential failover.
///
/// Each candidate is attempted at most once; there is no retry, backoff or
/// reordering. Candidates are never dispatched concurrently.
pub struct FallbackRouter {
    registry: ProviderRegistry,
    adapter: ProviderAdapter,
    client: Arc<dyn InvocationClient>,
    /// Overall budget for one routing pass
    deadline: Option<Duration>,
}

impl FallbackRouter {
    pub fn new(
        registry: ProviderRegistry,
        adapter: ProviderAdapter,
        client: Arc<dyn InvocationClient>,
    ) -> Self {
        Self {
            registry,
            adapter,
            client,
            deadline: None,
        }
    }

    /// Abort the in-flight call once this much time has passed
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub async fn route(&self, prompt: &str) -> FallbackResult {
        self.route_with_cancel(prompt, &CancellationToken::new())
            .await
    }

    /// Route a prompt. Cancellation or the deadline ends the pass immediately
    /// with an `Exhausted` result; no further candidates are tried.
    pub async fn route_with_cancel(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> FallbackResult {
        let deadline = self.deadline.map(|d| (Instant::now() + d, d));
        let total = self.registry.len();
        let mut last_error: Option<String> = None;
        let mut attempted = 0usize;

        for (idx, spec) in self.registry.iter().enumerate() {
            let payload = match self.adapter.build_payload(spec.family, prompt) {
                Payload::Body(payload) => payload,
                Payload::Skip => {
                    debug!(
                        "Skipping {} ({}/{}): unsupported provider family",
                        spec.identifier,
                        idx + 1,
                        total
                    );
                    continue;
                }
            };

            let bytes = match serde_json::to_vec(&payload) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to serialize payload for {}: {}", spec.identifier, e);
                    last_error = Some(format!(
                        "Failed to serialize payload for {}: {}",
                        spec.identifier, e
                    ));
                    continue;
                }
            };

            debug!(
                "Trying provider {} [{}] ({}/{})",
                spec.identifier,
                spec.family,
                idx + 1,
                total
            );
            attempted += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Request cancelled while invoking {}", spec.identifier);
                    return FallbackResult::Exhausted {
                        last_error: format!("Request cancelled while invoking {}", spec.identifier),
                    };
                }
                _ = deadline_elapsed(deadline.map(|(at, _)| at)) => {
                    let budget = deadline.map(|(_, d)| d).unwrap_or_default();
                    warn!("Request timed out after {:?} while invoking {}", budget, spec.identifier);
                    return FallbackResult::Exhausted {
                        last_error: format!(
                            "Request timed out after {}s while invoking {}",
                            budget.as_secs_f64(),
                            spec.identifier
                        ),
                    };
                }
                outcome = self.client.invoke(&spec.identifier, &bytes) => outcome,
            };

            match outcome {
                InvocationOutcome::Success { body } => {
                    match self.adapter.extract_text(spec.family, &body) {
                        Some(output) => {
                            if attempted > 1 {
                                info!(
                                    "Request succeeded on failover provider {} after {} attempts",
                                    spec.identifier, attempted
                                );
                            }
                            return FallbackResult::Completed {
                                output,
                                provider: spec.clone(),
                            };
                        }
                        None => {
                            let detail =
                                format!("Model {} returned an empty response.", spec.identifier);
                            warn!("{}", detail);
                            last_error = Some(detail);
                        }
                    }
                }
                InvocationOutcome::Failure { detail } => {
                    warn!("Error invoking model {}: {}", spec.identifier, detail);
                    last_error = Some(detail);
                }
            }

            match self.next_supported(idx) {
                Some(next) => {
                    info!("Failing over from {} to {}", spec.identifier, next.identifier)
                }
                None => debug!("No supported candidate left after {}", spec.identifier),
            }
        }

        let last_error = last_error.unwrap_or_else(|| NO_PROVIDER_ATTEMPTED.to_string());
        info!(
            "All {} providers exhausted ({} contacted): {}",
            total, attempted, last_error
        );
        FallbackResult::Exhausted { last_error }
    }

    /// First candidate after `idx` that will actually be invoked
    fn next_supported(&self, idx: usize) -> Option<&ProviderSpec> {
        self.registry
            .as_slice()
            .iter()
            .skip(idx + 1)
            .find(|next| next.family.is_supported())
    }
}

async fn deadline_elapsed(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
