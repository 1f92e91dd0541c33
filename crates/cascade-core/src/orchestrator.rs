//! Fallback orchestration across providers and models
//!
//! Two walks are offered, with different failure contracts:
//!
//! - [`FallbackOrchestrator::generate`] (cascading): one attempt per
//!   registered provider, in priority order; total failure yields `None`.
//! - [`FallbackOrchestrator::generate_with_strategy`]: each model of a
//!   [`Strategy`] runs under the [`RetryPolicy`]; total failure is an error
//!   carrying the last provider failure.
//!
//! Attempts inside one invocation are strictly sequential.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{CascadeError, ProviderError};
use crate::providers::{Generation, GenerationOptions, LlmProvider};
use crate::registry::ProviderRegistry;
use crate::retry::RetryPolicy;
use crate::strategy::Strategy;
use crate::telemetry::{AttemptOutcome, AttemptRecord, AttemptSink, TracingSink};

/// Wall-clock budget for a whole fallback walk
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(120);

/// Walks providers or strategy models in order until one generates
pub struct FallbackOrchestrator {
    registry: Arc<ProviderRegistry>,
    retry: RetryPolicy,
    deadline: Option<Duration>,
    sink: Arc<dyn AttemptSink>,
}

/// State for one orchestrated generation
struct Invocation {
    request_id: Uuid,
    started: Instant,
    limit: Option<Duration>,
    deadline: Option<Instant>,
}

impl Invocation {
    /// A limit too large to represent as an instant means no deadline
    fn start(limit: Option<Duration>) -> Self {
        let started = Instant::now();
        Self {
            request_id: Uuid::new_v4(),
            started,
            limit,
            deadline: limit.and_then(|l| started.checked_add(l)),
        }
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

impl std::fmt::Debug for FallbackOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackOrchestrator")
            .field("registry", &self.registry)
            .field("retry", &self.retry)
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl FallbackOrchestrator {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            retry: RetryPolicy::default(),
            deadline: Some(DEFAULT_DEADLINE),
            sink: Arc::new(TracingSink),
        }
    }

    /// Retry policy applied per model in strategy mode
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Overall budget per invocation; `None` disables it
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn AttemptSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Cascading mode: one attempt per registered provider
    ///
    /// Returns the first success with its attribution, or `None` once every
    /// provider has failed (or the registry is empty, or the deadline passed).
    pub async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        options: &GenerationOptions,
    ) -> Option<Generation> {
        if self.registry.is_empty() {
            error!("Inference is unconfigured: no providers registered, returning no result");
            return None;
        }

        let inv = Invocation::start(self.deadline);
        let providers = self.registry.providers();

        for (idx, provider) in providers.iter().enumerate() {
            if inv.expired() {
                warn!(
                    "Deadline of {:?} exceeded before trying {}",
                    inv.limit.unwrap_or_default(),
                    provider.identity()
                );
                return None;
            }

            debug!(
                "Trying provider {} ({}/{})",
                provider.identity(),
                idx + 1,
                providers.len()
            );

            match self.attempt(&inv, provider.as_ref(), 1, prompt, system, options).await {
                Ok(text) => {
                    if idx > 0 {
                        info!("Request succeeded on failover provider {}", provider.identity());
                    }
                    return Some(Generation {
                        text,
                        identity: provider.identity(),
                    });
                }
                Err(e) => {
                    warn!("Provider {} failed: {}", provider.identity(), e);
                    if let Some(next) = providers.get(idx + 1) {
                        info!(
                            "Failing over from {} to {}",
                            provider.identity(),
                            next.identity()
                        );
                    }
                }
            }
        }

        error!("All {} providers failed", providers.len());
        None
    }

    /// Strategy mode: retry each model under the policy, then advance
    pub async fn generate_with_strategy(
        &self,
        strategy: &Strategy,
        prompt: &str,
        system: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<Generation, CascadeError> {
        if strategy.is_empty() {
            return Err(CascadeError::Unconfigured(format!(
                "strategy '{}' lists no models",
                strategy.name
            )));
        }
        if self.registry.is_empty() {
            return Err(CascadeError::Unconfigured(
                "no providers are registered".to_string(),
            ));
        }

        let inv = Invocation::start(self.deadline);
        let mut last_error: Option<ProviderError> = None;
        let mut attempts = 0u32;

        for (idx, model) in strategy.models.iter().enumerate() {
            if inv.expired() {
                return Err(CascadeError::DeadlineExceeded {
                    elapsed: inv.started.elapsed(),
                    last: last_error,
                });
            }

            let provider = match self.registry.resolve_model(model) {
                Ok(provider) => provider,
                Err(e) => {
                    warn!("Skipping model {} in strategy '{}': {}", model, strategy.name, e);
                    last_error = Some(e);
                    continue;
                }
            };

            debug!(
                "Strategy '{}': trying {} ({}/{}) with up to {} attempts",
                strategy.name,
                provider.identity(),
                idx + 1,
                strategy.len(),
                self.retry.max_attempts()
            );

            let provider_ref: &dyn LlmProvider = provider.as_ref();
            let inv_ref = &inv;
            let result = self
                .retry
                .execute_until(inv.deadline, |attempt| {
                    attempts += 1;
                    self.attempt(inv_ref, provider_ref, attempt, prompt, system, options)
                })
                .await;

            match result {
                Ok(text) => {
                    if idx > 0 {
                        info!(
                            "Strategy '{}' succeeded on fallback model {}",
                            strategy.name,
                            provider.identity()
                        );
                    }
                    return Ok(Generation {
                        text,
                        identity: provider.identity(),
                    });
                }
                Err(e) => {
                    warn!(
                        "Model {} exhausted its retry budget: {}",
                        provider.identity(),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        if inv.expired() {
            error!("Strategy '{}' ran out of time", strategy.name);
            return Err(CascadeError::DeadlineExceeded {
                elapsed: inv.started.elapsed(),
                last: last_error,
            });
        }

        error!(
            "All {} models in strategy '{}' failed",
            strategy.len(),
            strategy.name
        );
        match last_error {
            Some(last) => Err(CascadeError::Exhausted {
                strategy: strategy.name.clone(),
                attempts,
                last,
            }),
            None => Err(CascadeError::Unconfigured(format!(
                "strategy '{}' produced no attempts",
                strategy.name
            ))),
        }
    }

    /// One provider invocation, bounded by the invocation deadline and reported to the sink
    async fn attempt(
        &self,
        inv: &Invocation,
        provider: &dyn LlmProvider,
        attempt: u32,
        prompt: &str,
        system: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        let started_at = Utc::now();
        let start = Instant::now();

        let call = provider.generate(prompt, system, options);
        let result = match (inv.deadline, inv.limit) {
            (Some(deadline), Some(limit)) => tokio::time::timeout_at(deadline, call)
                .await
                .unwrap_or_else(|_| Err(ProviderError::deadline(limit))),
            _ => call.await,
        };

        let outcome = match &result {
            Ok(_) => AttemptOutcome::Success,
            Err(e) => AttemptOutcome::failure(e),
        };
        self.sink.record(AttemptRecord {
            request_id: inv.request_id,
            identity: provider.identity(),
            attempt,
            outcome,
            elapsed: start.elapsed(),
            started_at,
        });

        result
    }
}
