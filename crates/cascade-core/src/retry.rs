//! Bounded retry with a linear delay schedule
//!
//! [`RetryPolicy`] knows nothing about other providers: it runs one operation
//! up to `max_attempts` times and hands the last error back so the caller can
//! move on to the next entry.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ProviderError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    skip_terminal: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            skip_terminal: false,
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            skip_terminal: false,
        }
    }

    /// Stop retrying an entry as soon as it reports a terminal error
    pub fn skip_terminal(mut self, skip: bool) -> Self {
        self.skip_terminal = skip;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn skips_terminal(&self) -> bool {
        self.skip_terminal
    }

    /// Delay after the `attempt`-th failure (1-based): `base_delay * attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Run `op` until it succeeds or the attempt budget is spent
    ///
    /// `op` receives the 1-based attempt index.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, ProviderError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.execute_until(None, op).await
    }

    /// Like [`execute`](Self::execute), but never sleeps past `deadline`
    ///
    /// When the next delay would end at or after the deadline, the last error
    /// is returned without further attempts.
    pub async fn execute_until<T, F, Fut>(
        &self,
        deadline: Option<Instant>,
        mut op: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 1;
        loop {
            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if attempt >= self.max_attempts {
                debug!("Retry budget of {} attempts exhausted", self.max_attempts);
                return Err(err);
            }

            if self.skip_terminal && !err.is_transient() {
                debug!("Terminal error on attempt {}, not retrying: {}", attempt, err);
                return Err(err);
            }

            let delay = self.delay_for(attempt);
            if let Some(deadline) = deadline {
                let resume = Instant::now().checked_add(delay);
                if resume.is_none_or(|at| at >= deadline) {
                    warn!(
                        "Skipping retry after attempt {}: {:?} backoff would pass the deadline",
                        attempt, delay
                    );
                    return Err(err);
                }
            }

            debug!("Backing off for {:?} before attempt {}", delay, attempt + 1);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
