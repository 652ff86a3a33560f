use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::MtdError;

type RetryPredicate = Arc<dyn Fn(&MtdError) -> bool + Send + Sync>;

/// Bounded exponential backoff around regulator calls.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first (default: 3)
    pub max_attempts: u32,
    /// Delay before the second attempt (default: 500ms)
    pub initial_backoff: Duration,
    /// Ceiling for any single delay (default: 8s)
    pub max_backoff: Duration,
    /// Growth factor between delays (default: 2.0)
    pub multiplier: f64,
    retryable: RetryPredicate,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            multiplier: 2.0,
            retryable: Arc::new(MtdError::is_retryable),
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_backoff", &self.initial_backoff)
            .field("max_backoff", &self.max_backoff)
            .field("multiplier", &self.multiplier)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            multiplier,
            ..Default::default()
        }
    }

    /// A single attempt, never retried.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Replaces the predicate deciding which errors earn another attempt.
    pub fn with_retryable<F>(mut self, retryable: F) -> Self
    where
        F: Fn(&MtdError) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(retryable);
        self
    }

    pub fn is_retryable(&self, err: &MtdError) -> bool {
        (self.retryable)(err)
    }

    /// Delay after failed attempt `attempt` (1-based):
    /// `min(initial * multiplier^(attempt - 1), max)`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
            .unwrap_or(self.max_backoff)
    }

    /// How long to wait before trying again after `err` ended attempt
    /// `attempt`, or `None` when the caller should give up.
    pub fn next_delay(&self, attempt: u32, err: &MtdError) -> Option<Duration> {
        if attempt >= self.max_attempts || !self.is_retryable(err) {
            return None;
        }
        Some(self.backoff_for(attempt))
    }

    /// Runs `f` until it succeeds, fails with a non-retryable error, or
    /// the attempts run out. `f` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T, MtdError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, MtdError>>,
    {
        let mut attempt = 1;
        loop {
            match f(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let Some(delay) = self.next_delay(attempt, &err) else {
                        return Err(err);
                    };
                    warn!(
                        operation,
                        attempt,
                        backoff_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// How long to wait for an accepted calculation to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Pause between status checks (default: 2s)
    pub interval: Duration,
    /// Give up and report "still processing" after this long (default: 30s)
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
        }
    }
}
