//! Retry loop with exponential backoff shared by the external tool adapters

use crate::{PipelineError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error};

/// Attempt budget and backoff schedule for one external call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Delay to wait after failed attempt `attempt` (1-based): base * 2^(attempt - 1)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent. The operation receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> AttemptReport<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let err = match operation(attempt).await {
                Ok(value) => {
                    return AttemptReport {
                        outcome: Ok(value),
                        attempts: attempt,
                        backoff,
                    }
                }
                Err(e) => e,
            };

            error!("Attempt {}/{} failed for {}: {}", attempt, self.max_attempts, label, err);

            if !err.is_retryable() || attempt >= self.max_attempts {
                return AttemptReport {
                    outcome: Err(err),
                    attempts: attempt,
                    backoff,
                };
            }

            let delay = self.delay_after(attempt);
            debug!("Retrying {} in {:.1}s", label, delay.as_secs_f64());
            tokio::time::sleep(delay).await;
            backoff.push(delay);
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Outcome of an operation run under a [`RetryPolicy`]
#[derive(Debug)]
pub struct AttemptReport<T> {
    /// Final value, or the error from the last attempt
    pub outcome: Result<T>,
    /// Number of attempts made
    pub attempts: u32,
    /// Delays slept between attempts, in order
    pub backoff: Vec<Duration>,
}

impl<T> AttemptReport<T> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Message of the error that ended the last attempt
    pub fn last_diagnostic(&self) -> Option<String> {
        self.outcome.as_ref().err().map(PipelineError::to_string)
    }

    pub fn into_result(self) -> Result<T> {
        self.outcome
    }
}
