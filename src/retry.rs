//! Bounded exponential-backoff retry for transient failures.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

/// Retry settings. `max_retries` is the total number of attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            backoff: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes a single attempt
    pub fn none() -> Self {
        Self {
            max_retries: 1,
            ..Self::default()
        }
    }

    /// Delay slept after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1) as i32;
        self.base_delay.mul_f64(self.backoff.powi(exp))
    }
}

/// Run `operation`, retrying transient failures per `policy`.
///
/// Non-transient errors return immediately. When the attempts run out the
/// last transient error is returned unchanged. The delay between attempts is
/// a tokio sleep, so other tasks keep running. Synchronous work can be passed
/// as `|| async { work() }`.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_retries.max(1);
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    event = "retry_attempt",
                    operation,
                    attempt,
                    max_attempts = attempts,
                    delay_seconds = delay.as_secs_f64(),
                    error = %e,
                    context = %e.context(),
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::error!(
                        event = "retry_exhausted",
                        operation,
                        attempts,
                        error = %e,
                        context = %e.context(),
                    );
                }
                return Err(e);
            }
        }
    }
}
