//! Fixed-schedule retry policies and a generic async retry wrapper.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Up to `max_attempts` tries; the sleep after attempt `n` is `delay * backoff^(n-1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: f64,
}

/// Clusters may report RUNNING before they accept a new execution context.
pub const CREATE_CONTEXT_RETRY: RetryPolicy = RetryPolicy::new(10, Duration::from_secs(5), 5.0);

pub const UPLOAD_RETRY: RetryPolicy = RetryPolicy::new(3, Duration::from_secs(1), 0.3);

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration, backoff: f64) -> Self {
        Self {
            max_attempts,
            delay,
            backoff,
        }
    }

    /// A single attempt, no sleeping.
    pub const fn none() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    /// The sleeps taken between consecutive attempts.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let count = self.max_attempts.saturating_sub(1) as usize;
        std::iter::successors(Some(self.delay), move |d| Some(d.mul_f64(self.backoff))).take(count)
    }

    pub fn total_delay(&self) -> Duration {
        self.delays().sum()
    }
}

/// Runs `op` until it succeeds or the policy's attempts are exhausted,
/// returning the last error.
pub async fn retry<F, Fut, T, E>(policy: &RetryPolicy, action: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delays = policy.delays();

    for attempt in 1..max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let delay = delays.next().unwrap_or(policy.delay);
                tracing::warn!(
                    action,
                    attempt,
                    max_attempts,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    op().await
}
