//! Bounded retry with backoff.

use std::{future::Future, time::Duration};

use tokio::time::sleep;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before the attempt following `attempt` (zero-based): `base * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    pub async fn run<T, F, Fut>(&self, label: &str, operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = *self;
        retry(label, self.max_attempts, move |attempt| policy.backoff(attempt), operation).await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Runs `operation` until it succeeds or `max_attempts` attempts have failed,
/// sleeping `backoff(attempt)` between attempts. Errors that are not
/// retryable are returned immediately.
pub async fn retry<T, F, Fut, B>(
    label: &str,
    max_attempts: u32,
    backoff: B,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    B: Fn(u32) -> Duration,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < max_attempts && err.is_retryable() => {
                let delay = backoff(attempt);
                tracing::warn!(
                    operation = label,
                    attempt = attempt + 1,
                    max_attempts,
                    backoff = ?delay,
                    "attempt failed, retrying: {}",
                    err
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
