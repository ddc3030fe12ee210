use std::{fmt::Display, future::Future, time::Duration};

use log::*;

/// Bounded exponential backoff.
///
/// `max_attempts` counts the first call, so the default policy makes one call and at most two retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, ..Default::default() }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// The pause before retry number `retry` (1-based), capped at `max_delay`.
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let factor = self.backoff_factor.saturating_pow(retry.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Runs `operation` until it succeeds, the error is not retryable, or the policy's attempts are used up.
/// The last error is returned in the latter two cases.
pub async fn with_retry<F, Fut, T, E, R>(policy: &RetryPolicy, is_retryable: R, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("🔁️ Operation succeeded after {attempt} attempts");
                }
                return Ok(result);
            },
            Err(e) if !is_retryable(&e) => {
                debug!("🔁️ Attempt {attempt} failed with a permanent error: {e}");
                return Err(e);
            },
            Err(e) if attempt >= policy.max_attempts => {
                warn!("🔁️ Operation failed after {attempt} attempts: {e}");
                return Err(e);
            },
            Err(e) => {
                let delay = policy.delay_before_retry(attempt);
                warn!("🔁️ Attempt {attempt} failed: {e}. Retrying in {delay:?}");
                tokio::time::sleep(delay).await;
            },
        }
    }
}
