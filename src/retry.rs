//! Retry with exponential backoff for upstream API calls
//!
//! Both network-bound capabilities (chat completion and speech synthesis)
//! share the same policy: a bounded number of attempts with the wait
//! doubling after each transient failure. Which failures count as
//! transient is decided per call site.

use std::future::Future;
use std::time::Duration;

/// Retry policy for upstream API calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (first try included)
    pub max_attempts: u32,
    /// Delay before the second attempt (doubles each retry)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Compute the wait before retrying after the given 1-based attempt.
    ///
    /// Attempt 1 waits `base_delay`, attempt 2 waits `2 * base_delay`,
    /// and so on, capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `op` until it succeeds, the error is not retryable, or attempts
/// are exhausted. Returns the last error on failure.
///
/// The operation is re-created per attempt via the `op` closure so that
/// request builders are not reused across tries.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_attempts || !is_retryable(&err) {
                    return Err(err);
                }

                let wait = policy.delay_for_attempt(attempt);
                tracing::debug!(attempt, wait_ms = wait.as_millis() as u64, "retrying after transient failure");
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}
