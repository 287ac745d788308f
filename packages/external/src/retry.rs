//! Bounded retry with a per-attempt timeout.
//!
//! Every external lookup goes through [`with_retry`]. Retryable
//! failures ([`LookupError::Timeout`], [`LookupError::Transient`]) are
//! retried with exponential backoff (`base`, `2·base`, `4·base`, ...)
//! until `max_attempts` is reached. `NotFound` and `Permanent` return
//! immediately.

use std::future::Future;
use std::time::Duration;

use acre_map_config::ExternalConfig;

use crate::LookupError;

/// How a single lookup is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Retry settings from `config` with the given per-attempt timeout.
    #[must_use]
    pub fn from_config(config: &ExternalConfig, timeout_secs: u64) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Delay before attempt `attempt` (zero-based; attempt 0 has none).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.backoff_base
            .saturating_mul(1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX))
    }
}

/// Runs `call` until it succeeds, fails permanently, or runs out of
/// attempts. The last error is returned on exhaustion.
///
/// # Errors
///
/// Returns the final [`LookupError`] once retries are exhausted or a
/// non-retryable error occurs.
pub async fn with_retry<T, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    call: F,
) -> Result<T, LookupError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LookupError>>,
{
    let mut last_error = LookupError::Timeout;

    for attempt in 0..policy.max_attempts {
        if attempt > 0 {
            let delay = policy.backoff(attempt);
            log::debug!(
                "{label}: retry {attempt}/{} in {delay:?}",
                policy.max_attempts - 1
            );
            tokio::time::sleep(delay).await;
        }

        let error = match tokio::time::timeout(policy.timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => LookupError::Timeout,
        };

        if !error.is_retryable() {
            return Err(error);
        }
        log::warn!("{label}: attempt {} failed: {error}", attempt + 1);
        last_error = error;
    }

    Err(last_error)
}
