//! Bounded retry with exponential backoff for rate-limited backend calls.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::domain::errors::{BackendError, QueryError};
use crate::domain::models::RetryConfig;
use crate::domain::ports::{Sleeper, TokioSleeper};

const DEFAULT_MAX_RETRY_AFTER_MS: u64 = 60_000;

/// Retry policy for handling backend throttling
///
/// Only [`BackendError::RateLimited`] is retried. The delay before attempt
/// `k + 1` is the backend's `Retry-After` hint when present (capped at
/// `max_retry_after`, 60s by default), otherwise
/// `min(max_backoff, base_backoff * 2^(k-1))` plus up to `max_jitter` of
/// random jitter: 500ms → 1s → 2s → 4s → 8s (max) with the defaults.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first
    max_attempts: u32,
    /// Backoff before the second attempt in milliseconds
    base_backoff_ms: u64,
    /// Cap on the exponential part of the backoff in milliseconds
    max_backoff_ms: u64,
    /// Upper bound of the uniform jitter in milliseconds
    max_jitter_ms: u64,
    /// `retry_in_ms` reported when attempts run out without a server hint
    exhausted_retry_in_ms: u64,
    /// Ceiling on a server `Retry-After` hint in milliseconds
    max_retry_after_ms: u64,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// # Arguments
    /// * `max_attempts` - Total attempts including the first (recommended: 5)
    /// * `base_backoff_ms` - Delay before the second attempt (recommended: 500ms)
    /// * `max_backoff_ms` - Cap on the exponential delay (recommended: 8000ms)
    /// * `max_jitter_ms` - Random jitter added on top (recommended: 200ms)
    /// * `exhausted_retry_in_ms` - Wait suggested to callers after giving up (recommended: 5000ms)
    ///
    /// # Example
    /// ```
    /// use trellis::services::RetryPolicy;
    ///
    /// let policy = RetryPolicy::new(5, 500, 8_000, 200, 5_000);
    /// assert_eq!(policy.max_attempts(), 5);
    /// ```
    pub fn new(
        max_attempts: u32,
        base_backoff_ms: u64,
        max_backoff_ms: u64,
        max_jitter_ms: u64,
        exhausted_retry_in_ms: u64,
    ) -> Self {
        assert!(max_attempts > 0, "max_attempts must be greater than 0");
        assert!(base_backoff_ms > 0, "base_backoff_ms must be greater than 0");
        assert!(
            max_backoff_ms >= base_backoff_ms,
            "max_backoff_ms must be >= base_backoff_ms"
        );

        Self {
            max_attempts,
            base_backoff_ms,
            max_backoff_ms,
            max_jitter_ms,
            exhausted_retry_in_ms,
            max_retry_after_ms: DEFAULT_MAX_RETRY_AFTER_MS,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.base_backoff_ms,
            config.max_backoff_ms,
            config.max_jitter_ms,
            config.exhausted_retry_in_ms,
        )
        .with_max_retry_after(Duration::from_millis(config.max_retry_after_ms))
    }

    /// Cap how long a server `Retry-After` hint may hold a request
    #[must_use]
    pub fn with_max_retry_after(mut self, max_retry_after: Duration) -> Self {
        self.max_retry_after_ms = u64::try_from(max_retry_after.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Replace the sleeper used between attempts
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Execute an operation, retrying while the backend rate limits
    ///
    /// The operation receives the 1-based attempt number.
    ///
    /// # Returns
    /// * `Ok(T)` - Some attempt succeeded
    /// * `Err(QueryError::RateLimit)` - Every one of `max_attempts` attempts was rate limited
    /// * `Err(QueryError::Fetch)` - A non-rate-limit failure; never retried
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, QueryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after rate limiting");
                    }
                    return Ok(result);
                }
                Err(BackendError::RateLimited { retry_after_secs }) => {
                    if attempt >= self.max_attempts {
                        let retry_in_ms = retry_after_secs
                            .map_or(self.exhausted_retry_in_ms, |secs| secs.saturating_mul(1000));
                        warn!(
                            attempts = attempt,
                            retry_in_ms, "rate limit retries exhausted"
                        );
                        return Err(QueryError::rate_limited(attempt, retry_in_ms));
                    }

                    let delay = self.backoff_delay(attempt, retry_after_secs);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        server_hint = retry_after_secs.is_some(),
                        "rate limited by backend, backing off"
                    );

                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    debug!(attempt, error = %err, "permanent error, not retrying");
                    return Err(QueryError::fetch(err));
                }
            }
        }
    }

    /// Delay to wait after attempt `attempt` was rate limited
    ///
    /// A server `Retry-After` hint (seconds) wins over computed backoff, up to
    /// the configured ceiling.
    pub fn backoff_delay(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        if let Some(secs) = retry_after_secs {
            return Duration::from_millis(
                secs.saturating_mul(1000).min(self.max_retry_after_ms),
            );
        }

        let jitter_ms = if self.max_jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.max_jitter_ms)
        };

        self.exponential_delay(attempt) + Duration::from_millis(jitter_ms)
    }

    /// Jitter-free part of the backoff
    ///
    /// Formula: min(base_backoff * 2^(attempt-1), max_backoff)
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let backoff_ms = self
            .base_backoff_ms
            .saturating_mul(2_u64.saturating_pow(exponent))
            .min(self.max_backoff_ms);

        Duration::from_millis(backoff_ms)
    }
}

impl Default for RetryPolicy {
    /// 5 attempts, 500ms base, 8s cap, 200ms jitter, 5s suggested wait
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_backoff_ms", &self.base_backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("max_jitter_ms", &self.max_jitter_ms)
            .field("exhausted_retry_in_ms", &self.exhausted_retry_in_ms)
            .field("max_retry_after_ms", &self.max_retry_after_ms)
            .finish_non_exhaustive()
    }
}
