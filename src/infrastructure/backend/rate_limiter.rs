//! Client-side token bucket throttling for the entity API client.
//!
//! Disabled unless `rate_limit.requests_per_second` is configured.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Token bucket limiter for outgoing backend requests
///
/// Keeps this client under the backend's published request rate so that
/// 429 responses stay the exception. Capacity equals the refill rate, which
/// allows a one-second burst.
#[derive(Clone)]
pub struct TokenBucketRateLimiter {
    state: Arc<Mutex<BucketState>>,
    /// Maximum token capacity
    capacity: f64,
    /// Tokens added per second
    refill_rate: f64,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucketRateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `requests_per_second` - Sustained request rate (e.g., 10.0 for 10 requests/sec)
    ///
    /// # Example
    /// ```
    /// use trellis::infrastructure::backend::TokenBucketRateLimiter;
    ///
    /// let rate_limiter = TokenBucketRateLimiter::new(10.0);
    /// ```
    pub fn new(requests_per_second: f64) -> Self {
        assert!(requests_per_second > 0.0, "Rate limit must be positive");

        Self {
            state: Arc::new(Mutex::new(BucketState {
                tokens: requests_per_second,
                last_refill: Instant::now(),
            })),
            capacity: requests_per_second,
            refill_rate: requests_per_second,
        }
    }

    /// Acquire a token from the bucket, waiting if necessary
    pub async fn acquire(&self) {
        loop {
            let mut state = self.state.lock().await;

            // Refill tokens based on elapsed time
            let now = Instant::now();
            let elapsed = now.duration_since(state.last_refill).as_secs_f64();
            let available = elapsed.mul_add(self.refill_rate, state.tokens).min(self.capacity);

            if available >= 1.0 {
                state.tokens = available - 1.0;
                state.last_refill = now;
                return;
            }

            let tokens_needed = 1.0 - available;
            let wait = Duration::from_secs_f64((tokens_needed / self.refill_rate).max(0.001));

            // Release the lock before sleeping
            drop(state);
            sleep(wait).await;
        }
    }

    /// Current number of available tokens (for testing/monitoring)
    pub async fn available_tokens(&self) -> f64 {
        let state = self.state.lock().await;
        let elapsed = Instant::now()
            .duration_since(state.last_refill)
            .as_secs_f64();
        elapsed.mul_add(self.refill_rate, state.tokens).min(self.capacity)
    }
}
