//! Hosted entity API adapter
//!
//! reqwest implementation of the [`EntityApi`](crate::domain::ports::EntityApi)
//! port, with optional client-side token bucket throttling.

pub mod client;
pub mod rate_limiter;

pub use client::HttpEntityApi;
pub use rate_limiter::TokenBucketRateLimiter;
