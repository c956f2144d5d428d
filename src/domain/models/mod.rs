pub mod config;
pub mod query;

pub use config::{
    BackendConfig, CacheConfig, Config, LogFormat, LoggingConfig, RateLimitConfig, RetryConfig,
    RotationPolicy,
};
pub use query::{canonical_json, Item, QuerySpec, RequestKey};
