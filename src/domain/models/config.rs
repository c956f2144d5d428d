use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main configuration structure for Trellis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Hosted entity API connection settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Response cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Rate-limit retry configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Client-side request throttling
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Entity API connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BackendConfig {
    /// Base URL of the hosted backend
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Application identifier the entity collections belong to
    #[serde(default = "default_app_id")]
    pub app_id: String,

    /// Bearer token sent with every request (can also be set via `TRELLIS_BACKEND__API_KEY`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_app_id() -> String {
    "garden".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            app_id: default_app_id(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheConfig {
    /// How long a successful result is served without re-querying, in milliseconds
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// Item cap applied when a query does not specify one
    #[serde(default = "default_limit")]
    pub default_limit: u32,
}

const fn default_ttl_ms() -> u64 {
    15_000
}

const fn default_limit() -> u32 {
    100
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            default_limit: default_limit(),
        }
    }
}

/// Retry policy configuration for rate-limited backend calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Total attempts, including the first, before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt, in milliseconds
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Upper bound on the exponential part of the backoff, in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Upper bound on the random jitter added to each backoff, in milliseconds
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,

    /// Wait suggested to callers once attempts are exhausted, in milliseconds
    #[serde(default = "default_exhausted_retry_in_ms")]
    pub exhausted_retry_in_ms: u64,

    /// Longest wait honoured from a server `Retry-After` hint, in milliseconds
    #[serde(default = "default_max_retry_after_ms")]
    pub max_retry_after_ms: u64,
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_base_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    8_000
}

const fn default_max_jitter_ms() -> u64 {
    200
}

const fn default_exhausted_retry_in_ms() -> u64 {
    5_000
}

const fn default_max_retry_after_ms() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_jitter_ms: default_max_jitter_ms(),
            exhausted_retry_in_ms: default_exhausted_retry_in_ms(),
            max_retry_after_ms: default_max_retry_after_ms(),
        }
    }
}

/// Client-side rate limiting configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    /// Requests per second sent to the backend; unset disables throttling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_second: Option<f64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default)]
    pub format: LogFormat,

    /// Directory for rolling JSON log files; stderr only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Log file rotation policy
    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            rotation: RotationPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}
