use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid ttl_ms: {0}. Must be at least 1")]
    InvalidTtl(u64),

    #[error("Invalid default_limit: {0}. Must be at least 1")]
    InvalidDefaultLimit(u32),

    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error(
        "Invalid backoff configuration: base_backoff_ms ({0}) must be positive and not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid max_retry_after_ms: {0}. Must be at least 1")]
    InvalidRetryAfterCap(u64),

    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(f64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Backend base_url cannot be empty")]
    EmptyBaseUrl,

    #[error("Backend app_id cannot be empty")]
    EmptyAppId,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .trellis/config.yaml (project config)
    /// 3. .trellis/local.yaml (project local overrides, optional)
    /// 4. Environment variables (TRELLIS_* prefix, `__` between sections)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".trellis/config.yaml"))
            .merge(Yaml::file(".trellis/local.yaml"))
            .merge(Env::prefixed("TRELLIS_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring environment overrides
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("TRELLIS_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.backend.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }

        if config.backend.app_id.trim().is_empty() {
            return Err(ConfigError::EmptyAppId);
        }

        if config.cache.ttl_ms == 0 {
            return Err(ConfigError::InvalidTtl(config.cache.ttl_ms));
        }

        if config.cache.default_limit == 0 {
            return Err(ConfigError::InvalidDefaultLimit(config.cache.default_limit));
        }

        if config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.retry.max_attempts));
        }

        if config.retry.base_backoff_ms == 0
            || config.retry.base_backoff_ms > config.retry.max_backoff_ms
        {
            return Err(ConfigError::InvalidBackoff(
                config.retry.base_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        if config.retry.max_retry_after_ms == 0 {
            return Err(ConfigError::InvalidRetryAfterCap(0));
        }

        if let Some(rps) = config.rate_limit.requests_per_second {
            if rps <= 0.0 || !rps.is_finite() {
                return Err(ConfigError::InvalidRateLimit(rps));
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        Ok(())
    }
}
