//! Trellis - request orchestration for a hosted entity API
//!
//! Trellis sits between an application and a rate-limited, remote entity
//! store. Every query goes through a [`QueryOrchestrator`], which
//!
//! - serves repeated queries from a short-lived cache,
//! - coalesces identical concurrent queries onto a single backend call,
//! - retries rate-limited calls with exponential backoff and jitter,
//! - classifies terminal failures as `RATE_LIMIT` or `FETCH_ERROR`.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): query and key models, errors, ports
//! - **Service Layer** (`services`): cache, retry policy, orchestrator
//! - **Infrastructure Layer** (`infrastructure`): HTTP backend, config, logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use serde_json::json;
//! use trellis::{HttpEntityApi, QueryOrchestrator, QuerySpec};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = trellis::ConfigLoader::load()?;
//!     let api = HttpEntityApi::with_config(&config.backend, &config.rate_limit)?;
//!     let orchestrator = QueryOrchestrator::from_config(Arc::new(api), &config);
//!
//!     let open_tasks = orchestrator
//!         .query(QuerySpec::new("Task").filter(json!({ "status": "open" })))
//!         .await?;
//!     println!("{} open tasks", open_tasks.len());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{BackendError, QueryError, QueryErrorCode};
pub use domain::models::{
    BackendConfig, CacheConfig, Config, Item, LoggingConfig, QuerySpec, RateLimitConfig,
    RequestKey, RetryConfig,
};
pub use domain::ports::{EntityApi, Sleeper, TokioSleeper};
pub use infrastructure::backend::HttpEntityApi;
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{QueryOrchestrator, QueryStats, RetryPolicy};
