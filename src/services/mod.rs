//! Service layer: the request orchestrator and the pieces it is built from.

pub mod query_orchestrator;
pub mod response_cache;
pub mod retry_policy;

pub use query_orchestrator::{QueryOrchestrator, QueryOrchestratorBuilder, QueryStats};
pub use response_cache::{CacheEntry, ResponseCache};
pub use retry_policy::RetryPolicy;
