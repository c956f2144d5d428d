use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::BackendError;
use crate::domain::models::Item;

/// Interface to the hosted entity store
///
/// Implementations must report throttling as [`BackendError::RateLimited`];
/// every other failure is [`BackendError::Other`]. The orchestrator never
/// inspects raw status codes.
#[async_trait]
pub trait EntityApi: Send + Sync {
    /// List records of `entity` in backend order, or by `sort` when given
    ///
    /// # Arguments
    /// * `entity` - Collection name, e.g. `Garden`
    /// * `sort` - Optional ordering hint (`-created_date` for descending)
    /// * `limit` - Optional cap on returned records
    async fn list(
        &self,
        entity: &str,
        sort: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Item>, BackendError>;

    /// List records of `entity` matching `query`
    ///
    /// # Arguments
    /// * `entity` - Collection name
    /// * `query` - Field to match-criteria object
    /// * `sort` - Optional ordering hint
    /// * `limit` - Optional cap on returned records
    async fn filter(
        &self,
        entity: &str,
        query: &Value,
        sort: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Item>, BackendError>;
}
