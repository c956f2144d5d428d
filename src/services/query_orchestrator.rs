//! Request orchestration for entity queries.
//!
//! Wraps an [`EntityApi`] with three behaviours:
//! - a short-TTL response cache keyed by the canonical request key
//! - coalescing of concurrent identical requests onto one backend call
//! - bounded exponential-backoff retry while the backend rate limits
//!
//! Failures are always surfaced as a [`QueryError`]; an error is never turned
//! into an empty result, so callers can keep showing their last good data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::domain::errors::{BackendError, QueryError};
use crate::domain::models::{Config, Item, QuerySpec, RequestKey};
use crate::domain::ports::EntityApi;

use super::response_cache::ResponseCache;
use super::retry_policy::RetryPolicy;

type QueryOutcome = Result<Arc<Vec<Item>>, QueryError>;
type SharedQuery = Shared<BoxFuture<'static, QueryOutcome>>;

const DEFAULT_TTL: Duration = Duration::from_millis(15_000);
const DEFAULT_LIMIT: u32 = 100;

/// Point-in-time copy of the orchestrator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueryStats {
    /// Queries answered from the cache.
    pub cache_hits: u64,
    /// Queries that started a new backend request.
    pub cache_misses: u64,
    /// Queries that attached to a request already in flight.
    pub coalesced: u64,
    /// Backend calls made, retries included.
    pub backend_calls: u64,
    /// Backend calls that were retries after a rate limit.
    pub rate_limit_retries: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    coalesced: AtomicU64,
    backend_calls: AtomicU64,
    rate_limit_retries: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> QueryStats {
        QueryStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            backend_calls: self.backend_calls.load(Ordering::Relaxed),
            rate_limit_retries: self.rate_limit_retries.load(Ordering::Relaxed),
        }
    }
}

/// Cache state a request was started under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Generation {
    epoch: u64,
    entity: u64,
}

struct InFlight {
    id: u64,
    request: SharedQuery,
}

/// Requests in flight, plus the invalidation counters they are checked
/// against before their result may enter the cache.
#[derive(Default)]
struct InFlightTable {
    requests: HashMap<RequestKey, InFlight>,
    /// Bumped by `invalidate_entity`.
    generations: HashMap<String, u64>,
    /// Bumped by `clear`.
    epoch: u64,
    next_id: u64,
}

impl InFlightTable {
    fn generation(&self, entity: &str) -> Generation {
        Generation {
            epoch: self.epoch,
            entity: self.generations.get(entity).copied().unwrap_or_default(),
        }
    }
}

struct Inner {
    api: Arc<dyn EntityApi>,
    cache: ResponseCache,
    in_flight: Mutex<InFlightTable>,
    retry: RetryPolicy,
    default_limit: u32,
    stats: StatsCounters,
}

/// Caching, coalescing, retrying front for an [`EntityApi`].
///
/// Cheap to clone; clones share one cache and one in-flight table. Create one
/// per process (or one per test for isolation).
///
/// # Example
/// ```ignore
/// let orchestrator = QueryOrchestrator::new(api);
/// let open_tasks = orchestrator
///     .query(QuerySpec::new("Task").filter(json!({ "status": "open" })))
///     .await?;
/// ```
#[derive(Clone)]
pub struct QueryOrchestrator {
    inner: Arc<Inner>,
}

/// Builder for [`QueryOrchestrator`].
pub struct QueryOrchestratorBuilder {
    api: Arc<dyn EntityApi>,
    ttl: Duration,
    default_limit: u32,
    retry: RetryPolicy,
}

impl QueryOrchestratorBuilder {
    /// How long successful results are served from cache.
    #[must_use]
    pub const fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Limit applied to queries that do not set one.
    #[must_use]
    pub const fn default_limit(mut self, limit: u32) -> Self {
        self.default_limit = limit;
        self
    }

    #[must_use]
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(self) -> QueryOrchestrator {
        QueryOrchestrator {
            inner: Arc::new(Inner {
                api: self.api,
                cache: ResponseCache::new(self.ttl),
                in_flight: Mutex::new(InFlightTable::default()),
                retry: self.retry,
                default_limit: self.default_limit,
                stats: StatsCounters::default(),
            }),
        }
    }
}

impl QueryOrchestrator {
    /// Orchestrator with the default 15s TTL, limit of 100 and retry policy.
    pub fn new(api: Arc<dyn EntityApi>) -> Self {
        Self::builder(api).build()
    }

    pub fn builder(api: Arc<dyn EntityApi>) -> QueryOrchestratorBuilder {
        QueryOrchestratorBuilder {
            api,
            ttl: DEFAULT_TTL,
            default_limit: DEFAULT_LIMIT,
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(api: Arc<dyn EntityApi>, config: &Config) -> Self {
        Self::builder(api)
            .ttl(Duration::from_millis(config.cache.ttl_ms))
            .default_limit(config.cache.default_limit)
            .retry_policy(RetryPolicy::from_config(&config.retry))
            .build()
    }

    /// Run `spec` against the backend, or answer it from cache or an identical
    /// request already in flight.
    ///
    /// # Returns
    /// * `Ok(items)` - Fresh cached data or the backend's result
    /// * `Err(QueryError::RateLimit)` - Backend kept throttling through every attempt
    /// * `Err(QueryError::Fetch)` - Any other failure, including an empty entity name
    #[instrument(skip(self, spec), fields(entity = %spec.entity))]
    pub async fn query(&self, spec: QuerySpec) -> Result<Vec<Item>, QueryError> {
        if spec.entity.trim().is_empty() {
            return Err(QueryError::fetch(BackendError::other(
                None,
                "entity name must not be empty",
            )));
        }

        let limit = spec.limit.unwrap_or(self.inner.default_limit);
        let key = RequestKey::new(&spec, limit);

        if let Some(data) = self.cached(&key).await {
            return Ok(data.as_ref().clone());
        }

        let pending = {
            let mut table = self.inner.in_flight.lock().await;

            if let Some(existing) = table.requests.get(&key) {
                self.inner.stats.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(%key, "joining in-flight request");
                existing.request.clone()
            } else if let Some(data) = self.cached(&key).await {
                // Settled between the fast path and taking the lock.
                return Ok(data.as_ref().clone());
            } else {
                self.inner.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
                let id = table.next_id;
                table.next_id += 1;
                let started_under = table.generation(key.entity());

                // Runs as its own task so it settles and leaves the table even
                // when every caller waiting on it has been dropped.
                let task = tokio::spawn(Arc::clone(&self.inner).fetch(
                    key.clone(),
                    spec,
                    limit,
                    id,
                    started_under,
                ));
                let request = task
                    .map(|joined| {
                        joined.unwrap_or_else(|err| {
                            Err(QueryError::fetch(BackendError::other(
                                None,
                                format!("query task failed: {err}"),
                            )))
                        })
                    })
                    .boxed()
                    .shared();
                table.requests.insert(
                    key,
                    InFlight {
                        id,
                        request: request.clone(),
                    },
                );
                request
            }
        };

        pending.await.map(|data| data.as_ref().clone())
    }

    /// Drop every cached result for `entity`, e.g. after writing to it.
    ///
    /// Requests for `entity` already in flight are detached: their callers
    /// still get the result, but it is not cached and later queries start a
    /// fresh backend call. Returns how many cached results were removed.
    pub async fn invalidate_entity(&self, entity: &str) -> usize {
        let mut table = self.inner.in_flight.lock().await;
        *table.generations.entry(entity.to_string()).or_default() += 1;
        table.requests.retain(|key, _| key.entity() != entity);

        let removed = self.inner.cache.invalidate_entity(entity).await;
        debug!(entity, removed, "invalidated cached results");
        removed
    }

    /// Drop all cached results and detach every in-flight request.
    pub async fn clear(&self) {
        let mut table = self.inner.in_flight.lock().await;
        table.epoch += 1;
        table.requests.clear();
        self.inner.cache.clear().await;
    }

    pub fn stats(&self) -> QueryStats {
        self.inner.stats.snapshot()
    }

    /// Number of backend requests currently in flight.
    pub async fn in_flight_count(&self) -> usize {
        self.inner.in_flight.lock().await.requests.len()
    }

    async fn cached(&self, key: &RequestKey) -> Option<Arc<Vec<Item>>> {
        let data = self.inner.cache.get_fresh(key).await?;
        self.inner.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
        debug!(%key, "cache hit");
        Some(data)
    }
}

impl Inner {
    async fn fetch(
        self: Arc<Self>,
        key: RequestKey,
        spec: QuerySpec,
        limit: u32,
        id: u64,
        started_under: Generation,
    ) -> QueryOutcome {
        let result = {
            let this: &Self = &self;
            let spec_ref = &spec;
            self.retry
                .execute(move |attempt| async move {
                    this.call_backend(spec_ref, limit, attempt).await
                })
                .await
        };

        // The cache write and the table update happen under one lock so an
        // invalidation cannot slip in between the generation check and the insert.
        let mut table = self.in_flight.lock().await;
        let still_current = table.generation(key.entity()) == started_under;

        let outcome = match result {
            Ok(items) => {
                let data = Arc::new(items);
                if still_current {
                    info!(%key, count = data.len(), "backend query completed");
                    self.cache.insert(key.clone(), Arc::clone(&data)).await;
                } else {
                    info!(%key, count = data.len(), "entity invalidated while in flight, result not cached");
                }
                Ok(data)
            }
            Err(err) => {
                debug!(%key, code = %err.code(), error = %err, "backend query failed");
                Err(err)
            }
        };

        if table.requests.get(&key).is_some_and(|entry| entry.id == id) {
            table.requests.remove(&key);
        }
        outcome
    }

    async fn call_backend(
        &self,
        spec: &QuerySpec,
        limit: u32,
        attempt: u32,
    ) -> Result<Vec<Item>, BackendError> {
        self.stats.backend_calls.fetch_add(1, Ordering::Relaxed);
        if attempt > 1 {
            self.stats.rate_limit_retries.fetch_add(1, Ordering::Relaxed);
        }

        if spec.is_unfiltered() {
            self.api
                .list(&spec.entity, spec.sort_hint(), Some(limit))
                .await
        } else {
            self.api
                .filter(&spec.entity, &spec.filter, spec.sort_hint(), Some(limit))
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex as StdMutex;

    /// Records which port method was called with which arguments.
    #[derive(Default)]
    struct RecordingApi {
        calls: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl EntityApi for RecordingApi {
        async fn list(
            &self,
            entity: &str,
            sort: Option<&str>,
            limit: Option<u32>,
        ) -> Result<Vec<Item>, BackendError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("list {entity} {sort:?} {limit:?}"));
            Ok(vec![])
        }

        async fn filter(
            &self,
            entity: &str,
            query: &Value,
            sort: Option<&str>,
            limit: Option<u32>,
        ) -> Result<Vec<Item>, BackendError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("filter {entity} {query} {sort:?} {limit:?}"));
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_dispatches_list_for_empty_filter() {
        let api = Arc::new(RecordingApi::default());
        let orchestrator = QueryOrchestrator::new(api.clone());

        orchestrator
            .query(QuerySpec::new("Garden").filter(json!({})).sort(""))
            .await
            .unwrap();
        orchestrator
            .query(
                QuerySpec::new("Task")
                    .filter(json!({"status": "open"}))
                    .sort("-created_date")
                    .limit(20),
            )
            .await
            .unwrap();

        let calls = api.calls.lock().unwrap();
        assert_eq!(calls[0], "list Garden None Some(100)");
        assert_eq!(
            calls[1],
            r#"filter Task {"status":"open"} Some("-created_date") Some(20)"#
        );
    }

    #[tokio::test]
    async fn test_default_limit_shares_key_with_explicit_limit() {
        let api = Arc::new(RecordingApi::default());
        let orchestrator = QueryOrchestrator::builder(api.clone())
            .default_limit(25)
            .build();

        orchestrator.query(QuerySpec::new("Plant")).await.unwrap();
        orchestrator
            .query(QuerySpec::new("Plant").limit(25))
            .await
            .unwrap();

        assert_eq!(api.calls.lock().unwrap().len(), 1);
        assert_eq!(orchestrator.stats().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_empty_entity_rejected_without_backend_call() {
        let api = Arc::new(RecordingApi::default());
        let orchestrator = QueryOrchestrator::new(api.clone());

        let err = orchestrator.query(QuerySpec::new("  ")).await.unwrap_err();
        assert_eq!(err.code(), crate::domain::QueryErrorCode::FetchError);
        assert!(api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_from_config_applies_cache_settings() {
        let api = Arc::new(RecordingApi::default());
        let mut config = Config::default();
        config.cache.default_limit = 7;
        let orchestrator = QueryOrchestrator::from_config(api.clone(), &config);

        orchestrator.query(QuerySpec::new("Harvest")).await.unwrap();
        assert_eq!(api.calls.lock().unwrap()[0], "list Harvest None Some(7)");
    }
}
