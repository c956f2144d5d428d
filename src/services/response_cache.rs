//! Short-lived cache of successful query results.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::domain::models::{Item, RequestKey};

/// A cached result set and when it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Arc<Vec<Item>>,
    pub stored_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.stored_at) < ttl
    }
}

/// TTL map from request key to result set.
///
/// Expired entries are never served: reads check age before trusting a hit
/// and drop the entry when it is stale. Inserts prune every expired entry so
/// keys that are never read again do not accumulate.
#[derive(Debug)]
pub struct ResponseCache {
    entries: RwLock<HashMap<RequestKey, CacheEntry>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached data for `key` if it is younger than the TTL.
    pub async fn get_fresh(&self, key: &RequestKey) -> Option<Arc<Vec<Item>>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_fresh(now, self.ttl) => {
                    return Some(Arc::clone(&entry.data));
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Stale: drop it unless a newer result replaced it meanwhile.
        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|entry| !entry.is_fresh(now, self.ttl))
        {
            entries.remove(key);
        }
        None
    }

    /// Store `data` for `key`, replacing any older result.
    pub async fn insert(&self, key: RequestKey, data: Arc<Vec<Item>>) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.is_fresh(now, self.ttl));
        entries.insert(
            key,
            CacheEntry {
                data,
                stored_at: now,
            },
        );
    }

    /// Drop every cached result belonging to `entity`. Returns how many were removed.
    pub async fn invalidate_entity(&self, entity: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| key.entity() != entity);
        before - entries.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of stored entries, fresh or not yet pruned.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
