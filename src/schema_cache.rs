//! Schema Cache - Process-wide memoization of catalog introspection
//!
//! Entries are keyed by requested table (or all tables) and populated lazily.
//! Each key owns a `OnceCell`, so concurrent first requests share a single
//! introspection instead of racing get-then-set. Entries expire after the
//! configured TTL or when invalidated explicitly.

use crate::error::Result;
use crate::schema::SchemaDescription;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    AllTables,
    Table(String),
}

impl CacheKey {
    pub fn for_request(table: Option<&str>) -> Self {
        match table {
            Some(t) => CacheKey::Table(t.to_lowercase()),
            None => CacheKey::AllTables,
        }
    }
}

#[derive(Debug)]
struct CachedSchema {
    schema: Arc<SchemaDescription>,
    fetched_at: Instant,
}

type Slot = Arc<OnceCell<CachedSchema>>;

pub struct SchemaCache {
    enabled: bool,
    ttl: Option<Duration>,
    entries: DashMap<CacheKey, Slot>,
}

impl SchemaCache {
    pub fn new(enabled: bool, ttl: Option<Duration>) -> Self {
        Self {
            enabled,
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, None)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Return the cached schema for `key`, running `load` at most once per
    /// live entry. With caching disabled `load` runs on every call.
    pub async fn get_or_load<F, Fut>(&self, key: CacheKey, load: F) -> Result<Arc<SchemaDescription>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SchemaDescription>>,
    {
        if !self.enabled {
            return load().await.map(Arc::new);
        }

        let slot = self.slot(&key);
        let entry = slot
            .get_or_try_init(|| async {
                debug!("Schema cache miss for {:?}", key);
                let schema = load().await?;
                Ok::<_, crate::error::QueryError>(CachedSchema {
                    schema: Arc::new(schema),
                    fetched_at: Instant::now(),
                })
            })
            .await?;

        Ok(entry.schema.clone())
    }

    /// Live slot for `key`; expired slots are swapped out atomically so only
    /// one caller replaces them.
    fn slot(&self, key: &CacheKey) -> Slot {
        let slot = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        if !self.is_expired(&slot) {
            return slot;
        }

        debug!("Schema cache entry {:?} expired", key);
        let fresh: Slot = Arc::new(OnceCell::new());
        let mut current = self.entries.entry(key.clone()).or_insert_with(|| fresh.clone());
        if Arc::ptr_eq(current.value(), &slot) {
            *current.value_mut() = fresh.clone();
        }
        current.value().clone()
    }

    fn is_expired(&self, slot: &Slot) -> bool {
        match (self.ttl, slot.get()) {
            (Some(ttl), Some(entry)) => entry.fetched_at.elapsed() >= ttl,
            _ => false,
        }
    }

    pub fn invalidate(&self, key: &CacheKey) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of populated entries
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
