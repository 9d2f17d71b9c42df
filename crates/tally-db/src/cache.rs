//! # List Cache
//!
//! Key-value store that memoises list queries (e.g. the full tax list).
//!
//! ## Read-through / invalidate-on-write
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         List Cache Flow                                 │
//! │                                                                         │
//! │  repo.all()                                                            │
//! │       │                                                                 │
//! │       ├── cache.get("taxes:all") ── hit ──► deserialize, return        │
//! │       │                                                                 │
//! │       └── miss ──► SELECT ... ──► cache.set("taxes:all", json) ──►     │
//! │                                                                         │
//! │  repo.save(tax) / repo.delete(tax)                                     │
//! │       │                                                                 │
//! │       └── cache.delete("taxes:all")  ← next all() re-reads the table   │
//! │                                                                         │
//! │  No TTL: entries live until a mutation deletes them.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Backends
//! - [`InMemoryCache`] - per-process map (default, tests)
//! - `RedisCache` - shared between processes (`redis` feature)
//!
//! Read and write failures never fail a repository call: [`ListCache`] logs
//! them and behaves as if the entry was missing. A failed invalidation is
//! returned, so a mutation never lands behind a stale list.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};

// =============================================================================
// Cache Store Trait
// =============================================================================

/// A key-value store for serialized lists.
#[async_trait]
pub trait CacheStore: Send + Sync + fmt::Debug {
    /// Returns the stored value, `None` on a miss.
    async fn get(&self, key: &str) -> DbResult<Option<String>>;

    /// Stores a value, replacing any previous one.
    async fn set(&self, key: &str, value: String) -> DbResult<()>;

    /// Removes a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> DbResult<()>;
}

/// Reads a cached list and deserializes it.
pub async fn get_array<T: DeserializeOwned>(
    cache: &dyn CacheStore,
    key: &str,
) -> DbResult<Option<Vec<T>>> {
    match cache.get(key).await? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Serializes a list and stores it.
pub async fn set_array<T: Serialize>(cache: &dyn CacheStore, key: &str, items: &[T]) -> DbResult<()> {
    let json = serde_json::to_string(items)?;
    cache.set(key, json).await
}

// =============================================================================
// In-Memory Backend
// =============================================================================

/// Process-local cache backend.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    store: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached keys (diagnostics).
    pub fn len(&self) -> usize {
        self.store.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> DbError {
    DbError::Cache("in-memory cache lock poisoned".to_string())
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let store = self.store.read().map_err(poisoned)?;
        Ok(store.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> DbResult<()> {
        let mut store = self.store.write().map_err(poisoned)?;
        store.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> DbResult<()> {
        let mut store = self.store.write().map_err(poisoned)?;
        store.remove(key);
        Ok(())
    }
}

// =============================================================================
// Redis Backend
// =============================================================================

/// Redis-backed cache shared by every application process.
///
/// Holds one multiplexed connection; clones share it.
#[cfg(feature = "redis")]
#[derive(Clone)]
pub struct RedisCache {
    conn: redis::aio::MultiplexedConnection,
}

#[cfg(feature = "redis")]
impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

#[cfg(feature = "redis")]
fn redis_error(e: redis::RedisError) -> DbError {
    DbError::Cache(e.to_string())
}

#[cfg(feature = "redis")]
impl RedisCache {
    /// Opens the client and its multiplexed connection.
    pub async fn connect(url: &str) -> DbResult<Self> {
        let client = redis::Client::open(url).map_err(redis_error)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_error)?;

        debug!("Connected to redis list cache");
        Ok(RedisCache { conn })
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(redis_error)
    }

    async fn set(&self, key: &str, value: String) -> DbResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
            .map_err(redis_error)
    }

    async fn delete(&self, key: &str) -> DbResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(redis_error)
    }
}

// =============================================================================
// List Cache (wrapper used by repositories)
// =============================================================================

/// Cache handle shared by the repositories.
///
/// Read and write failures are logged with `warn!` and downgraded: reads
/// become misses, writes become no-ops. Invalidation failures are returned.
#[derive(Debug, Clone)]
pub struct ListCache {
    store: Arc<dyn CacheStore>,
}

impl ListCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        ListCache { store }
    }

    /// A fresh in-memory cache.
    pub fn in_memory() -> Self {
        ListCache::new(Arc::new(InMemoryCache::new()))
    }

    /// The underlying store.
    pub fn store(&self) -> &dyn CacheStore {
        self.store.as_ref()
    }

    /// Returns the cached list, `None` on miss or failure.
    pub async fn fetch<T: DeserializeOwned>(&self, key: &str) -> Option<Vec<T>> {
        match get_array(self.store.as_ref(), key).await {
            Ok(Some(items)) => {
                debug!(key = %key, count = items.len(), "List cache hit");
                Some(items)
            }
            Ok(None) => {
                debug!(key = %key, "List cache miss");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "List cache read failed");
                None
            }
        }
    }

    /// Stores a list.
    pub async fn store_list<T: Serialize>(&self, key: &str, items: &[T]) {
        if let Err(e) = set_array(self.store.as_ref(), key, items).await {
            warn!(key = %key, error = %e, "List cache write failed");
        }
    }

    /// Drops every key in `keys`.
    ///
    /// Stops at the first failed delete and returns its error; callers must
    /// not write the table when this fails.
    pub async fn invalidate(&self, keys: &[&str]) -> DbResult<()> {
        for key in keys {
            debug!(key = %key, "Invalidating list cache");
            if let Err(e) = self.store.delete(key).await {
                warn!(key = %key, error = %e, "List cache delete failed");
                return Err(e);
            }
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Backend that fails every call.
    #[derive(Debug)]
    struct BrokenCache;

    #[async_trait]
    impl CacheStore for BrokenCache {
        async fn get(&self, _key: &str) -> DbResult<Option<String>> {
            Err(DbError::Cache("down".to_string()))
        }
        async fn set(&self, _key: &str, _value: String) -> DbResult<()> {
            Err(DbError::Cache("down".to_string()))
        }
        async fn delete(&self, _key: &str) -> DbResult<()> {
            Err(DbError::Cache("down".to_string()))
        }
    }

    /// In-memory backend whose deletes always fail.
    #[derive(Debug, Default)]
    pub(crate) struct StuckCache {
        inner: InMemoryCache,
    }

    #[async_trait]
    impl CacheStore for StuckCache {
        async fn get(&self, key: &str) -> DbResult<Option<String>> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: String) -> DbResult<()> {
            self.inner.set(key, value).await
        }
        async fn delete(&self, _key: &str) -> DbResult<()> {
            Err(DbError::Cache("delete refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_in_memory_get_set_delete() {
        let cache = InMemoryCache::new();
        assert!(cache.get("k").await.unwrap().is_none());

        cache.set("k", "v".to_string()).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(cache.len(), 1);

        cache.delete("k").await.unwrap();
        cache.delete("missing").await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_array_helpers() {
        let cache = InMemoryCache::new();
        set_array(&cache, "numbers", &[1, 2, 3]).await.unwrap();

        let numbers: Vec<i32> = get_array(&cache, "numbers").await.unwrap().unwrap();
        assert_eq!(numbers, vec![1, 2, 3]);

        cache.set("garbage", "not json".to_string()).await.unwrap();
        assert!(get_array::<i32>(&cache, "garbage").await.is_err());
    }

    #[tokio::test]
    async fn test_list_cache_round_trip_and_invalidate() {
        let cache = ListCache::in_memory();
        assert!(cache.fetch::<String>("names").await.is_none());

        cache.store_list("names", &["a".to_string(), "b".to_string()]).await;
        assert_eq!(
            cache.fetch::<String>("names").await,
            Some(vec!["a".to_string(), "b".to_string()])
        );

        cache.invalidate(&["names"]).await.unwrap();
        assert!(cache.fetch::<String>("names").await.is_none());
    }

    #[tokio::test]
    async fn test_list_cache_downgrades_read_and_write_errors() {
        let cache = ListCache::new(Arc::new(BrokenCache));
        assert!(cache.fetch::<i32>("k").await.is_none());
        cache.store_list("k", &[1]).await;
    }

    #[tokio::test]
    async fn test_list_cache_returns_invalidation_errors() {
        let cache = ListCache::new(Arc::new(StuckCache::default()));
        cache.store_list("k", &[1]).await;

        let err = cache.invalidate(&["k"]).await.unwrap_err();
        assert!(matches!(err, DbError::Cache(_)));
        assert_eq!(cache.fetch::<i32>("k").await, Some(vec![1]));
    }
}
