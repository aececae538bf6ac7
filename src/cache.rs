//! Pluggable cache contract and the bundled implementations.
//!
//! The cache maps `(source name, identity)` keys to previously fetched
//! values. Caches are logically immutable values threaded through rounds:
//! [`DataCache::insert`] returns the next cache value. An implementation may
//! mutate internally (as [`InMemoryCache`] does) because the interpreter
//! never inserts the same key concurrently within one round.

use crate::identity::{FetchValue, Id};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Key under which one fetched value is cached: the source's name paired
/// with the identity it resolves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    source: String,
    id: Id,
}

impl CacheKey {
    /// Build a key from a source name and an erased identity.
    pub fn new(source: impl Into<String>, id: Id) -> Self {
        Self {
            source: source.into(),
            id,
        }
    }

    /// The source name component.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The identity component.
    pub fn id(&self) -> &Id {
        &self.id
    }
}

/// A cache of fetched values, keyed by [`CacheKey`].
///
/// `insert` followed by `lookup` with the same key returns the inserted
/// value, unless the implementation voluntarily forgets (see
/// [`ForgetfulCache`]). Keys are opaque: an implementation is free to hash
/// them into its own key space.
#[async_trait]
pub trait DataCache: Send + Sync {
    /// Look up a previously cached value.
    async fn lookup(&self, key: &CacheKey) -> Option<FetchValue>;

    /// Store a value, returning the next cache value.
    async fn insert(self: Arc<Self>, key: CacheKey, value: FetchValue) -> Arc<dyn DataCache>;
}

/// The default cache: a map guarded by an async lock.
///
/// Shared across runs (via [`Arc`]) it carries values from one run to the
/// next, which is how repeated fetches of the same identity are elided
/// across program executions.
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<CacheKey, FetchValue>>,
}

impl InMemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl DataCache for InMemoryCache {
    async fn lookup(&self, key: &CacheKey) -> Option<FetchValue> {
        self.entries.read().await.get(key).cloned()
    }

    async fn insert(self: Arc<Self>, key: CacheKey, value: FetchValue) -> Arc<dyn DataCache> {
        self.entries.write().await.insert(key, value);
        self as Arc<dyn DataCache>
    }
}

/// A cache that remembers nothing: lookups always miss and inserts return
/// the cache unchanged. Useful to opt a run out of caching entirely.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForgetfulCache;

impl ForgetfulCache {
    /// Create a forgetful cache.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DataCache for ForgetfulCache {
    async fn lookup(&self, _key: &CacheKey) -> Option<FetchValue> {
        None
    }

    async fn insert(self: Arc<Self>, _key: CacheKey, _value: FetchValue) -> Arc<dyn DataCache> {
        self as Arc<dyn DataCache>
    }
}
