//! In-process cache with per-entry TTL and LRU eviction.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

/// Entry stored in the cache.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Cached value.
    pub value: V,

    /// When this entry was inserted into cache.
    pub cached_at: Instant,

    /// After this instant the entry reads as a miss. `None` when the TTL
    /// reaches past what `Instant` can represent.
    pub expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    /// Create a new cache entry that lives for `ttl`.
    pub fn new(value: V, ttl: Duration) -> Self {
        let cached_at = Instant::now();
        Self {
            value,
            cached_at,
            expires_at: cached_at.checked_add(ttl),
        }
    }

    /// Whether the entry's TTL has elapsed.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

struct CacheInner<V> {
    lru: LruCache<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
}

/// Key/value cache whose entries expire a fixed time after insertion.
///
/// All operations are synchronous and memory-only. Expired entries are
/// dropped lazily when read; [`keys`](Self::keys) never reports them. When
/// the cache is full the least recently used entry is evicted.
pub struct ExpiringCache<V> {
    inner: Mutex<CacheInner<V>>,
    capacity: usize,
}

impl<V: Clone> ExpiringCache<V> {
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(CacheInner {
                lru: LruCache::new(cap),
                hits: 0,
                misses: 0,
            }),
            capacity: cap.get(),
        }
    }

    /// Look up a live entry.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock();

        if inner.lru.peek(key).is_some_and(CacheEntry::is_expired) {
            trace!(key = %key, "Cache entry expired");
            inner.lru.pop(key);
        }

        let value = inner.lru.get(key).map(|entry| entry.value.clone());
        if value.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        value
    }

    /// Insert or replace an entry that expires after `ttl`.
    pub fn put(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let mut inner = self.inner.lock();
        if let Some((evicted, _)) = inner.lru.push(key.clone(), CacheEntry::new(value, ttl)) {
            if evicted != key {
                trace!(key = %evicted, "Evicted LRU cache entry");
            }
        }
    }

    /// Remove an entry. Returns whether a live entry was present.
    pub fn del(&self, key: &str) -> bool {
        self.inner
            .lock()
            .lru
            .pop(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    /// Keys of all live entries, most recently used first.
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .lock()
            .lru
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Number of stored entries, including expired ones not yet dropped.
    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    /// Check if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().lru.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.inner.lock().lru.clear();
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            size: inner.lru.len(),
            capacity: self.capacity,
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}

impl<V> std::fmt::Debug for ExpiringCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of stored entries.
    pub size: usize,

    /// Maximum capacity.
    pub capacity: usize,

    /// Lookups answered from cache.
    pub hits: u64,

    /// Lookups that found nothing live.
    pub misses: u64,
}
