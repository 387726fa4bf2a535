//! LRU cache of token account mints.
//!
//! A token account's mint is fixed when the account is created. Its owner
//! is not (the owner can be reassigned), so owners are always read from the
//! ledger and only the mint is kept here.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default cache capacity.
const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Cache statistics for monitoring.
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries added.
    pub additions: u64,
}

impl CacheStats {
    /// Share of lookups answered from the cache, in percent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        match self.hits + self.misses {
            0 => 0.0,
            lookups => self.hits as f64 * 100.0 / lookups as f64,
        }
    }
}

struct Inner {
    mints: LruCache<String, String>,
    stats: CacheStats,
}

/// Token account → mint resolutions.
///
/// Clones share the same entries.
#[derive(Clone)]
pub struct MintCache {
    inner: Arc<Mutex<Inner>>,
}

impl MintCache {
    /// Create a cache with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                mints: LruCache::new(cap),
                stats: CacheStats::default(),
            })),
        }
    }

    /// Mint held by a token account, if cached.
    pub fn get(&self, account: &str) -> Option<String> {
        let mut inner = self.inner.lock();
        let found = inner.mints.get(account).cloned();
        if found.is_some() {
            inner.stats.hits += 1;
        } else {
            inner.stats.misses += 1;
        }
        found
    }

    /// Remember the mint of a token account.
    pub fn insert(&self, account: String, mint: String) {
        let mut inner = self.inner.lock();
        inner.mints.put(account, mint);
        inner.stats.additions += 1;
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats.clone()
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().mints.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().mints.is_empty()
    }

    /// Drop all entries. Statistics are kept.
    pub fn clear(&self) {
        self.inner.lock().mints.clear();
    }
}

impl Default for MintCache {
    fn default() -> Self {
        Self::new()
    }
}
