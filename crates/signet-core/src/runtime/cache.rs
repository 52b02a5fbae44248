// crates/signet-core/src/runtime/cache.rs
// ============================================================================
// Module: TTL + LRU Cache
// Description: Process-wide cache with expiry and least-recently-used eviction.
// Purpose: Back the provider, RBAC, JWKS, and branding caches.
// Dependencies: none beyond the standard library
// ============================================================================

//! ## Overview
//! A bounded in-process cache: entries expire after a fixed TTL and, when the
//! cache is full, the least-recently-used entry is evicted to admit a new
//! one. Keys are plain strings so `invalidate_prefix` can clear a whole
//! namespace (for example every provider of one tenant).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Cache sizing and expiry configuration.
///
/// # Invariants
/// - `max_size` >= 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Entry time-to-live.
    pub ttl: Duration,
    /// Maximum resident entries.
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            max_size: 500,
        }
    }
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// One cached entry with bookkeeping.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    /// Cached value.
    value: V,
    /// Absolute expiry instant.
    expires_at: Instant,
    /// Logical use counter for LRU ordering.
    last_used: u64,
}

/// Interior cache state behind the lock.
#[derive(Debug)]
struct CacheInner<V> {
    /// Entries keyed by string.
    map: HashMap<String, CacheEntry<V>>,
    /// Monotone use counter.
    tick: u64,
}

/// Process-wide TTL + LRU cache.
///
/// # Invariants
/// - Safe for concurrent use; all access goes through one mutex.
/// - Expired entries are invisible to `get` and dropped on access.
#[derive(Debug)]
pub struct TtlLruCache<V> {
    /// Guarded cache state.
    inner: Mutex<CacheInner<V>>,
    /// Sizing and expiry configuration.
    config: CacheConfig,
}

impl<V: Clone> TtlLruCache<V> {
    /// Creates an empty cache with the given configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                tick: 0,
            }),
            config,
        }
    }

    /// Returns the cached value for `key`, refreshing its LRU position.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        let Ok(mut inner) = self.inner.lock() else {
            return None;
        };
        let now = Instant::now();
        match inner.map.get(key) {
            Some(entry) if entry.expires_at <= now => {
                inner.map.remove(key);
                None
            }
            Some(_) => {
                inner.tick += 1;
                let tick = inner.tick;
                inner.map.get_mut(key).map(|entry| {
                    entry.last_used = tick;
                    entry.value.clone()
                })
            }
            None => None,
        }
    }

    /// Inserts `value` under `key`, evicting the LRU entry when full.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let now = Instant::now();
        inner.map.retain(|_, entry| entry.expires_at > now);
        if !inner.map.contains_key(&key) && inner.map.len() >= self.config.max_size {
            if let Some(lru_key) = inner
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| k.clone())
            {
                inner.map.remove(&lru_key);
            }
        }
        inner.tick += 1;
        let entry = CacheEntry {
            value,
            expires_at: now + self.config.ttl,
            last_used: inner.tick,
        };
        inner.map.insert(key, entry);
    }

    /// Removes the entry for `key`.
    pub fn invalidate(&self, key: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.map.remove(key);
        }
    }

    /// Removes every entry whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.map.retain(|key, _| !key.starts_with(prefix));
        }
    }

    /// Returns the number of resident (possibly expired) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.map.len()).unwrap_or(0)
    }

    /// Returns true when no entries are resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
