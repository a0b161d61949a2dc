//! Cache storage implementation: TTL tracking plus a separate, longer-lived
//! stale window used only for 429 fallback serving.

use crate::eviction::{EvictionPolicy, EvictionStore, FifoStore, LfuStore, LruStore};
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Entry in the cache with TTL tracking.
#[derive(Clone, Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
        }
    }

    fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }
}

/// Freshness of an entry returned by [`CacheStore::get_with_staleness`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Freshness {
    Fresh,
    Stale,
}

/// Cache store with configurable eviction policy, a fresh TTL, and a longer
/// stale TTL used only when a caller explicitly asks to accept stale data
/// (the C5 429-fallback path).
pub(crate) struct CacheStore<K, V> {
    store: Box<dyn EvictionStore<K, CacheEntry<V>>>,
    ttl: Option<Duration>,
    stale_ttl: Option<Duration>,
}

impl<K: Hash + Eq + Clone + Send + 'static, V: Clone + Send + 'static> CacheStore<K, V> {
    pub(crate) fn new(
        capacity: usize,
        ttl: Option<Duration>,
        stale_ttl: Option<Duration>,
        policy: EvictionPolicy,
    ) -> Self {
        let store: Box<dyn EvictionStore<K, CacheEntry<V>>> = match policy {
            EvictionPolicy::Lru => Box::new(LruStore::new(capacity)),
            EvictionPolicy::Lfu => Box::new(LfuStore::new(capacity)),
            EvictionPolicy::Fifo => Box::new(FifoStore::new(capacity)),
        };

        Self {
            store,
            ttl,
            stale_ttl,
        }
    }

    /// Returns the value only if it is still within the fresh TTL.
    pub(crate) fn get(&mut self, key: &K) -> Option<V> {
        match self.get_with_staleness(key) {
            Some((value, Freshness::Fresh)) => Some(value),
            _ => None,
        }
    }

    /// Returns the value and whether it is fresh or merely within the stale
    /// window. Entries older than `stale_ttl` (or `ttl` if no stale window
    /// is configured) are evicted and `None` is returned.
    pub(crate) fn get_with_staleness(&mut self, key: &K) -> Option<(V, Freshness)> {
        let entry = self.store.get(key)?;
        let age = entry.age();

        let is_fresh = self.ttl.map(|ttl| age <= ttl).unwrap_or(true);
        if is_fresh {
            return Some((entry.value.clone(), Freshness::Fresh));
        }

        let stale_bound = self.stale_ttl.or(self.ttl);
        let is_stale_ok = stale_bound.map(|bound| age <= bound).unwrap_or(false);
        if is_stale_ok {
            return Some((entry.value.clone(), Freshness::Stale));
        }

        self.store.remove(key);
        None
    }

    /// Inserts a value into the cache. Returns the evicted entry if the
    /// cache was full.
    pub(crate) fn insert(&mut self, key: K, value: V) -> Option<V> {
        let entry = CacheEntry::new(value);
        self.store.insert(key, entry).map(|(_, e)| e.value)
    }

    pub(crate) fn len(&self) -> usize {
        self.store.len()
    }

    #[allow(dead_code)]
    pub(crate) fn clear(&mut self) {
        self.store.clear();
    }
}
