//! Keyed, single-flight cache coordinator (C5) with stale-on-429 fallback.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::coalesce::InFlight;
use crate::config::CacheConfig;
use crate::eviction::EvictionPolicy;
use crate::store::{CacheStore, Freshness};

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// Implemented by a crate's own fetch error so the coordinator can detect a
/// rate-limit response and fall back to a stale cached value instead of
/// propagating it.
pub trait RateLimitSignal {
    fn is_rate_limited(&self) -> bool;
}

/// Per-namespace hit/miss/error/stale-serve/rate-limit-error/coalesced-join
/// counters.
#[derive(Debug, Default)]
pub struct NamespaceCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub errors: AtomicU64,
    pub stale_serves: AtomicU64,
    pub rate_limit_errors: AtomicU64,
    pub coalesced_joins: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NamespaceSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub stale_serves: u64,
    pub rate_limit_errors: u64,
    pub coalesced_joins: u64,
}

impl NamespaceCounters {
    fn snapshot(&self) -> NamespaceSnapshot {
        NamespaceSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            stale_serves: self.stale_serves.load(Ordering::Relaxed),
            rate_limit_errors: self.rate_limit_errors.load(Ordering::Relaxed),
            coalesced_joins: self.coalesced_joins.load(Ordering::Relaxed),
        }
    }
}

/// A namespaced, single-flight cache over any `fetch(key) -> value`
/// function, with stale-while-erroring fallback on rate-limit errors.
///
/// `K` is the cache key (typically scoped by namespace already, e.g.
/// `"user-profile:<id>"`); `V` is the cached value.
pub struct CacheCoordinator<K, V> {
    store: Mutex<CacheStore<K, V>>,
    in_flight: Arc<InFlight<K, V>>,
    counters: Mutex<HashMap<String, Arc<NamespaceCounters>>>,
}

impl<K, V> CacheCoordinator<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            store: Mutex::new(CacheStore::new(
                config.capacity,
                Some(config.ttl),
                Some(config.stale_ttl),
                config.eviction_policy,
            )),
            in_flight: Arc::new(InFlight::new()),
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_eviction_policy(capacity: usize, policy: EvictionPolicy) -> Self {
        Self::new(CacheConfig {
            capacity,
            eviction_policy: policy,
            ..CacheConfig::default()
        })
    }

    fn counters_for(&self, namespace: &str) -> Arc<NamespaceCounters> {
        let mut counters = self.counters.lock();
        counters
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(NamespaceCounters::default()))
            .clone()
    }

    pub fn namespace_snapshot(&self, namespace: &str) -> NamespaceSnapshot {
        self.counters
            .lock()
            .get(namespace)
            .map(|c| c.snapshot())
            .unwrap_or_default()
    }

    /// Returns a fresh cached value for `key`, or runs `fetch` (coalescing
    /// concurrent callers for the same key) and caches the result. On a
    /// rate-limit error from `fetch`, falls back to a value within the
    /// stale window before propagating the error.
    pub async fn get_or_fetch<F, Fut, E>(&self, namespace: &str, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
        E: RateLimitSignal,
    {
        let counters = self.counters_for(namespace);

        if let Some(value) = self.store.lock().get(&key) {
            counters.hits.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "tracing")]
            debug!(namespace, "cache hit");
            #[cfg(feature = "metrics")]
            metrics::counter!("publisher_cache_total", "namespace" => namespace.to_string(), "outcome" => "hit").increment(1);
            return Ok(value);
        }
        counters.misses.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::counter!("publisher_cache_total", "namespace" => namespace.to_string(), "outcome" => "miss").increment(1);

        let (result, coalesced) = self.in_flight.run(key.clone(), fetch).await;
        if coalesced {
            counters.coalesced_joins.fetch_add(1, Ordering::Relaxed);
        }

        match result {
            Ok(value) => {
                self.store.lock().insert(key, value.clone());
                Ok(value)
            }
            Err(err) if err.is_rate_limited() => {
                counters.rate_limit_errors.fetch_add(1, Ordering::Relaxed);
                match self.store.lock().get_with_staleness(&key) {
                    Some((value, Freshness::Stale)) => {
                        counters.stale_serves.fetch_add(1, Ordering::Relaxed);
                        #[cfg(feature = "tracing")]
                        warn!(namespace, "serving stale cache entry after rate-limit error");
                        Ok(value)
                    }
                    Some((value, Freshness::Fresh)) => Ok(value),
                    None => {
                        counters.errors.fetch_add(1, Ordering::Relaxed);
                        Err(err)
                    }
                }
            }
            Err(err) => {
                counters.errors.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }
}
