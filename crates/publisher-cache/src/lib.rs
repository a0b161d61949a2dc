//! Keyed single-flight cache coordinator (C5).
//!
//! Wraps any `fetch(key) -> value` function with an LRU/LFU/FIFO-evicted,
//! TTL-bounded cache. Concurrent callers for the same key coalesce into one
//! in-flight fetch, and a rate-limit error from `fetch` falls back to a
//! stale cached value within a separate, longer `stale_ttl` window before
//! propagating.

mod coalesce;
mod config;
mod coordinator;
mod eviction;
mod store;

pub use config::{CacheConfig, CacheConfigBuilder, DEFAULT_STALE_TTL, DEFAULT_TTL};
pub use coordinator::{CacheCoordinator, NamespaceCounters, NamespaceSnapshot, RateLimitSignal};
pub use eviction::EvictionPolicy;
