//! Configuration for the cache coordinator.

use std::time::Duration;

use crate::eviction::EvictionPolicy;

/// Default TTL for fresh entries, matching `CACHE_DEFAULT_TTL`.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default window during which a 429-triggered fallback may still serve an
/// expired entry, matching `CACHE_STALE_TTL`.
pub const DEFAULT_STALE_TTL: Duration = Duration::from_secs(7200);

/// Configuration for a [`crate::CacheCoordinator`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
    pub stale_ttl: Duration,
    pub eviction_policy: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            ttl: DEFAULT_TTL,
            stale_ttl: DEFAULT_STALE_TTL,
            eviction_policy: EvictionPolicy::Lru,
        }
    }
}

pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
        }
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = ttl;
        self
    }

    pub fn stale_ttl(mut self, stale_ttl: Duration) -> Self {
        self.config.stale_ttl = stale_ttl;
        self
    }

    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.config.eviction_policy = policy;
        self
    }

    pub fn build(self) -> CacheConfig {
        self.config
    }
}

impl Default for CacheConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
