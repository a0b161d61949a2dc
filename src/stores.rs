//! Default implementations of the external key-value store seams C2 and C4
//! depend on (`CircuitStateStore`, `MetricsStore`).
//!
//! Persistence to Redis for circuit/rate-limit state and metrics snapshots
//! is explicitly best-effort (spec.md §5: "persistence is best-effort").
//! These no-op stores are the default when no backing store is wired in;
//! a deployment that sets `CIRCUIT_BREAKER_PERSIST_TO_REDIS=true` swaps in a
//! real store behind the same trait at the integration point, the way
//! `publisher-queue`'s `redis-backend` feature swaps `MemoryJobQueue` for
//! `RedisJobQueue`.

use async_trait::async_trait;
use publisher_circuitbreaker::{CircuitStateStore, PersistedCircuitState};
use publisher_metrics::{MetricsSnapshot, MetricsStore};

/// Discards every write; `load` always reports no prior state. Used when no
/// external key-value store is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCircuitStateStore;

#[async_trait]
impl CircuitStateStore for NoopCircuitStateStore {
    async fn save(&self, _key: &str, _state: PersistedCircuitState, _ttl: std::time::Duration) {}

    async fn load(&self, _key: &str) -> Option<PersistedCircuitState> {
        None
    }
}

/// Discards every metrics snapshot flush. Used when no external key-value
/// store is configured (`METRICS_ENABLED=false`, or no store wired in).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsStore;

#[async_trait]
impl MetricsStore for NoopMetricsStore {
    async fn write_snapshot(&self, _epoch_seconds: i64, _snapshot: &MetricsSnapshot) {}

    async fn trim_timeline(&self, _older_than_seconds: i64) {}
}
