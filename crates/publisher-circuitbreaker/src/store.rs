use std::time::Duration;

use async_trait::async_trait;

use crate::circuit::CircuitState;

/// Persisted snapshot of one key's breaker state, written through to the
/// external store at `circuit:<key>` with TTL `open_duration + 60s` so a
/// restarted process recovers a breaker mid-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistedCircuitState {
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

/// External key-value store for circuit state. Implementations should treat
/// write failures as non-fatal: the registry logs and continues rather than
/// propagating them, per the persistence contract in the design doc.
#[async_trait]
pub trait CircuitStateStore: Send + Sync {
    async fn save(&self, key: &str, state: PersistedCircuitState, ttl: Duration);
    async fn load(&self, key: &str) -> Option<PersistedCircuitState>;
}
