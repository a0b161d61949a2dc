use std::collections::HashMap;
use std::sync::atomic::AtomicU8;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::circuit::{Circuit, CircuitSnapshot, CircuitState};
use crate::config::CircuitBreakerConfig;
use crate::store::{CircuitStateStore, PersistedCircuitState};

/// Per-key circuit breaker registry (C2). One [`Circuit`] state machine per
/// key (typically a user id), gating outbound publish calls.
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    circuits: Mutex<HashMap<String, Circuit>>,
    store: Option<Arc<dyn CircuitStateStore>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: Mutex::new(HashMap::new()),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn CircuitStateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Whether a call under `key` may proceed right now. Mutates OPEN ->
    /// HALF_OPEN as a side effect when `open_duration` has elapsed, matching
    /// the query's documented contract.
    pub fn should_allow(&self, key: &str) -> bool {
        let mut circuits = self.circuits.lock();
        let circuit = circuits
            .entry(key.to_string())
            .or_insert_with(Circuit::new);
        circuit.should_allow(&self.config)
    }

    pub fn record_success(&self, key: &str) {
        let mut circuits = self.circuits.lock();
        let circuit = circuits
            .entry(key.to_string())
            .or_insert_with(Circuit::new);
        circuit.record_success(&self.config);
        self.persist(key, circuit);
    }

    pub fn record_failure(&self, key: &str) {
        let mut circuits = self.circuits.lock();
        let circuit = circuits
            .entry(key.to_string())
            .or_insert_with(Circuit::new);
        circuit.record_failure(&self.config);
        self.persist(key, circuit);
    }

    pub fn force_open(&self, key: &str) {
        let mut circuits = self.circuits.lock();
        circuits
            .entry(key.to_string())
            .or_insert_with(Circuit::new)
            .force_open();
    }

    pub fn force_closed(&self, key: &str) {
        let mut circuits = self.circuits.lock();
        circuits
            .entry(key.to_string())
            .or_insert_with(Circuit::new)
            .force_closed();
    }

    pub fn snapshot(&self, key: &str) -> Option<CircuitSnapshot> {
        self.circuits.lock().get(key).map(|c| c.snapshot())
    }

    /// How long until an open breaker's next half-open probe is admitted.
    /// Used by the publish executor to decide the re-queue delay for a
    /// `CIRCUIT_OPEN` error.
    pub fn time_until_retry(&self, key: &str) -> Duration {
        self.circuits
            .lock()
            .get(key)
            .map(|c| c.time_until_retry(&self.config))
            .unwrap_or(Duration::ZERO)
    }

    fn persist(&self, key: &str, circuit: &Circuit) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let persisted = PersistedCircuitState {
            state: circuit.state(),
            consecutive_failures: circuit.snapshot().consecutive_failures,
        };
        let ttl = self.config.open_duration + Duration::from_secs(60);
        let key = key.to_string();
        tokio::spawn(async move {
            store.save(&key, persisted, ttl).await;
        });
    }
}

/// Lock-free snapshot of a single atomic breaker state, suitable for health
/// checks called from sync contexts.
pub fn state_from_atomic(atomic: &AtomicU8) -> CircuitState {
    CircuitState::from_u8(atomic.load(std::sync::atomic::Ordering::Acquire))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::builder()
            .failure_threshold(2)
            .open_duration(Duration::from_millis(30))
            .half_open_max_attempts(1)
            .build()
    }

    #[test]
    fn keys_are_independent() {
        let registry = CircuitBreakerRegistry::new(config());
        registry.record_failure("user-a");
        registry.record_failure("user-a");
        assert!(!registry.should_allow("user-a"));
        assert!(registry.should_allow("user-b"));
    }

    #[test]
    fn unknown_key_defaults_to_closed() {
        let registry = CircuitBreakerRegistry::new(config());
        assert!(registry.should_allow("never-seen"));
        assert_eq!(registry.snapshot("never-seen").unwrap().state, CircuitState::Closed);
    }
}
