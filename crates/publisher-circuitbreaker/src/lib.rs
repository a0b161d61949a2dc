//! Per-key circuit breaker registry (C2): one `CLOSED`/`OPEN`/`HALF_OPEN`
//! state machine per key, gating outbound publish calls before they reach
//! the network.
//!
//! ## States
//! - **Closed**: calls pass through; consecutive failures are counted.
//! - **Open**: calls are rejected immediately until `open_duration` elapses.
//! - **Half-Open**: a bounded number of probe calls are admitted to test
//!   recovery.

use std::future::Future;
use std::sync::Arc;

use publisher_contracts::PublisherError;

mod circuit;
mod config;
mod registry;
mod store;

pub use circuit::{CircuitSnapshot, CircuitState};
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use registry::{state_from_atomic, CircuitBreakerRegistry};
pub use store::{CircuitStateStore, PersistedCircuitState};

/// Runs `fut` under the breaker for `key`: rejects with `CIRCUIT_OPEN`
/// without making the call if the breaker is tripped, otherwise records
/// success or failure based on `classify_failure`.
pub async fn with_breaker<T, F>(
    registry: &CircuitBreakerRegistry,
    key: &str,
    fut: F,
    classify_failure: impl FnOnce(&Result<T, PublisherError>) -> bool,
) -> Result<T, PublisherError>
where
    F: Future<Output = Result<T, PublisherError>>,
{
    if !registry.should_allow(key) {
        return Err(PublisherError::CircuitOpen {
            key: key.to_string(),
            retry_after: registry.time_until_retry(key),
        });
    }

    let result = fut.await;
    if classify_failure(&result) {
        registry.record_failure(key);
    } else {
        registry.record_success(key);
    }
    result
}

/// Convenience for the common case: any `Err` counts as a breaker failure.
pub async fn with_breaker_default<T, F>(
    registry: &CircuitBreakerRegistry,
    key: &str,
    fut: F,
) -> Result<T, PublisherError>
where
    F: Future<Output = Result<T, PublisherError>>,
{
    with_breaker(registry, key, fut, |result| result.is_err()).await
}

/// Shared handle to a [`CircuitBreakerRegistry`], the shape every collaborator
/// crate receives it in.
pub type SharedCircuitBreakerRegistry = Arc<CircuitBreakerRegistry>;
