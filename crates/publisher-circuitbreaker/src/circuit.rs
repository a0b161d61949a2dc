use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::CircuitBreakerConfig;

/// State of a single-key circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Point-in-time view of one key's breaker, used by metrics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub half_open_attempts: u32,
}

/// One key's state machine: `CLOSED -> OPEN` at `failure_threshold`
/// consecutive failures, `OPEN -> HALF_OPEN` on the first `should_allow`
/// query after `open_duration` has elapsed, `HALF_OPEN -> CLOSED` on any
/// success, `HALF_OPEN -> OPEN` on any failure. At most
/// `half_open_max_attempts` probes are admitted per half-open window.
pub(crate) struct Circuit {
    state: CircuitState,
    state_atomic: Arc<AtomicU8>,
    consecutive_failures: u32,
    last_state_change: Instant,
    half_open_attempts: u32,
}

impl Circuit {
    pub(crate) fn new() -> Self {
        Self::new_with_atomic(Arc::new(AtomicU8::new(CircuitState::Closed as u8)))
    }

    pub(crate) fn new_with_atomic(state_atomic: Arc<AtomicU8>) -> Self {
        Self {
            state: CircuitState::Closed,
            state_atomic,
            consecutive_failures: 0,
            last_state_change: Instant::now(),
            half_open_attempts: 0,
        }
    }

    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    pub(crate) fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            half_open_attempts: self.half_open_attempts,
        }
    }

    /// `shouldAllow`: mutates OPEN -> HALF_OPEN on expiry as a side effect of
    /// the query itself, per spec.
    pub(crate) fn should_allow(&mut self, config: &CircuitBreakerConfig) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if self.last_state_change.elapsed() >= config.open_duration {
                    self.transition_to(CircuitState::HalfOpen);
                    self.half_open_attempts = 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if self.half_open_attempts < config.half_open_max_attempts {
                    self.half_open_attempts += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub(crate) fn record_success(&mut self, _config: &CircuitBreakerConfig) {
        match self.state {
            CircuitState::HalfOpen => {
                self.transition_to(CircuitState::Closed);
            }
            CircuitState::Closed => {
                self.consecutive_failures = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub(crate) fn record_failure(&mut self, config: &CircuitBreakerConfig) {
        match self.state {
            CircuitState::HalfOpen => {
                self.transition_to(CircuitState::Open);
            }
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= config.failure_threshold {
                    self.transition_to(CircuitState::Open);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub(crate) fn force_open(&mut self) {
        self.transition_to(CircuitState::Open);
    }

    pub(crate) fn force_closed(&mut self) {
        self.transition_to(CircuitState::Closed);
    }

    pub(crate) fn time_until_retry(&self, config: &CircuitBreakerConfig) -> Duration {
        config
            .open_duration
            .saturating_sub(self.last_state_change.elapsed())
    }

    fn transition_to(&mut self, state: CircuitState) {
        if self.state == state {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::info!(from = ?self.state, to = ?state, "circuit breaker state transition");

        #[cfg(feature = "metrics")]
        {
            metrics::counter!(
                "circuitbreaker_transitions_total",
                "from" => match self.state {
                    CircuitState::Closed => "closed",
                    CircuitState::Open => "open",
                    CircuitState::HalfOpen => "half_open",
                },
                "to" => match state {
                    CircuitState::Closed => "closed",
                    CircuitState::Open => "open",
                    CircuitState::HalfOpen => "half_open",
                }
            )
            .increment(1);
        }

        self.state = state;
        self.state_atomic.store(state as u8, Ordering::Release);
        self.last_state_change = Instant::now();
        self.consecutive_failures = 0;
        self.half_open_attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::builder()
            .failure_threshold(3)
            .open_duration(Duration::from_millis(50))
            .half_open_max_attempts(1)
            .build()
    }

    #[test]
    fn opens_after_consecutive_failures_reach_threshold() {
        let cfg = config();
        let mut c = Circuit::new();
        c.record_failure(&cfg);
        c.record_failure(&cfg);
        assert_eq!(c.state(), CircuitState::Closed);
        c.record_failure(&cfg);
        assert_eq!(c.state(), CircuitState::Open);
    }

    #[test]
    fn success_resets_consecutive_failure_count_while_closed() {
        let cfg = config();
        let mut c = Circuit::new();
        c.record_failure(&cfg);
        c.record_failure(&cfg);
        c.record_success(&cfg);
        c.record_failure(&cfg);
        c.record_failure(&cfg);
        assert_eq!(c.state(), CircuitState::Closed);
    }

    #[test]
    fn open_rejects_until_open_duration_elapses() {
        let cfg = config();
        let mut c = Circuit::new();
        for _ in 0..3 {
            c.record_failure(&cfg);
        }
        assert_eq!(c.state(), CircuitState::Open);
        assert!(!c.should_allow(&cfg));
        std::thread::sleep(Duration::from_millis(60));
        assert!(c.should_allow(&cfg));
        assert_eq!(c.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_admits_only_configured_attempts() {
        let cfg = config();
        let mut c = Circuit::new();
        for _ in 0..3 {
            c.record_failure(&cfg);
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(c.should_allow(&cfg));
        assert!(!c.should_allow(&cfg));
    }

    #[test]
    fn half_open_success_closes_and_failure_reopens() {
        let cfg = config();
        let mut closing = Circuit::new();
        for _ in 0..3 {
            closing.record_failure(&cfg);
        }
        std::thread::sleep(Duration::from_millis(60));
        closing.should_allow(&cfg);
        closing.record_success(&cfg);
        assert_eq!(closing.state(), CircuitState::Closed);

        let mut reopening = Circuit::new();
        for _ in 0..3 {
            reopening.record_failure(&cfg);
        }
        std::thread::sleep(Duration::from_millis(60));
        reopening.should_allow(&cfg);
        reopening.record_failure(&cfg);
        assert_eq!(reopening.state(), CircuitState::Open);
    }

    #[test]
    fn force_open_and_closed_override_state() {
        let cfg = config();
        let mut c = Circuit::new();
        c.force_open();
        assert_eq!(c.state(), CircuitState::Open);
        assert!(!c.should_allow(&cfg));
        c.force_closed();
        assert_eq!(c.state(), CircuitState::Closed);
        assert!(c.should_allow(&cfg));
    }
}
