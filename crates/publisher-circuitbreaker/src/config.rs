use std::time::Duration;

/// Tunables for a [`crate::CircuitBreakerRegistry`].
///
/// Defaults match the publish-path defaults: threshold 3, open duration
/// 300 s, half-open max attempts 1.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub(crate) failure_threshold: u32,
    pub(crate) open_duration: Duration,
    pub(crate) half_open_max_attempts: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_duration: Duration::from_secs(300),
            half_open_max_attempts: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::default()
    }
}

/// Builder for [`CircuitBreakerConfig`].
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    /// Consecutive failures required to trip the circuit. Default: 3.
    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.config.failure_threshold = n;
        self
    }

    /// How long the circuit stays open before admitting a half-open probe.
    /// Default: 300 s.
    pub fn open_duration(mut self, duration: Duration) -> Self {
        self.config.open_duration = duration;
        self
    }

    /// Probes admitted per half-open window. Default: 1.
    pub fn half_open_max_attempts(mut self, n: u32) -> Self {
        self.config.half_open_max_attempts = n;
        self
    }

    pub fn build(self) -> CircuitBreakerConfig {
        self.config
    }
}
