/// Tunables for an [`crate::AdaptiveDelayController`]. Defaults match the
/// publish-path defaults.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub(crate) base_delay_ms: u64,
    pub(crate) max_delay_ms: u64,
    pub(crate) jitter_percent: f64,
    pub(crate) success_decrease_factor: f64,
    pub(crate) failure_increase_factor: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 3_000,
            max_delay_ms: 300_000,
            jitter_percent: 0.20,
            success_decrease_factor: 0.9,
            failure_increase_factor: 2.0,
        }
    }
}

impl RateLimiterConfig {
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RateLimiterConfigBuilder {
    config: RateLimiterConfig,
}

impl RateLimiterConfigBuilder {
    pub fn base_delay_ms(mut self, ms: u64) -> Self {
        self.config.base_delay_ms = ms;
        self
    }

    pub fn max_delay_ms(mut self, ms: u64) -> Self {
        self.config.max_delay_ms = ms;
        self
    }

    pub fn jitter_percent(mut self, pct: f64) -> Self {
        self.config.jitter_percent = pct;
        self
    }

    pub fn success_decrease_factor(mut self, factor: f64) -> Self {
        self.config.success_decrease_factor = factor;
        self
    }

    pub fn failure_increase_factor(mut self, factor: f64) -> Self {
        self.config.failure_increase_factor = factor;
        self
    }

    pub fn build(self) -> RateLimiterConfig {
        self.config
    }
}
