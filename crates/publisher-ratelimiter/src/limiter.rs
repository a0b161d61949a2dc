use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;

use crate::config::RateLimiterConfig;

/// One key's adaptive delay state (C3). `current_delay_ms` evolves via AIMD
/// feedback with the polarity flipped from a concurrency limiter: success
/// *decreases* the delay, failure *increases* it.
pub struct AdaptiveDelayController {
    current_delay_ms: AtomicU64,
    next_allowed_at: Mutex<Instant>,
    config: RateLimiterConfig,
}

impl AdaptiveDelayController {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            current_delay_ms: AtomicU64::new(config.base_delay_ms),
            next_allowed_at: Mutex::new(Instant::now()),
            config,
        }
    }

    pub fn current_delay_ms(&self) -> u64 {
        self.current_delay_ms.load(Ordering::Relaxed)
    }

    /// Blocks the caller until `now >= next_allowed_at`, then schedules the
    /// following acquisition at `now + current_delay ± jitter`.
    pub async fn acquire(&self) {
        let wait = {
            let next = *self.next_allowed_at.lock();
            let now = Instant::now();
            next.saturating_duration_since(now)
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        self.schedule_next();
    }

    fn schedule_next(&self) {
        let delay_ms = self.current_delay_ms();
        let jitter_span = (delay_ms as f64 * self.config.jitter_percent) as i64;
        let jitter = if jitter_span > 0 {
            rand::rng().random_range(-jitter_span..=jitter_span)
        } else {
            0
        };
        let effective_ms = (delay_ms as i64 + jitter).max(0) as u64;
        let mut next_allowed_at = self.next_allowed_at.lock();
        *next_allowed_at = Instant::now() + Duration::from_millis(effective_ms);
    }

    /// `currentDelay := max(baseDelayMs, currentDelay * successDecreaseFactor)`.
    pub fn on_success(&self) {
        let current = self.current_delay_ms();
        let decreased = (current as f64 * self.config.success_decrease_factor) as u64;
        self.current_delay_ms
            .store(decreased.max(self.config.base_delay_ms), Ordering::Relaxed);
    }

    /// `currentDelay := min(maxDelayMs, currentDelay * failureIncreaseFactor)`.
    /// A `retry_after` hint is honored as a hard floor on the next
    /// acquisition, even if it exceeds the computed delay.
    pub fn on_failure(&self, retry_after: Option<Duration>) {
        let current = self.current_delay_ms();
        let increased = (current as f64 * self.config.failure_increase_factor) as u64;
        self.current_delay_ms
            .store(increased.min(self.config.max_delay_ms), Ordering::Relaxed);

        if let Some(retry_after) = retry_after {
            let floor = Instant::now() + retry_after;
            let mut next_allowed_at = self.next_allowed_at.lock();
            if floor > *next_allowed_at {
                *next_allowed_at = floor;
            }
        }
    }

    pub fn reset(&self) {
        self.current_delay_ms
            .store(self.config.base_delay_ms, Ordering::Relaxed);
        *self.next_allowed_at.lock() = Instant::now();
    }
}

/// Per-key registry of [`AdaptiveDelayController`]s (one per user).
pub struct RateLimiterRegistry {
    config: RateLimiterConfig,
    controllers: Mutex<HashMap<String, Arc<AdaptiveDelayController>>>,
}

impl RateLimiterRegistry {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            controllers: Mutex::new(HashMap::new()),
        }
    }

    pub fn controller(&self, key: &str) -> Arc<AdaptiveDelayController> {
        self.controllers
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AdaptiveDelayController::new(self.config.clone())))
            .clone()
    }

    pub async fn acquire(&self, key: &str) {
        self.controller(key).acquire().await;
    }

    pub fn on_success(&self, key: &str) {
        self.controller(key).on_success();
    }

    pub fn on_failure(&self, key: &str, retry_after: Option<Duration>) {
        self.controller(key).on_failure(retry_after);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RateLimiterConfig {
        RateLimiterConfig::builder()
            .base_delay_ms(100)
            .max_delay_ms(1_000)
            .jitter_percent(0.0)
            .success_decrease_factor(0.5)
            .failure_increase_factor(2.0)
            .build()
    }

    #[test]
    fn success_decreases_but_never_below_base() {
        let controller = AdaptiveDelayController::new(config());
        controller.on_failure(None);
        controller.on_failure(None);
        assert_eq!(controller.current_delay_ms(), 400);
        controller.on_success();
        assert_eq!(controller.current_delay_ms(), 200);
        controller.on_success();
        controller.on_success();
        assert_eq!(controller.current_delay_ms(), 100);
    }

    #[test]
    fn failure_increases_but_never_above_max() {
        let controller = AdaptiveDelayController::new(config());
        for _ in 0..10 {
            controller.on_failure(None);
        }
        assert_eq!(controller.current_delay_ms(), 1_000);
    }

    #[test]
    fn delay_always_stays_within_bounds() {
        let controller = AdaptiveDelayController::new(config());
        for i in 0..50 {
            if i % 3 == 0 {
                controller.on_success();
            } else {
                controller.on_failure(None);
            }
            let delay = controller.current_delay_ms();
            assert!(delay >= 100 && delay <= 1_000);
        }
    }

    #[tokio::test]
    async fn retry_after_hint_acts_as_hard_floor() {
        let controller = AdaptiveDelayController::new(config());
        controller.on_failure(Some(Duration::from_millis(50)));
        let start = Instant::now();
        controller.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn registry_keys_are_independent() {
        let registry = RateLimiterRegistry::new(config());
        registry.on_failure("a", None);
        registry.on_failure("a", None);
        assert_eq!(registry.controller("a").current_delay_ms(), 400);
        assert_eq!(registry.controller("b").current_delay_ms(), 100);
    }
}
