use std::time::Duration;

use publisher_contracts::PublisherError;

/// Exponential backoff with a floor and a cap, matching spec.md §4.7: base
/// 30s, cap 10min, up to `max_attempts` (default 7) before an error is
/// treated as exhausted and the job is marked terminally failed.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(600),
            max_attempts: 7,
        }
    }
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// `min(max_delay, base_delay * 2^(attempt - 1))` for a 1-indexed
    /// attempt number.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let scaled = self.base_delay.saturating_mul(1u32.checked_shl(shift).unwrap_or(u32::MAX));
        scaled.min(self.max_delay)
    }

    /// Whether `error` should be retried given it has already been
    /// attempted `attempts_so_far` times. Terminal error kinds (per
    /// `PublisherError::retryable`) are never retried regardless of
    /// attempt count.
    pub fn should_retry(&self, error: &PublisherError, attempts_so_far: u32) -> bool {
        error.retryable() && attempts_so_far < self.max_attempts
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    pub fn base_delay(mut self, d: Duration) -> Self {
        self.policy.base_delay = d;
        self
    }

    pub fn max_delay(mut self, d: Duration) -> Self {
        self.policy.max_delay = d;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.policy.max_attempts = n;
        self
    }

    pub fn build(self) -> RetryPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_then_caps() {
        let policy = RetryPolicy::builder()
            .base_delay(Duration::from_secs(30))
            .max_delay(Duration::from_secs(600))
            .build();
        assert_eq!(policy.backoff_for_attempt(1), Duration::from_secs(30));
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_secs(60));
        assert_eq!(policy.backoff_for_attempt(3), Duration::from_secs(120));
        assert_eq!(policy.backoff_for_attempt(4), Duration::from_secs(240));
        assert_eq!(policy.backoff_for_attempt(5), Duration::from_secs(480));
        assert_eq!(policy.backoff_for_attempt(6), Duration::from_secs(600));
        assert_eq!(policy.backoff_for_attempt(20), Duration::from_secs(600));
    }

    #[test]
    fn rate_limit_and_server_errors_are_retryable_within_attempt_budget() {
        let policy = RetryPolicy::default();
        let rate_limited = PublisherError::RateLimited {
            retry_after: None,
            rate_limit_reset: None,
            rate_limit_remaining: None,
        };
        assert!(policy.should_retry(&rate_limited, 0));
        assert!(policy.should_retry(&rate_limited, 6));
        assert!(!policy.should_retry(&rate_limited, 7));
    }

    #[test]
    fn terminal_kinds_are_never_retried() {
        let policy = RetryPolicy::default();
        let validation = PublisherError::validation("bad request");
        assert!(!policy.should_retry(&validation, 0));
        let reauth = PublisherError::ReauthRequired {
            user_id: uuid::Uuid::nil(),
        };
        assert!(!policy.should_retry(&reauth, 0));
    }
}
