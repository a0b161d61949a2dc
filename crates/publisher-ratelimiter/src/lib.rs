//! Adaptive per-user rate limiter (C3): an evolving millisecond delay per
//! key, widened multiplicatively on failure and narrowed multiplicatively on
//! success, following an AIMD feedback shape with the polarity flipped from
//! a concurrency limiter (here, higher delay means *more* conservative).

mod config;
mod limiter;

pub use config::{RateLimiterConfig, RateLimiterConfigBuilder};
pub use limiter::{AdaptiveDelayController, RateLimiterRegistry};
