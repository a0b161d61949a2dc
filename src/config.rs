//! Process configuration, read from environment variables (spec.md §6).
//!
//! Every recognized option is parsed here with a descriptive error; an
//! invalid value aborts startup with a non-zero exit, matching the
//! `GatewayConfig::from_env` pattern this is grounded on.

use std::env;
use std::time::Duration;

use tracing::Level;

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub publisher_concurrency: usize,
    pub publisher_max_attempts: u32,
    pub publisher_job_timeout: Duration,

    pub rate_limiter_enabled: bool,
    pub rate_limiter_base_delay_ms: u64,
    pub rate_limiter_max_delay_ms: u64,
    pub rate_limiter_jitter_percent: f64,
    pub rate_limiter_success_decrease_factor: f64,
    pub rate_limiter_failure_increase_factor: f64,

    pub circuit_breaker_enabled: bool,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_open_duration: Duration,
    pub circuit_breaker_persist_to_redis: bool,

    pub cache_enabled: bool,
    pub cache_default_ttl: Duration,
    pub cache_stale_ttl: Duration,

    pub metrics_enabled: bool,
    pub metrics_flush_interval: Duration,

    pub refresh_token_expiry_days: i64,
    pub log_level: Level,

    /// Upstream OAuth2/API base URL. Not in spec.md §6's enumerated list
    /// (which covers the resilience tunables only) but required to build a
    /// runnable [`crate::app::App`] — grounded on `GatewayConfig`'s
    /// `DATABASE_URL`-style required-URL fields.
    pub upstream_base_url: String,
    pub oauth_client_id: String,
    pub oauth_client_secret: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: &'static str, message: String },
}

fn parse_env<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
            var,
            message: format!("could not parse {raw:?}"),
        }),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            var,
            message: "value is not valid unicode".to_string(),
        }),
    }
}

fn parse_log_level(raw: &str) -> Result<Level, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(ConfigError::InvalidValue {
            var: "LOG_LEVEL",
            message: format!("expected one of debug|info|warn|error, got {other:?}"),
        }),
    }
}

impl PublisherConfig {
    /// Parses every recognized environment variable. Callers that want the
    /// spec's "abort startup with non-zero exit" behavior should call
    /// [`PublisherConfig::from_env_or_exit`] instead.
    pub fn from_env() -> Result<Self, ConfigError> {
        let log_level_raw = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            publisher_concurrency: parse_env("PUBLISHER_CONCURRENCY", 2usize)?,
            publisher_max_attempts: parse_env("PUBLISHER_MAX_ATTEMPTS", 7u32)?,
            publisher_job_timeout: Duration::from_millis(parse_env(
                "PUBLISHER_JOB_TIMEOUT_MS",
                1_200_000u64,
            )?),

            rate_limiter_enabled: parse_env("RATE_LIMITER_ENABLED", true)?,
            rate_limiter_base_delay_ms: parse_env("RATE_LIMITER_BASE_DELAY_MS", 3_000u64)?,
            rate_limiter_max_delay_ms: parse_env("RATE_LIMITER_MAX_DELAY_MS", 300_000u64)?,
            rate_limiter_jitter_percent: parse_env("RATE_LIMITER_JITTER_PERCENT", 0.20f64)?,
            rate_limiter_success_decrease_factor: parse_env(
                "RATE_LIMITER_SUCCESS_DECREASE_FACTOR",
                0.9f64,
            )?,
            rate_limiter_failure_increase_factor: parse_env(
                "RATE_LIMITER_FAILURE_INCREASE_FACTOR",
                2.0f64,
            )?,

            circuit_breaker_enabled: parse_env("CIRCUIT_BREAKER_ENABLED", true)?,
            circuit_breaker_threshold: parse_env("CIRCUIT_BREAKER_THRESHOLD", 3u32)?,
            circuit_breaker_open_duration: Duration::from_millis(parse_env(
                "CIRCUIT_BREAKER_OPEN_DURATION_MS",
                300_000u64,
            )?),
            circuit_breaker_persist_to_redis: parse_env("CIRCUIT_BREAKER_PERSIST_TO_REDIS", false)?,

            cache_enabled: parse_env("CACHE_ENABLED", true)?,
            cache_default_ttl: Duration::from_secs(parse_env("CACHE_DEFAULT_TTL", 300u64)?),
            cache_stale_ttl: Duration::from_secs(parse_env("CACHE_STALE_TTL", 7_200u64)?),

            metrics_enabled: parse_env("METRICS_ENABLED", true)?,
            metrics_flush_interval: Duration::from_millis(parse_env(
                "METRICS_FLUSH_INTERVAL_MS",
                60_000u64,
            )?),

            refresh_token_expiry_days: parse_env("REFRESH_TOKEN_EXPIRY_DAYS", 60i64)?,
            log_level: parse_log_level(&log_level_raw)?,

            upstream_base_url: env::var("UPSTREAM_BASE_URL")
                .unwrap_or_else(|_| "https://www.deviantart.com".to_string()),
            oauth_client_id: env::var("OAUTH_CLIENT_ID").unwrap_or_default(),
            oauth_client_secret: env::var("OAUTH_CLIENT_SECRET").unwrap_or_default(),
        })
    }

    /// Parses the environment, aborting the process with a non-zero exit on
    /// any invalid value (spec.md §6: "Invalid values abort startup").
    pub fn from_env_or_exit() -> Self {
        match Self::from_env() {
            Ok(config) => config,
            Err(err) => {
                eprintln!("publisher: invalid configuration: {err}");
                std::process::exit(1);
            }
        }
    }
}
