//! The publisher's unified error taxonomy.
//!
//! Every fallible operation in the workspace returns [`PublisherError`] (or a
//! `Result<T, PublisherError>`). This plays the role the teacher's generic
//! `ResilienceError<E>` plays for a middleware library, specialized down to
//! one concrete application error set since nothing here wraps an arbitrary
//! inner service error.

use std::time::Duration;

use uuid::Uuid;

/// The publisher's closed error taxonomy. See the error table in the design
/// doc for origin and observable-effect per variant.
#[derive(Debug, thiserror::Error, Clone)]
pub enum PublisherError {
    /// The user's refresh token is expired or upstream rejected it outright.
    #[error("reauthentication required for user {user_id}")]
    ReauthRequired { user_id: Uuid },

    /// Upstream returned 400.
    #[error("validation error: {message}")]
    ValidationError { message: String },

    /// Upstream returned 401 for an access token that looked valid locally.
    #[error("auth error: {message}")]
    AuthError { message: String },

    /// Upstream returned 403.
    #[error("permission denied: {message}")]
    PermissionDenied { message: String },

    /// Upstream returned 429.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        retry_after: Option<Duration>,
        rate_limit_reset: Option<i64>,
        rate_limit_remaining: Option<i64>,
    },

    /// Upstream returned a 5xx.
    #[error("upstream server error: status {status}")]
    ServerError { status: u16 },

    /// C2 rejected the call; no network request was made.
    #[error("circuit open for key {key}, retry after {retry_after:?}")]
    CircuitOpen { key: String, retry_after: Duration },

    /// C7 observed a race between `publishNow` and an already-active job.
    #[error("job busy: {job_id}")]
    JobBusy { job_id: String },

    /// Network-level failure (connect/timeout/reset) below the HTTP layer.
    #[error("transient io error: {message}")]
    TransientIo { message: String },

    /// Refresh attempted but the upstream token endpoint itself failed
    /// transiently (not a REAUTH_REQUIRED condition).
    #[error("token refresh failed: {message}")]
    TokenRefreshFailed { message: String },
}

impl PublisherError {
    /// Whether C7 should re-queue this error with backoff, per spec.md's
    /// error table. `CIRCUIT_OPEN` is retryable only after its own delay;
    /// callers that already know the delay (the breaker itself) schedule
    /// that separately rather than going through ordinary backoff.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            PublisherError::RateLimited { .. }
                | PublisherError::ServerError { .. }
                | PublisherError::CircuitOpen { .. }
                | PublisherError::TransientIo { .. }
                | PublisherError::TokenRefreshFailed { .. }
        )
    }

    /// Short machine-readable kind, used as the metrics category label.
    pub fn kind(&self) -> &'static str {
        match self {
            PublisherError::ReauthRequired { .. } => "REAUTH_REQUIRED",
            PublisherError::ValidationError { .. } => "VALIDATION_ERROR",
            PublisherError::AuthError { .. } => "AUTH_ERROR",
            PublisherError::PermissionDenied { .. } => "PERMISSION_DENIED",
            PublisherError::RateLimited { .. } => "RATE_LIMITED",
            PublisherError::ServerError { .. } => "SERVER_ERROR",
            PublisherError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            PublisherError::JobBusy { .. } => "JOB_BUSY",
            PublisherError::TransientIo { .. } => "TRANSIENT_IO",
            PublisherError::TokenRefreshFailed { .. } => "TOKEN_REFRESH_FAILED",
        }
    }

    /// Whether a draft that failed on this error should be marked `failed`
    /// immediately, bypassing further retries (the terminal-kind rows of the
    /// error table).
    pub fn is_terminal_for_draft(&self) -> bool {
        matches!(
            self,
            PublisherError::ReauthRequired { .. }
                | PublisherError::ValidationError { .. }
                | PublisherError::PermissionDenied { .. }
        )
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::AuthError {
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    pub fn transient_io(message: impl Into<String>) -> Self {
        Self::TransientIo {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds_match_error_table() {
        assert!(PublisherError::RateLimited {
            retry_after: None,
            rate_limit_reset: None,
            rate_limit_remaining: None
        }
        .retryable());
        assert!(PublisherError::ServerError { status: 503 }.retryable());
        assert!(PublisherError::CircuitOpen {
            key: "k".into(),
            retry_after: Duration::from_secs(1)
        }
        .retryable());
        assert!(PublisherError::TransientIo {
            message: "reset".into()
        }
        .retryable());
    }

    #[test]
    fn terminal_kinds_match_error_table() {
        assert!(!PublisherError::ReauthRequired {
            user_id: Uuid::nil()
        }
        .retryable());
        assert!(!PublisherError::ValidationError {
            message: "bad".into()
        }
        .retryable());
        assert!(!PublisherError::PermissionDenied {
            message: "no".into()
        }
        .retryable());
        assert!(!PublisherError::AuthError {
            message: "401".into()
        }
        .retryable());
        assert!(!PublisherError::JobBusy {
            job_id: "publish:1".into()
        }
        .retryable());
    }

    #[test]
    fn terminal_for_draft_is_a_strict_subset_of_non_retryable() {
        let reauth = PublisherError::ReauthRequired {
            user_id: Uuid::nil(),
        };
        assert!(reauth.is_terminal_for_draft());
        assert!(!reauth.retryable());

        let auth = PublisherError::AuthError {
            message: "401".into(),
        };
        assert!(!auth.is_terminal_for_draft());
        assert!(!auth.retryable());
    }

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(
            PublisherError::JobBusy {
                job_id: "x".into()
            }
            .kind(),
            "JOB_BUSY"
        );
    }
}
