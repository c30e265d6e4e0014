//! Error types for the flood-upstream crate.

use thiserror::Error;

/// Errors from talking to the upstream detection service.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The request never produced a response (connect, DNS, reset).
    #[error("transport error: {reason}")]
    Transport {
        /// What went wrong.
        reason: String,
    },

    /// An attempt exceeded its deadline.
    #[error("upstream request timed out after {timeout_ms}ms")]
    Timeout {
        /// The deadline that was exceeded.
        timeout_ms: u64,
    },

    /// The service answered with a non-success status.
    #[error("upstream returned status {code}")]
    Status {
        /// HTTP status code.
        code: u16,
    },

    /// The response body could not be understood.
    #[error("malformed upstream response: {reason}")]
    Malformed {
        /// Why decoding failed.
        reason: String,
    },

    /// The circuit breaker short-circuited the call.
    #[error("circuit breaker open, next trial in {retry_in_ms}ms")]
    BreakerOpen {
        /// Time until a trial call is allowed.
        retry_in_ms: i64,
    },

    /// The client was configured with unusable settings.
    #[error("invalid upstream configuration: {reason}")]
    InvalidConfig {
        /// What is wrong.
        reason: String,
    },
}

impl UpstreamError {
    /// Returns true for failures worth retrying within a call.
    ///
    /// Transport errors, timeouts and 5xx are transient. Everything else
    /// (any 4xx including 429, malformed payloads, an open breaker) is not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Status { code } => *code >= 500,
            Self::Malformed { .. } | Self::BreakerOpen { .. } | Self::InvalidConfig { .. } => false,
        }
    }

    /// Returns true if this is a breaker short-circuit.
    #[must_use]
    pub const fn is_breaker_open(&self) -> bool {
        matches!(self, Self::BreakerOpen { .. })
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::Status {
                code: status.as_u16(),
            }
        } else if err.is_decode() {
            Self::Malformed {
                reason: err.to_string(),
            }
        } else {
            Self::Transport {
                reason: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for UpstreamError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed {
            reason: err.to_string(),
        }
    }
}

/// Result type for upstream operations.
pub type Result<T> = std::result::Result<T, UpstreamError>;
