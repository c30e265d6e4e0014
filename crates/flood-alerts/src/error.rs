//! Error types for the flood-alerts crate.

use thiserror::Error;

/// Errors that can occur while queueing or delivering alerts.
#[derive(Debug, Error)]
pub enum AlertError {
    /// A channel failed to deliver a message.
    #[error("delivery via {channel} failed: {reason}")]
    DeliveryFailed {
        /// The channel that failed.
        channel: String,
        /// Why it failed.
        reason: String,
    },

    /// A channel was configured with unusable settings.
    #[error("invalid channel configuration: {reason}")]
    InvalidChannel {
        /// What is wrong.
        reason: String,
    },

    /// No channel accepts the destination.
    #[error("no channel for destination: {destination}")]
    NoRoute {
        /// The destination that could not be routed.
        destination: String,
    },

    /// The queue no longer accepts new tasks.
    #[error("alert queue is closed")]
    QueueClosed,

    /// The target store rejected an operation.
    #[error("store error: {0}")]
    Store(#[from] flood_core::CoreError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for AlertError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Result type for alert operations.
pub type Result<T> = std::result::Result<T, AlertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_delivery_failed() {
        let err = AlertError::DeliveryFailed {
            channel: "webhook".into(),
            reason: "status 502".into(),
        };
        assert_eq!(err.to_string(), "delivery via webhook failed: status 502");
    }

    #[test]
    fn error_display_queue_closed() {
        assert_eq!(AlertError::QueueClosed.to_string(), "alert queue is closed");
    }

    #[test]
    fn error_from_core() {
        let err: AlertError = flood_core::CoreError::TargetNotFound { id: "t-1".into() }.into();
        assert!(err.to_string().starts_with("store error:"));
    }

    #[test]
    fn error_from_serde() {
        let err: AlertError = serde_json::from_str::<serde_json::Value>("[").unwrap_err().into();
        assert!(matches!(err, AlertError::SerializationError(_)));
    }
}
