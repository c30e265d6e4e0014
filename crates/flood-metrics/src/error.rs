//! Error types for the flood-metrics crate.

use thiserror::Error;

/// Errors that can occur in the metrics system.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The metric name is invalid (empty or contains invalid characters).
    #[error("invalid metric name: {reason}")]
    InvalidMetricName {
        /// The reason the name is invalid.
        reason: String,
    },

    /// A metric with the given name was not found.
    #[error("metric not found: {name}")]
    MetricNotFound {
        /// The metric name that was not found.
        name: String,
    },
}

/// Result type for metrics operations.
pub type Result<T> = std::result::Result<T, MetricsError>;
