//! Error types for the flood-engine crate.

use thiserror::Error;

/// Errors surfaced by the monitoring engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Model or store error.
    #[error(transparent)]
    Core(#[from] flood_core::CoreError),

    /// Upstream client error.
    #[error(transparent)]
    Upstream(#[from] flood_upstream::UpstreamError),

    /// Alert queueing or delivery error.
    #[error(transparent)]
    Alert(#[from] flood_alerts::AlertError),

    /// `start` was called on a running service.
    #[error("monitor service is already running")]
    AlreadyRunning,

    /// `stop` was called on a stopped service.
    #[error("monitor service is not running")]
    NotRunning,

    /// The target does not exist.
    #[error("target not found: {id}")]
    TargetNotFound {
        /// The id that was looked up.
        id: String,
    },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
