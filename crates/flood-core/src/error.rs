//! Error types for the flood-core crate.

use thiserror::Error;

/// Errors raised by the core model, the decision policy and the target store.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The target address is not a valid IPv4 or IPv6 address.
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress {
        /// The rejected address.
        address: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A target definition is invalid.
    #[error("invalid target: {reason}")]
    InvalidTarget {
        /// The reason the target is invalid.
        reason: String,
    },

    /// An active target already exists for the same tenant and address.
    #[error("duplicate target: tenant '{tenant}' already monitors {address}")]
    DuplicateTarget {
        /// The tenant owning the existing target.
        tenant: String,
        /// The duplicated address.
        address: String,
    },

    /// Target with the given ID was not found.
    #[error("target not found: {id}")]
    TargetNotFound {
        /// The target ID that was not found.
        id: String,
    },

    /// Severity breakpoints are not ordered tier over tier.
    #[error("invalid severity breakpoints: {reason}")]
    InvalidBreakpoints {
        /// The reason the breakpoints are invalid.
        reason: String,
    },

    /// Unknown severity tier name.
    #[error("unknown severity tier: {0}")]
    UnknownSeverity(String),

    /// The backing store rejected an operation.
    #[error("store error: {reason}")]
    Store {
        /// The reason the store operation failed.
        reason: String,
    },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
