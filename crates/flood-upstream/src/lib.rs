//! Resilient access to the upstream detection service.
//!
//! - [`EventSource`]: the boundary the engine fetches events through, with an
//!   HTTP implementation in [`HttpEventSource`]
//! - [`retry_with_backoff`]: exponential backoff with optional jitter and a
//!   per-attempt deadline
//! - [`CircuitBreaker`]: stops calling a failing service for a while
//! - [`UpstreamClient`]: all of the above composed
//!
//! Errors carry their own retry classification via
//! [`UpstreamError::is_retryable`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod breaker;
pub mod client;
pub mod error;
pub mod http;
pub mod retry;
pub mod source;

// Re-export main types at crate root
pub use breaker::{Admission, BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker};
pub use client::UpstreamClient;
pub use error::{Result, UpstreamError};
pub use http::{HttpEventSource, HttpSourceConfig, parse_events};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use source::{EventSource, SourceFuture};
