//! Metrics for the floodwatch monitoring engine.
//!
//! The engine reports counters and gauges through the [`MetricsSink`] trait.
//! [`MetricStore`] is a small in-memory, retention-bounded implementation used
//! by the standalone binary and by tests to assert on what was emitted.
//!
//! # Example
//!
//! ```rust
//! use flood_metrics::{MetricStore, MetricsSink, names};
//!
//! let store = MetricStore::default();
//! store.increment(names::ALERTS_SENT_TOTAL, &[("tenant", "acme")]);
//!
//! assert_eq!(store.total(names::ALERTS_SENT_TOTAL), 1.0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod names;
pub mod sink;
pub mod storage;
pub mod types;

// Re-export main types at crate root
pub use error::{MetricsError, Result};
pub use sink::{MetricsSink, NoopSink};
pub use storage::MetricStore;
pub use types::{Aggregation, MetricName, MetricPoint};
