//! Core model and alert decision policy for floodwatch.
//!
//! `flood-core` holds everything in the monitoring engine that does not touch
//! the network:
//!
//! - **Model**: [`MonitoredTarget`], [`DetectionEvent`], [`AlertPolicy`] and the
//!   per-event [`NotificationState`]
//! - **Severity**: a total, monotonic step function from peak bps/pps to a
//!   [`Severity`] tier, with configurable [`SeverityBreakpoints`]
//! - **Correlation**: [`correlate`] pairs each active target with its newest event
//! - **Decision**: [`DecisionEngine`] applies dedup, cooldown, age and severity rules
//! - **Store boundary**: the [`TargetStore`] trait and an [`InMemoryTargetStore`]
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::Utc;
//! use flood_core::{
//!     correlate, CooldownTracker, DecisionEngine, DecisionPolicy, DetectionEvent,
//!     MonitoredTarget, Severity, SystemClock,
//! };
//!
//! let targets = vec![MonitoredTarget::new("acme", "203.0.113.5", "https://hooks.example.com/x").unwrap()];
//! let events = vec![DetectionEvent::new("evt-1", "203.0.113.5", Utc::now()).with_peaks(2e9, 5e4)];
//!
//! let engine = DecisionEngine::new(
//!     DecisionPolicy::default(),
//!     Arc::new(CooldownTracker::new()),
//!     Arc::new(SystemClock),
//! );
//!
//! for pair in correlate(&targets, &events) {
//!     let decision = engine.evaluate(pair.target, pair.event);
//!     assert!(decision.is_accepted());
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod clock;
pub mod cooldown;
pub mod correlator;
pub mod decision;
pub mod error;
pub mod event;
pub mod severity;
pub mod store;
pub mod target;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock, SharedClock, SystemClock, system_clock};
pub use cooldown::{CooldownCheck, CooldownTracker};
pub use correlator::{Correlation, correlate, latest_event};
pub use decision::{Decision, DecisionEngine, DecisionPolicy, RejectReason};
pub use error::{CoreError, Result};
pub use event::{DetectionEvent, SourceBreakdown};
pub use severity::{Severity, SeverityBreakpoints, TierCutoff};
pub use store::{EventRecord, InMemoryTargetStore, StoreFuture, TargetStore};
pub use target::{
    AlertPolicy, CooldownKey, MonitoredTarget, NotificationState, TargetId, TargetUpdate, TenantId,
};
