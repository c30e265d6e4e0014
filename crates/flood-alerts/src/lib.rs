//! Alert queueing and delivery for floodwatch.
//!
//! Accepted alerts become [`AlertTask`]s in an [`AlertQueue`]. A single
//! [`Dispatcher`] drains the queue, rendering each task into a
//! [`RenderedMessage`] and handing it to a [`NotificationChannel`].
//!
//! # Ordering
//!
//! Retries are drained before new work: a task that failed goes back to the
//! front of a dedicated retry lane, ahead of everything enqueued after it.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use flood_alerts::{AlertQueue, AlertTask};
//! use flood_core::{DetectionEvent, MonitoredTarget, Severity};
//!
//! let queue = AlertQueue::new();
//! let target = MonitoredTarget::new("acme", "203.0.113.5", "log:ops").unwrap();
//! let event = DetectionEvent::new("evt-1", "203.0.113.5", Utc::now());
//!
//! queue.push(AlertTask::new(target, event, Severity::Medium, Utc::now())).unwrap();
//! assert_eq!(queue.len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod channels;
pub mod dispatcher;
pub mod error;
pub mod queue;
pub mod render;
pub mod task;

// Re-export main types at crate root
pub use channels::{
    ChannelFuture, ChannelRouter, LogChannel, NotificationChannel, WebhookChannel, WebhookConfig,
    WebhookPayload,
};
pub use dispatcher::{DeliveryOutcome, Dispatcher, DispatcherConfig, DispatcherStats};
pub use error::{AlertError, Result};
pub use queue::AlertQueue;
pub use render::{RenderedMessage, format_bps, format_pps};
pub use task::AlertTask;
