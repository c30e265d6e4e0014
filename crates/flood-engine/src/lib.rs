//! Floodwatch engine.
//!
//! Ties the pieces together: a [`Monitor`] runs check cycles (targets from a
//! [`flood_core::TargetStore`], events from a [`flood_upstream::EventSource`]
//! behind retry and a circuit breaker), decides which pairs deserve an alert
//! and queues them for the [`flood_alerts::Dispatcher`]. [`MonitorService`]
//! drives it from timers.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use flood_alerts::LogChannel;
//! use flood_core::InMemoryTargetStore;
//! use flood_engine::{Collaborators, EngineConfig, Monitor, MonitorService};
//! use flood_upstream::HttpEventSource;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::from_file("floodwatch.toml")?;
//! let store = Arc::new(InMemoryTargetStore::new());
//! let source = Arc::new(HttpEventSource::new(config.http_source_config())?);
//!
//! let monitor = Monitor::new(config, Collaborators::new(store, source, Arc::new(LogChannel)));
//! let service = MonitorService::new(monitor);
//! service.start()?;
//! // ...
//! service.stop().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod health;
pub mod monitor;
pub mod scheduler;
pub mod stats;

// Re-export main types at crate root
pub use config::{
    AlertSettings, BreakerSettings, DispatcherSettings, EngineConfig, RetentionSettings,
    ScheduleSettings, TargetSeed, UpstreamSettings,
};
pub use error::{EngineError, Result};
pub use health::{ComponentHealth, HealthReport};
pub use monitor::{Collaborators, CycleOutcome, CycleReport, MaintenanceReport, Monitor};
pub use scheduler::{Job, MonitorService};
pub use stats::EngineStats;
