//! Health reporting.

use chrono::{DateTime, Utc};
use flood_upstream::BreakerState;
use serde::{Deserialize, Serialize};

/// Health of one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComponentHealth {
    /// The last probe succeeded.
    Healthy,
    /// The last probe failed.
    Unhealthy {
        /// Why.
        reason: String,
    },
}

impl ComponentHealth {
    /// Returns true for [`ComponentHealth::Healthy`].
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Builds from a probe result.
    pub fn from_result<E: std::fmt::Display>(result: &Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::Healthy,
            Err(e) => Self::Unhealthy {
                reason: e.to_string(),
            },
        }
    }
}

/// Outcome of one health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Detection service.
    pub upstream: ComponentHealth,
    /// Target store.
    pub store: ComponentHealth,
    /// Breaker state at probe time.
    pub breaker: BreakerState,
    /// Alerts waiting for delivery.
    pub queue_depth: usize,
    /// When the probe ran.
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// Healthy when both dependencies answered and the breaker is closed.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.upstream.is_healthy() && self.store.is_healthy() && self.breaker == BreakerState::Closed
    }
}
