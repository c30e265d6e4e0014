//! Operational statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use flood_upstream::{BreakerSnapshot, BreakerState};
use serde::{Deserialize, Serialize};

use crate::health::HealthReport;

/// Everything an operator sees when asking how the engine is doing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Whether the scheduler is running.
    pub is_running: bool,
    /// Check cycles started.
    pub total_checks: u64,
    /// Check cycles skipped because one was still running.
    pub skipped_cycles: u64,
    /// Cycles short-circuited by the breaker.
    pub short_circuited_cycles: u64,
    /// Alerts accepted and queued.
    pub alerts_enqueued: u64,
    /// Alerts delivered.
    pub alerts_sent: u64,
    /// Delivery attempts that were retried.
    pub alerts_retried: u64,
    /// Alerts dropped after exhausting retries.
    pub alerts_failed: u64,
    /// Alerts abandoned at shutdown, in the queue or on the way into it.
    pub alerts_abandoned: u64,
    /// Fetch failures and per-target errors.
    pub errors: u64,
    /// Alerts waiting for delivery.
    pub queue_depth: usize,
    /// Breaker state.
    pub breaker_state: BreakerState,
    /// Breaker details.
    pub breaker: BreakerSnapshot,
    /// Cooldown entries currently tracked.
    pub active_cooldowns: usize,
    /// When the last cycle started.
    pub last_check_at: Option<DateTime<Utc>>,
    /// Last health probe.
    pub health: Option<HealthReport>,
}

/// Counters owned by the monitor.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub total_checks: AtomicU64,
    pub skipped_cycles: AtomicU64,
    pub short_circuited: AtomicU64,
    pub alerts_enqueued: AtomicU64,
    pub alerts_abandoned: AtomicU64,
    pub errors: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
