//! Queued units of delivery work.

use chrono::{DateTime, Utc};
use flood_core::{DetectionEvent, MonitoredTarget, Severity};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One pending notification.
///
/// Holds snapshots of the target and event as they were when the alert was
/// accepted, so later changes to either do not alter what gets sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertTask {
    /// Task id, for log correlation.
    pub id: Uuid,
    /// Target snapshot.
    pub target: MonitoredTarget,
    /// Event snapshot.
    pub event: DetectionEvent,
    /// Severity at acceptance time.
    pub severity: Severity,
    /// When the task entered the queue.
    pub enqueued_at: DateTime<Utc>,
    /// Failed attempts so far.
    pub retry_count: u32,
    /// Operator-triggered test alert, not tied to a real event.
    pub synthetic: bool,
}

impl AlertTask {
    /// Creates a task for an accepted (target, event) pair.
    #[must_use]
    pub fn new(
        target: MonitoredTarget,
        event: DetectionEvent,
        severity: Severity,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            event,
            severity,
            enqueued_at,
            retry_count: 0,
            synthetic: false,
        }
    }

    /// Creates a test alert for `target`.
    #[must_use]
    pub fn synthetic(target: MonitoredTarget, now: DateTime<Utc>) -> Self {
        let event = DetectionEvent::new(
            format!("test-{}", Uuid::new_v4()),
            target.address.to_string(),
            now,
        )
        .with_kind("test");

        Self {
            synthetic: true,
            ..Self::new(target, event, Severity::Minimal, now)
        }
    }

    /// Returns true if another attempt is allowed under `max_retries`.
    #[must_use]
    pub const fn can_retry(&self, max_retries: u32) -> bool {
        self.retry_count < max_retries
    }

    /// Time spent queued so far.
    #[must_use]
    pub fn waited(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.enqueued_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> MonitoredTarget {
        MonitoredTarget::new("acme", "203.0.113.5", "log:ops").unwrap()
    }

    #[test]
    fn new_task_starts_without_retries() {
        let now = Utc::now();
        let task = AlertTask::new(
            target(),
            DetectionEvent::new("evt-1", "203.0.113.5", now),
            Severity::High,
            now,
        );
        assert_eq!(task.retry_count, 0);
        assert!(!task.synthetic);
        assert!(task.can_retry(3));
    }

    #[test]
    fn retry_budget() {
        let now = Utc::now();
        let mut task = AlertTask::synthetic(target(), now);
        task.retry_count = 3;
        assert!(!task.can_retry(3));
        assert!(task.can_retry(4));
        assert!(!task.can_retry(0));
    }

    #[test]
    fn synthetic_task_targets_own_address() {
        let now = Utc::now();
        let task = AlertTask::synthetic(target(), now);

        assert!(task.synthetic);
        assert_eq!(task.event.address, "203.0.113.5");
        assert!(task.event.id.starts_with("test-"));
        assert_eq!(task.event.kind, "test");
    }
}
