//! Alert decision policy.
//!
//! A candidate (target, event) pair is accepted only if all of these hold:
//!
//! 1. the target has not already been notified for this exact event id;
//! 2. no cooldown is active for the target's (tenant, address);
//! 3. the event started within the maximum event age;
//! 4. the event's severity meets the target's minimum.
//!
//! On acceptance the cooldown entry is written immediately, before delivery
//! is attempted. A delivery that later fails for good still suppresses the
//! target for the rest of the window.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::cooldown::{CooldownCheck, CooldownTracker};
use crate::event::DetectionEvent;
use crate::severity::{Severity, SeverityBreakpoints};
use crate::target::MonitoredTarget;

/// Engine-wide decision settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionPolicy {
    /// Cooldown applied when the target has no override.
    pub default_cooldown: Duration,
    /// Events that started longer ago than this are ignored.
    pub max_event_age: Duration,
    /// Severity breakpoints.
    pub breakpoints: SeverityBreakpoints,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            default_cooldown: Duration::minutes(5),
            max_event_age: Duration::hours(1),
            breakpoints: SeverityBreakpoints::default(),
        }
    }
}

/// Why a candidate was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// The target was already notified for this event id.
    AlreadyNotified,
    /// The target is inside its cooldown window.
    CooldownActive {
        /// Time left in the window, in milliseconds.
        remaining_ms: i64,
    },
    /// The event started too long ago.
    StaleEvent {
        /// Event age in milliseconds.
        age_ms: i64,
    },
    /// The event is below the target's severity threshold.
    BelowSeverity {
        /// The event's severity.
        severity: Severity,
        /// The target's minimum.
        minimum: Severity,
    },
}

impl RejectReason {
    /// Short label for logs and metric tags.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyNotified => "already_notified",
            Self::CooldownActive { .. } => "cooldown",
            Self::StaleEvent { .. } => "stale",
            Self::BelowSeverity { .. } => "below_severity",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyNotified => write!(f, "already notified for this event"),
            Self::CooldownActive { remaining_ms } => {
                write!(f, "cooldown active for another {remaining_ms}ms")
            }
            Self::StaleEvent { age_ms } => write!(f, "event is stale ({age_ms}ms old)"),
            Self::BelowSeverity { severity, minimum } => {
                write!(f, "severity {severity} is below minimum {minimum}")
            }
        }
    }
}

/// The decision for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Notify, at this severity.
    Accept {
        /// The event's severity.
        severity: Severity,
    },
    /// Do not notify.
    Reject(RejectReason),
}

impl Decision {
    /// Returns true for [`Decision::Accept`].
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept { .. })
    }
}

/// Checks every predicate except the cooldown, which needs shared state.
///
/// Returns the event's severity when those predicates hold.
pub fn screen(
    policy: &DecisionPolicy,
    target: &MonitoredTarget,
    event: &DetectionEvent,
    now: DateTime<Utc>,
) -> Result<Severity, RejectReason> {
    if target.notification_state(&event.id).is_notified() {
        return Err(RejectReason::AlreadyNotified);
    }

    let oldest = now.checked_sub_signed(policy.max_event_age);
    if oldest.is_some_and(|oldest| event.started_at < oldest) {
        return Err(RejectReason::StaleEvent {
            age_ms: event.age(now).num_milliseconds(),
        });
    }

    let severity = event.severity(&policy.breakpoints);
    let minimum = target.policy.min_severity_or_minimal();
    if severity < minimum {
        return Err(RejectReason::BelowSeverity { severity, minimum });
    }

    Ok(severity)
}

/// Applies the decision policy against shared cooldown state.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    policy: DecisionPolicy,
    cooldowns: Arc<CooldownTracker>,
    clock: SharedClock,
}

impl DecisionEngine {
    /// Creates a decision engine over an owned cooldown tracker.
    #[must_use]
    pub fn new(policy: DecisionPolicy, cooldowns: Arc<CooldownTracker>, clock: SharedClock) -> Self {
        Self {
            policy,
            cooldowns,
            clock,
        }
    }

    /// Returns the policy.
    #[must_use]
    pub const fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    /// Returns the cooldown tracker.
    #[must_use]
    pub fn cooldowns(&self) -> &Arc<CooldownTracker> {
        &self.cooldowns
    }

    /// Decides whether `event` should produce a notification for `target`.
    ///
    /// Acceptance records the cooldown entry as a side effect.
    pub fn evaluate(&self, target: &MonitoredTarget, event: &DetectionEvent) -> Decision {
        let now = self.clock.now();

        let severity = match screen(&self.policy, target, event, now) {
            Ok(severity) => severity,
            Err(reason) => return Decision::Reject(reason),
        };

        let window = target.policy.cooldown_or(self.policy.default_cooldown);
        match self.cooldowns.try_acquire(target.cooldown_key(), now, window) {
            CooldownCheck::Acquired => Decision::Accept { severity },
            CooldownCheck::Active { remaining } => Decision::Reject(RejectReason::CooldownActive {
                remaining_ms: remaining.num_milliseconds(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::target::{AlertPolicy, TargetUpdate};

    fn setup() -> (DecisionEngine, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let engine = DecisionEngine::new(
            DecisionPolicy::default(),
            Arc::new(CooldownTracker::new()),
            Arc::new(clock.clone()),
        );
        (engine, clock)
    }

    fn target() -> MonitoredTarget {
        MonitoredTarget::new("acme", "203.0.113.5", "dest")
            .unwrap()
            .with_policy(AlertPolicy::default().with_cooldown(std::time::Duration::from_secs(300)))
    }

    fn event(id: &str, clock: &ManualClock) -> DetectionEvent {
        DetectionEvent::new(id, "203.0.113.5", clock.now()).with_peaks(2e9, 50_000.0)
    }

    #[test]
    fn novel_fresh_event_accepted() {
        let (engine, clock) = setup();
        let decision = engine.evaluate(&target(), &event("evt-1", &clock));

        assert_eq!(
            decision,
            Decision::Accept {
                severity: Severity::Medium
            }
        );
        assert_eq!(engine.cooldowns().len(), 1);
    }

    #[test]
    fn already_notified_event_rejected_even_after_cooldown() {
        let (engine, clock) = setup();
        let mut t = target();
        TargetUpdate::notified("evt-1", clock.now()).apply(&mut t, clock.now());

        clock.advance(Duration::hours(2));
        let e = event("evt-1", &clock);

        assert_eq!(
            engine.evaluate(&t, &e),
            Decision::Reject(RejectReason::AlreadyNotified)
        );
    }

    #[test]
    fn cooldown_blocks_new_event() {
        let (engine, clock) = setup();
        let t = target();
        assert!(engine.evaluate(&t, &event("evt-1", &clock)).is_accepted());

        clock.advance(Duration::seconds(60));
        let decision = engine.evaluate(&t, &event("evt-2", &clock));
        assert_eq!(
            decision,
            Decision::Reject(RejectReason::CooldownActive {
                remaining_ms: 240_000
            })
        );
    }

    #[test]
    fn cooldown_expires() {
        let (engine, clock) = setup();
        let t = target();
        assert!(engine.evaluate(&t, &event("evt-1", &clock)).is_accepted());

        clock.advance(Duration::minutes(5));
        assert!(engine.evaluate(&t, &event("evt-2", &clock)).is_accepted());
    }

    #[test]
    fn stale_event_rejected_without_touching_cooldown() {
        let (engine, clock) = setup();
        let mut e = event("evt-1", &clock);
        e.started_at = clock.now() - Duration::minutes(61);

        let decision = engine.evaluate(&target(), &e);
        assert!(matches!(
            decision,
            Decision::Reject(RejectReason::StaleEvent { .. })
        ));
        assert!(engine.cooldowns().is_empty());
    }

    #[test]
    fn event_exactly_at_max_age_accepted() {
        let (engine, clock) = setup();
        let mut e = event("evt-1", &clock);
        e.started_at = clock.now() - Duration::hours(1);

        assert!(engine.evaluate(&target(), &e).is_accepted());
    }

    #[test]
    fn huge_max_event_age_accepts_instead_of_overflowing() {
        let clock = ManualClock::new(Utc::now());
        let engine = DecisionEngine::new(
            DecisionPolicy {
                max_event_age: Duration::milliseconds(i64::MAX / 2),
                ..DecisionPolicy::default()
            },
            Arc::new(CooldownTracker::new()),
            Arc::new(clock.clone()),
        );
        let mut e = event("evt-1", &clock);
        e.started_at = clock.now() - Duration::days(3650);

        assert!(engine.evaluate(&target(), &e).is_accepted());
    }

    #[test]
    fn below_severity_rejected() {
        let (engine, clock) = setup();
        let t = target().with_policy(AlertPolicy::default().with_min_severity(Severity::High));

        let decision = engine.evaluate(&t, &event("evt-1", &clock));
        assert_eq!(
            decision,
            Decision::Reject(RejectReason::BelowSeverity {
                severity: Severity::Medium,
                minimum: Severity::High
            })
        );
    }

    #[test]
    fn default_cooldown_applies_without_override() {
        let (engine, clock) = setup();
        let t = MonitoredTarget::new("acme", "203.0.113.5", "dest").unwrap();
        assert!(engine.evaluate(&t, &event("evt-1", &clock)).is_accepted());

        clock.advance(Duration::minutes(4));
        assert!(!engine.evaluate(&t, &event("evt-2", &clock)).is_accepted());
    }

    #[test]
    fn reject_reason_labels() {
        assert_eq!(RejectReason::AlreadyNotified.as_str(), "already_notified");
        assert_eq!(
            RejectReason::CooldownActive { remaining_ms: 1 }.as_str(),
            "cooldown"
        );
        assert_eq!(
            RejectReason::BelowSeverity {
                severity: Severity::Low,
                minimum: Severity::High
            }
            .to_string(),
            "severity low is below minimum high"
        );
    }
}
