//! Circuit breaker around the upstream dependency.
//!
//! ```text
//!            threshold consecutive failures
//!   Closed ─────────────────────────────────▶ Open
//!     ▲                                        │ reset timeout elapsed
//!     │ trial succeeds                         ▼
//!     └──────────────────────────────────── HalfOpen
//!                    trial fails: back to Open, timer restarted
//! ```
//!
//! While half-open exactly one trial call is admitted; any other caller is
//! short-circuited until the trial reports back. A trial that has not
//! reported back within the reset timeout is treated as abandoned and the
//! next caller becomes the new trial.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use flood_core::{SharedClock, system_clock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, UpstreamError};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Calls flow normally.
    Closed,
    /// Calls are short-circuited.
    Open,
    /// One trial call decides whether to close.
    HalfOpen,
}

impl BreakerState {
    /// Returns the state as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open before a trial.
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(300),
        }
    }
}

/// What the caller was admitted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Breaker closed.
    Normal,
    /// The single half-open trial.
    Trial,
}

/// Point-in-time view of the breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    /// Current state.
    pub state: BreakerState,
    /// Consecutive failures so far.
    pub consecutive_failures: u32,
    /// When the last failure was recorded.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// How many times the breaker has opened.
    pub times_opened: u64,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    last_failure_at: Option<DateTime<Utc>>,
    trial_started_at: Option<DateTime<Utc>>,
    times_opened: u64,
}

/// Thread-safe circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
    clock: SharedClock,
}

impl CircuitBreaker {
    /// Creates a closed breaker on the system clock.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    /// Creates a closed breaker on the given clock.
    #[must_use]
    pub fn with_clock(config: BreakerConfig, clock: SharedClock) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                trial_started_at: None,
                times_opened: 0,
            }),
            clock,
        }
    }

    /// Returns the thresholds.
    #[must_use]
    pub const fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Returns a snapshot for stats and health reporting.
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            last_failure_at: inner.last_failure_at,
            times_opened: inner.times_opened,
        }
    }

    /// Asks to make a call.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamError::BreakerOpen` when the call must not be made.
    pub fn try_acquire(&self) -> Result<Admission> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        match inner.state {
            BreakerState::Closed => Ok(Admission::Normal),
            BreakerState::Open => {
                let remaining = self.remaining(&inner, now);
                if remaining > chrono::Duration::zero() {
                    return Err(UpstreamError::BreakerOpen {
                        retry_in_ms: remaining.num_milliseconds(),
                    });
                }
                inner.state = BreakerState::HalfOpen;
                inner.trial_started_at = Some(now);
                info!("circuit breaker half-open, admitting trial call");
                Ok(Admission::Trial)
            }
            BreakerState::HalfOpen => {
                if let Some(started) = inner.trial_started_at {
                    if !self.trial_abandoned(started, now) {
                        return Err(UpstreamError::BreakerOpen { retry_in_ms: 0 });
                    }
                    warn!(
                        started_at = %started,
                        "half-open trial never reported back, admitting a new one"
                    );
                }
                inner.trial_started_at = Some(now);
                Ok(Admission::Trial)
            }
        }
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != BreakerState::Closed {
            info!(previous = %inner.state, "circuit breaker closed");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.trial_started_at = None;
    }

    /// Records a failed call.
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure_at = Some(now);
        inner.trial_started_at = None;

        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.times_opened += 1;
                warn!(
                    failures = inner.consecutive_failures,
                    "trial call failed, circuit breaker re-opened"
                );
            }
            BreakerState::Closed if inner.consecutive_failures >= self.config.failure_threshold => {
                inner.state = BreakerState::Open;
                inner.times_opened += 1;
                warn!(
                    failures = inner.consecutive_failures,
                    reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                    "circuit breaker opened"
                );
            }
            _ => {}
        }
    }

    /// Moves an open breaker to half-open once its reset timeout has elapsed,
    /// and clears a half-open trial that was abandoned.
    ///
    /// Returns true if the state changed.
    pub fn half_open_if_elapsed(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Open if self.remaining(&inner, now) <= chrono::Duration::zero() => {
                inner.state = BreakerState::HalfOpen;
                inner.trial_started_at = None;
                info!("circuit breaker half-open after reset timeout");
                true
            }
            BreakerState::HalfOpen
                if inner
                    .trial_started_at
                    .is_some_and(|started| self.trial_abandoned(started, now)) =>
            {
                inner.trial_started_at = None;
                warn!("cleared abandoned half-open trial");
                true
            }
            _ => false,
        }
    }

    /// Forces the breaker closed and clears the failure count.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.trial_started_at = None;
    }

    fn reset_timeout(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.reset_timeout)
            .unwrap_or_else(|_| chrono::Duration::days(36_500))
    }

    fn trial_abandoned(&self, started: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(started) >= self.reset_timeout()
    }

    fn remaining(&self, inner: &Inner, now: DateTime<Utc>) -> chrono::Duration {
        let reset = self.reset_timeout();
        inner.last_failure_at.map_or_else(chrono::Duration::zero, |last| {
            reset - now.signed_duration_since(last)
        })
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flood_core::ManualClock;
    use std::sync::Arc;

    fn breaker() -> (CircuitBreaker, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let breaker = CircuitBreaker::with_clock(BreakerConfig::default(), Arc::new(clock.clone()));
        (breaker, clock)
    }

    fn trip(breaker: &CircuitBreaker) {
        for _ in 0..breaker.config().failure_threshold {
            breaker.record_failure();
        }
    }

    #[test]
    fn starts_closed() {
        let (breaker, _) = breaker();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.try_acquire().unwrap(), Admission::Normal);
    }

    #[test]
    fn opens_at_threshold() {
        let (breaker, _) = breaker();
        for _ in 0..4 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), BreakerState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(breaker.snapshot().times_opened, 1);
    }

    #[test]
    fn success_resets_failure_count() {
        let (breaker, _) = breaker();
        for _ in 0..4 {
            breaker.record_failure();
        }
        breaker.record_success();
        breaker.record_failure();

        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.snapshot().consecutive_failures, 1);
    }

    #[test]
    fn open_breaker_short_circuits_until_reset_timeout() {
        let (breaker, clock) = breaker();
        trip(&breaker);

        clock.advance(chrono::Duration::minutes(1));
        match breaker.try_acquire() {
            Err(UpstreamError::BreakerOpen { retry_in_ms }) => assert_eq!(retry_in_ms, 240_000),
            other => panic!("expected BreakerOpen, got {other:?}"),
        }
    }

    #[test]
    fn single_trial_after_reset_timeout() {
        let (breaker, clock) = breaker();
        trip(&breaker);
        clock.advance(chrono::Duration::minutes(5));

        assert_eq!(breaker.try_acquire().unwrap(), Admission::Trial);
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        // A concurrent caller during the trial is turned away.
        assert!(breaker.try_acquire().unwrap_err().is_breaker_open());
    }

    #[test]
    fn successful_trial_closes() {
        let (breaker, clock) = breaker();
        trip(&breaker);
        clock.advance(chrono::Duration::minutes(5));

        breaker.try_acquire().unwrap();
        breaker.record_success();

        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.try_acquire().unwrap(), Admission::Normal);
    }

    #[test]
    fn failed_trial_reopens_with_fresh_timer() {
        let (breaker, clock) = breaker();
        trip(&breaker);
        clock.advance(chrono::Duration::minutes(5));

        breaker.try_acquire().unwrap();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(breaker.snapshot().times_opened, 2);

        clock.advance(chrono::Duration::minutes(4));
        assert!(breaker.try_acquire().is_err());
        clock.advance(chrono::Duration::minutes(1));
        assert_eq!(breaker.try_acquire().unwrap(), Admission::Trial);
    }

    #[test]
    fn half_open_if_elapsed_respects_timeout() {
        let (breaker, clock) = breaker();
        assert!(!breaker.half_open_if_elapsed());

        trip(&breaker);
        assert!(!breaker.half_open_if_elapsed());

        clock.advance(chrono::Duration::minutes(5));
        assert!(breaker.half_open_if_elapsed());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        // The next caller becomes the trial.
        assert_eq!(breaker.try_acquire().unwrap(), Admission::Trial);
        assert!(breaker.try_acquire().is_err());
    }

    #[test]
    fn trial_that_never_reports_back_is_replaced_after_reset_timeout() {
        let (breaker, clock) = breaker();
        trip(&breaker);
        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(breaker.try_acquire().unwrap(), Admission::Trial);

        clock.advance(chrono::Duration::minutes(4));
        assert!(breaker.try_acquire().unwrap_err().is_breaker_open());

        clock.advance(chrono::Duration::minutes(1));
        assert_eq!(breaker.try_acquire().unwrap(), Admission::Trial);
        assert!(breaker.try_acquire().is_err());

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_if_elapsed_clears_abandoned_trial() {
        let (breaker, clock) = breaker();
        trip(&breaker);
        clock.advance(chrono::Duration::minutes(5));
        breaker.try_acquire().unwrap();

        assert!(!breaker.half_open_if_elapsed());
        clock.advance(chrono::Duration::hours(24));
        assert!(breaker.half_open_if_elapsed());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert_eq!(breaker.try_acquire().unwrap(), Admission::Trial);
    }

    #[test]
    fn reset_closes() {
        let (breaker, _) = breaker();
        trip(&breaker);
        breaker.reset();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.snapshot().consecutive_failures, 0);
    }

    #[test]
    fn state_display() {
        assert_eq!(BreakerState::HalfOpen.to_string(), "half_open");
        assert_eq!(
            serde_json::to_string(&BreakerState::Open).unwrap(),
            "\"open\""
        );
    }
}
