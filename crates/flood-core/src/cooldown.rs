//! In-memory cooldown tracking.
//!
//! One entry per (tenant, address) holding the time of the last notification
//! *attempt*. Entries are written at decision time, not delivery time.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::target::CooldownKey;

/// Outcome of a cooldown check-and-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownCheck {
    /// No active cooldown; the entry now holds the new attempt time.
    Acquired,
    /// A cooldown is active for this long still.
    Active {
        /// Time left in the window.
        remaining: Duration,
    },
}

/// Thread-safe map of last notification attempts.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    entries: Mutex<HashMap<CooldownKey, DateTime<Utc>>>,
}

impl CooldownTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last attempt time for a key.
    #[must_use]
    pub fn last(&self, key: &CooldownKey) -> Option<DateTime<Utc>> {
        self.entries.lock().get(key).copied()
    }

    /// Overwrites the last attempt time for a key.
    pub fn record(&self, key: CooldownKey, at: DateTime<Utc>) {
        self.entries.lock().insert(key, at);
    }

    /// Returns the time left in the window for `key`, if a cooldown is active.
    #[must_use]
    pub fn remaining(&self, key: &CooldownKey, now: DateTime<Utc>, window: Duration) -> Option<Duration> {
        self.last(key).and_then(|last| remaining_in_window(last, now, window))
    }

    /// Atomically checks the window and, when clear, records `now`.
    pub fn try_acquire(&self, key: CooldownKey, now: DateTime<Utc>, window: Duration) -> CooldownCheck {
        let mut entries = self.entries.lock();

        if let Some(remaining) = entries
            .get(&key)
            .and_then(|last| remaining_in_window(*last, now, window))
        {
            return CooldownCheck::Active { remaining };
        }

        entries.insert(key, now);
        CooldownCheck::Acquired
    }

    /// Drops the entry for `key`, giving back a window whose alert never
    /// made it into the queue. Returns true if an entry was removed.
    pub fn release(&self, key: &CooldownKey) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Removes entries older than twice `window`. Returns how many were removed.
    ///
    /// A window too large to represent keeps every entry.
    pub fn prune(&self, now: DateTime<Utc>, window: Duration) -> usize {
        let Some(cutoff) = window
            .checked_mul(2)
            .and_then(|span| now.checked_sub_signed(span))
        else {
            return 0;
        };
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, last| *last >= cutoff);
        let removed = before - entries.len();

        if removed > 0 {
            debug!(removed, remaining = entries.len(), "pruned cooldown entries");
        }

        removed
    }

    /// Returns the number of tracked entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if no entries are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

fn remaining_in_window(last: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> Option<Duration> {
    let elapsed = now.signed_duration_since(last);
    (elapsed < window).then(|| window.checked_sub(&elapsed).unwrap_or(window))
}
