//! Pairing fetched events with monitored targets.
//!
//! Correlation is pure: no I/O, no clock, no logging. For every active
//! target it picks the single most relevant event for the target's address,
//! the one with the latest start time, breaking ties on the lexicographically
//! greatest event id so repeated runs over the same input agree.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::net::IpAddr;

use crate::event::DetectionEvent;
use crate::target::MonitoredTarget;

/// A target paired with its candidate event for this cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correlation<'a> {
    /// The target.
    pub target: &'a MonitoredTarget,
    /// The newest event against the target's address.
    pub event: &'a DetectionEvent,
}

/// Orders events by relevance: later start first wins, then greater id.
#[must_use]
pub fn relevance(a: &DetectionEvent, b: &DetectionEvent) -> Ordering {
    a.started_at
        .cmp(&b.started_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Returns the most relevant event of a set, if any.
#[must_use]
pub fn latest_event<'a, I>(events: I) -> Option<&'a DetectionEvent>
where
    I: IntoIterator<Item = &'a DetectionEvent>,
{
    events.into_iter().max_by(|a, b| relevance(a, b))
}

/// Indexes events by parsed address, keeping only the most relevant per address.
///
/// Events whose address does not parse are dropped.
#[must_use]
pub fn index_latest(events: &[DetectionEvent]) -> HashMap<IpAddr, &DetectionEvent> {
    let mut latest: HashMap<IpAddr, &DetectionEvent> = HashMap::with_capacity(events.len());

    for event in events {
        let Some(ip) = event.ip() else {
            continue;
        };
        latest
            .entry(ip)
            .and_modify(|current| {
                if relevance(event, current) == Ordering::Greater {
                    *current = event;
                }
            })
            .or_insert(event);
    }

    latest
}

/// Pairs each active target with its candidate event.
///
/// Targets with no matching event are omitted. Output order follows the
/// order of `targets`.
#[must_use]
pub fn correlate<'a>(
    targets: &'a [MonitoredTarget],
    events: &'a [DetectionEvent],
) -> Vec<Correlation<'a>> {
    if targets.is_empty() || events.is_empty() {
        return Vec::new();
    }

    let latest = index_latest(events);

    targets
        .iter()
        .filter(|target| target.active)
        .filter_map(|target| {
            latest
                .get(&target.address)
                .copied()
                .map(|event| Correlation { target, event })
        })
        .collect()
}
