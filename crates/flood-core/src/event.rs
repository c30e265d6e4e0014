//! Detection events reported by the upstream service.

use std::collections::BTreeMap;
use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::severity::{Severity, SeverityBreakpoints};
use crate::target::parse_address;

/// Optional breakdown of where attack traffic came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceBreakdown {
    /// Share of traffic per source country code (0.0..=1.0).
    pub countries: BTreeMap<String, f64>,
    /// Most significant source networks or addresses.
    pub top_sources: Vec<String>,
}

/// A point-in-time upstream report of a disruption against an address.
///
/// Events are immutable once observed except for `ended_at`, which may go
/// from unset to set across repeated fetches of the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    /// Upstream-assigned opaque id.
    pub id: String,
    /// Address under attack, as reported upstream.
    #[serde(alias = "ip", alias = "target")]
    pub address: String,
    /// Classification label (for example `udp_flood`).
    #[serde(rename = "type", alias = "kind", default)]
    pub kind: String,
    /// When the event started.
    #[serde(alias = "start_time", alias = "startTime")]
    pub started_at: DateTime<Utc>,
    /// When the event ended, if it has.
    #[serde(default, alias = "end_time", alias = "endTime")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Peak throughput in bits per second.
    #[serde(default, alias = "peakBps")]
    pub peak_bps: f64,
    /// Peak rate in packets per second.
    #[serde(default, alias = "peakPps")]
    pub peak_pps: f64,
    /// Optional geographic or source breakdown.
    #[serde(default)]
    pub sources: Option<SourceBreakdown>,
}

impl DetectionEvent {
    /// Creates an event with zero peaks.
    #[must_use]
    pub fn new(id: impl Into<String>, address: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            kind: String::new(),
            started_at,
            ended_at: None,
            peak_bps: 0.0,
            peak_pps: 0.0,
            sources: None,
        }
    }

    /// Sets the peaks.
    #[must_use]
    pub const fn with_peaks(mut self, peak_bps: f64, peak_pps: f64) -> Self {
        self.peak_bps = peak_bps;
        self.peak_pps = peak_pps;
        self
    }

    /// Sets the classification label.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Sets the end time.
    #[must_use]
    pub const fn with_end(mut self, ended_at: DateTime<Utc>) -> Self {
        self.ended_at = Some(ended_at);
        self
    }

    /// Sets the source breakdown.
    #[must_use]
    pub fn with_sources(mut self, sources: SourceBreakdown) -> Self {
        self.sources = Some(sources);
        self
    }

    /// Returns the parsed address, or `None` if upstream sent garbage.
    #[must_use]
    pub fn ip(&self) -> Option<IpAddr> {
        parse_address(&self.address).ok()
    }

    /// Returns true while the event has no end time.
    #[must_use]
    pub const fn is_ongoing(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Returns how long ago the event started.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.started_at)
    }

    /// Returns the event duration so far (or in total if it ended).
    #[must_use]
    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        self.ended_at
            .unwrap_or(now)
            .signed_duration_since(self.started_at)
    }

    /// Classifies the event.
    #[must_use]
    pub fn severity(&self, breakpoints: &SeverityBreakpoints) -> Severity {
        breakpoints.classify(self.peak_bps, self.peak_pps)
    }

    /// Folds a later observation of the same event into this one.
    ///
    /// Only the end time may change. Returns true if it did.
    pub fn observe(&mut self, later: &Self) -> bool {
        if self.id != later.id || self.ended_at.is_some() {
            return false;
        }
        match later.ended_at {
            Some(ended_at) => {
                self.ended_at = Some(ended_at);
                true
            }
            None => false,
        }
    }
}
