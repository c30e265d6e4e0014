//! Plain message rendering.
//!
//! Rich presentation belongs to the channels' consumers; this produces a
//! neutral title, body and key/value fields every channel can use.

use chrono::{DateTime, Utc};
use flood_core::Severity;
use serde::{Deserialize, Serialize};

use crate::task::AlertTask;

/// A channel-neutral alert message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedMessage {
    /// One-line summary.
    pub title: String,
    /// Multi-line description.
    pub body: String,
    /// Severity tier.
    pub severity: Severity,
    /// Structured details in display order.
    pub fields: Vec<(String, String)>,
    /// Owning tenant.
    pub tenant: String,
    /// Upstream event id.
    pub event_id: String,
    /// True for operator test alerts.
    pub test: bool,
    /// When the message was rendered.
    pub rendered_at: DateTime<Utc>,
}

impl RenderedMessage {
    /// Renders a task.
    #[must_use]
    pub fn from_task(task: &AlertTask, now: DateTime<Utc>) -> Self {
        let target = &task.target;
        let event = &task.event;
        let name = target.display_name();

        if task.synthetic {
            return Self {
                title: format!("Test alert for {name}"),
                body: format!(
                    "This is a test notification for {} ({}). No attack is in progress.",
                    name, target.address
                ),
                severity: task.severity,
                fields: vec![("Address".to_string(), target.address.to_string())],
                tenant: target.tenant_id.to_string(),
                event_id: event.id.clone(),
                test: true,
                rendered_at: now,
            };
        }

        let kind = if event.kind.is_empty() {
            "attack"
        } else {
            event.kind.as_str()
        };
        let status = if event.is_ongoing() { "ongoing" } else { "ended" };

        let mut fields = vec![
            ("Address".to_string(), target.address.to_string()),
            ("Type".to_string(), kind.to_string()),
            ("Severity".to_string(), task.severity.to_string()),
            ("Peak throughput".to_string(), format_bps(event.peak_bps)),
            ("Peak rate".to_string(), format_pps(event.peak_pps)),
            ("Started".to_string(), event.started_at.to_rfc3339()),
            ("Status".to_string(), status.to_string()),
        ];
        if let Some(ended) = event.ended_at {
            fields.push(("Ended".to_string(), ended.to_rfc3339()));
        }
        if let Some(sources) = &event.sources {
            if !sources.top_sources.is_empty() {
                fields.push(("Top sources".to_string(), sources.top_sources.join(", ")));
            }
        }

        Self {
            title: format!("[{}] {} detected on {}", task.severity.as_str().to_uppercase(), kind, name),
            body: format!(
                "{} against {} peaked at {} / {}, {} for {}.",
                kind,
                target.address,
                format_bps(event.peak_bps),
                format_pps(event.peak_pps),
                status,
                format_duration(event.duration(now)),
            ),
            severity: task.severity,
            fields,
            tenant: target.tenant_id.to_string(),
            event_id: event.id.clone(),
            test: false,
            rendered_at: now,
        }
    }

    /// Title and fields as plain text, one field per line.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut text = self.title.clone();
        for (key, value) in &self.fields {
            text.push('\n');
            text.push_str(key);
            text.push_str(": ");
            text.push_str(value);
        }
        text
    }
}

fn scaled(value: f64, unit: &str) -> String {
    const PREFIXES: [(f64, &str); 4] = [(1e12, "T"), (1e9, "G"), (1e6, "M"), (1e3, "K")];

    PREFIXES
        .iter()
        .find(|(factor, _)| value >= *factor)
        .map_or_else(
            || format!("{value:.0} {unit}"),
            |(factor, prefix)| format!("{:.2} {prefix}{unit}", value / factor),
        )
}

/// Formats bits per second with a decimal prefix.
#[must_use]
pub fn format_bps(bps: f64) -> String {
    scaled(bps, "bps")
}

/// Formats packets per second with a decimal prefix.
#[must_use]
pub fn format_pps(pps: f64) -> String {
    scaled(pps, "pps")
}

/// Formats a duration as `1h 2m 3s`, dropping leading zero units.
#[must_use]
pub fn format_duration(duration: chrono::Duration) -> String {
    let total = duration.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    match (hours, minutes) {
        (0, 0) => format!("{seconds}s"),
        (0, _) => format!("{minutes}m {seconds}s"),
        _ => format!("{hours}h {minutes}m {seconds}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flood_core::{DetectionEvent, MonitoredTarget, SourceBreakdown};
    use test_case::test_case;

    #[test_case(0.0, "0 bps" ; "zero")]
    #[test_case(950.0, "950 bps" ; "below kilo")]
    #[test_case(2e9, "2.00 Gbps" ; "gigabits")]
    #[test_case(1.5e6, "1.50 Mbps" ; "megabits")]
    #[test_case(3.2e12, "3.20 Tbps" ; "terabits")]
    fn bps_units(value: f64, expected: &str) {
        assert_eq!(format_bps(value), expected);
    }

    #[test]
    fn pps_units() {
        assert_eq!(format_pps(50_000.0), "50.00 Kpps");
    }

    #[test_case(45, "45s" ; "seconds")]
    #[test_case(125, "2m 5s" ; "minutes")]
    #[test_case(3723, "1h 2m 3s" ; "hours")]
    #[test_case(-5, "0s" ; "negative clamps")]
    fn durations(seconds: i64, expected: &str) {
        assert_eq!(format_duration(chrono::Duration::seconds(seconds)), expected);
    }

    #[test]
    fn renders_real_alert() {
        let now = Utc::now();
        let target = MonitoredTarget::new("acme", "203.0.113.5", "log:ops")
            .unwrap()
            .with_alias("edge-1");
        let event = DetectionEvent::new("evt-1", "203.0.113.5", now - chrono::Duration::seconds(90))
            .with_peaks(2e9, 50_000.0)
            .with_kind("udp_flood")
            .with_sources(SourceBreakdown {
                top_sources: vec!["198.51.100.0/24".into()],
                ..SourceBreakdown::default()
            });
        let task = AlertTask::new(target, event, Severity::Medium, now);

        let message = RenderedMessage::from_task(&task, now);

        assert_eq!(message.title, "[MEDIUM] udp_flood detected on edge-1");
        assert!(message.body.contains("2.00 Gbps / 50.00 Kpps"));
        assert!(message.body.contains("ongoing for 1m 30s"));
        assert_eq!(message.event_id, "evt-1");
        assert!(!message.test);
        assert!(message.to_text().contains("Top sources: 198.51.100.0/24"));
    }

    #[test]
    fn renders_test_alert() {
        let now = Utc::now();
        let target = MonitoredTarget::new("acme", "203.0.113.5", "log:ops").unwrap();
        let message = RenderedMessage::from_task(&AlertTask::synthetic(target, now), now);

        assert!(message.test);
        assert_eq!(message.title, "Test alert for 203.0.113.5");
    }
}
