//! Core metric types.
//!
//! - [`MetricPoint`]: a single measurement with timestamp, value and tags
//! - [`MetricName`]: a validated metric name
//! - [`Aggregation`]: how to fold a series into one value

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, Result};

/// A single metric data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
    /// The measured value.
    pub value: f64,
    /// Dimensional tags (e.g. `tenant`, `reason`).
    pub tags: BTreeMap<String, String>,
}

impl MetricPoint {
    /// Creates a new metric point with the given timestamp and value.
    #[must_use]
    pub const fn new(timestamp: i64, value: f64) -> Self {
        Self {
            timestamp,
            value,
            tags: BTreeMap::new(),
        }
    }

    /// Adds a tag and returns self for chaining.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Adds every tag in `tags`.
    #[must_use]
    pub fn tags(mut self, tags: &[(&str, &str)]) -> Self {
        for (key, value) in tags {
            self.tags.insert((*key).to_string(), (*value).to_string());
        }
        self
    }

    /// Returns true if every `(key, value)` filter matches this point's tags.
    #[must_use]
    pub fn matches(&self, filters: &[(&str, &str)]) -> bool {
        filters
            .iter()
            .all(|(k, v)| self.tags.get(*k).is_some_and(|tag| tag == v))
    }

    /// Returns the current timestamp in milliseconds.
    #[must_use]
    pub fn now_timestamp() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Creates a new metric point with the current timestamp.
    #[must_use]
    pub fn now(value: f64) -> Self {
        Self::new(Self::now_timestamp(), value)
    }
}

/// A validated metric name.
///
/// Metric names must:
/// - Be non-empty
/// - Contain only alphanumeric characters, underscores, and colons
/// - Start with a letter or underscore
/// - Be at most 256 characters long
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricName(String);

impl MetricName {
    /// Maximum allowed length for a metric name.
    pub const MAX_LENGTH: usize = 256;

    /// Creates a new validated metric name.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidMetricName` if the name is invalid.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();

        if name.is_empty() {
            return Err(MetricsError::InvalidMetricName {
                reason: "metric name cannot be empty".to_string(),
            });
        }

        if name.len() > Self::MAX_LENGTH {
            return Err(MetricsError::InvalidMetricName {
                reason: format!(
                    "metric name exceeds maximum length of {} characters",
                    Self::MAX_LENGTH
                ),
            });
        }

        if let Some(c) = name.chars().next() {
            if !c.is_ascii_alphabetic() && c != '_' {
                return Err(MetricsError::InvalidMetricName {
                    reason: "metric name must start with a letter or underscore".to_string(),
                });
            }
        }

        if let Some(c) = name
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '_' && *c != ':')
        {
            return Err(MetricsError::InvalidMetricName {
                reason: format!("invalid character '{c}' in metric name"),
            });
        }

        Ok(Self(name))
    }

    /// Returns the metric name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MetricName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for MetricName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Aggregation functions over a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregation {
    /// Sum of all values.
    Sum,
    /// Maximum value.
    Max,
    /// Last (most recent) value.
    Last,
    /// Count of data points.
    Count,
}

impl Aggregation {
    /// Applies this aggregation to a slice of values.
    ///
    /// Returns `None` if the slice is empty.
    #[must_use]
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }

        match self {
            Self::Sum => Some(values.iter().sum()),
            Self::Max => values.iter().copied().reduce(f64::max),
            Self::Last => values.last().copied(),
            Self::Count => Some(values.len() as f64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod metric_point_tests {
        use super::*;

        #[test]
        fn tag_chaining() {
            let point = MetricPoint::new(1000, 1.0)
                .tag("tenant", "acme")
                .tags(&[("reason", "cooldown")]);

            assert_eq!(point.tags.get("tenant").map(String::as_str), Some("acme"));
            assert_eq!(point.tags.get("reason").map(String::as_str), Some("cooldown"));
        }

        #[test]
        fn matches_filters() {
            let point = MetricPoint::new(1000, 1.0).tag("reason", "stale");

            assert!(point.matches(&[]));
            assert!(point.matches(&[("reason", "stale")]));
            assert!(!point.matches(&[("reason", "cooldown")]));
            assert!(!point.matches(&[("tenant", "acme")]));
        }

        #[test]
        fn now_returns_reasonable_timestamp() {
            let before = MetricPoint::now_timestamp();
            let point = MetricPoint::now(100.0);
            let after = MetricPoint::now_timestamp();

            assert!(point.timestamp >= before);
            assert!(point.timestamp <= after);
        }
    }

    mod metric_name_tests {
        use super::*;
        use test_case::test_case;

        #[test_case("floodwatch_checks_total" ; "snake case")]
        #[test_case("floodwatch:alerts:sent" ; "colons")]
        #[test_case("_internal" ; "leading underscore")]
        fn valid_names(name: &str) {
            assert_eq!(MetricName::new(name).unwrap().as_str(), name);
        }

        #[test_case("" , "empty" ; "empty")]
        #[test_case("0_checks", "start with" ; "leading digit")]
        #[test_case("alerts-sent", "invalid character" ; "dash")]
        #[test_case("alerts.sent", "invalid character" ; "dot")]
        fn invalid_names(name: &str, expected: &str) {
            match MetricName::new(name) {
                Err(MetricsError::InvalidMetricName { reason }) => {
                    assert!(reason.contains(expected), "{reason}");
                }
                other => panic!("expected InvalidMetricName, got {other:?}"),
            }
        }

        #[test]
        fn too_long_name_fails() {
            let long_name = "a".repeat(MetricName::MAX_LENGTH + 1);
            assert!(MetricName::new(long_name).is_err());
            assert!(MetricName::new("a".repeat(MetricName::MAX_LENGTH)).is_ok());
        }
    }

    mod aggregation_tests {
        use super::*;

        #[test]
        fn aggregations() {
            let values = [1.0, 5.0, 3.0];
            assert_eq!(Aggregation::Sum.apply(&values), Some(9.0));
            assert_eq!(Aggregation::Max.apply(&values), Some(5.0));
            assert_eq!(Aggregation::Last.apply(&values), Some(3.0));
            assert_eq!(Aggregation::Count.apply(&values), Some(3.0));
        }

        #[test]
        fn empty_slice_is_none() {
            assert!(Aggregation::Sum.apply(&[]).is_none());
        }
    }
}
