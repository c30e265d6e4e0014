//! In-memory metric storage with retention.
//!
//! [`MetricStore`] keeps timestamp-ordered points per metric name. Expiry is
//! explicit: the engine's maintenance task calls [`MetricStore::expire_before`]
//! with its retention cutoff.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{MetricsError, Result};
use crate::types::{Aggregation, MetricName, MetricPoint};

/// Thread-safe in-memory storage for metrics.
#[derive(Debug, Clone)]
pub struct MetricStore {
    /// The retention duration for metrics (in milliseconds).
    retention_millis: i64,
    /// Series keyed by metric name.
    data: Arc<RwLock<HashMap<MetricName, Vec<MetricPoint>>>>,
}

impl MetricStore {
    /// Creates a new metric store with the given retention duration.
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            retention_millis: i64::try_from(retention.as_millis()).unwrap_or(i64::MAX),
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the retention duration in milliseconds.
    #[must_use]
    pub const fn retention_millis(&self) -> i64 {
        self.retention_millis
    }

    /// Pushes a new metric point, keeping the series in timestamp order.
    #[allow(clippy::significant_drop_tightening)] // Lock needed for multi-step atomic operation
    pub fn push(&self, name: &MetricName, point: MetricPoint) {
        let mut data = self.data.write();
        let points = data.entry(name.clone()).or_default();

        let insert_pos = points
            .binary_search_by_key(&point.timestamp, |p| p.timestamp)
            .map_or_else(|pos| pos, |pos| pos + 1);
        points.insert(insert_pos, point);
    }

    /// Returns every retained point of a metric matching the tag filters.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::MetricNotFound` if the metric doesn't exist.
    pub fn query(&self, name: &MetricName, filters: &[(&str, &str)]) -> Result<Vec<MetricPoint>> {
        let data = self.data.read();
        let points = data.get(name).ok_or_else(|| MetricsError::MetricNotFound {
            name: name.to_string(),
        })?;

        Ok(points.iter().filter(|p| p.matches(filters)).cloned().collect())
    }

    /// Aggregates every retained point of a metric matching the tag filters.
    ///
    /// Returns `None` when the metric is unknown or no point matches.
    #[must_use]
    pub fn aggregate(
        &self,
        name: &str,
        filters: &[(&str, &str)],
        aggregation: Aggregation,
    ) -> Option<f64> {
        let name = MetricName::new(name).ok()?;
        let values: Vec<f64> = self
            .query(&name, filters)
            .ok()?
            .into_iter()
            .map(|p| p.value)
            .collect();
        aggregation.apply(&values)
    }

    /// Sum of a counter's retained increments.
    #[must_use]
    pub fn total(&self, name: &str) -> f64 {
        self.aggregate(name, &[], Aggregation::Sum).unwrap_or(0.0)
    }

    /// Most recent value of a gauge.
    #[must_use]
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.aggregate(name, &[], Aggregation::Last)
    }

    /// Returns a list of all metric names in the store.
    #[must_use]
    pub fn metrics_list(&self) -> Vec<MetricName> {
        let data = self.data.read();
        let mut names: Vec<MetricName> = data.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of data points for a given metric.
    #[must_use]
    pub fn metric_count(&self, name: &MetricName) -> usize {
        let data = self.data.read();
        data.get(name).map_or(0, Vec::len)
    }

    /// Returns the number of data points across all metrics.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.data.read().values().map(Vec::len).sum()
    }

    /// Clears all metrics from the store.
    pub fn clear(&self) {
        self.data.write().clear();
    }

    /// Drops points older than `cutoff_millis`. Returns how many were dropped.
    pub fn expire_before(&self, cutoff_millis: i64) -> usize {
        let mut data = self.data.write();
        let mut removed = 0;

        for points in data.values_mut() {
            // Points are timestamp-ordered, so expired ones form a prefix.
            let keep_from = points.partition_point(|p| p.timestamp < cutoff_millis);
            removed += keep_from;
            points.drain(..keep_from);
        }

        data.retain(|_, v| !v.is_empty());

        if removed > 0 {
            debug!(removed, "expired metric points");
        }

        removed
    }

    /// Drops points older than the store's retention relative to `now_millis`.
    pub fn expire(&self, now_millis: i64) -> usize {
        self.expire_before(now_millis.saturating_sub(self.retention_millis))
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        // Default retention of 24 hours
        Self::new(Duration::from_secs(24 * 3600))
    }
}
