//! The metrics sink boundary.
//!
//! The engine emits counters and gauges through [`MetricsSink`]; where they
//! end up is the host application's business. Recording a metric never fails
//! from the caller's point of view.

use std::fmt;

use tracing::debug;

use crate::storage::MetricStore;
use crate::types::{MetricName, MetricPoint};

/// Receives counters and gauges.
pub trait MetricsSink: Send + Sync + fmt::Debug {
    /// Adds `delta` to a counter.
    fn counter(&self, name: &str, delta: f64, tags: &[(&str, &str)]);

    /// Sets a gauge.
    fn gauge(&self, name: &str, value: f64, tags: &[(&str, &str)]);

    /// Adds one to a counter.
    fn increment(&self, name: &str, tags: &[(&str, &str)]) {
        self.counter(name, 1.0, tags);
    }

    /// Drops whatever the sink retains past its retention window.
    ///
    /// Returns how many points were dropped. Sinks that keep nothing return 0.
    fn apply_retention(&self, _now_millis: i64) -> usize {
        0
    }
}

/// A sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn counter(&self, _name: &str, _delta: f64, _tags: &[(&str, &str)]) {}

    fn gauge(&self, _name: &str, _value: f64, _tags: &[(&str, &str)]) {}
}

impl MetricStore {
    fn record_point(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        match MetricName::new(name) {
            Ok(metric) => self.push(&metric, MetricPoint::now(value).tags(tags)),
            Err(e) => debug!(metric = %name, error = %e, "dropping metric with invalid name"),
        }
    }
}

impl MetricsSink for MetricStore {
    fn counter(&self, name: &str, delta: f64, tags: &[(&str, &str)]) {
        self.record_point(name, delta, tags);
    }

    fn gauge(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        self.record_point(name, value, tags);
    }

    fn apply_retention(&self, now_millis: i64) -> usize {
        self.expire(now_millis)
    }
}
