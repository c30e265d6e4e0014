//! Test helpers for E2E tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use flood_alerts::{AlertError, ChannelFuture, DeliveryOutcome, NotificationChannel, RenderedMessage};
use flood_core::{
    Clock, DetectionEvent, InMemoryTargetStore, ManualClock, MonitoredTarget, TargetId,
};
use flood_engine::{Collaborators, CycleOutcome, CycleReport, EngineConfig, Monitor, MonitorService};
use flood_metrics::MetricStore;
use flood_upstream::{EventSource, SourceFuture, UpstreamError};
use parking_lot::Mutex;

/// The address used by the reference scenarios.
pub const ADDR: &str = "203.0.113.5";

/// Installs a test subscriber once; `RUST_LOG` controls the output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Upstream double with a settable event set and failure mode.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    events: Mutex<Vec<DetectionEvent>>,
    fail_with: Mutex<Option<u16>>,
    fetches: AtomicUsize,
}

impl ScriptedSource {
    pub fn set_events(&self, events: Vec<DetectionEvent>) {
        *self.events.lock() = events;
    }

    /// Every call fails with `status` until [`ScriptedSource::recover`].
    pub fn fail_with(&self, status: u16) {
        *self.fail_with.lock() = Some(status);
    }

    pub fn recover(&self) {
        *self.fail_with.lock() = None;
    }

    /// Network calls made so far.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl EventSource for ScriptedSource {
    fn fetch_active_events(&self) -> SourceFuture<'_, Vec<DetectionEvent>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let result = match *self.fail_with.lock() {
            Some(code) => Err(UpstreamError::Status { code }),
            None => Ok(self.events.lock().clone()),
        };
        Box::pin(async move { result })
    }

    fn ping(&self) -> SourceFuture<'_, ()> {
        let result = match *self.fail_with.lock() {
            Some(code) => Err(UpstreamError::Status { code }),
            None => Ok(()),
        };
        Box::pin(async move { result })
    }
}

/// Channel double that can fail a number of times and delay each send.
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    failures_left: AtomicUsize,
    panics_left: AtomicUsize,
    attempts: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    delivered: Mutex<Vec<(String, RenderedMessage)>>,
}

impl ScriptedChannel {
    /// Fails the next `n` sends.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Panics inside the next `n` sends.
    pub fn panic_next(&self, n: usize) {
        self.panics_left.store(n, Ordering::SeqCst);
    }

    /// Makes every send take `delay`.
    pub fn slow(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<(String, RenderedMessage)> {
        self.delivered.lock().clone()
    }

    pub fn delivered_event_ids(&self) -> Vec<String> {
        self.delivered
            .lock()
            .iter()
            .map(|(_, m)| m.event_id.clone())
            .collect()
    }
}

impl NotificationChannel for ScriptedChannel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn send<'a>(&'a self, destination: &'a str, message: &'a RenderedMessage) -> ChannelFuture<'a> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let panicking = self
                .panics_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            assert!(!panicking, "scripted channel panic");

            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(AlertError::DeliveryFailed {
                    channel: "scripted".to_string(),
                    reason: "status 502".to_string(),
                });
            }

            self.delivered
                .lock()
                .push((destination.to_string(), message.clone()));
            Ok(())
        })
    }
}

/// Engine settings that keep tests fast: no retry sleeps, no jitter.
pub fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.upstream.url = "http://detect.test".to_string();
    config.upstream.max_retries = 0;
    config.dispatcher.send_spacing_ms = 100;
    config
}

/// A monitor wired to scripted collaborators on a manual clock.
pub struct Harness {
    pub clock: ManualClock,
    pub store: InMemoryTargetStore,
    pub source: Arc<ScriptedSource>,
    pub channel: Arc<ScriptedChannel>,
    pub metrics: Arc<MetricStore>,
    pub monitor: Monitor,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        init_tracing();
        let clock = ManualClock::new(Utc::now());
        let store = InMemoryTargetStore::with_clock(Arc::new(clock.clone()));
        let source = Arc::new(ScriptedSource::default());
        let channel = Arc::new(ScriptedChannel::default());
        let metrics = Arc::new(MetricStore::default());

        let deps = Collaborators::new(Arc::new(store.clone()), source.clone(), channel.clone())
            .with_metrics(metrics.clone())
            .with_clock(Arc::new(clock.clone()));

        Self {
            monitor: Monitor::new(config, deps),
            clock,
            store,
            source,
            channel,
            metrics,
        }
    }

    /// Adds an active target for tenant `acme` with a 5 minute cooldown.
    pub fn add_target(&self, address: &str) -> TargetId {
        let target = MonitoredTarget::new("acme", address, format!("https://hooks.test/{address}"))
            .unwrap()
            .with_policy(
                flood_core::AlertPolicy::default().with_cooldown(Duration::from_secs(300)),
            );
        self.store.add_target(target).unwrap()
    }

    pub fn target(&self, id: &TargetId) -> MonitoredTarget {
        self.store.target(id).unwrap()
    }

    /// A medium-severity event starting now.
    pub fn event(&self, id: &str, address: &str) -> DetectionEvent {
        DetectionEvent::new(id, address, self.clock.now()).with_peaks(2e9, 50_000.0)
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.clock.advance(by);
    }

    pub async fn cycle(&self) -> CycleReport {
        match self.monitor.run_check_cycle().await {
            CycleOutcome::Completed(report) => report,
            other => panic!("expected a completed cycle, got {other:?}"),
        }
    }

    /// Processes queued tasks until the queue is empty.
    pub async fn deliver_all(&self) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::new();
        while let Some(task) = self.monitor.queue().try_pop() {
            outcomes.push(self.monitor.dispatcher().process(task).await);
        }
        outcomes
    }
}

/// A running-service setup; the monitor lives inside the service.
pub struct ServiceHarness {
    pub clock: ManualClock,
    pub store: InMemoryTargetStore,
    pub source: Arc<ScriptedSource>,
    pub channel: Arc<ScriptedChannel>,
    pub service: MonitorService,
}

impl ServiceHarness {
    pub fn new(config: EngineConfig) -> Self {
        let Harness {
            clock,
            store,
            source,
            channel,
            monitor,
            ..
        } = Harness::with_config(config);

        Self {
            clock,
            store,
            source,
            channel,
            service: MonitorService::new(monitor),
        }
    }

    pub fn add_target(&self, address: &str) -> TargetId {
        let target = MonitoredTarget::new("acme", address, format!("https://hooks.test/{address}")).unwrap();
        self.store.add_target(target).unwrap()
    }

    pub fn event(&self, id: &str, address: &str) -> DetectionEvent {
        DetectionEvent::new(id, address, self.clock.now()).with_peaks(2e9, 50_000.0)
    }
}
