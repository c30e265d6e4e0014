//! The monitoring engine.
//!
//! A [`Monitor`] owns the in-memory state of the engine (breaker, cooldowns,
//! alert queue) and exposes the three scheduled operations:
//!
//! - [`Monitor::run_check_cycle`]: load targets, fetch events once, correlate,
//!   decide and enqueue, evaluating targets in bounded concurrent batches;
//! - [`Monitor::run_maintenance`]: prune cooldowns, apply retention, give the
//!   breaker its half-open chance;
//! - [`Monitor::run_health_probe`]: ping the upstream service and the store.
//!
//! None of them return errors: every failure is logged, counted and turned
//! into an outcome value, so a scheduler can fire them forever.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use flood_alerts::{AlertError, AlertQueue, AlertTask, Dispatcher, NotificationChannel};
use flood_core::{
    CooldownTracker, Decision, DecisionEngine, DetectionEvent, MonitoredTarget, Severity,
    SharedClock, TargetId, TargetStore, TenantId, correlate, system_clock,
};
use flood_metrics::{MetricsSink, NoopSink, names};
use flood_upstream::{CircuitBreaker, EventSource, UpstreamClient};
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::health::{ComponentHealth, HealthReport};
use crate::stats::{Counters, EngineStats};

/// The external collaborators a monitor runs against.
#[derive(Debug, Clone)]
pub struct Collaborators {
    /// Durable target storage.
    pub store: Arc<dyn TargetStore>,
    /// Upstream detection service.
    pub source: Arc<dyn EventSource>,
    /// Where alerts are delivered.
    pub channel: Arc<dyn NotificationChannel>,
    /// Where metrics go.
    pub metrics: Arc<dyn MetricsSink>,
    /// Time source.
    pub clock: SharedClock,
}

impl Collaborators {
    /// Collaborators with no metrics, on the system clock.
    #[must_use]
    pub fn new(
        store: Arc<dyn TargetStore>,
        source: Arc<dyn EventSource>,
        channel: Arc<dyn NotificationChannel>,
    ) -> Self {
        Self {
            store,
            source,
            channel,
            metrics: Arc::new(NoopSink),
            clock: system_clock(),
        }
    }

    /// Sets the metrics sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Sets the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }
}

/// Counts for one completed check cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Active targets loaded.
    pub targets: usize,
    /// Events fetched.
    pub events: usize,
    /// Targets with a candidate event.
    pub candidates: usize,
    /// Alerts enqueued.
    pub enqueued: usize,
    /// Candidates rejected by the decision policy.
    pub rejected: usize,
    /// Targets whose evaluation failed.
    pub errors: usize,
    /// Accepted alerts dropped because the queue was already closed.
    pub abandoned: usize,
}

/// How a check cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The cycle ran to completion.
    Completed(CycleReport),
    /// Another cycle was still in flight.
    Skipped,
    /// The breaker was open; nothing was fetched.
    ShortCircuited,
    /// Targets or events could not be loaded.
    Failed {
        /// What went wrong.
        reason: String,
    },
}

/// What one maintenance pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    /// Cooldown entries removed.
    pub cooldowns_pruned: usize,
    /// History rows removed, `None` if the store failed.
    pub history_pruned: Option<usize>,
    /// Metric points expired.
    pub metric_points_expired: usize,
    /// Whether the breaker moved to half-open.
    pub breaker_half_opened: bool,
}

enum Evaluation {
    Enqueued,
    Rejected,
    Abandoned,
}

/// Marks a cycle in flight; cleared on drop, including during unwinding.
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The monitoring and alert-decision engine.
#[derive(Debug)]
pub struct Monitor {
    config: EngineConfig,
    store: Arc<dyn TargetStore>,
    upstream: UpstreamClient,
    decisions: DecisionEngine,
    queue: Arc<AlertQueue>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<dyn MetricsSink>,
    clock: SharedClock,
    cycle_in_flight: AtomicBool,
    running: AtomicBool,
    counters: Counters,
    last_check_at: RwLock<Option<DateTime<Utc>>>,
    last_health: RwLock<Option<HealthReport>>,
}

impl Monitor {
    /// Wires a monitor from configuration and collaborators.
    #[must_use]
    pub fn new(config: EngineConfig, deps: Collaborators) -> Self {
        let breaker = Arc::new(CircuitBreaker::with_clock(
            config.breaker_config(),
            deps.clock.clone(),
        ));
        let upstream = UpstreamClient::new(deps.source, breaker, config.retry_policy());
        let decisions = DecisionEngine::new(
            config.decision_policy(),
            Arc::new(CooldownTracker::new()),
            deps.clock.clone(),
        );
        let queue = Arc::new(AlertQueue::new());
        let dispatcher = Arc::new(
            Dispatcher::new(
                queue.clone(),
                deps.channel,
                deps.store.clone(),
                deps.metrics.clone(),
                config.dispatcher_config(),
            )
            .with_clock(deps.clock.clone()),
        );

        Self {
            config,
            store: deps.store,
            upstream,
            decisions,
            queue,
            dispatcher,
            metrics: deps.metrics,
            clock: deps.clock,
            cycle_in_flight: AtomicBool::new(false),
            running: AtomicBool::new(false),
            counters: Counters::default(),
            last_check_at: RwLock::new(None),
            last_health: RwLock::new(None),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the alert queue.
    #[must_use]
    pub const fn queue(&self) -> &Arc<AlertQueue> {
        &self.queue
    }

    /// Returns the dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Returns the upstream client.
    #[must_use]
    pub const fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    /// Returns the decision engine.
    #[must_use]
    pub const fn decisions(&self) -> &DecisionEngine {
        &self.decisions
    }

    /// Returns true while a check cycle is in flight.
    #[must_use]
    pub fn is_cycle_in_flight(&self) -> bool {
        self.cycle_in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn record_task_failure(&self, job: &'static str) {
        Counters::bump(&self.counters.errors);
        self.metrics
            .increment(names::TASK_FAILURES_TOTAL, &[("job", job)]);
    }

    /// Runs one check cycle over every active target.
    pub async fn run_check_cycle(&self) -> CycleOutcome {
        self.run_cycle(None).await
    }

    /// Runs one check cycle over a single tenant's active targets.
    pub async fn run_check_cycle_for(&self, tenant: &TenantId) -> CycleOutcome {
        self.run_cycle(Some(tenant)).await
    }

    async fn run_cycle(&self, tenant: Option<&TenantId>) -> CycleOutcome {
        let Some(_guard) = CycleGuard::acquire(&self.cycle_in_flight) else {
            Counters::bump(&self.counters.skipped_cycles);
            self.metrics.increment(names::CHECKS_SKIPPED_TOTAL, &[]);
            info!("previous check cycle still running, skipping");
            return CycleOutcome::Skipped;
        };

        let started = Instant::now();
        Counters::bump(&self.counters.total_checks);
        self.metrics.increment(names::CHECKS_TOTAL, &[]);
        *self.last_check_at.write() = Some(self.clock.now());

        let targets = match self.store.list_active_targets(tenant).await {
            Ok(targets) => targets,
            Err(e) => {
                Counters::bump(&self.counters.errors);
                warn!(error = %e, "failed to load active targets");
                return CycleOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };
        if targets.is_empty() {
            debug!("no active targets");
            return CycleOutcome::Completed(CycleReport::default());
        }

        let events = match self.upstream.fetch_events().await {
            Ok(events) => events,
            Err(e) if e.is_breaker_open() => {
                Counters::bump(&self.counters.short_circuited);
                self.metrics
                    .increment(names::BREAKER_SHORT_CIRCUITS_TOTAL, &[]);
                debug!(error = %e, "check cycle skipped, circuit breaker open");
                return CycleOutcome::ShortCircuited;
            }
            Err(e) => {
                Counters::bump(&self.counters.errors);
                self.metrics.increment(
                    names::UPSTREAM_FAILURES_TOTAL,
                    &[("retryable", if e.is_retryable() { "true" } else { "false" })],
                );
                return CycleOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };
        self.metrics
            .gauge(names::EVENTS_FETCHED, events.len() as f64, &[]);

        let pairs = correlate(&targets, &events);
        let mut report = CycleReport {
            targets: targets.len(),
            events: events.len(),
            candidates: pairs.len(),
            ..CycleReport::default()
        };

        let concurrency = self.config.alerts.batch_concurrency.max(1);
        for batch in pairs.chunks(concurrency) {
            let results = join_all(
                batch
                    .iter()
                    .map(|pair| self.evaluate(pair.target, pair.event)),
            )
            .await;

            for (pair, result) in batch.iter().zip(results) {
                match result {
                    Ok(Evaluation::Enqueued) => report.enqueued += 1,
                    Ok(Evaluation::Rejected) => report.rejected += 1,
                    Ok(Evaluation::Abandoned) => report.abandoned += 1,
                    Err(e) => {
                        report.errors += 1;
                        Counters::bump(&self.counters.errors);
                        self.metrics.increment(
                            names::TARGET_ERRORS_TOTAL,
                            &[("tenant", pair.target.tenant_id.as_str())],
                        );
                        warn!(
                            target_id = %pair.target.id,
                            address = %pair.target.address,
                            event_id = %pair.event.id,
                            error = %e,
                            "target evaluation failed"
                        );
                    }
                }
            }
        }

        let elapsed = started.elapsed();
        self.metrics
            .gauge(names::CHECK_DURATION_MS, elapsed.as_millis() as f64, &[]);
        self.metrics
            .gauge(names::QUEUE_DEPTH, self.queue.len() as f64, &[]);
        info!(
            targets = report.targets,
            events = report.events,
            candidates = report.candidates,
            enqueued = report.enqueued,
            rejected = report.rejected,
            errors = report.errors,
            duration_ms = elapsed.as_millis() as u64,
            "check cycle complete"
        );

        CycleOutcome::Completed(report)
    }

    async fn evaluate(&self, target: &MonitoredTarget, event: &DetectionEvent) -> Result<Evaluation> {
        self.store.record_event(&target.id, event).await?;

        match self.decisions.evaluate(target, event) {
            Decision::Accept { severity } => self.enqueue(target, event, severity),
            Decision::Reject(reason) => {
                self.metrics.increment(
                    names::REJECTIONS_TOTAL,
                    &[("reason", reason.as_str())],
                );
                debug!(
                    target_id = %target.id,
                    event_id = %event.id,
                    reason = %reason,
                    "candidate rejected"
                );
                Ok(Evaluation::Rejected)
            }
        }
    }

    fn enqueue(
        &self,
        target: &MonitoredTarget,
        event: &DetectionEvent,
        severity: Severity,
    ) -> Result<Evaluation> {
        let task = AlertTask::new(target.clone(), event.clone(), severity, self.clock.now());
        let task_id = task.id;
        match self.queue.push(task) {
            Ok(()) => {}
            Err(AlertError::QueueClosed) => {
                // Nothing will deliver it, so the window goes back.
                self.decisions.cooldowns().release(&target.cooldown_key());
                Counters::bump(&self.counters.alerts_abandoned);
                self.metrics.counter(
                    names::ALERTS_ABANDONED_TOTAL,
                    1.0,
                    &[("tenant", target.tenant_id.as_str())],
                );
                error!(
                    task_id = %task_id,
                    target_id = %target.id,
                    event_id = %event.id,
                    "alert abandoned, queue closed"
                );
                return Ok(Evaluation::Abandoned);
            }
            Err(e) => return Err(e.into()),
        }

        Counters::bump(&self.counters.alerts_enqueued);
        self.metrics.increment(
            names::ALERTS_ENQUEUED_TOTAL,
            &[("severity", severity.as_str())],
        );
        info!(
            task_id = %task_id,
            target_id = %target.id,
            address = %target.address,
            event_id = %event.id,
            severity = %severity,
            "alert enqueued"
        );
        Ok(Evaluation::Enqueued)
    }

    /// Runs housekeeping.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let now = self.clock.now();

        let window = self.cooldown_prune_window().await;
        let cooldowns_pruned = self.decisions.cooldowns().prune(now, window);
        if cooldowns_pruned > 0 {
            self.metrics.counter(
                names::COOLDOWNS_PRUNED_TOTAL,
                cooldowns_pruned as f64,
                &[],
            );
        }

        let history_pruned = match now.checked_sub_signed(self.config.retention.history()) {
            Some(cutoff) => match self.store.prune_history(cutoff).await {
                Ok(removed) => Some(removed),
                Err(e) => {
                    Counters::bump(&self.counters.errors);
                    warn!(error = %e, "history retention failed");
                    None
                }
            },
            // Retention reaches back past the earliest representable time.
            None => Some(0),
        };

        // Metric points carry wall-clock timestamps.
        let metric_points_expired = self.metrics.apply_retention(Utc::now().timestamp_millis());

        let breaker_half_opened = self.upstream.breaker().half_open_if_elapsed();
        if breaker_half_opened {
            self.metrics
                .increment(names::BREAKER_TRANSITIONS_TOTAL, &[("state", "half_open")]);
        }

        let report = MaintenanceReport {
            cooldowns_pruned,
            history_pruned,
            metric_points_expired,
            breaker_half_opened,
        };
        info!(
            cooldowns_pruned,
            history_pruned = ?history_pruned,
            metric_points_expired,
            breaker_half_opened,
            active_cooldowns = self.decisions.cooldowns().len(),
            "maintenance complete"
        );
        report
    }

    /// The widest cooldown window among active targets.
    async fn cooldown_prune_window(&self) -> chrono::Duration {
        let default = self.decisions.policy().default_cooldown;
        match self.store.list_active_targets(None).await {
            Ok(targets) => targets
                .iter()
                .map(|t| t.policy.cooldown_or(default))
                .fold(default, std::cmp::max),
            Err(e) => {
                debug!(error = %e, "using default cooldown window for pruning");
                default
            }
        }
    }

    /// Pings the upstream service and the store, and records the result.
    pub async fn run_health_probe(&self) -> HealthReport {
        let deadline = Duration::from_millis(self.config.upstream.request_timeout_ms);
        let (upstream, store) = tokio::join!(
            self.upstream.ping(),
            timeout(deadline, self.store.ping())
        );
        let store: std::result::Result<(), String> = match store {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("store ping timed out after {}ms", deadline.as_millis())),
        };

        let report = HealthReport {
            upstream: ComponentHealth::from_result(&upstream),
            store: ComponentHealth::from_result(&store),
            breaker: self.upstream.breaker_state(),
            queue_depth: self.queue.len(),
            checked_at: self.clock.now(),
        };

        for (component, health) in [("upstream", &report.upstream), ("store", &report.store)] {
            let healthy = health.is_healthy();
            self.metrics.gauge(
                names::COMPONENT_HEALTHY,
                if healthy { 1.0 } else { 0.0 },
                &[("component", component)],
            );
            if let ComponentHealth::Unhealthy { reason } = health {
                warn!(component, reason = %reason, "health probe failed");
            }
        }
        debug!(
            healthy = report.is_healthy(),
            breaker = %report.breaker,
            queue_depth = report.queue_depth,
            "health probe complete"
        );

        *self.last_health.write() = Some(report.clone());
        report
    }

    /// Enqueues a test alert for a target, bypassing the decision policy.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::TargetNotFound` for an unknown id, or the store
    /// or queue error.
    pub async fn send_test_alert(&self, target_id: &TargetId) -> Result<Uuid> {
        let target = self
            .store
            .get_target(target_id)
            .await?
            .ok_or_else(|| EngineError::TargetNotFound {
                id: target_id.to_string(),
            })?;

        let task = AlertTask::synthetic(target, self.clock.now());
        let task_id = task.id;
        info!(
            task_id = %task_id,
            target_id = %target_id,
            destination = %task.target.destination,
            "test alert enqueued"
        );
        self.queue.push(task)?;
        Ok(task_id)
    }

    /// Returns current statistics.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let delivery = self.dispatcher.stats();
        let breaker = self.upstream.breaker().snapshot();

        EngineStats {
            is_running: self.running.load(Ordering::Acquire),
            total_checks: Counters::get(&self.counters.total_checks),
            skipped_cycles: Counters::get(&self.counters.skipped_cycles),
            short_circuited_cycles: Counters::get(&self.counters.short_circuited),
            alerts_enqueued: Counters::get(&self.counters.alerts_enqueued),
            alerts_sent: delivery.sent,
            alerts_retried: delivery.retried,
            alerts_failed: delivery.failed,
            alerts_abandoned: delivery.abandoned
                + Counters::get(&self.counters.alerts_abandoned),
            errors: Counters::get(&self.counters.errors),
            queue_depth: self.queue.len(),
            breaker_state: breaker.state,
            breaker,
            active_cooldowns: self.decisions.cooldowns().len(),
            last_check_at: *self.last_check_at.read(),
            health: self.last_health.read().clone(),
        }
    }
}
