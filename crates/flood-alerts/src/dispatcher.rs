//! The delivery dispatcher.
//!
//! A single consumer drains the [`AlertQueue`]. For each task it renders the
//! message, sends it through the channel and:
//!
//! - on success writes the notification cursor back to the target store;
//! - on failure requeues the task at the front of the retry lane while
//!   `retry_count < max_retries`, and drops it as a permanent failure
//!   otherwise.
//!
//! A channel that panics while sending costs only that task: it is counted
//! as a permanent failure and the dispatcher moves on.
//!
//! Consecutive attempts are separated by a fixed spacing. On shutdown the
//! queue is closed and the remaining tasks get a bounded grace period; what is
//! still queued afterwards is logged and counted as abandoned.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use flood_core::{SharedClock, TargetStore, TargetUpdate, system_clock};
use flood_metrics::{MetricsSink, names};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channels::NotificationChannel;
use crate::queue::AlertQueue;
use crate::render::RenderedMessage;
use crate::task::AlertTask;

/// Dispatcher settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Failed attempts allowed before a task is dropped.
    pub max_retries: u32,
    /// Pause between consecutive send attempts.
    pub spacing: Duration,
    /// How long the shutdown drain may take.
    pub shutdown_grace: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            spacing: Duration::from_millis(250),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// What happened to one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Delivered and the cursor written back.
    Delivered,
    /// Delivered, but the cursor write-back failed.
    DeliveredUnrecorded,
    /// Failed and requeued.
    Requeued,
    /// Failed with no retries left.
    Failed,
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    /// Send attempts made.
    pub attempts: u64,
    /// Alerts delivered.
    pub sent: u64,
    /// Attempts that failed and were requeued.
    pub retried: u64,
    /// Alerts dropped after exhausting retries.
    pub failed: u64,
    /// Alerts left in the queue when the shutdown grace ran out.
    pub abandoned: u64,
}

#[derive(Debug, Default)]
struct Counters {
    attempts: AtomicU64,
    sent: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
}

/// Serializes outbound notifications.
#[derive(Debug)]
pub struct Dispatcher {
    queue: Arc<AlertQueue>,
    channel: Arc<dyn NotificationChannel>,
    store: Arc<dyn TargetStore>,
    metrics: Arc<dyn MetricsSink>,
    config: DispatcherConfig,
    clock: SharedClock,
    counters: Counters,
}

impl Dispatcher {
    /// Creates a dispatcher on the system clock.
    #[must_use]
    pub fn new(
        queue: Arc<AlertQueue>,
        channel: Arc<dyn NotificationChannel>,
        store: Arc<dyn TargetStore>,
        metrics: Arc<dyn MetricsSink>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            queue,
            channel,
            store,
            metrics,
            config,
            clock: system_clock(),
            counters: Counters::default(),
        }
    }

    /// Uses `clock` for rendering and cursor timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the queue.
    #[must_use]
    pub const fn queue(&self) -> &Arc<AlertQueue> {
        &self.queue
    }

    /// Returns the settings.
    #[must_use]
    pub const fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Returns a snapshot of the delivery counters.
    #[must_use]
    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            attempts: self.counters.attempts.load(Ordering::Relaxed),
            sent: self.counters.sent.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            abandoned: self.counters.abandoned.load(Ordering::Relaxed),
        }
    }

    /// Makes one delivery attempt for `task`.
    ///
    /// A panic inside the channel is caught and reported as
    /// [`DeliveryOutcome::Failed`].
    pub async fn process(&self, task: AlertTask) -> DeliveryOutcome {
        let task_id = task.id;
        let target_id = task.target.id.clone();
        let tenant = task.target.tenant_id.clone();
        let event_id = task.event.id.clone();

        match AssertUnwindSafe(self.attempt(task)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.metrics
                    .increment(names::ALERTS_FAILED_TOTAL, &[("tenant", tenant.as_str())]);
                error!(
                    task_id = %task_id,
                    target_id = %target_id,
                    event_id = %event_id,
                    channel = self.channel.name(),
                    "notification channel panicked, alert dropped"
                );
                DeliveryOutcome::Failed
            }
        }
    }

    async fn attempt(&self, mut task: AlertTask) -> DeliveryOutcome {
        let now = self.clock.now();
        let message = RenderedMessage::from_task(&task, now);
        let tenant = task.target.tenant_id.to_string();
        self.counters.attempts.fetch_add(1, Ordering::Relaxed);

        match self.channel.send(&task.target.destination, &message).await {
            Ok(()) => {
                self.counters.sent.fetch_add(1, Ordering::Relaxed);
                self.metrics.increment(
                    names::ALERTS_SENT_TOTAL,
                    &[("tenant", tenant.as_str()), ("severity", task.severity.as_str())],
                );
                info!(
                    task_id = %task.id,
                    target_id = %task.target.id,
                    address = %task.target.address,
                    event_id = %task.event.id,
                    severity = %task.severity,
                    attempt = task.retry_count + 1,
                    waited_ms = task.waited(now).num_milliseconds(),
                    "alert delivered"
                );
                self.record_delivery(&task).await
            }
            Err(e) if task.can_retry(self.config.max_retries) => {
                task.retry_count += 1;
                self.counters.retried.fetch_add(1, Ordering::Relaxed);
                self.metrics
                    .increment(names::ALERTS_RETRIED_TOTAL, &[("tenant", tenant.as_str())]);
                warn!(
                    task_id = %task.id,
                    target_id = %task.target.id,
                    event_id = %task.event.id,
                    retry = task.retry_count,
                    max_retries = self.config.max_retries,
                    error = %e,
                    "alert delivery failed, requeued"
                );
                self.queue.push_retry(task);
                DeliveryOutcome::Requeued
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.metrics
                    .increment(names::ALERTS_FAILED_TOTAL, &[("tenant", tenant.as_str())]);
                error!(
                    task_id = %task.id,
                    target_id = %task.target.id,
                    event_id = %task.event.id,
                    attempts = task.retry_count + 1,
                    error = %e,
                    "alert delivery failed permanently"
                );
                DeliveryOutcome::Failed
            }
        }
    }

    async fn record_delivery(&self, task: &AlertTask) -> DeliveryOutcome {
        if task.synthetic {
            return DeliveryOutcome::Delivered;
        }

        let update = TargetUpdate::notified(task.event.id.clone(), self.clock.now());
        match self.store.update_target(&task.target.id, update).await {
            Ok(_) => DeliveryOutcome::Delivered,
            Err(e) => {
                self.metrics.increment(
                    names::CURSOR_WRITE_FAILURES_TOTAL,
                    &[("tenant", task.target.tenant_id.as_str())],
                );
                warn!(
                    target_id = %task.target.id,
                    event_id = %task.event.id,
                    error = %e,
                    "alert delivered but target update failed"
                );
                DeliveryOutcome::DeliveredUnrecorded
            }
        }
    }

    /// Runs until `shutdown` fires, then drains within the grace period.
    ///
    /// Returns the number of abandoned tasks.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> usize {
        info!(
            max_retries = self.config.max_retries,
            spacing_ms = self.config.spacing.as_millis() as u64,
            "dispatcher started"
        );

        loop {
            let task = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                task = self.queue.next() => task,
            };
            let Some(task) = task else { break };

            self.process(task).await;
            self.metrics
                .gauge(names::QUEUE_DEPTH, self.queue.len() as f64, &[]);

            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = sleep(self.config.spacing) => {}
            }
        }

        self.drain().await
    }

    /// Closes the queue and delivers what remains within the grace period.
    ///
    /// Returns the number of abandoned tasks.
    pub async fn drain(&self) -> usize {
        self.queue.close();
        let pending = self.queue.len();
        if pending > 0 {
            info!(
                pending,
                grace_ms = self.config.shutdown_grace.as_millis() as u64,
                "draining alert queue"
            );
        }

        let deadline = Instant::now() + self.config.shutdown_grace;
        let mut abandoned = Vec::new();

        while let Some(task) = self.queue.try_pop() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                abandoned.push(task);
                break;
            }
            if timeout(remaining, self.process(task.clone())).await.is_err() {
                abandoned.push(task);
                break;
            }
            if !self.queue.is_empty() {
                sleep(self.config.spacing.min(deadline.saturating_duration_since(Instant::now())))
                    .await;
            }
        }

        abandoned.extend(self.queue.drain());
        for task in &abandoned {
            error!(
                task_id = %task.id,
                target_id = %task.target.id,
                event_id = %task.event.id,
                retry_count = task.retry_count,
                "alert abandoned at shutdown"
            );
        }

        let count = abandoned.len();
        if count > 0 {
            self.counters
                .abandoned
                .fetch_add(count as u64, Ordering::Relaxed);
            self.metrics
                .counter(names::ALERTS_ABANDONED_TOTAL, count as f64, &[]);
        }
        debug!(abandoned = count, "dispatcher stopped");
        count
    }
}
