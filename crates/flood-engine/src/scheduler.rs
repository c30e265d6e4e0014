//! Timers around a [`Monitor`].
//!
//! [`MonitorService`] runs three independent tickers (check cycle, health
//! probe, maintenance) plus the alert dispatcher. Every firing runs in its
//! own task; a firing that panics is logged and counted and the ticker keeps
//! going. Tickers skip missed ticks instead of bursting to catch up. On stop,
//! firings still running when the grace period runs out are aborted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use flood_core::TargetId;

use crate::error::{EngineError, Result};
use crate::monitor::Monitor;
use crate::stats::EngineStats;

/// A scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// [`Monitor::run_check_cycle`].
    CheckCycle,
    /// [`Monitor::run_health_probe`].
    HealthProbe,
    /// [`Monitor::run_maintenance`].
    Maintenance,
}

impl Job {
    /// Every job, in start order.
    pub const ALL: [Self; 3] = [Self::CheckCycle, Self::HealthProbe, Self::Maintenance];

    /// Label for logs and metric tags.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CheckCycle => "check_cycle",
            Self::HealthProbe => "health_probe",
            Self::Maintenance => "maintenance",
        }
    }

    fn period(self, monitor: &Monitor) -> Duration {
        let schedule = &monitor.config().schedule;
        match self {
            Self::CheckCycle => schedule.check_interval(),
            Self::HealthProbe => schedule.health_interval(),
            Self::Maintenance => schedule.maintenance_interval(),
        }
    }

    /// Checks and probes fire as soon as the service starts; maintenance
    /// waits a full period.
    const fn fires_at_start(self) -> bool {
        !matches!(self, Self::Maintenance)
    }

    async fn run(self, monitor: Arc<Monitor>) {
        match self {
            Self::CheckCycle => {
                monitor.run_check_cycle().await;
            }
            Self::HealthProbe => {
                monitor.run_health_probe().await;
            }
            Self::Maintenance => {
                monitor.run_maintenance().await;
            }
        }
    }
}

struct Running {
    tickers: CancellationToken,
    firings: CancellationToken,
    dispatch: CancellationToken,
    tracker: TaskTracker,
    dispatcher: JoinHandle<usize>,
    started_at: DateTime<Utc>,
}

/// Start/stop control over a monitor.
pub struct MonitorService {
    monitor: Arc<Monitor>,
    running: Mutex<Option<Running>>,
}

impl std::fmt::Debug for MonitorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorService")
            .field("monitor", &self.monitor)
            .field("running", &self.is_running())
            .finish()
    }
}

impl MonitorService {
    /// Wraps a monitor. Nothing runs until [`MonitorService::start`].
    #[must_use]
    pub fn new(monitor: Monitor) -> Self {
        Self {
            monitor: Arc::new(monitor),
            running: Mutex::new(None),
        }
    }

    /// Returns the monitor.
    #[must_use]
    pub const fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// Returns true between `start` and `stop`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Starts the tickers and the dispatcher.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::AlreadyRunning` if the service is running.
    pub fn start(&self) -> Result<()> {
        let mut slot = self.running.lock();
        if slot.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        // A previous stop closed the queue.
        self.monitor.queue().reopen();

        let tickers = CancellationToken::new();
        let firings = CancellationToken::new();
        let dispatch = CancellationToken::new();
        let tracker = TaskTracker::new();

        for job in Job::ALL {
            tracker.spawn(run_ticker(
                job,
                self.monitor.clone(),
                tickers.clone(),
                firings.clone(),
                tracker.clone(),
            ));
        }
        let dispatcher = tokio::spawn(self.monitor.dispatcher().clone().run(dispatch.clone()));

        let schedule = &self.monitor.config().schedule;
        info!(
            check_interval_ms = schedule.check_interval_ms,
            health_interval_ms = schedule.health_interval_ms,
            maintenance_interval_ms = schedule.maintenance_interval_ms,
            "monitor service started"
        );

        *slot = Some(Running {
            tickers,
            firings,
            dispatch,
            tracker,
            dispatcher,
            started_at: Utc::now(),
        });
        self.monitor.set_running(true);
        Ok(())
    }

    /// Stops the tickers, waits for in-flight firings, then drains the
    /// alert queue within the shutdown grace period.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotRunning` if the service is not running.
    pub async fn stop(&self) -> Result<()> {
        let running = self.running.lock().take().ok_or(EngineError::NotRunning)?;
        self.monitor.set_running(false);

        running.tickers.cancel();
        running.tracker.close();
        let grace = self.monitor.dispatcher().config().shutdown_grace;
        if timeout(grace, running.tracker.wait()).await.is_err() {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "scheduled tasks still running after grace period, aborting them"
            );
            running.firings.cancel();
            running.tracker.wait().await;
        }

        running.dispatch.cancel();
        let abandoned = match running.dispatcher.await {
            Ok(abandoned) => abandoned,
            Err(e) => {
                error!(error = %e, "dispatcher task failed");
                self.monitor.record_task_failure("dispatcher");
                0
            }
        };

        let uptime = Utc::now() - running.started_at;
        info!(
            abandoned,
            uptime_secs = uptime.num_seconds(),
            "monitor service stopped"
        );
        Ok(())
    }

    /// Stops the service if it is running, then starts it.
    ///
    /// # Errors
    ///
    /// Returns the error from `start`.
    pub async fn restart(&self) -> Result<()> {
        match self.stop().await {
            Ok(()) | Err(EngineError::NotRunning) => {}
            Err(e) => return Err(e),
        }
        self.start()
    }

    /// Returns current statistics.
    #[must_use]
    pub fn get_stats(&self) -> EngineStats {
        self.monitor.stats()
    }

    /// Enqueues a test alert for a target.
    ///
    /// # Errors
    ///
    /// See [`Monitor::send_test_alert`].
    pub async fn send_test_alert(&self, target_id: &TargetId) -> Result<Uuid> {
        self.monitor.send_test_alert(target_id).await
    }
}

impl Drop for MonitorService {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.tickers.cancel();
            running.firings.cancel();
            running.dispatch.cancel();
            self.monitor.set_running(false);
        }
    }
}

async fn run_ticker(
    job: Job,
    monitor: Arc<Monitor>,
    cancel: CancellationToken,
    abort: CancellationToken,
    tracker: TaskTracker,
) {
    let period = job.period(&monitor);
    let first = if job.fires_at_start() {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut ticker = interval_at(first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    debug!(job = job.as_str(), period_ms = period.as_millis() as u64, "ticker started");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                tracker.spawn(supervise(
                    job,
                    monitor.clone(),
                    abort.clone(),
                    job.run(monitor.clone()),
                ));
            }
        }
    }

    debug!(job = job.as_str(), "ticker stopped");
}

/// Runs one firing in its own task and reports a panic instead of
/// propagating it. The firing is aborted when `abort` fires.
async fn supervise<F>(job: Job, monitor: Arc<Monitor>, abort: CancellationToken, firing: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let mut handle = tokio::spawn(firing);
    let result = tokio::select! {
        result = &mut handle => result,
        () = abort.cancelled() => {
            handle.abort();
            handle.await
        }
    };
    if let Err(e) = result {
        if e.is_panic() {
            error!(job = job.as_str(), error = %e, "scheduled task panicked");
            monitor.record_task_failure(job.as_str());
        } else {
            warn!(job = job.as_str(), "scheduled task aborted");
        }
    }
}
