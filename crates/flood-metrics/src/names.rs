//! Names of the metrics the engine emits.

/// Check cycles started.
pub const CHECKS_TOTAL: &str = "floodwatch_checks_total";
/// Check cycles skipped because one was already running.
pub const CHECKS_SKIPPED_TOTAL: &str = "floodwatch_checks_skipped_total";
/// Wall time of a check cycle in milliseconds.
pub const CHECK_DURATION_MS: &str = "floodwatch_check_duration_ms";
/// Events returned by the upstream service.
pub const EVENTS_FETCHED: &str = "floodwatch_events_fetched";
/// Upstream fetches that failed after retries.
pub const UPSTREAM_FAILURES_TOTAL: &str = "floodwatch_upstream_failures_total";
/// Cycles short-circuited by the open breaker.
pub const BREAKER_SHORT_CIRCUITS_TOTAL: &str = "floodwatch_breaker_short_circuits_total";
/// Breaker transitions, tagged with `state`.
pub const BREAKER_TRANSITIONS_TOTAL: &str = "floodwatch_breaker_transitions_total";
/// Target evaluations that errored.
pub const TARGET_ERRORS_TOTAL: &str = "floodwatch_target_errors_total";
/// Candidates rejected by the decision policy, tagged with `reason`.
pub const REJECTIONS_TOTAL: &str = "floodwatch_rejections_total";
/// Alert tasks enqueued, tagged with `severity`.
pub const ALERTS_ENQUEUED_TOTAL: &str = "floodwatch_alerts_enqueued_total";
/// Alerts delivered.
pub const ALERTS_SENT_TOTAL: &str = "floodwatch_alerts_sent_total";
/// Delivery attempts that failed and were requeued.
pub const ALERTS_RETRIED_TOTAL: &str = "floodwatch_alerts_retried_total";
/// Alerts dropped after exhausting retries.
pub const ALERTS_FAILED_TOTAL: &str = "floodwatch_alerts_failed_total";
/// Alerts still queued when the shutdown grace period ran out.
pub const ALERTS_ABANDONED_TOTAL: &str = "floodwatch_alerts_abandoned_total";
/// Delivered alerts whose cursor write-back failed.
pub const CURSOR_WRITE_FAILURES_TOTAL: &str = "floodwatch_cursor_write_failures_total";
/// Current alert queue depth.
pub const QUEUE_DEPTH: &str = "floodwatch_queue_depth";
/// Cooldown entries removed by maintenance.
pub const COOLDOWNS_PRUNED_TOTAL: &str = "floodwatch_cooldowns_pruned_total";
/// Health of a component (1 healthy, 0 unhealthy), tagged with `component`.
pub const COMPONENT_HEALTHY: &str = "floodwatch_component_healthy";
/// Scheduled tasks that failed or panicked, tagged with `task`.
pub const TASK_FAILURES_TOTAL: &str = "floodwatch_task_failures_total";
