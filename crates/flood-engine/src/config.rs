//! Engine configuration.
//!
//! Loaded from TOML. Every section and field is optional; missing values take
//! the defaults below. Durations are integer milliseconds in the file.
//!
//! ```toml
//! [upstream]
//! url = "https://detect.example.net/api"
//!
//! [schedule]
//! check_interval_ms = 30000
//!
//! [[targets]]
//! tenant = "acme"
//! address = "203.0.113.5"
//! destination = "https://hooks.example.com/floodwatch"
//! ```

use std::path::Path;
use std::time::Duration;

use flood_alerts::DispatcherConfig;
use flood_core::{AlertPolicy, DecisionPolicy, MonitoredTarget, Severity, SeverityBreakpoints};
use flood_upstream::{BreakerConfig, HttpSourceConfig, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Longest duration any setting may hold (ten years).
pub const MAX_DURATION_MS: u64 = 10 * 365 * 24 * 3600 * 1000;

/// Longest history retention, in days.
pub const MAX_HISTORY_DAYS: u32 = 3650;

fn chrono_ms(ms: u64) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

/// Connection and retry settings for the detection service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UpstreamSettings {
    /// Base URL of the detection service.
    pub url: String,
    /// Bearer token.
    pub api_key: Option<String>,
    /// Path of the active-events listing.
    pub events_path: String,
    /// Path of the liveness endpoint.
    pub ping_path: String,
    /// Deadline for each attempt.
    pub request_timeout_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Backoff base.
    pub backoff_base_ms: u64,
    /// Backoff cap.
    pub backoff_max_ms: u64,
    /// Randomize backoff delays.
    pub jitter: bool,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: None,
            events_path: "/events/active".to_string(),
            ping_path: "/health".to_string(),
            request_timeout_ms: 10_000,
            max_retries: 3,
            backoff_base_ms: 1_000,
            backoff_max_ms: 30_000,
            jitter: false,
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BreakerSettings {
    /// Consecutive failed fetches that open the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open.
    pub reset_timeout_ms: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 300_000,
        }
    }
}

/// Timer cadences.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScheduleSettings {
    /// Check cycle cadence.
    pub check_interval_ms: u64,
    /// Maintenance cadence.
    pub maintenance_interval_ms: u64,
    /// Health probe cadence.
    pub health_interval_ms: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            check_interval_ms: 30_000,
            maintenance_interval_ms: 3_600_000,
            health_interval_ms: 60_000,
        }
    }
}

impl ScheduleSettings {
    /// Check cycle cadence.
    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Maintenance cadence.
    #[must_use]
    pub const fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms)
    }

    /// Health probe cadence.
    #[must_use]
    pub const fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }
}

/// Alert decision settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AlertSettings {
    /// Default cooldown window.
    pub cooldown_ms: u64,
    /// Events older than this are ignored.
    pub max_event_age_ms: u64,
    /// Targets evaluated concurrently per batch.
    pub batch_concurrency: usize,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            cooldown_ms: 300_000,
            max_event_age_ms: 3_600_000,
            batch_concurrency: 5,
        }
    }
}

/// Delivery settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DispatcherSettings {
    /// Failed attempts allowed per alert.
    pub max_retries: u32,
    /// Pause between sends.
    pub send_spacing_ms: u64,
    /// Shutdown drain budget.
    pub shutdown_grace_ms: u64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            send_spacing_ms: 250,
            shutdown_grace_ms: 10_000,
        }
    }
}

/// Retention windows applied by maintenance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetentionSettings {
    /// In-memory metric points.
    pub metrics_ms: u64,
    /// Event history kept by the target store.
    pub history_days: u32,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            metrics_ms: 86_400_000,
            history_days: 30,
        }
    }
}

impl RetentionSettings {
    /// Metric retention.
    #[must_use]
    pub const fn metrics(&self) -> Duration {
        Duration::from_millis(self.metrics_ms)
    }

    /// History retention.
    #[must_use]
    pub fn history(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.history_days))
    }
}

/// A target declared in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetSeed {
    /// Owning tenant.
    pub tenant: String,
    /// IPv4 or IPv6 address.
    pub address: String,
    /// Display name.
    #[serde(default)]
    pub alias: Option<String>,
    /// Channel destination.
    pub destination: String,
    /// Cooldown override.
    #[serde(default)]
    pub cooldown_ms: Option<u64>,
    /// Minimum severity.
    #[serde(default)]
    pub min_severity: Option<Severity>,
}

impl TargetSeed {
    /// Builds the target.
    ///
    /// # Errors
    ///
    /// Returns an error if the tenant, address or destination is invalid.
    pub fn to_target(&self) -> Result<MonitoredTarget> {
        let mut target = MonitoredTarget::new(self.tenant.clone(), &self.address, self.destination.clone())?
            .with_policy(AlertPolicy {
                cooldown_ms: self.cooldown_ms,
                min_severity: self.min_severity,
            });
        if let Some(alias) = &self.alias {
            target = target.with_alias(alias.clone());
        }
        Ok(target)
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Detection service.
    pub upstream: UpstreamSettings,
    /// Circuit breaker.
    pub breaker: BreakerSettings,
    /// Timers.
    pub schedule: ScheduleSettings,
    /// Decision policy.
    pub alerts: AlertSettings,
    /// Delivery.
    pub dispatcher: DispatcherSettings,
    /// Retention.
    pub retention: RetentionSettings,
    /// Severity breakpoints.
    pub severity: SeverityBreakpoints,
    /// Targets seeded into the in-memory store.
    pub targets: Vec<TargetSeed>,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            EngineError::Config(format!(
                "failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// Parsing does not validate; call [`validate`](Self::validate).
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| EngineError::Config(format!("invalid TOML: {e}")))
    }

    /// Serializes to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// A documented starting point for `init-config`.
    #[must_use]
    pub fn sample() -> Self {
        Self {
            upstream: UpstreamSettings {
                url: "https://detect.example.net/api".to_string(),
                ..UpstreamSettings::default()
            },
            targets: vec![TargetSeed {
                tenant: "example".to_string(),
                address: "203.0.113.5".to_string(),
                alias: Some("edge-1".to_string()),
                destination: "log:ops".to_string(),
                cooldown_ms: None,
                min_severity: Some(Severity::Low),
            }],
            ..Self::default()
        }
    }

    /// Overrides the upstream URL and token when given.
    #[must_use]
    pub fn with_upstream_overrides(mut self, url: Option<String>, api_key: Option<String>) -> Self {
        if let Some(url) = url {
            self.upstream.url = url;
        }
        if api_key.is_some() {
            self.upstream.api_key = api_key;
        }
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let url = self.upstream.url.trim();
        if url.is_empty() {
            return Err(EngineError::Config("upstream.url cannot be empty".to_string()));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(EngineError::Config(
                "upstream.url must start with http:// or https://".to_string(),
            ));
        }

        for (name, value) in [
            ("schedule.check_interval_ms", self.schedule.check_interval_ms),
            ("schedule.maintenance_interval_ms", self.schedule.maintenance_interval_ms),
            ("schedule.health_interval_ms", self.schedule.health_interval_ms),
            ("upstream.request_timeout_ms", self.upstream.request_timeout_ms),
            ("breaker.reset_timeout_ms", self.breaker.reset_timeout_ms),
            ("alerts.cooldown_ms", self.alerts.cooldown_ms),
            ("alerts.max_event_age_ms", self.alerts.max_event_age_ms),
        ] {
            if value == 0 {
                return Err(EngineError::Config(format!("{name} must be greater than 0")));
            }
        }

        for (name, value) in [
            ("schedule.check_interval_ms", self.schedule.check_interval_ms),
            ("schedule.maintenance_interval_ms", self.schedule.maintenance_interval_ms),
            ("schedule.health_interval_ms", self.schedule.health_interval_ms),
            ("upstream.request_timeout_ms", self.upstream.request_timeout_ms),
            ("upstream.backoff_base_ms", self.upstream.backoff_base_ms),
            ("upstream.backoff_max_ms", self.upstream.backoff_max_ms),
            ("breaker.reset_timeout_ms", self.breaker.reset_timeout_ms),
            ("alerts.cooldown_ms", self.alerts.cooldown_ms),
            ("alerts.max_event_age_ms", self.alerts.max_event_age_ms),
            ("dispatcher.send_spacing_ms", self.dispatcher.send_spacing_ms),
            ("dispatcher.shutdown_grace_ms", self.dispatcher.shutdown_grace_ms),
            ("retention.metrics_ms", self.retention.metrics_ms),
        ] {
            if value > MAX_DURATION_MS {
                return Err(EngineError::Config(format!(
                    "{name} cannot exceed {MAX_DURATION_MS}"
                )));
            }
        }

        if self.retention.history_days > MAX_HISTORY_DAYS {
            return Err(EngineError::Config(format!(
                "retention.history_days cannot exceed {MAX_HISTORY_DAYS}"
            )));
        }

        if self.alerts.batch_concurrency == 0 {
            return Err(EngineError::Config(
                "alerts.batch_concurrency must be greater than 0".to_string(),
            ));
        }

        if self.breaker.failure_threshold == 0 {
            return Err(EngineError::Config(
                "breaker.failure_threshold must be greater than 0".to_string(),
            ));
        }

        if self.upstream.backoff_max_ms < self.upstream.backoff_base_ms {
            return Err(EngineError::Config(
                "upstream.backoff_max_ms cannot be less than upstream.backoff_base_ms".to_string(),
            ));
        }

        self.severity
            .validate()
            .map_err(|e| EngineError::Config(format!("severity: {e}")))?;

        for (i, seed) in self.targets.iter().enumerate() {
            seed.to_target()
                .map_err(|e| EngineError::Config(format!("targets[{i}]: {e}")))?;
        }

        Ok(())
    }

    /// Retry policy for upstream fetches.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.upstream.max_retries,
            base_delay: Duration::from_millis(self.upstream.backoff_base_ms),
            max_delay: Duration::from_millis(self.upstream.backoff_max_ms),
            jitter: self.upstream.jitter,
            attempt_timeout: Duration::from_millis(self.upstream.request_timeout_ms),
        }
    }

    /// Breaker thresholds.
    #[must_use]
    pub const fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.breaker.failure_threshold,
            reset_timeout: Duration::from_millis(self.breaker.reset_timeout_ms),
        }
    }

    /// Decision policy.
    #[must_use]
    pub fn decision_policy(&self) -> DecisionPolicy {
        DecisionPolicy {
            default_cooldown: chrono_ms(self.alerts.cooldown_ms),
            max_event_age: chrono_ms(self.alerts.max_event_age_ms),
            breakpoints: self.severity,
        }
    }

    /// Dispatcher settings.
    #[must_use]
    pub const fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_retries: self.dispatcher.max_retries,
            spacing: Duration::from_millis(self.dispatcher.send_spacing_ms),
            shutdown_grace: Duration::from_millis(self.dispatcher.shutdown_grace_ms),
        }
    }

    /// HTTP source settings.
    #[must_use]
    pub fn http_source_config(&self) -> HttpSourceConfig {
        let mut config = HttpSourceConfig::new(self.upstream.url.clone())
            .with_timeout(Duration::from_millis(self.upstream.request_timeout_ms))
            .with_events_path(self.upstream.events_path.clone());
        config.ping_path.clone_from(&self.upstream.ping_path);
        if let Some(key) = &self.upstream.api_key {
            config = config.with_api_key(key.clone());
        }
        config
    }

    /// Builds the seeded targets.
    ///
    /// # Errors
    ///
    /// Returns the first invalid seed's error.
    pub fn seed_targets(&self) -> Result<Vec<MonitoredTarget>> {
        self.targets.iter().map(TargetSeed::to_target).collect()
    }
}
