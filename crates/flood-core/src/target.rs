//! Monitored targets.
//!
//! A [`MonitoredTarget`] is one watched address for one tenant, plus where
//! its notifications go and the policy that gates them. The engine only ever
//! writes the notification cursor back (see [`TargetUpdate`]); creation and
//! soft deletion belong to the management surface.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::severity::Severity;

/// Unique identifier of a monitored target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(Uuid);

impl TargetId {
    /// Generates a new random ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the tenant owning a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    /// Creates a tenant ID.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTarget` if the ID is blank.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoreError::InvalidTarget {
                reason: "tenant id cannot be empty".to_string(),
            });
        }
        Ok(Self(id))
    }

    /// Returns the tenant ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parses and normalizes a target address.
///
/// # Errors
///
/// Returns `CoreError::InvalidAddress` if `raw` is not an IPv4 or IPv6 address.
pub fn parse_address(raw: &str) -> Result<IpAddr> {
    raw.trim()
        .parse::<IpAddr>()
        .map_err(|e| CoreError::InvalidAddress {
            address: raw.to_string(),
            reason: e.to_string(),
        })
}

/// Per-target alerting policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertPolicy {
    /// Cooldown override in milliseconds; the engine default applies when unset.
    pub cooldown_ms: Option<u64>,
    /// Minimum severity worth notifying; no threshold when unset.
    pub min_severity: Option<Severity>,
}

impl AlertPolicy {
    /// Sets the cooldown override.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: std::time::Duration) -> Self {
        self.cooldown_ms = Some(u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets the minimum severity.
    #[must_use]
    pub const fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    /// Returns the effective cooldown window.
    #[must_use]
    pub fn cooldown_or(&self, default: Duration) -> Duration {
        self.cooldown_ms
            .and_then(|ms| i64::try_from(ms).ok())
            .map_or(default, Duration::milliseconds)
    }

    /// Returns the effective severity threshold.
    #[must_use]
    pub fn min_severity_or_minimal(&self) -> Severity {
        self.min_severity.unwrap_or(Severity::Minimal)
    }
}

/// Where a target stands with respect to a given event id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationState {
    /// No notification has been delivered for this event.
    Unseen,
    /// A notification for this event was delivered.
    Notified {
        /// When the notification was delivered.
        at: DateTime<Utc>,
    },
}

impl NotificationState {
    /// Returns true for [`NotificationState::Notified`].
    #[must_use]
    pub const fn is_notified(&self) -> bool {
        matches!(self, Self::Notified { .. })
    }
}

/// Key of the in-memory cooldown map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CooldownKey {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Watched address.
    pub address: IpAddr,
}

impl fmt::Display for CooldownKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.address)
    }
}

/// A watched address for one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredTarget {
    /// Unique ID.
    pub id: TargetId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Watched address.
    pub address: IpAddr,
    /// Optional human-friendly name.
    pub alias: Option<String>,
    /// Channel destination (webhook URL, chat id, ...).
    pub destination: String,
    /// Alert gating policy.
    pub policy: AlertPolicy,
    /// Event id of the last delivered notification.
    pub last_notified_event_id: Option<String>,
    /// When the last notification was delivered.
    pub last_notified_at: Option<DateTime<Utc>>,
    /// Total notifications delivered for this target.
    pub notification_count: u64,
    /// Inactive targets are kept for history but never evaluated.
    pub active: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl MonitoredTarget {
    /// Creates a new active target.
    ///
    /// # Errors
    ///
    /// Returns an error if the tenant is blank, the address is not an IP
    /// address, or the destination is empty.
    pub fn new(
        tenant_id: impl Into<String>,
        address: &str,
        destination: impl Into<String>,
    ) -> Result<Self> {
        let tenant_id = TenantId::new(tenant_id)?;
        let address = parse_address(address)?;
        let destination = destination.into();
        if destination.trim().is_empty() {
            return Err(CoreError::InvalidTarget {
                reason: "destination cannot be empty".to_string(),
            });
        }

        let now = Utc::now();
        Ok(Self {
            id: TargetId::new(),
            tenant_id,
            address,
            alias: None,
            destination,
            policy: AlertPolicy::default(),
            last_notified_event_id: None,
            last_notified_at: None,
            notification_count: 0,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Sets the alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Sets the alert policy.
    #[must_use]
    pub fn with_policy(mut self, policy: AlertPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the alias if set, otherwise the address.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| self.address.to_string())
    }

    /// Returns the cooldown map key for this target.
    #[must_use]
    pub fn cooldown_key(&self) -> CooldownKey {
        CooldownKey {
            tenant_id: self.tenant_id.clone(),
            address: self.address,
        }
    }

    /// Returns the notification state of this target for `event_id`.
    #[must_use]
    pub fn notification_state(&self, event_id: &str) -> NotificationState {
        match (&self.last_notified_event_id, self.last_notified_at) {
            (Some(last), Some(at)) if last == event_id => NotificationState::Notified { at },
            (Some(last), None) if last == event_id => NotificationState::Notified {
                at: self.updated_at,
            },
            _ => NotificationState::Unseen,
        }
    }
}

/// Field changes applied to a target row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetUpdate {
    /// New notification cursor.
    pub last_notified_event_id: Option<String>,
    /// New notification time.
    pub last_notified_at: Option<DateTime<Utc>>,
    /// Increment `notification_count` by one.
    pub increment_notifications: bool,
    /// New active flag.
    pub active: Option<bool>,
}

impl TargetUpdate {
    /// The update recorded after a successful delivery.
    #[must_use]
    pub fn notified(event_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            last_notified_event_id: Some(event_id.into()),
            last_notified_at: Some(at),
            increment_notifications: true,
            active: None,
        }
    }

    /// The soft-delete update.
    #[must_use]
    pub fn deactivate() -> Self {
        Self {
            active: Some(false),
            ..Self::default()
        }
    }

    /// Applies this update to a target.
    pub fn apply(&self, target: &mut MonitoredTarget, now: DateTime<Utc>) {
        if let Some(event_id) = &self.last_notified_event_id {
            target.last_notified_event_id = Some(event_id.clone());
        }
        if let Some(at) = self.last_notified_at {
            target.last_notified_at = Some(at);
        }
        if self.increment_notifications {
            target.notification_count = target.notification_count.saturating_add(1);
        }
        if let Some(active) = self.active {
            target.active = active;
        }
        target.updated_at = now;
    }
}
