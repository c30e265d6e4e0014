//! Target store boundary.
//!
//! The durable store is owned by the surrounding application. The engine only
//! reads active targets, writes back the notification cursor after delivery,
//! records observed events for history and asks the store to apply its
//! retention. [`InMemoryTargetStore`] backs tests and the standalone binary.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::{SharedClock, system_clock};
use crate::error::{CoreError, Result};
use crate::event::DetectionEvent;
use crate::target::{MonitoredTarget, TargetId, TargetUpdate, TenantId};

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Persistence operations the engine depends on.
///
/// Implementations must make each single-row update atomic; the engine never
/// relies on transactions spanning several targets.
pub trait TargetStore: Send + Sync + fmt::Debug {
    /// Lists active targets, optionally for a single tenant.
    fn list_active_targets<'a>(
        &'a self,
        tenant: Option<&'a TenantId>,
    ) -> StoreFuture<'a, Vec<MonitoredTarget>>;

    /// Fetches one target by id, active or not.
    fn get_target<'a>(&'a self, id: &'a TargetId) -> StoreFuture<'a, Option<MonitoredTarget>>;

    /// Applies a field update to one target and returns the new row.
    fn update_target<'a>(
        &'a self,
        id: &'a TargetId,
        update: TargetUpdate,
    ) -> StoreFuture<'a, MonitoredTarget>;

    /// Records (or refreshes) an observed event against a target.
    fn record_event<'a>(
        &'a self,
        target_id: &'a TargetId,
        event: &'a DetectionEvent,
    ) -> StoreFuture<'a, ()>;

    /// Drops history last seen before `before`. Returns the number of rows removed.
    fn prune_history(&self, before: DateTime<Utc>) -> StoreFuture<'_, usize>;

    /// Checks the store is reachable.
    fn ping(&self) -> StoreFuture<'_, ()>;
}

/// A stored observation of an event against a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// The target the event was matched to.
    pub target_id: TargetId,
    /// The event as last observed.
    pub event: DetectionEvent,
    /// First time the event was recorded.
    pub first_seen: DateTime<Utc>,
    /// Last time the event was recorded.
    pub last_seen: DateTime<Utc>,
}

/// Thread-safe in-memory target store.
#[derive(Debug, Clone)]
pub struct InMemoryTargetStore {
    targets: Arc<RwLock<HashMap<TargetId, MonitoredTarget>>>,
    history: Arc<RwLock<HashMap<(TargetId, String), EventRecord>>>,
    clock: SharedClock,
}

impl Default for InMemoryTargetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTargetStore {
    /// Creates an empty store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Creates an empty store on the given clock.
    #[must_use]
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            targets: Arc::new(RwLock::new(HashMap::new())),
            history: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Adds a target.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::DuplicateTarget` if an active target already exists
    /// for the same tenant and address.
    pub fn add_target(&self, target: MonitoredTarget) -> Result<TargetId> {
        let mut targets = self.targets.write();

        if target.active
            && targets.values().any(|t| {
                t.active && t.tenant_id == target.tenant_id && t.address == target.address
            })
        {
            return Err(CoreError::DuplicateTarget {
                tenant: target.tenant_id.to_string(),
                address: target.address.to_string(),
            });
        }

        let id = target.id;
        info!(
            target_id = %id,
            tenant = %target.tenant_id,
            address = %target.address,
            "added monitored target"
        );
        targets.insert(id, target);
        Ok(id)
    }

    /// Soft-deletes a target.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::TargetNotFound` if the id is unknown.
    pub fn deactivate_target(&self, id: &TargetId) -> Result<()> {
        self.apply(id, &TargetUpdate::deactivate())?;
        info!(target_id = %id, "deactivated monitored target");
        Ok(())
    }

    /// Returns a target by id.
    #[must_use]
    pub fn target(&self, id: &TargetId) -> Option<MonitoredTarget> {
        self.targets.read().get(id).cloned()
    }

    /// Returns the number of stored targets, active or not.
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.targets.read().len()
    }

    /// Returns all history records for a target.
    #[must_use]
    pub fn events_for(&self, target_id: &TargetId) -> Vec<EventRecord> {
        let history = self.history.read();
        let mut records: Vec<EventRecord> = history
            .values()
            .filter(|r| &r.target_id == target_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.event.started_at.cmp(&b.event.started_at));
        records
    }

    /// Returns the number of history records.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    fn apply(&self, id: &TargetId, update: &TargetUpdate) -> Result<MonitoredTarget> {
        let now = self.clock.now();
        let mut targets = self.targets.write();
        let target = targets.get_mut(id).ok_or_else(|| CoreError::TargetNotFound {
            id: id.to_string(),
        })?;
        update.apply(target, now);
        Ok(target.clone())
    }

    fn upsert_event(&self, target_id: &TargetId, event: &DetectionEvent) {
        let now = self.clock.now();
        let mut history = self.history.write();
        history
            .entry((*target_id, event.id.clone()))
            .and_modify(|record| {
                if record.event.observe(event) {
                    debug!(target_id = %target_id, event_id = %event.id, "event ended");
                }
                record.last_seen = now;
            })
            .or_insert_with(|| EventRecord {
                target_id: *target_id,
                event: event.clone(),
                first_seen: now,
                last_seen: now,
            });
    }
}

impl TargetStore for InMemoryTargetStore {
    fn list_active_targets<'a>(
        &'a self,
        tenant: Option<&'a TenantId>,
    ) -> StoreFuture<'a, Vec<MonitoredTarget>> {
        Box::pin(async move {
            let targets = self.targets.read();
            let mut active: Vec<MonitoredTarget> = targets
                .values()
                .filter(|t| t.active)
                .filter(|t| tenant.is_none_or(|tenant| &t.tenant_id == tenant))
                .cloned()
                .collect();
            active.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Ok(active)
        })
    }

    fn get_target<'a>(&'a self, id: &'a TargetId) -> StoreFuture<'a, Option<MonitoredTarget>> {
        Box::pin(async move { Ok(self.target(id)) })
    }

    fn update_target<'a>(
        &'a self,
        id: &'a TargetId,
        update: TargetUpdate,
    ) -> StoreFuture<'a, MonitoredTarget> {
        Box::pin(async move { self.apply(id, &update) })
    }

    fn record_event<'a>(
        &'a self,
        target_id: &'a TargetId,
        event: &'a DetectionEvent,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.upsert_event(target_id, event);
            Ok(())
        })
    }

    fn prune_history(&self, before: DateTime<Utc>) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            let mut history = self.history.write();
            let count = history.len();
            history.retain(|_, record| record.last_seen >= before);
            Ok(count - history.len())
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}
