//! Subscriber registry.
//!
//! Owns the set of registered endpoints (persisted through a
//! [`SubscriberRepository`]) and the last-active pointer consulted by the
//! scheduled broadcaster. The pointer is only reachable through registry
//! methods and is guarded by a single mutex.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::database::models::{BreakdownField, SubscriberDbModel};
use crate::database::repositories::SubscriberRepository;
use crate::{Error, Result};

pub struct SubscriberRegistry {
    repo: Arc<dyn SubscriberRepository>,
    last_active: Mutex<Option<SubscriberDbModel>>,
    /// Bumped on every successful registration.
    registrations: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new(repo: Arc<dyn SubscriberRepository>) -> Self {
        Self {
            repo,
            last_active: Mutex::new(None),
            registrations: AtomicU64::new(0),
        }
    }

    /// Insert or refresh a subscriber, keyed by endpoint.
    ///
    /// Re-registering an endpoint updates its keys, metadata and
    /// `last_active` in place. The stored record becomes the last-active
    /// pointer.
    pub async fn register(&self, subscriber: SubscriberDbModel) -> Result<SubscriberDbModel> {
        validate_subscriber(&subscriber)?;

        let stored = self.repo.upsert(&subscriber).await?;
        debug!(endpoint = %stored.endpoint, "Subscriber registered");
        let mut pointer = self.last_active.lock();
        *pointer = Some(stored.clone());
        self.registrations.fetch_add(1, Ordering::AcqRel);
        drop(pointer);
        Ok(stored)
    }

    /// All known subscribers, oldest registration first.
    ///
    /// A storage failure is logged and yields an empty list.
    pub async fn list(&self) -> Vec<SubscriberDbModel> {
        match self.repo.list_all().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Failed to load subscribers, treating registry as empty");
                Vec::new()
            }
        }
    }

    pub async fn count(&self) -> Result<u64> {
        self.repo.count_all().await
    }

    pub async fn breakdown(&self, field: BreakdownField) -> Result<Vec<(String, u64)>> {
        self.repo.count_by(field).await
    }

    /// Remove a subscriber. Removing an unknown endpoint is a no-op.
    pub async fn remove(&self, endpoint: &str) -> Result<bool> {
        let removed = self.repo.delete(endpoint).await?;
        self.clear_last_active_if(endpoint);
        if removed {
            info!(endpoint = %endpoint, "Subscriber removed");
        }
        Ok(removed)
    }

    /// Drop every member of `snapshot` that is not in `surviving`.
    ///
    /// Only rows whose `last_active` has not advanced since the snapshot are
    /// deleted, so a subscriber that re-registered while the broadcast was in
    /// flight is kept. All deletions commit together.
    pub async fn reconcile(
        &self,
        snapshot: &[SubscriberDbModel],
        surviving: &HashSet<String>,
    ) -> Result<u64> {
        let targets: Vec<(String, i64)> = snapshot
            .iter()
            .filter(|s| !surviving.contains(&s.endpoint))
            .map(|s| (s.endpoint.clone(), s.last_active))
            .collect();
        if targets.is_empty() {
            return Ok(0);
        }

        let removed = self.repo.delete_unrefreshed(&targets).await?;
        if removed > 0 {
            info!(removed, "Pruned invalid subscribers after broadcast");
        }
        Ok(removed)
    }

    /// Delete subscribers inactive since before `cutoff_ms`.
    pub async fn prune_inactive(&self, cutoff_ms: i64) -> Result<Vec<String>> {
        let removed = self.repo.delete_inactive_before(cutoff_ms).await?;
        if !removed.is_empty() {
            let removed_set: HashSet<&str> = removed.iter().map(String::as_str).collect();
            let mut pointer = self.last_active.lock();
            if pointer
                .as_ref()
                .is_some_and(|p| removed_set.contains(p.endpoint.as_str()))
            {
                *pointer = None;
            }
        }
        Ok(removed)
    }

    /// Snapshot of the last-active pointer.
    pub fn last_active(&self) -> Option<SubscriberDbModel> {
        self.last_active.lock().clone()
    }

    pub(crate) fn set_last_active(&self, subscriber: Option<SubscriberDbModel>) {
        *self.last_active.lock() = subscriber;
    }

    /// Registration count, taken before a broadcast snapshots the registry.
    pub(crate) fn registration_epoch(&self) -> u64 {
        self.registrations.load(Ordering::Acquire)
    }

    /// Move the pointer to a broadcast's last delivery, unless a registration
    /// landed after `epoch`. Returns whether the pointer was replaced.
    pub(crate) fn settle_after_broadcast(
        &self,
        delivered: Option<SubscriberDbModel>,
        epoch: u64,
    ) -> bool {
        let mut pointer = self.last_active.lock();
        if self.registrations.load(Ordering::Acquire) != epoch {
            return false;
        }
        *pointer = delivered;
        true
    }

    /// Clear the pointer if it references `endpoint`. Returns whether it did.
    pub fn clear_last_active_if(&self, endpoint: &str) -> bool {
        let mut pointer = self.last_active.lock();
        if pointer.as_ref().is_some_and(|p| p.endpoint == endpoint) {
            *pointer = None;
            return true;
        }
        false
    }

    /// Re-arm the pointer from the most recently active stored subscriber.
    pub async fn restore_last_active(&self) -> Result<Option<SubscriberDbModel>> {
        let latest = self.repo.most_recently_active().await?;
        let mut pointer = self.last_active.lock();
        // A registration that raced with startup wins.
        if pointer.is_none() {
            pointer.clone_from(&latest);
        }
        Ok(pointer.clone())
    }
}

/// Endpoint and both keys must be present.
pub fn validate_subscriber(subscriber: &SubscriberDbModel) -> Result<()> {
    if subscriber.endpoint.trim().is_empty() {
        return Err(Error::validation("subscription endpoint is required"));
    }
    if subscriber.p256dh.trim().is_empty() || subscriber.auth.trim().is_empty() {
        return Err(Error::validation(
            "subscription keys p256dh and auth are required",
        ));
    }
    Ok(())
}
