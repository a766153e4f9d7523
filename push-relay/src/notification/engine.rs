//! Delivery engine.
//!
//! Fans a payload out to a target set through the [`PushTransport`],
//! classifies every response and applies the consequences: invalid
//! subscribers are pruned through the registry in one reconcile pass, the
//! last-active pointer follows the last successful delivery and the stats
//! counter grows by the number of deliveries.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DeliveryConfig;
use crate::database::models::SubscriberDbModel;
use crate::notification::outcome::{DeliveryOutcome, OutcomeKind};
use crate::notification::payload::NotificationPayload;
use crate::notification::registry::SubscriberRegistry;
use crate::notification::stats::StatsAccumulator;
use crate::notification::transport::PushTransport;
use crate::{Error, Result};

/// Aggregate result of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct BroadcastSummary {
    pub sent: usize,
    pub failed: usize,
}

pub struct DeliveryEngine {
    registry: Arc<SubscriberRegistry>,
    stats: StatsAccumulator,
    transport: Arc<dyn PushTransport>,
    ttl_secs: u32,
    concurrency: usize,
}

impl DeliveryEngine {
    pub fn new(
        registry: Arc<SubscriberRegistry>,
        stats: StatsAccumulator,
        transport: Arc<dyn PushTransport>,
        config: &DeliveryConfig,
    ) -> Self {
        Self {
            registry,
            stats,
            transport,
            ttl_secs: config.ttl_secs,
            concurrency: config.broadcast_concurrency.max(1),
        }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Invoke the transport once and classify the result. Never fails.
    async fn attempt(
        &self,
        payload: &NotificationPayload,
        subscriber: &SubscriberDbModel,
    ) -> DeliveryOutcome {
        let outcome = match self
            .transport
            .deliver(payload, subscriber, self.ttl_secs)
            .await
        {
            Ok(response) => DeliveryOutcome::from_response(&subscriber.endpoint, response),
            Err(e) => DeliveryOutcome::from_error(&subscriber.endpoint, e),
        };

        match outcome.kind {
            OutcomeKind::Delivered => {
                debug!(endpoint = %outcome.endpoint, status = ?outcome.status, "Notification delivered");
            }
            OutcomeKind::PermanentlyInvalid => {
                info!(endpoint = %outcome.endpoint, status = ?outcome.status, "Subscription is no longer valid");
            }
            OutcomeKind::TransientFailure => {
                warn!(
                    endpoint = %outcome.endpoint,
                    status = ?outcome.status,
                    body = outcome.detail.as_deref().unwrap_or_default(),
                    "Notification delivery failed"
                );
            }
        }
        outcome
    }

    /// Deliver `payload` to every target.
    ///
    /// Per-target failures are counted, never raised. Storage errors while
    /// pruning or counting are returned after the pointer has been updated.
    pub async fn broadcast(
        &self,
        payload: &NotificationPayload,
        targets: Vec<SubscriberDbModel>,
    ) -> Result<BroadcastSummary> {
        payload.validate()?;
        let epoch = self.registry.registration_epoch();
        self.broadcast_snapshot(payload, targets, epoch).await
    }

    /// `epoch` is the registration count observed before `targets` was taken.
    async fn broadcast_snapshot(
        &self,
        payload: &NotificationPayload,
        targets: Vec<SubscriberDbModel>,
        epoch: u64,
    ) -> Result<BroadcastSummary> {
        if targets.is_empty() {
            info!("No subscribers to broadcast to");
            return Ok(BroadcastSummary::default());
        }

        info!(targets = targets.len(), "Broadcasting notification");

        // `buffered` keeps outcomes in target order.
        let outcomes: Vec<DeliveryOutcome> = stream::iter(targets.iter().cloned())
            .map(move |target| async move { self.attempt(payload, &target).await })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut surviving = HashSet::with_capacity(outcomes.len());
        let mut last_delivered: Option<&SubscriberDbModel> = None;
        let mut sent = 0usize;
        for (target, outcome) in targets.iter().zip(&outcomes) {
            match outcome.kind {
                OutcomeKind::Delivered => {
                    sent += 1;
                    last_delivered = Some(target);
                    surviving.insert(target.endpoint.clone());
                }
                OutcomeKind::TransientFailure => {
                    surviving.insert(target.endpoint.clone());
                }
                OutcomeKind::PermanentlyInvalid => {}
            }
        }
        let summary = BroadcastSummary {
            sent,
            failed: outcomes.len() - sent,
        };

        let reconciled = self.registry.reconcile(&targets, &surviving).await;
        if !self
            .registry
            .settle_after_broadcast(last_delivered.cloned(), epoch)
        {
            debug!("Subscriber registered during broadcast, keeping its pointer");
        }
        let counted = self.stats.increment(sent as u64).await;

        info!(sent = summary.sent, failed = summary.failed, "Broadcast finished");

        reconciled?;
        counted?;
        Ok(summary)
    }

    /// Broadcast to everyone currently registered.
    pub async fn broadcast_all(&self, payload: &NotificationPayload) -> Result<BroadcastSummary> {
        payload.validate()?;
        let epoch = self.registry.registration_epoch();
        let targets = self.registry.list().await;
        self.broadcast_snapshot(payload, targets, epoch).await
    }

    /// Deliver `payload` to a single subscriber.
    ///
    /// A permanently invalid subscriber is removed and reported as
    /// [`Error::SubscriptionGone`]; a transient failure leaves the registry
    /// untouched and is reported as [`Error::TransientDelivery`].
    pub async fn send_one(
        &self,
        payload: &NotificationPayload,
        target: &SubscriberDbModel,
    ) -> Result<()> {
        payload.validate()?;
        let outcome = self.attempt(payload, target).await;

        match outcome.kind {
            OutcomeKind::Delivered => self.stats.increment(1).await,
            OutcomeKind::PermanentlyInvalid => {
                self.registry.clear_last_active_if(&target.endpoint);
                self.registry.remove(&target.endpoint).await?;
                Err(Error::SubscriptionGone {
                    endpoint: outcome.endpoint,
                    status: outcome.status.unwrap_or_default(),
                })
            }
            OutcomeKind::TransientFailure => Err(Error::TransientDelivery {
                status: outcome.status,
                body: outcome.detail.unwrap_or_default(),
            }),
        }
    }
}
