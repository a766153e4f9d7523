//! Scheduled broadcaster.
//!
//! Re-sends a fixed notification to the last-active subscriber on a fixed
//! interval. Idle while the registry has no last-active pointer, armed while
//! it has one. Runs until its cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Error;
use crate::notification::engine::DeliveryEngine;
use crate::notification::payload::NotificationPayload;

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No last-active subscriber.
    Idle,
    Delivered,
    /// The subscriber was gone and has been removed; the broadcaster is idle now.
    Gone,
    Failed,
}

pub struct ScheduledBroadcaster {
    engine: Arc<DeliveryEngine>,
    interval: Duration,
    payload: NotificationPayload,
}

impl ScheduledBroadcaster {
    pub fn new(engine: Arc<DeliveryEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            payload: NotificationPayload::scheduled(),
        }
    }

    /// Spawn the broadcaster loop.
    pub fn start(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel_token).await })
    }

    pub async fn run(self, cancel_token: CancellationToken) {
        // First tick one full interval after start.
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = self.interval.as_secs(), "Scheduled broadcaster started");
        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    debug!("Scheduled broadcaster shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// Run one tick. Errors are logged, never returned.
    pub async fn tick(&self) -> TickOutcome {
        let Some(target) = self.engine.registry().last_active() else {
            debug!("No last active subscriber, skipping scheduled notification");
            return TickOutcome::Idle;
        };

        debug!(endpoint = %target.endpoint, "Sending scheduled notification");
        match self.engine.send_one(&self.payload, &target).await {
            Ok(()) => {
                info!(endpoint = %target.endpoint, "Scheduled notification sent");
                TickOutcome::Delivered
            }
            Err(Error::SubscriptionGone { .. }) => {
                info!(endpoint = %target.endpoint, "Scheduled target is gone, broadcaster idle");
                TickOutcome::Gone
            }
            Err(e) => {
                warn!(endpoint = %target.endpoint, error = %e, "Scheduled notification failed");
                TickOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::SubscriberDbModel;
    use crate::notification::outcome::TransportResponse;
    use crate::notification::test_support::{MemoryRepository, build_engine};

    #[tokio::test]
    async fn test_tick_state_machine() {
        let (engine, transport, stats) = build_engine(Arc::new(MemoryRepository::default()), 4);
        let engine = Arc::new(engine);
        let broadcaster = ScheduledBroadcaster::new(engine.clone(), Duration::from_secs(60));

        assert_eq!(broadcaster.tick().await, TickOutcome::Idle);
        assert_eq!(transport.calls(), 0);

        engine
            .registry()
            .register(SubscriberDbModel::new("https://e/a", "k", "a"))
            .await
            .unwrap();
        assert_eq!(broadcaster.tick().await, TickOutcome::Delivered);
        assert_eq!(stats.read().await.unwrap(), 1);

        transport.respond("https://e/a", TransportResponse::new(503));
        assert_eq!(broadcaster.tick().await, TickOutcome::Failed);
        assert!(engine.registry().last_active().is_some());

        transport.respond("https://e/a", TransportResponse::new(410));
        assert_eq!(broadcaster.tick().await, TickOutcome::Gone);
        assert!(engine.registry().last_active().is_none());
        assert!(engine.registry().list().await.is_empty());

        assert_eq!(broadcaster.tick().await, TickOutcome::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_on_interval_until_cancelled() {
        let (engine, transport, _) = build_engine(Arc::new(MemoryRepository::default()), 4);
        let engine = Arc::new(engine);
        engine
            .registry()
            .register(SubscriberDbModel::new("https://e/a", "k", "a"))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let handle =
            ScheduledBroadcaster::new(engine.clone(), Duration::from_secs(60)).start(cancel.clone());

        // Nothing before the first interval has elapsed.
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(transport.calls(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(transport.calls(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.calls(), 2);

        cancel.cancel();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(transport.calls(), 2);
    }
}
