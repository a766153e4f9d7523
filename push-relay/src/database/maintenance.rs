//! Database maintenance.
//!
//! Periodically prunes subscribers that have not re-registered within the
//! configured retention window.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::database::time::days_ago_ms;
use crate::notification::SubscriberRegistry;

/// Configuration for the maintenance scheduler.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Interval between runs (default: 24 hours).
    pub interval: Duration,
    /// Subscribers inactive for longer than this many days are removed.
    pub subscriber_retention_days: u32,
}

impl MaintenanceConfig {
    pub fn new(subscriber_retention_days: u32) -> Self {
        Self {
            interval: Duration::from_secs(24 * 60 * 60),
            subscriber_retention_days,
        }
    }
}

/// Database maintenance scheduler.
pub struct MaintenanceScheduler {
    registry: Arc<SubscriberRegistry>,
    config: MaintenanceConfig,
}

impl MaintenanceScheduler {
    pub fn new(registry: Arc<SubscriberRegistry>, config: MaintenanceConfig) -> Self {
        Self { registry, config }
    }

    /// Start the maintenance loop; the first run happens right away.
    pub fn start(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval);
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        tracing::debug!("Maintenance scheduler shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = self.run_maintenance().await {
                            tracing::error!("Maintenance error: {}", e);
                        }
                    }
                }
            }
        })
    }

    /// Run all maintenance tasks. Returns the number of pruned subscribers.
    pub async fn run_maintenance(&self) -> Result<usize, crate::Error> {
        let cutoff = days_ago_ms(self.config.subscriber_retention_days);
        let removed = self.registry.prune_inactive(cutoff).await?;
        if !removed.is_empty() {
            tracing::info!(
                count = removed.len(),
                retention_days = self.config.subscriber_retention_days,
                "Pruned inactive subscribers"
            );
        }
        Ok(removed.len())
    }
}
