//! Service context.
//!
//! Built once at startup and shared by the HTTP handlers and background
//! tasks. Holds the configuration, the database pool and every core
//! component, so nothing lives in global state.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Result;
use crate::config::ServiceConfig;
use crate::database::repositories::{SqlxSubscriberRepository, SubscriberRepository};
use crate::database::{DbPool, MaintenanceConfig, MaintenanceScheduler};
use crate::enrichment::{Enricher, HttpEnricher};
use crate::notification::{
    DeliveryEngine, PushTransport, ScheduledBroadcaster, StatsAccumulator, SubscriberRegistry,
    WebPushTransport,
};

/// Default timeout for graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ServiceContext {
    pub config: Arc<ServiceConfig>,
    pub pool: DbPool,
    pub registry: Arc<SubscriberRegistry>,
    pub stats: StatsAccumulator,
    pub engine: Arc<DeliveryEngine>,
    pub enricher: Arc<dyn Enricher>,
    cancellation_token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ServiceContext {
    /// Wire the production transport and enricher.
    pub fn new(config: ServiceConfig, pool: DbPool) -> Result<Self> {
        let transport = Arc::new(WebPushTransport::new(config.vapid.clone())?);
        let enricher = Arc::new(HttpEnricher::new(config.geoip_lookup_url.clone())?);
        Ok(Self::with_components(config, pool, transport, enricher))
    }

    /// Wire arbitrary transport and enricher implementations.
    pub fn with_components(
        config: ServiceConfig,
        pool: DbPool,
        transport: Arc<dyn PushTransport>,
        enricher: Arc<dyn Enricher>,
    ) -> Self {
        let repo: Arc<dyn SubscriberRepository> =
            Arc::new(SqlxSubscriberRepository::new(pool.clone()));
        let registry = Arc::new(SubscriberRegistry::new(repo.clone()));
        let stats = StatsAccumulator::new(repo);
        let engine = Arc::new(DeliveryEngine::new(
            registry.clone(),
            stats.clone(),
            transport,
            &config.delivery,
        ));

        Self {
            config: Arc::new(config),
            pool,
            registry,
            stats,
            engine,
            enricher,
            cancellation_token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Restore the last-active pointer and start the background tasks.
    pub async fn initialize(&self) -> Result<()> {
        info!("Initializing services");

        match self.registry.restore_last_active().await? {
            Some(subscriber) => {
                info!(endpoint = %subscriber.endpoint, "Restored last active subscriber")
            }
            None => info!("No subscribers yet, scheduled broadcaster idle"),
        }

        let mut tasks = self.tasks.lock();
        tasks.push(
            ScheduledBroadcaster::new(self.engine.clone(), self.config.delivery.scheduled_interval)
                .start(self.cancellation_token.child_token()),
        );

        if let Some(days) = self.config.subscriber_retention_days {
            info!(retention_days = days, "Inactive subscriber pruning enabled");
            tasks.push(
                MaintenanceScheduler::new(self.registry.clone(), MaintenanceConfig::new(days))
                    .start(self.cancellation_token.child_token()),
            );
        }

        info!("Services initialized");
        Ok(())
    }

    /// Shutdown all services gracefully.
    pub async fn shutdown(&self) {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Cancel background tasks, wait for them up to `timeout` and close the pool.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) {
        info!("Shutting down services (timeout: {:?})", timeout);
        self.cancellation_token.cancel();

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        let joined = tokio::time::timeout(timeout, futures::future::join_all(tasks)).await;
        if joined.is_err() {
            warn!("Shutdown timeout reached, forcing shutdown");
        }

        info!("Closing database pool...");
        self.pool.close().await;
        info!("Services shut down");
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn vapid_public_key(&self) -> &str {
        self.config.vapid.public_key_b64()
    }
}
