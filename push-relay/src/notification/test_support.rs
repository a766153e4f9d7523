//! Test doubles shared by the notification unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::DeliveryConfig;
use crate::database::models::{BreakdownField, SubscriberDbModel};
use crate::database::repositories::{SqlxSubscriberRepository, SubscriberRepository};
use crate::database::{init_pool, run_migrations};
use crate::notification::engine::DeliveryEngine;
use crate::notification::outcome::TransportResponse;
use crate::notification::payload::NotificationPayload;
use crate::notification::registry::SubscriberRegistry;
use crate::notification::stats::StatsAccumulator;
use crate::notification::transport::PushTransport;
use crate::{Error, Result};

/// Transport answering with a scripted status per endpoint (201 when
/// unscripted), counting calls and peak concurrency.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    responses: Mutex<HashMap<String, std::result::Result<TransportResponse, String>>>,
    pub(crate) calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub(crate) max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn respond(&self, endpoint: &str, response: TransportResponse) {
        self.responses
            .lock()
            .insert(endpoint.to_string(), Ok(response));
    }

    pub(crate) fn fail(&self, endpoint: &str, error: &str) {
        self.responses
            .lock()
            .insert(endpoint.to_string(), Err(error.to_string()));
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for ScriptedTransport {
    async fn deliver(
        &self,
        _payload: &NotificationPayload,
        subscriber: &SubscriberDbModel,
        _ttl_secs: u32,
    ) -> Result<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self.responses.lock().get(&subscriber.endpoint).cloned();
        match scripted {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(Error::Other(message)),
            None => Ok(TransportResponse::new(201)),
        }
    }
}

/// Repository kept entirely in memory, for tests that run on a paused clock.
#[derive(Default)]
pub(crate) struct MemoryRepository {
    rows: Mutex<Vec<SubscriberDbModel>>,
    counter: AtomicUsize,
}

#[async_trait]
impl SubscriberRepository for MemoryRepository {
    async fn upsert(&self, subscriber: &SubscriberDbModel) -> Result<SubscriberDbModel> {
        let mut rows = self.rows.lock();
        if let Some(existing) = rows.iter_mut().find(|r| r.endpoint == subscriber.endpoint) {
            let last_active = subscriber.last_active.max(existing.last_active + 1);
            *existing = SubscriberDbModel {
                id: existing.id.clone(),
                created_at: existing.created_at,
                last_active,
                ..subscriber.clone()
            };
            return Ok(existing.clone());
        }
        rows.push(subscriber.clone());
        Ok(subscriber.clone())
    }

    async fn list_all(&self) -> Result<Vec<SubscriberDbModel>> {
        Ok(self.rows.lock().clone())
    }

    async fn count_all(&self) -> Result<u64> {
        Ok(self.rows.lock().len() as u64)
    }

    async fn delete(&self, endpoint: &str) -> Result<bool> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|r| r.endpoint != endpoint);
        Ok(rows.len() != before)
    }

    async fn delete_unrefreshed(&self, targets: &[(String, i64)]) -> Result<u64> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|r| {
            !targets
                .iter()
                .any(|(endpoint, seen)| r.endpoint == *endpoint && r.last_active <= *seen)
        });
        Ok((before - rows.len()) as u64)
    }

    async fn delete_inactive_before(&self, cutoff_ms: i64) -> Result<Vec<String>> {
        let mut rows = self.rows.lock();
        let removed = rows
            .iter()
            .filter(|r| r.last_active < cutoff_ms)
            .map(|r| r.endpoint.clone())
            .collect();
        rows.retain(|r| r.last_active >= cutoff_ms);
        Ok(removed)
    }

    async fn most_recently_active(&self) -> Result<Option<SubscriberDbModel>> {
        Ok(self
            .rows
            .lock()
            .iter()
            .max_by_key(|r| r.last_active)
            .cloned())
    }

    async fn count_by(&self, _field: BreakdownField) -> Result<Vec<(String, u64)>> {
        Ok(Vec::new())
    }

    async fn increment_counter(&self, n: u64) -> Result<()> {
        self.counter.fetch_add(n as usize, Ordering::SeqCst);
        Ok(())
    }

    async fn read_counter(&self) -> Result<u64> {
        Ok(self.counter.load(Ordering::SeqCst) as u64)
    }
}

pub(crate) fn build_engine(
    repo: Arc<dyn SubscriberRepository>,
    concurrency: usize,
) -> (DeliveryEngine, Arc<ScriptedTransport>, StatsAccumulator) {
    let registry = Arc::new(SubscriberRegistry::new(repo.clone()));
    let stats = StatsAccumulator::new(repo);
    let transport = Arc::new(ScriptedTransport::default());
    let config = DeliveryConfig {
        broadcast_concurrency: concurrency,
        ..DeliveryConfig::default()
    };
    let engine = DeliveryEngine::new(registry, stats.clone(), transport.clone(), &config);
    (engine, transport, stats)
}

/// Engine over a migrated in-memory SQLite database.
pub(crate) async fn sqlite_engine(
    concurrency: usize,
) -> (DeliveryEngine, Arc<ScriptedTransport>, StatsAccumulator) {
    let pool = init_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    build_engine(Arc::new(SqlxSubscriberRepository::new(pool)), concurrency)
}
