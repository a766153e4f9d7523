//! Integration tests for the subscriber registry and delivery engine.
//!
//! These run against a real in-memory SQLite database with migrations
//! applied, and a scripted push transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use push_relay::config::DeliveryConfig;
use push_relay::database::models::SubscriberDbModel;
use push_relay::database::repositories::SqlxSubscriberRepository;
use push_relay::database::{DbPool, init_pool, run_migrations};
use push_relay::notification::{
    BroadcastSummary, DeliveryEngine, NotificationPayload, PushTransport, StatsAccumulator,
    SubscriberRegistry, TransportResponse,
};
use push_relay::{Error, Result};

/// Helper to create a test database pool with migrations applied.
async fn setup_test_db() -> DbPool {
    let pool = init_pool("sqlite::memory:")
        .await
        .expect("Failed to create test pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

#[derive(Default)]
struct StatusTransport {
    statuses: Mutex<HashMap<String, TransportResponse>>,
    calls: AtomicUsize,
}

impl StatusTransport {
    fn respond(&self, endpoint: &str, response: TransportResponse) {
        self.statuses.lock().insert(endpoint.to_string(), response);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for StatusTransport {
    async fn deliver(
        &self,
        _payload: &NotificationPayload,
        subscriber: &SubscriberDbModel,
        _ttl_secs: u32,
    ) -> Result<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .statuses
            .lock()
            .get(&subscriber.endpoint)
            .cloned()
            .unwrap_or_else(|| TransportResponse::new(201)))
    }
}

struct Harness {
    engine: DeliveryEngine,
    registry: Arc<SubscriberRegistry>,
    stats: StatsAccumulator,
    transport: Arc<StatusTransport>,
}

async fn harness() -> Harness {
    let pool = setup_test_db().await;
    let repo = Arc::new(SqlxSubscriberRepository::new(pool));
    let registry = Arc::new(SubscriberRegistry::new(repo.clone()));
    let stats = StatsAccumulator::new(repo);
    let transport = Arc::new(StatusTransport::default());
    let engine = DeliveryEngine::new(
        registry.clone(),
        stats.clone(),
        transport.clone(),
        &DeliveryConfig::default(),
    );
    Harness {
        engine,
        registry,
        stats,
        transport,
    }
}

async fn register(registry: &SubscriberRegistry, endpoint: &str) -> SubscriberDbModel {
    registry
        .register(SubscriberDbModel::new(endpoint, "client-key", "client-auth"))
        .await
        .expect("register")
}

async fn endpoints(registry: &SubscriberRegistry) -> Vec<String> {
    registry
        .list()
        .await
        .into_iter()
        .map(|s| s.endpoint)
        .collect()
}

fn payload() -> NotificationPayload {
    NotificationPayload::new("Hello", "World")
}

#[tokio::test]
async fn test_broadcast_prunes_gone_and_keeps_survivors() {
    let h = harness().await;
    for endpoint in ["https://e/a", "https://e/b", "https://e/c"] {
        register(&h.registry, endpoint).await;
    }
    h.transport.respond("https://e/a", TransportResponse::new(201));
    h.transport.respond("https://e/b", TransportResponse::new(410));
    h.transport.respond("https://e/c", TransportResponse::new(200));

    let summary = h.engine.broadcast_all(&payload()).await.unwrap();

    assert_eq!(summary, BroadcastSummary { sent: 2, failed: 1 });
    assert_eq!(endpoints(&h.registry).await, vec!["https://e/a", "https://e/c"]);
    assert_eq!(h.stats.read().await.unwrap(), 2);
    assert_eq!(h.registry.last_active().unwrap().endpoint, "https://e/c");
}

#[tokio::test]
async fn test_broadcast_keeps_transient_failures() {
    let h = harness().await;
    for endpoint in ["https://e/a", "https://e/b"] {
        register(&h.registry, endpoint).await;
    }
    h.transport.respond("https://e/a", TransportResponse::new(429));
    h.transport.respond("https://e/b", TransportResponse::new(503));

    let summary = h.engine.broadcast_all(&payload()).await.unwrap();

    assert_eq!(summary, BroadcastSummary { sent: 0, failed: 2 });
    assert_eq!(endpoints(&h.registry).await, vec!["https://e/a", "https://e/b"]);
    assert_eq!(h.stats.read().await.unwrap(), 0);
    // Nothing was delivered, so the scheduled broadcaster goes idle.
    assert!(h.registry.last_active().is_none());
}

#[tokio::test]
async fn test_empty_broadcast_touches_nothing() {
    let h = harness().await;

    let summary = h.engine.broadcast_all(&payload()).await.unwrap();

    assert_eq!(summary, BroadcastSummary::default());
    assert_eq!(h.transport.calls(), 0);
    assert_eq!(h.stats.read().await.unwrap(), 0);
    assert!(h.registry.list().await.is_empty());
}

#[tokio::test]
async fn test_send_one_gone_removes_and_clears_pointer() {
    let h = harness().await;
    let target = register(&h.registry, "https://e/a").await;
    h.transport.respond("https://e/a", TransportResponse::new(404));

    let err = h.engine.send_one(&payload(), &target).await.unwrap_err();

    assert!(matches!(err, Error::SubscriptionGone { status: 404, .. }));
    assert!(h.registry.list().await.is_empty());
    assert!(h.registry.last_active().is_none());
    assert_eq!(h.stats.read().await.unwrap(), 0);
}

#[tokio::test]
async fn test_send_one_transient_surfaces_status_and_body() {
    let h = harness().await;
    let target = register(&h.registry, "https://e/a").await;
    h.transport.respond(
        "https://e/a",
        TransportResponse::new(500).with_body("rate limited"),
    );

    let err = h.engine.send_one(&payload(), &target).await.unwrap_err();

    match err {
        Error::TransientDelivery { status, body } => {
            assert_eq!(status, Some(500));
            assert_eq!(body, "rate limited");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(endpoints(&h.registry).await, vec!["https://e/a"]);
    assert_eq!(h.stats.read().await.unwrap(), 0);
    assert_eq!(h.registry.last_active().unwrap().endpoint, "https://e/a");
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    let h = harness().await;
    register(&h.registry, "https://e/a").await;
    register(&h.registry, "https://e/b").await;

    assert!(h.registry.remove("https://e/a").await.unwrap());
    let after_once = endpoints(&h.registry).await;
    assert!(!h.registry.remove("https://e/a").await.unwrap());

    assert_eq!(endpoints(&h.registry).await, after_once);
    assert_eq!(after_once, vec!["https://e/b"]);
}

#[tokio::test]
async fn test_reregistration_updates_in_place() {
    let h = harness().await;
    let first = register(&h.registry, "https://e/a").await;

    let mut again = SubscriberDbModel::new("https://e/a", "rotated-key", "rotated-auth");
    again.nation = Some("FR".to_string());
    let second = h.registry.register(again).await.unwrap();

    assert_eq!(h.registry.count().await.unwrap(), 1);
    assert_eq!(second.id, first.id);
    assert_eq!(second.created_at, first.created_at);
    assert!(second.last_active > first.last_active);
    assert_eq!(second.p256dh, "rotated-key");
    assert_eq!(second.nation.as_deref(), Some("FR"));
}

#[tokio::test]
async fn test_register_rejects_missing_fields() {
    let h = harness().await;
    for (endpoint, key, auth) in [("", "k", "a"), ("https://e/a", "", "a"), ("https://e/a", "k", " ")] {
        let err = h
            .registry
            .register(SubscriberDbModel::new(endpoint, key, auth))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
    assert_eq!(h.registry.count().await.unwrap(), 0);
    assert!(h.registry.last_active().is_none());
}

#[tokio::test]
async fn test_concurrent_sends_are_all_counted() {
    let h = harness().await;
    let engine = Arc::new(h.engine);
    let target = register(&h.registry, "https://e/a").await;

    let mut handles = Vec::new();
    for _ in 0..25 {
        let engine = engine.clone();
        let target = target.clone();
        handles.push(tokio::spawn(async move {
            engine.send_one(&payload(), &target).await
        }));
    }
    for _ in 0..5 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.broadcast_all(&payload()).await.map(|_| ())
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(h.stats.read().await.unwrap(), 30);
}

#[tokio::test]
async fn test_pointer_restored_from_most_recent_activity() {
    let pool = setup_test_db().await;
    let repo = Arc::new(SqlxSubscriberRepository::new(pool.clone()));
    let before_restart = SubscriberRegistry::new(repo.clone());
    register(&before_restart, "https://e/a").await;
    let b = register(&before_restart, "https://e/b").await;
    let mut a_again = SubscriberDbModel::new("https://e/a", "client-key", "client-auth");
    a_again.last_active = b.last_active + 1_000;
    before_restart.register(a_again).await.unwrap();

    let after_restart = SubscriberRegistry::new(repo);
    assert!(after_restart.last_active().is_none());
    let restored = after_restart.restore_last_active().await.unwrap();

    assert_eq!(restored.unwrap().endpoint, "https://e/a");
    assert_eq!(after_restart.last_active().unwrap().endpoint, "https://e/a");
}
