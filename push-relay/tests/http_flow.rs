//! End-to-end tests over real sockets: the relay's HTTP API in front of the
//! production Web Push transport, delivering to a local fake push service.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use p256::elliptic_curve::rand_core::{OsRng, RngCore};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use parking_lot::Mutex;

use push_relay::api::server::{AppState, build_router};
use push_relay::config::{ServiceConfig, vapid};
use push_relay::database::{init_pool, run_migrations};
use push_relay::services::ServiceContext;
use push_relay::utils::http_client::build_client;

/// One request as seen by the fake push service.
#[derive(Debug, Clone)]
struct Received {
    id: String,
    headers: HeaderMap,
    body_len: usize,
}

#[derive(Clone, Default)]
struct PushService {
    received: Arc<Mutex<Vec<Received>>>,
}

async fn push_handler(
    State(service): State<PushService>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let attempts = {
        let mut received = service.received.lock();
        received.push(Received {
            id: id.clone(),
            headers,
            body_len: body.len(),
        });
        received.iter().filter(|r| r.id == id).count()
    };

    match id.as_str() {
        "gone" => (StatusCode::GONE, HeaderMap::new(), "push subscription has unsubscribed or expired"),
        "throttled" if attempts == 1 => {
            let mut headers = HeaderMap::new();
            headers.insert("Retry-After", "1".parse().unwrap());
            (StatusCode::TOO_MANY_REQUESTS, headers, "slow down")
        }
        _ => (StatusCode::CREATED, HeaderMap::new(), ""),
    }
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

/// A browser-side subscription key pair.
fn client_keys() -> (String, String) {
    let secret = p256::SecretKey::random(&mut OsRng);
    let public = secret.public_key().to_encoded_point(false);
    let mut auth = [0u8; 16];
    OsRng.fill_bytes(&mut auth);
    (
        URL_SAFE_NO_PAD.encode(public.as_bytes()),
        URL_SAFE_NO_PAD.encode(auth),
    )
}

struct Relay {
    base: String,
    push_base: String,
    push: PushService,
    context: Arc<ServiceContext>,
    client: reqwest::Client,
}

async fn start_relay() -> Relay {
    let push = PushService::default();
    let push_addr = spawn(
        Router::new()
            .route("/push/{id}", post(push_handler))
            .with_state(push.clone()),
    )
    .await;

    let (public, private) = vapid::generate_keypair_b64();
    let env = HashMap::from([
        ("WEB_PUSH_VAPID_PUBLIC_KEY", public),
        ("WEB_PUSH_VAPID_PRIVATE_KEY", private),
        ("GEOIP_LOOKUP_URL", String::new()),
    ]);
    let config = ServiceConfig::from_lookup(|k| env.get(k).cloned()).unwrap();

    let pool = init_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    let context = Arc::new(ServiceContext::new(config, pool).unwrap());

    let relay_addr = spawn(build_router(AppState::new(context.clone()), true)).await;

    Relay {
        base: format!("http://{}", relay_addr),
        push_base: format!("http://{}/push", push_addr),
        push,
        context,
        client: build_client(Duration::from_secs(10)).unwrap(),
    }
}

impl Relay {
    async fn subscribe(&self, id: &str) -> reqwest::Response {
        let (p256dh, auth) = client_keys();
        self.client
            .post(format!("{}/subscribe", self.base))
            .json(&serde_json::json!({
                "endpoint": format!("{}/{}", self.push_base, id),
                "keys": {"p256dh": p256dh, "auth": auth},
                "platform": "macOS",
                "platformVersion": "14.2.1"
            }))
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_broadcast_through_web_push_transport() {
    let relay = start_relay().await;
    for id in ["a", "gone", "throttled"] {
        assert_eq!(relay.subscribe(id).await.status(), 200);
    }

    let summary: serde_json::Value = relay
        .client
        .post(format!("{}/send-broadcast", relay.base))
        .json(&serde_json::json!({"title": "Release", "body": "v2 is out"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary, serde_json::json!({"sent": 2, "failed": 1}));

    let received = relay.push.received.lock().clone();
    // The throttled endpoint was retried once after its Retry-After.
    assert_eq!(received.iter().filter(|r| r.id == "throttled").count(), 2);
    for request in &received {
        let header = |name: &str| request.headers.get(name).unwrap().to_str().unwrap().to_string();
        assert_eq!(header("content-encoding"), "aes128gcm");
        assert_eq!(header("ttl"), "30");
        assert_eq!(header("urgency"), "normal");
        assert!(header("authorization").starts_with("vapid t="));
        assert!(header("authorization").ends_with(relay.context.vapid_public_key()));
        assert!(header("crypto-key").starts_with("dh="));
        assert!(request.body_len > 0);
    }

    let stats: serde_json::Value = relay
        .client
        .get(format!("{}/api/stats", relay.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total_clients"], 2);
    assert_eq!(stats["total_pushes"], 2);
    assert_eq!(stats["operating_systems"]["macOS"], 2);
    for sub in stats["subscriptions"].as_array().unwrap() {
        assert_eq!(sub["ip"], "127.0.0.1");
        assert_eq!(sub["os_version"], "14.2.1");
        assert!(sub["nation"].is_null());
    }
}

#[tokio::test]
async fn test_send_notification_to_gone_subscription() {
    let relay = start_relay().await;
    assert_eq!(relay.subscribe("gone").await.status(), 200);
    let stored = relay.context.registry.list().await.remove(0);

    let response = relay
        .client
        .post(format!("{}/send-notification", relay.base))
        .json(&serde_json::json!({
            "subscription": {
                "endpoint": stored.endpoint,
                "keys": {"p256dh": stored.p256dh, "auth": stored.auth}
            },
            "title": "Ping"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 410);
    assert!(relay.context.registry.list().await.is_empty());
    assert!(relay.context.registry.last_active().is_none());
}

#[tokio::test]
async fn test_vapid_key_matches_configuration() {
    let relay = start_relay().await;
    let key = relay
        .client
        .get(format!("{}/vapid-public-key", relay.base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(key, relay.context.vapid_public_key());
    assert_eq!(URL_SAFE_NO_PAD.decode(&key).unwrap().len(), 65);
}
