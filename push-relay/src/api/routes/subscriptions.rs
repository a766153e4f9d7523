//! Subscription registration route.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::{ConnectInfo, FromRequestParts, State, rejection::JsonRejection},
    http::{HeaderMap, header, request::Parts},
    routing::post,
};
use tracing::info;

use crate::api::error::ApiResult;
use crate::api::models::{StatusResponse, SubscribeRequest};
use crate::api::server::AppState;
use crate::enrichment::{RequestMetadata, client_ip};

pub fn router() -> Router<AppState> {
    Router::new().route("/subscribe", post(subscribe))
}

/// Socket peer address, when the server was started with connect info.
pub struct PeerAddr(pub Option<SocketAddr>);

impl<S: Send + Sync> FromRequestParts<S> for PeerAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0),
        ))
    }
}

fn header_str(headers: &HeaderMap, name: impl header::AsHeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn request_metadata(
    req: &SubscribeRequest,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> RequestMetadata {
    RequestMetadata {
        ip: client_ip(header_str(headers, "x-forwarded-for"), peer),
        user_agent: header_str(headers, header::USER_AGENT).map(str::to_string),
        platform: req.platform.clone(),
        platform_version: req.platform_version.clone(),
        browser: req.browser.clone(),
        browser_version: req.browser_version.clone(),
    }
}

#[utoipa::path(
    post,
    path = "/subscribe",
    tag = "subscriptions",
    request_body = SubscribeRequest,
    responses(
        (status = 200, description = "Subscription stored", body = StatusResponse),
        (status = 400, description = "Malformed or incomplete subscription", body = crate::api::error::ApiErrorResponse),
        (status = 500, description = "Storage failure", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn subscribe(
    State(state): State<AppState>,
    PeerAddr(peer): PeerAddr,
    headers: HeaderMap,
    body: Result<Json<SubscribeRequest>, JsonRejection>,
) -> ApiResult<Json<StatusResponse>> {
    let Json(req) = body?;
    let metadata = request_metadata(&req, &headers, peer);
    let client = state.context.enricher.classify(&metadata).await;

    let mut subscriber = req.to_subscriber();
    subscriber.ip = metadata.ip;
    subscriber.user_agent = metadata.user_agent;
    subscriber.platform = metadata.platform;
    subscriber.platform_version = metadata.platform_version;
    subscriber.nation = client.nation;
    subscriber.os = client.os;
    subscriber.os_version = client.os_version;
    subscriber.browser = client.browser;
    subscriber.browser_version = client.browser_version;

    let stored = state.context.registry.register(subscriber).await?;
    info!(
        endpoint = %stored.endpoint,
        ip = stored.ip.as_deref().unwrap_or("-"),
        nation = stored.nation.as_deref().unwrap_or("-"),
        os = stored.os.as_deref().unwrap_or("-"),
        browser = stored.browser.as_deref().unwrap_or("-"),
        "Subscription received"
    );

    Ok(Json(StatusResponse::new("ok")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_request_metadata_prefers_forwarded_for() {
        let req = SubscribeRequest {
            platform: Some("Windows".to_string()),
            platform_version: Some("15.0.0".to_string()),
            ..Default::default()
        };
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));

        let meta = request_metadata(&req, &headers, "127.0.0.1:9000".parse().ok());
        assert_eq!(meta.ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(meta.user_agent.as_deref(), Some("Mozilla/5.0"));
        assert_eq!(meta.platform.as_deref(), Some("Windows"));

        let meta = request_metadata(&req, &HeaderMap::new(), "127.0.0.1:9000".parse().ok());
        assert_eq!(meta.ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(meta.user_agent, None);
    }
}
