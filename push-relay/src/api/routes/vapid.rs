//! VAPID public key for `PushManager.subscribe({ applicationServerKey })`.

use axum::{Router, extract::State, routing::get};

use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/vapid-public-key", get(get_public_key))
}

/// Returns the base64url application server key as plain text.
#[utoipa::path(
    get,
    path = "/vapid-public-key",
    tag = "subscriptions",
    responses(
        (status = 200, description = "Base64url encoded uncompressed P-256 public key", body = String, content_type = "text/plain")
    )
)]
pub async fn get_public_key(State(state): State<AppState>) -> String {
    state.context.vapid_public_key().to_string()
}
