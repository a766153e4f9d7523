//! API route modules.
//!
//! The push routes sit at the root where browser pages expect them; admin
//! and health routes are nested.

pub mod health;
pub mod logging;
pub mod notifications;
pub mod stats;
pub mod subscriptions;
pub mod vapid;

use axum::{Router, routing::get};

use crate::api::openapi;
use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(subscriptions::router())
        .merge(notifications::router())
        .merge(vapid::router())
        .nest("/api", stats::router())
        .nest("/api/logging", logging::router())
        .route("/api/openapi.json", get(openapi::openapi_json))
        .nest("/health", health::router())
        .with_state(state)
}
