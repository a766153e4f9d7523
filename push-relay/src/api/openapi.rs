//! OpenAPI documentation configuration.
//!
//! The document is generated with `utoipa` and served as JSON at
//! `/api/openapi.json`.

use axum::Json;
use utoipa::OpenApi;

use crate::api::error::ApiErrorResponse;
use crate::api::models::{
    LivenessResponse, NotificationContent, ReadinessResponse, SendNotificationRequest,
    StatsResponse, StatusResponse, SubscribeRequest, SubscriptionKeys,
};
use crate::api::routes::logging::{LoggingConfigResponse, UpdateLogFilterRequest};
use crate::database::models::SubscriberDbModel;
use crate::notification::BroadcastSummary;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "push-relay API",
        version = "0.1.0",
        description = "Web Push relay: subscriber registration, single and broadcast delivery, and delivery statistics.",
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:10040", description = "Local development server")
    ),
    tags(
        (name = "health", description = "Health check endpoints for monitoring and orchestration"),
        (name = "subscriptions", description = "Push subscription registration"),
        (name = "notifications", description = "Single and broadcast delivery"),
        (name = "stats", description = "Subscriber and delivery statistics"),
        (name = "logging", description = "Logging configuration endpoints")
    ),
    paths(
        crate::api::routes::health::readiness_check,
        crate::api::routes::health::liveness_check,
        crate::api::routes::subscriptions::subscribe,
        crate::api::routes::vapid::get_public_key,
        crate::api::routes::notifications::send_notification,
        crate::api::routes::notifications::send_broadcast,
        crate::api::routes::stats::get_stats,
        crate::api::routes::logging::get_logging_config,
        crate::api::routes::logging::update_logging_config,
    ),
    components(schemas(
        ApiErrorResponse,
        SubscriptionKeys,
        SubscribeRequest,
        StatusResponse,
        NotificationContent,
        SendNotificationRequest,
        BroadcastSummary,
        StatsResponse,
        SubscriberDbModel,
        LivenessResponse,
        ReadinessResponse,
        LoggingConfigResponse,
        UpdateLogFilterRequest,
    ))
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
