//! Notification delivery routes.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::post,
};
use tracing::info;

use crate::api::error::ApiResult;
use crate::api::models::{NotificationContent, SendNotificationRequest, StatusResponse};
use crate::api::server::AppState;
use crate::notification::{BroadcastSummary, validate_subscriber};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/send-notification", post(send_notification))
        .route("/send-broadcast", post(send_broadcast))
}

#[utoipa::path(
    post,
    path = "/send-notification",
    tag = "notifications",
    request_body = SendNotificationRequest,
    responses(
        (status = 200, description = "Notification delivered", body = StatusResponse),
        (status = 400, description = "Invalid subscription or payload", body = crate::api::error::ApiErrorResponse),
        (status = 410, description = "Subscription is gone and was removed", body = crate::api::error::ApiErrorResponse),
        (status = 502, description = "Push service rejected the message", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn send_notification(
    State(state): State<AppState>,
    body: Result<Json<SendNotificationRequest>, JsonRejection>,
) -> ApiResult<Json<StatusResponse>> {
    let Json(req) = body?;
    let target = req.subscription.to_subscriber();
    validate_subscriber(&target)?;

    info!(endpoint = %target.endpoint, "Sending notification");
    state
        .context
        .engine
        .send_one(&req.content.to_payload(), &target)
        .await?;

    Ok(Json(StatusResponse::new("sent")))
}

#[utoipa::path(
    post,
    path = "/send-broadcast",
    tag = "notifications",
    request_body = NotificationContent,
    responses(
        (status = 200, description = "Broadcast summary", body = BroadcastSummary),
        (status = 400, description = "Invalid payload", body = crate::api::error::ApiErrorResponse),
        (status = 500, description = "Storage failure while reconciling", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn send_broadcast(
    State(state): State<AppState>,
    body: Result<Json<NotificationContent>, JsonRejection>,
) -> ApiResult<Json<BroadcastSummary>> {
    let Json(content) = body?;
    let summary = state
        .context
        .engine
        .broadcast_all(&content.to_payload())
        .await?;
    Ok(Json(summary))
}
