//! Logging API routes.
//!
//! Read and replace the live log filter directive.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::get,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;

/// Request to update the log filter.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateLogFilterRequest {
    pub filter: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoggingConfigResponse {
    pub filter: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_logging_config).put(update_logging_config))
}

#[utoipa::path(
    get,
    path = "/api/logging",
    tag = "logging",
    responses(
        (status = 200, description = "Current filter directive", body = LoggingConfigResponse),
        (status = 503, description = "Logging is not reloadable in this process", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn get_logging_config(
    State(state): State<AppState>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    let logging = state
        .logging_config
        .ok_or_else(|| ApiError::service_unavailable("Logging configuration not available"))?;
    Ok(Json(LoggingConfigResponse {
        filter: logging.get_filter(),
    }))
}

#[utoipa::path(
    put,
    path = "/api/logging",
    tag = "logging",
    request_body = UpdateLogFilterRequest,
    responses(
        (status = 200, description = "Filter applied", body = LoggingConfigResponse),
        (status = 400, description = "Invalid directive", body = crate::api::error::ApiErrorResponse),
        (status = 503, description = "Logging is not reloadable in this process", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn update_logging_config(
    State(state): State<AppState>,
    body: Result<Json<UpdateLogFilterRequest>, JsonRejection>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    let Json(req) = body?;
    let logging = state
        .logging_config
        .ok_or_else(|| ApiError::service_unavailable("Logging configuration not available"))?;
    logging
        .set_filter(&req.filter)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(Json(LoggingConfigResponse {
        filter: logging.get_filter(),
    }))
}
