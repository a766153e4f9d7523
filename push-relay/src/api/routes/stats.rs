//! Subscriber and delivery statistics.

use std::collections::BTreeMap;

use axum::{Json, Router, extract::State, routing::get};

use crate::api::error::ApiResult;
use crate::api::models::StatsResponse;
use crate::api::server::AppState;
use crate::database::models::BreakdownField;

pub fn router() -> Router<AppState> {
    Router::new().route("/stats", get(get_stats))
}

#[utoipa::path(
    get,
    path = "/api/stats",
    tag = "stats",
    responses(
        (status = 200, description = "Subscriber counts, breakdowns and total deliveries", body = StatsResponse),
        (status = 500, description = "Storage failure", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let registry = &state.context.registry;

    let total_clients = registry.count().await?;
    let total_pushes = state.context.stats.read().await?;
    let countries = registry.breakdown(BreakdownField::Nation).await?;
    let browsers = registry.breakdown(BreakdownField::Browser).await?;
    let operating_systems = registry.breakdown(BreakdownField::Os).await?;
    let subscriptions = registry.list().await;

    Ok(Json(StatsResponse {
        total_clients,
        online_clients: total_clients,
        total_pushes,
        countries: BTreeMap::from_iter(countries),
        browsers: BTreeMap::from_iter(browsers),
        operating_systems: BTreeMap::from_iter(operating_systems),
        subscriptions,
    }))
}
