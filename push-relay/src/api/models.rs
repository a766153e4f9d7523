//! API request and response models (DTOs).
//!
//! Field names follow what browsers send from `PushSubscription.toJSON()`
//! plus the extra hints the subscribe page collects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::database::models::SubscriberDbModel;
use crate::notification::NotificationPayload;

// ============================================================================
// Subscriptions
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionKeys {
    #[serde(default)]
    pub p256dh: String,
    #[serde(default)]
    pub auth: String,
}

/// Body of `POST /subscribe`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SubscribeRequest {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub keys: SubscriptionKeys,
    /// `navigator.userAgentData.platform`
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default, alias = "platformVersion")]
    pub platform_version: Option<String>,
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default, alias = "browserVersion")]
    pub browser_version: Option<String>,
}

impl SubscribeRequest {
    /// A bare record carrying only the delivery fields.
    pub fn to_subscriber(&self) -> SubscriberDbModel {
        SubscriberDbModel::new(&self.endpoint, &self.keys.p256dh, &self.keys.auth)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// Notification fields accepted from callers. Anything omitted is empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct NotificationContent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub badge: String,
    #[serde(default)]
    pub tag: String,
}

impl NotificationContent {
    pub fn to_payload(&self) -> NotificationPayload {
        NotificationPayload::new(&self.title, &self.body)
            .with_icon(&self.icon)
            .with_badge(&self.badge)
            .with_tag(&self.tag)
    }
}

/// Body of `POST /send-notification`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SendNotificationRequest {
    pub subscription: SubscribeRequest,
    #[serde(flatten)]
    pub content: NotificationContent,
}

// ============================================================================
// Stats
// ============================================================================

/// Body of `GET /api/stats`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatsResponse {
    pub total_clients: u64,
    /// Every stored subscriber counts as online.
    pub online_clients: u64,
    pub total_pushes: u64,
    /// Region code to subscriber count; subscribers without a region are left out.
    pub countries: BTreeMap<String, u64>,
    pub browsers: BTreeMap<String, u64>,
    pub operating_systems: BTreeMap<String, u64>,
    pub subscriptions: Vec<SubscriberDbModel>,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LivenessResponse {
    /// Always "alive" if responding
    pub status: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReadinessResponse {
    pub status: String,
    pub database: String,
}
