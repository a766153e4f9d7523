//! Subscriber database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::now_ms;

/// A registered Web Push endpoint plus the best-effort client metadata
/// captured when it (re-)registered.
///
/// `endpoint` is unique across the table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SubscriberDbModel {
    pub id: String,
    pub endpoint: String,
    /// Client ECDH public key (base64url).
    pub p256dh: String,
    /// Client auth secret (base64url).
    pub auth: String,
    pub ip: Option<String>,
    /// Region / country code.
    pub nation: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub platform: Option<String>,
    pub platform_version: Option<String>,
    pub user_agent: Option<String>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds, bumped on every re-registration.
    pub last_active: i64,
}

impl SubscriberDbModel {
    pub fn new(
        endpoint: impl Into<String>,
        p256dh: impl Into<String>,
        auth: impl Into<String>,
    ) -> Self {
        let now = now_ms();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            endpoint: endpoint.into(),
            p256dh: p256dh.into(),
            auth: auth.into(),
            ip: None,
            nation: None,
            os: None,
            os_version: None,
            browser: None,
            browser_version: None,
            platform: None,
            platform_version: None,
            user_agent: None,
            created_at: now,
            last_active: now,
        }
    }

    /// Keys the transport needs to encrypt for this subscriber.
    pub fn keys(&self) -> SubscriberKeys<'_> {
        SubscriberKeys {
            p256dh: &self.p256dh,
            auth: &self.auth,
        }
    }
}

/// Borrowed per-subscriber encryption material.
#[derive(Debug, Clone, Copy)]
pub struct SubscriberKeys<'a> {
    pub p256dh: &'a str,
    pub auth: &'a str,
}

/// Columns the stats endpoint can break subscriber counts down by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakdownField {
    Nation,
    Browser,
    Os,
}

impl BreakdownField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Nation => "nation",
            Self::Browser => "browser",
            Self::Os => "os",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_subscriber_timestamps() {
        let sub = SubscriberDbModel::new("https://push.example.com/a", "key", "auth");
        assert_eq!(sub.created_at, sub.last_active);
        assert!(sub.nation.is_none());
        assert_eq!(sub.keys().p256dh, "key");
        assert!(uuid::Uuid::parse_str(&sub.id).is_ok());
    }
}
