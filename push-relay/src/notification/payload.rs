//! Notification payload delivered to the browser's service worker.

use serde::{Deserialize, Serialize};

use crate::utils::text::truncate_string;
use crate::{Error, Result};

/// Push services reject bodies much above 4 KiB once encrypted.
pub const MAX_PAYLOAD_BYTES: usize = 3500;
const MAX_TITLE_CHARS: usize = 120;
const MAX_BODY_CHARS: usize = 600;
const FALLBACK_TITLE_CHARS: usize = 80;
const FALLBACK_TAG_CHARS: usize = 64;
const FALLBACK_BODY: &str = "Open the app to view details.";

pub const VIBRATION_PATTERN: [u32; 3] = [200, 100, 200];

pub const SCHEDULED_TITLE: &str = "Scheduled Notification";
pub const SCHEDULED_BODY: &str = "This is an automatic notification from the backend.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub vibrate: Vec<u32>,
}

impl NotificationPayload {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            icon: String::new(),
            badge: String::new(),
            tag: String::new(),
            vibrate: VIBRATION_PATTERN.to_vec(),
        }
    }

    /// Payload used by the scheduled broadcaster.
    pub fn scheduled() -> Self {
        Self::new(SCHEDULED_TITLE, SCHEDULED_BODY)
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn with_badge(mut self, badge: impl Into<String>) -> Self {
        self.badge = badge.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// A payload needs a title or a body, and must fit in [`MAX_PAYLOAD_BYTES`]
    /// once capped.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() && self.body.trim().is_empty() {
            return Err(Error::validation(
                "notification needs a non-empty title or body",
            ));
        }
        self.to_bytes_capped(MAX_PAYLOAD_BYTES).map(|_| ())
    }

    /// Serialize to JSON, shortening text fields so the result fits in `max_bytes`.
    pub fn to_bytes_capped(&self, max_bytes: usize) -> Result<Vec<u8>> {
        let mut capped = self.clone();
        capped.title = truncate_string(&self.title, MAX_TITLE_CHARS);
        capped.body = truncate_string(&self.body, MAX_BODY_CHARS);

        let bytes = serde_json::to_vec(&capped)?;
        if bytes.len() <= max_bytes {
            return Ok(bytes);
        }

        let minimal = Self {
            title: truncate_string(&capped.title, FALLBACK_TITLE_CHARS),
            body: FALLBACK_BODY.to_string(),
            icon: String::new(),
            badge: String::new(),
            tag: truncate_string(&capped.tag, FALLBACK_TAG_CHARS),
            ..capped
        };
        let bytes = serde_json::to_vec(&minimal)?;
        if bytes.len() > max_bytes {
            return Err(Error::validation(format!(
                "notification payload exceeds {} bytes",
                max_bytes
            )));
        }
        Ok(bytes)
    }
}
