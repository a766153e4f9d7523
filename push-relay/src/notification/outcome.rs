//! Delivery outcome classification.

use serde::Serialize;

/// Three-way classification of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The push service accepted the message.
    Delivered,
    /// The subscription is gone for good and should be dropped.
    PermanentlyInvalid,
    /// Anything else that went wrong; the subscription is kept.
    TransientFailure,
}

/// Classify a push service HTTP status.
///
/// 404 and 410 mean the subscription no longer exists; any other status
/// `>= 400` is a transient failure; everything below 400 counts as delivered.
pub fn classify(status: u16) -> OutcomeKind {
    match status {
        404 | 410 => OutcomeKind::PermanentlyInvalid,
        s if s >= 400 => OutcomeKind::TransientFailure,
        _ => OutcomeKind::Delivered,
    }
}

/// Raw response of the transport for one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Option<String>,
}

impl TransportResponse {
    pub fn new(status: u16) -> Self {
        Self { status, body: None }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Classified result of delivering one payload to one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub endpoint: String,
    pub kind: OutcomeKind,
    /// Transport status; `None` when the request never produced a response.
    pub status: Option<u16>,
    /// Response body or error text, if any.
    pub detail: Option<String>,
}

impl DeliveryOutcome {
    pub fn from_response(endpoint: impl Into<String>, response: TransportResponse) -> Self {
        Self {
            endpoint: endpoint.into(),
            kind: classify(response.status),
            status: Some(response.status),
            detail: response.body,
        }
    }

    /// A transport-level error (connection, encryption, bad key) with no HTTP status.
    pub fn from_error(endpoint: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            endpoint: endpoint.into(),
            kind: OutcomeKind::TransientFailure,
            status: None,
            detail: Some(error.to_string()),
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.kind == OutcomeKind::Delivered
    }
}
