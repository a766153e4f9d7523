//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    /// The push service reported the subscription as permanently gone (404/410).
    #[error("Subscription is no longer valid: {endpoint} (status {status})")]
    SubscriptionGone { endpoint: String, status: u16 },

    /// Delivery failed but the subscription is kept.
    #[error("Failed to send notification (status {}): {body}", .status.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()))]
    TransientDelivery { status: Option<u16>, body: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {op} '{path}': {source}")]
    IoPath {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io_path(op: &'static str, path: &std::path::Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.display().to_string(),
            source,
        }
    }

    /// Whether this error originated in the persistence layer.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::DatabaseSqlx(_) | Self::Database(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_delivery_display() {
        let err = Error::TransientDelivery {
            status: Some(500),
            body: "rate limited".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to send notification (status 500): rate limited"
        );

        let err = Error::TransientDelivery {
            status: None,
            body: "connection reset".to_string(),
        };
        assert!(err.to_string().contains("status none"));
    }

    #[test]
    fn test_is_storage() {
        assert!(Error::Database("locked".to_string()).is_storage());
        assert!(!Error::validation("missing endpoint").is_storage());
    }
}
