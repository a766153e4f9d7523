//! Service configuration.
//!
//! Everything is read once at startup from the process environment (after
//! `dotenvy` has loaded a `.env` file, if any) and then shared read-only
//! through [`crate::services::ServiceContext`].

pub mod vapid;

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

pub use vapid::VapidCredentials;

use crate::Result;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:data/webpush.db?mode=rwc";
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 10040;
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_TTL_SECS: u32 = 30;
pub const DEFAULT_BROADCAST_CONCURRENCY: usize = 16;
pub const DEFAULT_SCHEDULED_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_GEOIP_LOOKUP_URL: &str = "http://ip-api.com/line/{ip}?fields=countryCode";

/// Delivery tuning shared by the engine and the transport.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// `TTL` header sent with every push message.
    pub ttl_secs: u32,
    /// Maximum number of in-flight transport calls during a broadcast.
    pub broadcast_concurrency: usize,
    /// Interval of the scheduled re-send to the last active subscriber.
    pub scheduled_interval: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            broadcast_concurrency: DEFAULT_BROADCAST_CONCURRENCY,
            scheduled_interval: Duration::from_secs(DEFAULT_SCHEDULED_INTERVAL_SECS),
        }
    }
}

/// An environment value that failed to parse and was replaced by its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFallback {
    pub key: String,
    pub value: String,
    pub default: String,
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub database_url: String,
    pub bind_address: String,
    pub port: u16,
    pub log_dir: String,
    pub vapid: VapidCredentials,
    pub delivery: DeliveryConfig,
    /// Region lookup URL template with an `{ip}` placeholder; `None` disables lookups.
    pub geoip_lookup_url: Option<String>,
    /// Prune subscribers inactive for this many days; `None` disables pruning.
    pub subscriber_retention_days: Option<u32>,
    /// Invalid values replaced while loading, reported by [`Self::log_fallbacks`].
    pub fallbacks: Vec<ConfigFallback>,
}

impl ServiceConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string_or = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let vapid = VapidCredentials::resolve(&lookup)?;
        let mut fallbacks = Vec::new();

        let delivery = DeliveryConfig {
            ttl_secs: parse_or(&lookup, &mut fallbacks, "WEB_PUSH_TTL_SECS", DEFAULT_TTL_SECS),
            broadcast_concurrency: parse_or(
                &lookup,
                &mut fallbacks,
                "BROADCAST_CONCURRENCY",
                DEFAULT_BROADCAST_CONCURRENCY,
            )
            .max(1),
            scheduled_interval: Duration::from_secs(
                parse_or(
                    &lookup,
                    &mut fallbacks,
                    "SCHEDULED_PUSH_INTERVAL_SECS",
                    DEFAULT_SCHEDULED_INTERVAL_SECS,
                )
                .max(1),
            ),
        };

        // An explicitly empty GEOIP_LOOKUP_URL disables region lookups.
        let geoip_lookup_url = match lookup("GEOIP_LOOKUP_URL") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v.trim().to_string()),
            None => Some(DEFAULT_GEOIP_LOOKUP_URL.to_string()),
        };

        let retention: u32 = parse_or(&lookup, &mut fallbacks, "SUBSCRIBER_RETENTION_DAYS", 0);

        Ok(Self {
            database_url: string_or("DATABASE_URL", DEFAULT_DATABASE_URL),
            bind_address: string_or("API_BIND_ADDRESS", DEFAULT_BIND_ADDRESS),
            port: parse_or(&lookup, &mut fallbacks, "API_PORT", DEFAULT_PORT),
            log_dir: string_or("LOG_DIR", DEFAULT_LOG_DIR),
            vapid,
            delivery,
            geoip_lookup_url,
            subscriber_retention_days: (retention > 0).then_some(retention),
            fallbacks,
        })
    }

    /// Warn about every fallback. Call once logging is initialized.
    pub fn log_fallbacks(&self) {
        for f in &self.fallbacks {
            warn!(key = %f.key, value = %f.value, default = %f.default, "Invalid configuration value, using default");
        }
    }
}

fn parse_or<F, T>(lookup: &F, fallbacks: &mut Vec<ConfigFallback>, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    let Some(raw) = lookup(key).map(|v| v.trim().to_string()) else {
        return default;
    };
    if raw.is_empty() {
        return default;
    }
    match raw.parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            fallbacks.push(ConfigFallback {
                key: key.to_string(),
                value: raw,
                default: default.to_string(),
            });
            default
        }
    }
}
