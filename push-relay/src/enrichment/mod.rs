//! Best-effort client metadata for subscriber records.
//!
//! Nothing here can fail a registration: every lookup yields `None` when the
//! answer is unknown.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::Result;
use crate::utils::http_client::build_client;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_REGION_LEN: usize = 16;

/// What the HTTP layer knows about a registering client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    /// `navigator.userAgentData.platform`
    pub platform: Option<String>,
    /// High-entropy `platformVersion` hint.
    pub platform_version: Option<String>,
    pub browser: Option<String>,
    pub browser_version: Option<String>,
}

/// Derived classification. `None` means unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub nation: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub browser: Option<String>,
    pub browser_version: Option<String>,
}

#[async_trait]
pub trait Enricher: Send + Sync {
    async fn classify(&self, metadata: &RequestMetadata) -> ClientInfo;
}

/// Enricher that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEnricher;

#[async_trait]
impl Enricher for NoopEnricher {
    async fn classify(&self, _metadata: &RequestMetadata) -> ClientInfo {
        ClientInfo::default()
    }
}

/// Region lookup over HTTP plus client-hint based OS and browser fields.
#[derive(Debug, Clone)]
pub struct HttpEnricher {
    client: reqwest::Client,
    /// URL with an `{ip}` placeholder; `None` disables region lookups.
    lookup_url: Option<String>,
}

impl HttpEnricher {
    pub fn new(lookup_url: Option<String>) -> Result<Self> {
        Ok(Self {
            client: build_client(LOOKUP_TIMEOUT)?,
            lookup_url,
        })
    }

    async fn lookup_region(&self, ip: &str) -> Option<String> {
        let template = self.lookup_url.as_deref()?;
        let addr = parse_ip(ip)?;
        if !is_routable(&addr) {
            return None;
        }

        let url = template.replace("{ip}", &addr.to_string());
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(ip = %addr, error = %e, "Region lookup failed");
                return None;
            }
        };
        if response.status() != reqwest::StatusCode::OK {
            debug!(ip = %addr, status = %response.status(), "Region lookup rejected");
            return None;
        }
        let body = response.text().await.ok()?;
        let region = body.trim();
        if region.is_empty() || region.len() > MAX_REGION_LEN {
            return None;
        }
        Some(region.to_string())
    }
}

#[async_trait]
impl Enricher for HttpEnricher {
    async fn classify(&self, metadata: &RequestMetadata) -> ClientInfo {
        let nation = match metadata.ip.as_deref() {
            Some(ip) => self.lookup_region(ip).await,
            None => None,
        };
        ClientInfo {
            nation,
            ..client_hints(metadata)
        }
    }
}

/// OS and browser fields taken only from explicit client hints.
pub fn client_hints(metadata: &RequestMetadata) -> ClientInfo {
    let platform = non_empty(metadata.platform.as_deref());
    let os_version = match (platform, non_empty(metadata.platform_version.as_deref())) {
        (Some(platform), Some(version)) => Some(normalize_platform_version(platform, version)),
        (_, version) => version.map(str::to_string),
    };
    ClientInfo {
        nation: None,
        os: platform.map(str::to_string),
        os_version,
        browser: non_empty(metadata.browser.as_deref()).map(str::to_string),
        browser_version: non_empty(metadata.browser_version.as_deref()).map(str::to_string),
    }
}

/// Map a `platformVersion` hint to the marketing version where they differ.
///
/// Windows reports `13+` for 11, `10`-`12` for 10, and NT `6.x` for 7 to 8.1.
pub fn normalize_platform_version(platform: &str, version: &str) -> String {
    if !platform.eq_ignore_ascii_case("windows") {
        return version.to_string();
    }

    let mut parts = version.split('.');
    let major = parts.next().and_then(|p| p.parse::<u32>().ok());
    let minor = parts.next();
    match (major, minor) {
        (Some(m), _) if m >= 13 => "11".to_string(),
        (Some(m), _) if m >= 10 => "10".to_string(),
        (Some(6), Some("3")) => "8.1".to_string(),
        (Some(6), Some("2")) => "8".to_string(),
        (Some(6), Some("1")) => "7".to_string(),
        _ => version.to_string(),
    }
}

/// Client address: the first `X-Forwarded-For` entry, else the socket peer.
pub fn client_ip(forwarded_for: Option<&str>, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    match forwarded {
        Some(value) => Some(
            parse_ip(value)
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| value.to_string()),
        ),
        None => peer.map(|addr| addr.ip().to_string()),
    }
}

/// Accepts a bare address or an `addr:port` pair.
fn parse_ip(value: &str) -> Option<IpAddr> {
    value
        .parse::<IpAddr>()
        .ok()
        .or_else(|| value.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}

fn is_routable(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified())
        }
        IpAddr::V6(v6) => !(v6.is_loopback() || v6.is_unspecified()),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
