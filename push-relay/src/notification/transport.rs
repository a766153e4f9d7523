//! Push transport.
//!
//! [`PushTransport`] is the seam between the delivery engine and the network.
//! [`WebPushTransport`] implements it with RFC 8291 (`aes128gcm`) payload
//! encryption and RFC 8292 (VAPID) authorization.

use std::time::Duration;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes128Gcm, KeyInit};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use hkdf::Hkdf;
use p256::ecdh::EphemeralSecret;
use p256::ecdsa::SigningKey;
use p256::ecdsa::signature::Signer;
use p256::elliptic_curve::rand_core::{OsRng, RngCore};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use serde::Serialize;
use sha2::Sha256;
use tracing::debug;
use url::Url;

use crate::config::VapidCredentials;
use crate::config::vapid::{PUBLIC_KEY_LEN, decode_b64url, encode_b64url};
use crate::database::models::SubscriberDbModel;
use crate::notification::outcome::TransportResponse;
use crate::notification::payload::{MAX_PAYLOAD_BYTES, NotificationPayload};
use crate::utils::http_client::build_client;
use crate::utils::text::truncate_string;
use crate::{Error, Result};

const SALT_LEN: usize = 16;
const AUTH_SECRET_LEN: usize = 16;
const DEFAULT_RS: u32 = 4096;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);
const MAX_ERROR_BODY_CHARS: usize = 500;
const VAPID_JWT_EXP_SECS: i64 = 12 * 60 * 60;
const VAPID_JWT_SKEW_SECS: i64 = 60;

const IKM_INFO_PREFIX: &str = "WebPush: info\0";
const KEY_INFO: &str = "Content-Encoding: aes128gcm\0";
const NONCE_INFO: &str = "Content-Encoding: nonce\0";

/// Delivers one payload to one subscriber.
///
/// Implementations return `Ok` with the push service's status for every
/// request that got a response, and `Err` only when no response was obtained
/// (bad keys, connection failure). Classification is the caller's job.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(
        &self,
        payload: &NotificationPayload,
        subscriber: &SubscriberDbModel,
        ttl_secs: u32,
    ) -> Result<TransportResponse>;
}

#[derive(Debug, Clone)]
struct CachedVapidJwt {
    jwt: String,
    exp_unix: i64,
}

/// Web Push transport backed by `reqwest`.
#[derive(Debug)]
pub struct WebPushTransport {
    vapid: VapidCredentials,
    client: reqwest::Client,
    vapid_jwt_cache: DashMap<String, CachedVapidJwt>,
}

impl WebPushTransport {
    pub fn new(vapid: VapidCredentials) -> Result<Self> {
        Ok(Self {
            vapid,
            client: build_client(REQUEST_TIMEOUT)?,
            vapid_jwt_cache: DashMap::new(),
        })
    }

    fn get_or_build_vapid_jwt(&self, aud: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        if let Some(entry) = self.vapid_jwt_cache.get(aud)
            && entry.exp_unix - VAPID_JWT_SKEW_SECS > now
        {
            return Ok(entry.jwt.clone());
        }

        let (jwt, exp_unix) = build_vapid_jwt_with_exp(
            aud,
            self.vapid.subject(),
            self.vapid.private_key_raw(),
            VAPID_JWT_EXP_SECS,
        )?;
        self.vapid_jwt_cache.insert(
            aud.to_string(),
            CachedVapidJwt {
                jwt: jwt.clone(),
                exp_unix,
            },
        );
        Ok(jwt)
    }

    async fn post(&self, endpoint: &str, request: &EncryptedRequest) -> Result<reqwest::Response> {
        self.client
            .post(endpoint)
            .header("TTL", request.ttl_secs.to_string())
            .header("Content-Encoding", "aes128gcm")
            .header("Content-Type", "application/octet-stream")
            .header("Encryption", format!("salt={}", request.salt_b64))
            .header("Crypto-Key", request.crypto_key.as_str())
            .header("Authorization", request.authorization.as_str())
            .header("Urgency", "normal")
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| Error::Other(format!("Web push request failed: {}", e)))
    }
}

struct EncryptedRequest {
    body: Vec<u8>,
    salt_b64: String,
    crypto_key: String,
    authorization: String,
    ttl_secs: u32,
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn deliver(
        &self,
        payload: &NotificationPayload,
        subscriber: &SubscriberDbModel,
        ttl_secs: u32,
    ) -> Result<TransportResponse> {
        let aud = push_service_audience(&subscriber.endpoint)?;
        let jwt = self.get_or_build_vapid_jwt(&aud)?;

        let payload_bytes = payload.to_bytes_capped(MAX_PAYLOAD_BYTES)?;

        let keys = subscriber.keys();
        let client_pub_raw = decode_b64url(keys.p256dh)
            .map_err(|e| Error::Other(format!("Invalid p256dh key: {}", e)))?;
        let client_auth = decode_b64url(keys.auth)
            .map_err(|e| Error::Other(format!("Invalid auth key: {}", e)))?;
        let client_pub_raw: [u8; PUBLIC_KEY_LEN] = client_pub_raw
            .try_into()
            .map_err(|_| Error::Other("Invalid p256dh key length".to_string()))?;
        let client_auth: [u8; AUTH_SECRET_LEN] = client_auth
            .try_into()
            .map_err(|_| Error::Other("Invalid auth secret length".to_string()))?;

        let (body, salt_b64, dh_b64) =
            encrypt_aes128gcm(&payload_bytes, &client_pub_raw, &client_auth)?;

        let public_key = self.vapid.public_key_b64();
        let request = EncryptedRequest {
            body,
            salt_b64,
            crypto_key: format!("dh={}; p256ecdsa={}", dh_b64, public_key),
            authorization: format!("vapid t={}, k={}", jwt, public_key),
            ttl_secs,
        };

        let mut response = self.post(&subscriber.endpoint, &request).await?;

        if response.status().as_u16() == 429
            && let Some(delay) = retry_after_delay(&response)
            && delay <= MAX_RETRY_AFTER
        {
            debug!(
                endpoint = %subscriber.endpoint,
                delay_secs = delay.as_secs(),
                "Push service throttled, retrying once"
            );
            tokio::time::sleep(delay).await;
            response = self.post(&subscriber.endpoint, &request).await?;
        }

        let status = response.status();
        if status.as_u16() < 400 {
            return Ok(TransportResponse::new(status.as_u16()));
        }

        let body_text = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());
        Ok(TransportResponse::new(status.as_u16())
            .with_body(truncate_string(&body_text, MAX_ERROR_BODY_CHARS)))
    }
}

/// The VAPID `aud` claim: the origin of the push endpoint.
fn push_service_audience(endpoint: &str) -> Result<String> {
    let url = Url::parse(endpoint)
        .map_err(|e| Error::Other(format!("Invalid push endpoint URL: {}", e)))?;
    let host = url
        .host()
        .ok_or_else(|| Error::Other("Push endpoint missing host".to_string()))?;

    let host = match host {
        url::Host::Domain(d) => d.to_string(),
        url::Host::Ipv4(ip) => ip.to_string(),
        url::Host::Ipv6(ip) => format!("[{}]", ip),
    };

    let aud = match (url.scheme(), url.port()) {
        (scheme, Some(port)) => format!("{}://{}:{}", scheme, host, port),
        (scheme, None) => format!("{}://{}", scheme, host),
    };
    Ok(aud)
}

fn retry_after_delay(response: &reqwest::Response) -> Option<Duration> {
    let header = response.headers().get("Retry-After")?;
    let value = header.to_str().ok()?.trim();
    value.parse::<u64>().ok().map(Duration::from_secs)
}

fn hkdf_sha256(salt: &[u8], ikm: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; len];
    hk.expand(info, &mut okm)
        .map_err(|_| Error::Other("HKDF expand failed".to_string()))?;
    Ok(okm)
}

fn encrypt_aes128gcm(
    plaintext: &[u8],
    remote_public_key_raw: &[u8; PUBLIC_KEY_LEN],
    auth_secret: &[u8; AUTH_SECRET_LEN],
) -> Result<(Vec<u8>, String, String)> {
    if plaintext.is_empty() {
        return Err(Error::Other("Web push payload cannot be empty".to_string()));
    }

    let mut salt = [0u8; SALT_LEN];
    let mut rng = OsRng;
    rng.fill_bytes(&mut salt);

    let remote_pub = p256::PublicKey::from_sec1_bytes(remote_public_key_raw)
        .map_err(|_| Error::Other("Invalid remote public key".to_string()))?;

    let local_secret = EphemeralSecret::random(&mut rng);
    let local_pub = p256::PublicKey::from(&local_secret).to_encoded_point(false);
    let local_pub_raw: [u8; PUBLIC_KEY_LEN] = local_pub
        .as_bytes()
        .try_into()
        .map_err(|_| Error::Other("Invalid local public key length".to_string()))?;

    let shared_secret = local_secret.diffie_hellman(&remote_pub);
    let shared_secret = shared_secret.raw_secret_bytes();

    let mut ikm_info = Vec::with_capacity(IKM_INFO_PREFIX.len() + PUBLIC_KEY_LEN * 2);
    ikm_info.extend_from_slice(IKM_INFO_PREFIX.as_bytes());
    ikm_info.extend_from_slice(remote_public_key_raw);
    ikm_info.extend_from_slice(&local_pub_raw);

    let ikm = hkdf_sha256(auth_secret, shared_secret.as_slice(), &ikm_info, 32)?;
    let cek = hkdf_sha256(&salt, &ikm, KEY_INFO.as_bytes(), 16)?;
    let nonce = hkdf_sha256(&salt, &ikm, NONCE_INFO.as_bytes(), 12)?;

    let cek = Aes128Gcm::new_from_slice(&cek)
        .map_err(|_| Error::Other("Invalid CEK length".to_string()))?;

    // Single record: the nonce is used as-is (record sequence number 0).
    let mut iv = [0u8; 12];
    iv.copy_from_slice(&nonce);

    let mut padded = Vec::with_capacity(plaintext.len() + 1);
    padded.extend_from_slice(plaintext);
    padded.push(2); // last record delimiter

    let ciphertext = cek
        .encrypt((&iv).into(), padded.as_slice())
        .map_err(|_| Error::Other("AES-GCM encryption failed".to_string()))?;

    // aes128gcm header: salt | rs | idlen | keyid
    let mut body = Vec::with_capacity(SALT_LEN + 4 + 1 + PUBLIC_KEY_LEN + ciphertext.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&DEFAULT_RS.to_be_bytes());
    body.push(PUBLIC_KEY_LEN as u8);
    body.extend_from_slice(&local_pub_raw);
    body.extend_from_slice(&ciphertext);

    Ok((body, encode_b64url(&salt), encode_b64url(&local_pub_raw)))
}

fn build_vapid_jwt_with_exp(
    aud: &str,
    subject: &str,
    private_key_raw: &[u8; 32],
    exp_secs: i64,
) -> Result<(String, i64)> {
    #[derive(Serialize)]
    struct Claims<'a> {
        aud: &'a str,
        exp: u64,
        sub: &'a str,
    }

    let header = serde_json::json!({ "typ": "JWT", "alg": "ES256" });
    let exp_unix = (Utc::now() + chrono::Duration::seconds(exp_secs)).timestamp();
    let claims = Claims {
        aud,
        exp: exp_unix.max(0) as u64,
        sub: subject,
    };

    let header_b64 = encode_b64url(serde_json::to_string(&header)?.as_bytes());
    let claims_b64 = encode_b64url(serde_json::to_string(&claims)?.as_bytes());
    let signing_input = format!("{}.{}", header_b64, claims_b64);

    let signing_key = SigningKey::from_bytes(private_key_raw.into())
        .map_err(|_| Error::Other("Invalid VAPID private key".to_string()))?;
    let sig: p256::ecdsa::Signature = signing_key.sign(signing_input.as_bytes());
    let sig_b64 = encode_b64url(sig.to_bytes().as_slice());

    Ok((format!("{}.{}", signing_input, sig_b64), exp_unix))
}
