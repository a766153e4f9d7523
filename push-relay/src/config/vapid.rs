//! VAPID service credentials.
//!
//! Loaded once at startup, either from `WEB_PUSH_VAPID_PUBLIC_KEY` /
//! `WEB_PUSH_VAPID_PRIVATE_KEY` or from the key files next to the database.

use std::path::Path;

use base64::Engine as _;
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::rand_core::OsRng;

use crate::utils::fs::read_trimmed_sync;
use crate::{Error, Result};

pub const PUBLIC_KEY_LEN: usize = 65;
const PRIVATE_KEY_LEN: usize = 32;

pub const DEFAULT_VAPID_SUBJECT: &str = "mailto:example@example.com";
pub const DEFAULT_PUBLIC_KEY_FILE: &str = "data/vapid_public.txt";
pub const DEFAULT_PRIVATE_KEY_FILE: &str = "data/vapid_private.txt";

#[derive(Clone)]
pub struct VapidCredentials {
    public_key_b64: String,
    private_key_raw: [u8; PRIVATE_KEY_LEN],
    subject: String,
}

impl std::fmt::Debug for VapidCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidCredentials")
            .field("public_key_b64", &self.public_key_b64)
            .field("private_key_raw", &"<redacted>")
            .field("subject", &self.subject)
            .finish()
    }
}

impl VapidCredentials {
    /// Build credentials from base64url (unpadded) encoded keys.
    pub fn from_b64(public_b64: &str, private_b64: &str, subject: impl Into<String>) -> Result<Self> {
        let public_b64 = public_b64.trim();
        let private_b64 = private_b64.trim();
        if public_b64.is_empty() || private_b64.is_empty() {
            return Err(Error::config("VAPID keys are empty"));
        }

        let public_raw = decode_b64url(public_b64)
            .map_err(|e| Error::config(format!("Invalid VAPID public key: {}", e)))?;
        let private_raw = decode_b64url(private_b64)
            .map_err(|e| Error::config(format!("Invalid VAPID private key: {}", e)))?;

        if public_raw.len() != PUBLIC_KEY_LEN {
            return Err(Error::config(format!(
                "VAPID public key must decode to {} bytes",
                PUBLIC_KEY_LEN
            )));
        }
        let private_key_raw: [u8; PRIVATE_KEY_LEN] = private_raw.try_into().map_err(|_| {
            Error::config(format!(
                "VAPID private key must decode to {} bytes",
                PRIVATE_KEY_LEN
            ))
        })?;

        Ok(Self {
            public_key_b64: public_b64.to_string(),
            private_key_raw,
            subject: subject.into(),
        })
    }

    /// Resolve credentials from the environment lookup, falling back to key files.
    pub fn resolve<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let subject = non_empty("WEB_PUSH_VAPID_SUBJECT")
            .unwrap_or_else(|| DEFAULT_VAPID_SUBJECT.to_string());

        match (
            non_empty("WEB_PUSH_VAPID_PUBLIC_KEY"),
            non_empty("WEB_PUSH_VAPID_PRIVATE_KEY"),
        ) {
            (Some(public), Some(private)) => Self::from_b64(&public, &private, subject),
            (None, None) => {
                let public_path = non_empty("WEB_PUSH_VAPID_PUBLIC_KEY_FILE")
                    .unwrap_or_else(|| DEFAULT_PUBLIC_KEY_FILE.to_string());
                let private_path = non_empty("WEB_PUSH_VAPID_PRIVATE_KEY_FILE")
                    .unwrap_or_else(|| DEFAULT_PRIVATE_KEY_FILE.to_string());
                Self::from_files(Path::new(&public_path), Path::new(&private_path), subject)
            }
            _ => Err(Error::config(
                "Both WEB_PUSH_VAPID_PUBLIC_KEY and WEB_PUSH_VAPID_PRIVATE_KEY must be set",
            )),
        }
    }

    pub fn from_files(public_path: &Path, private_path: &Path, subject: String) -> Result<Self> {
        let public = read_trimmed_sync("reading VAPID public key", public_path).map_err(|e| {
            Error::config(format!(
                "{}. Generate a key pair with `push-relay-vapid`",
                e
            ))
        })?;
        let private = read_trimmed_sync("reading VAPID private key", private_path)
            .map_err(|e| Error::config(e.to_string()))?;
        Self::from_b64(&public, &private, subject)
    }

    /// Fresh credentials with a random key pair.
    pub fn generate(subject: impl Into<String>) -> Result<Self> {
        let (public, private) = generate_keypair_b64();
        Self::from_b64(&public, &private, subject)
    }

    pub fn public_key_b64(&self) -> &str {
        &self.public_key_b64
    }

    pub fn private_key_raw(&self) -> &[u8; PRIVATE_KEY_LEN] {
        &self.private_key_raw
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Generate a P-256 key pair as unpadded base64url `(public, private)`.
///
/// The public key is the 65-byte uncompressed point, the private key the
/// 32-byte scalar.
pub fn generate_keypair_b64() -> (String, String) {
    let signing_key = SigningKey::random(&mut OsRng);
    let public = signing_key
        .verifying_key()
        .to_encoded_point(false)
        .to_bytes();
    (encode_b64url(&public), encode_b64url(&signing_key.to_bytes()))
}

pub(crate) fn decode_b64url(input: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(input.as_bytes())
}

pub(crate) fn encode_b64url(input: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(input)
}
