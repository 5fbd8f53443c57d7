//! Anti-forgery tokens
//!
//! Stateless HMAC-SHA256 tokens of the form `<hmac>.<timestamp>.<nonce>`. Pages embed
//! one in `<meta name="csrf-token">` and the recovery agent echoes it in the
//! `X-CSRF-TOKEN` header of fallback requests.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Default token lifetime (2 hours, the usual session length of the pages embedding it).
pub const CSRF_TOKEN_TTL: Duration = Duration::from_secs(2 * 3600);

/// Issues and verifies anti-forgery tokens with a shared secret.
#[derive(Clone)]
pub struct CsrfTokens {
    secret: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for CsrfTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfTokens")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl CsrfTokens {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            ttl: CSRF_TOKEN_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn issue(&self) -> String {
        self.issue_at(unix_now())
    }

    pub fn verify(&self, token: &str) -> bool {
        self.verify_at(token, unix_now())
    }

    fn issue_at(&self, timestamp: u64) -> String {
        let nonce = Uuid::new_v4().simple().to_string();
        let signature = self.sign(timestamp, &nonce);
        format!("{}.{}.{}", signature, timestamp, nonce)
    }

    fn verify_at(&self, token: &str, now: u64) -> bool {
        let mut parts = token.trim().splitn(3, '.');
        let (Some(signature), Some(timestamp), Some(nonce)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return false;
        };

        let Ok(timestamp) = timestamp.parse::<u64>() else {
            return false;
        };
        if nonce.is_empty() || nonce.contains('.') {
            return false;
        }
        if timestamp > now || now - timestamp > self.ttl.as_secs() {
            tracing::debug!(timestamp, now, "CSRF token expired or from the future");
            return false;
        }

        let expected = self.sign(timestamp, nonce);
        expected.as_bytes().ct_eq(signature.as_bytes()).into()
    }

    fn sign(&self, timestamp: u64, nonce: &str) -> String {
        // HMAC accepts keys of any length, so this cannot fail.
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(format!("{}.{}", timestamp, nonce).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
