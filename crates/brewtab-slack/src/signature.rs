//! Slack request signing (`X-Slack-Signature`, `v0=` HMAC-SHA256).
//!
//! The signed base string is `v0:{timestamp}:{raw body}`. Requests whose
//! timestamp is more than five minutes away from our clock are rejected.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use brewtab_core::{errors::Error, Result};

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

const VERSION: &str = "v0";
const MAX_SKEW_SECS: u64 = 60 * 5;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct SignatureVerifier {
    secret: SecretString,
}

impl SignatureVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    pub fn verify(&self, timestamp: &str, body: &[u8], signature: &str) -> Result<()> {
        self.verify_at(chrono::Utc::now().timestamp(), timestamp, body, signature)
    }

    pub fn verify_at(&self, now: i64, timestamp: &str, body: &[u8], signature: &str) -> Result<()> {
        let ts: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| Error::Unauthorized("malformed request timestamp".to_string()))?;
        if now.abs_diff(ts) > MAX_SKEW_SECS {
            return Err(Error::Unauthorized("stale request timestamp".to_string()));
        }

        let hex_sig = signature
            .strip_prefix("v0=")
            .ok_or_else(|| Error::Unauthorized("missing v0= signature prefix".to_string()))?;
        let expected = hex::decode(hex_sig)
            .map_err(|_| Error::Unauthorized("signature is not hex".to_string()))?;

        let computed = self.compute(timestamp.trim(), body)?;
        if computed.ct_eq(&expected).into() {
            Ok(())
        } else {
            tracing::warn!("slack signature verification failed");
            Err(Error::Unauthorized("signature mismatch".to_string()))
        }
    }

    /// `v0=<hex>` for a body, as Slack would send it.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> Result<String> {
        Ok(format!("{VERSION}={}", hex::encode(self.compute(timestamp, body)?)))
    }

    fn compute(&self, timestamp: &str, body: &[u8]) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| Error::Config(format!("invalid signing secret: {e}")))?;
        mac.update(VERSION.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}
