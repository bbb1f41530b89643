//! OAuth access tokens for the Sheets API.
//!
//! Either a static bearer token, or a service-account key exchanged for a
//! short-lived token via the JWT bearer grant (RS256).

use std::{
    path::Path,
    time::{Duration, Instant},
};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use brewtab_core::{errors::Error, Result};

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const TOKEN_LIFETIME_SECS: i64 = 3600;
/// Refresh this long before the token actually expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// The fields of a Google service-account JSON key we need.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"[redacted]")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }
}

#[derive(Debug, Serialize)]
struct GrantClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: SecretString,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + EXPIRY_MARGIN < self.expires_at
    }
}

enum Source {
    Static(SecretString),
    ServiceAccount {
        key: ServiceAccountKey,
        cached: Mutex<Option<CachedToken>>,
    },
}

pub struct TokenSource {
    source: Source,
}

impl TokenSource {
    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            source: Source::Static(SecretString::from(token.into())),
        }
    }

    pub fn service_account(key: ServiceAccountKey) -> Self {
        Self {
            source: Source::ServiceAccount {
                key,
                cached: Mutex::new(None),
            },
        }
    }

    /// A bearer token valid for at least the refresh margin.
    pub async fn access_token(&self, http: &reqwest::Client) -> Result<String> {
        match &self.source {
            Source::Static(token) => Ok(token.expose_secret().to_string()),
            Source::ServiceAccount { key, cached } => {
                let mut guard = cached.lock().await;
                if let Some(c) = guard.as_ref() {
                    if c.is_fresh(Instant::now()) {
                        return Ok(c.token.expose_secret().to_string());
                    }
                }

                let fresh = exchange_jwt(http, key).await?;
                let token = fresh.token.expose_secret().to_string();
                *guard = Some(fresh);
                Ok(token)
            }
        }
    }
}

fn sign_grant(key: &ServiceAccountKey, now_unix: i64) -> Result<String> {
    let claims = GrantClaims {
        iss: &key.client_email,
        scope: SHEETS_SCOPE,
        aud: key.token_uri(),
        iat: now_unix,
        exp: now_unix + TOKEN_LIFETIME_SECS,
    };
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| Error::Config(format!("invalid service account private key: {e}")))?;
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
        .map_err(|e| Error::External(format!("jwt signing failed: {e}")))
}

async fn exchange_jwt(http: &reqwest::Client, key: &ServiceAccountKey) -> Result<CachedToken> {
    let assertion = sign_grant(key, chrono::Utc::now().timestamp())?;

    let resp = http
        .post(key.token_uri())
        .form(&[
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::External(format!("google token request error: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Unauthorized(format!(
            "google token exchange failed: {status} {}",
            body.chars().take(200).collect::<String>()
        )));
    }

    let parsed: TokenResponse = resp
        .json()
        .await
        .map_err(|e| Error::External(format!("google token json error: {e}")))?;

    let lifetime = Duration::from_secs(parsed.expires_in.unwrap_or(TOKEN_LIFETIME_SECS as u64));
    tracing::debug!(expires_in = lifetime.as_secs(), "google access token refreshed");

    Ok(CachedToken {
        token: SecretString::from(parsed.access_token),
        expires_at: Instant::now() + lifetime,
    })
}
