use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;

/// The gateway rejects credentials older than an hour; refresh well before that
pub const DEFAULT_REFRESH_AFTER_SECS: i64 = 50 * 60;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Signing failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    iat: i64,
}

/// A signed provider credential and the instant it was issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCredential {
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

impl SignedCredential {
    fn is_fresh(&self, now: DateTime<Utc>, refresh_after: Duration) -> bool {
        now.signed_duration_since(self.issued_at) < refresh_after
    }
}

/// Accept full PEM, PEM without header/footer, or PEM with escaped newlines
/// (as found in environment variables) and return the PKCS#8 DER bytes.
pub fn decode_private_key(content: &str) -> Result<Vec<u8>, SigningError> {
    let body: String = content
        .replace("\\n", "\n")
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("-----"))
        .collect::<Vec<_>>()
        .concat()
        .split_whitespace()
        .collect();

    if body.is_empty() {
        return Err(SigningError::InvalidKey("key content is empty".to_string()));
    }

    STANDARD
        .decode(body.as_bytes())
        .map_err(|e| SigningError::InvalidKey(e.to_string()))
}

/// Issues and caches the ES256 bearer credential for the per-device gateway
///
/// Readers holding a fresh credential only take the read lock. When it goes stale
/// the first writer re-signs and every other caller waiting on the write lock
/// finds the new credential on its re-check.
pub struct CredentialSigner {
    team_id: String,
    key_id: String,
    encoding_key: EncodingKey,
    refresh_after: Duration,
    cached: RwLock<Option<SignedCredential>>,
    signings: AtomicU64,
}

impl CredentialSigner {
    /// Parse the private key and make sure it can sign before accepting it
    pub fn new(
        team_id: impl Into<String>,
        key_id: impl Into<String>,
        private_key: &str,
        refresh_after: Duration,
    ) -> Result<Self, SigningError> {
        let der = decode_private_key(private_key)?;

        let signer = Self {
            team_id: team_id.into(),
            key_id: key_id.into(),
            encoding_key: EncodingKey::from_ec_der(&der),
            refresh_after,
            cached: RwLock::new(None),
            signings: AtomicU64::new(0),
        };

        signer
            .sign(Utc::now())
            .map_err(|e| SigningError::InvalidKey(e.to_string()))?;

        Ok(signer)
    }

    /// Current credential, re-signed if the cached one is stale
    pub async fn bearer(&self) -> Result<String, SigningError> {
        Ok(self.credential_at(Utc::now()).await?.token)
    }

    /// Credential as seen at `now`
    pub async fn credential_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<SignedCredential, SigningError> {
        {
            let cached = self.cached.read().await;
            if let Some(credential) = cached.as_ref() {
                if credential.is_fresh(now, self.refresh_after) {
                    return Ok(credential.clone());
                }
            }
        }

        let mut cached = self.cached.write().await;

        // Another caller may have refreshed while we waited
        if let Some(credential) = cached.as_ref() {
            if credential.is_fresh(now, self.refresh_after) {
                return Ok(credential.clone());
            }
        }

        let credential = SignedCredential {
            token: self.sign(now)?,
            issued_at: now,
        };
        self.signings.fetch_add(1, Ordering::Relaxed);

        tracing::debug!("Signed new APNs provider credential (kid: {})", self.key_id);

        *cached = Some(credential.clone());
        Ok(credential)
    }

    /// Drop the cached credential so the next call re-signs
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    /// Number of credentials signed for the cache so far
    pub fn signings(&self) -> u64 {
        self.signings.load(Ordering::Relaxed)
    }

    fn sign(&self, now: DateTime<Utc>) -> Result<String, SigningError> {
        let mut header = Header::new(Algorithm::ES256);
        header.typ = None;
        header.kid = Some(self.key_id.clone());

        let claims = Claims {
            iss: &self.team_id,
            iat: now.timestamp(),
        };

        Ok(encode(&header, &claims, &self.encoding_key)?)
    }
}
