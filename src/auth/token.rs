//! Stateless signed session tokens.
//!
//! A token is `base64url(claims JSON) "." base64url(HMAC-SHA256(payload))`.
//! Only `sub` (the user id) is trusted after verification; the embedded
//! username is informational and goes stale on profile changes.

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const KEY_FILE: &str = "session.key";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid token signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
}

pub struct TokenSigner {
    mac: HmacSha256,
    ttl_hours: u64,
}

impl TokenSigner {
    pub fn new(key: &[u8], ttl_hours: u64) -> anyhow::Result<Self> {
        if key.is_empty() {
            anyhow::bail!("token signing key must not be empty");
        }
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|_| anyhow::anyhow!("invalid token signing key"))?;
        Ok(Self { mac, ttl_hours })
    }

    /// Load the signing key from `<data_dir>/session.key`, generating and
    /// persisting a random one on first start.
    pub fn load_or_create(data_dir: &Path, ttl_hours: u64) -> anyhow::Result<Self> {
        let path = data_dir.join(KEY_FILE);

        let key = if path.exists() {
            hex::decode(fs::read_to_string(&path)?.trim())?
        } else {
            let key: [u8; 32] = rand::thread_rng().gen();
            fs::create_dir_all(data_dir)?;
            fs::write(&path, hex::encode(key))?;
            tracing::info!("Generated new session signing key at {}", path.display());
            key.to_vec()
        };

        Self::new(&key, ttl_hours)
    }

    pub fn issue(&self, user_id: &str, username: &str) -> String {
        self.issue_at(user_id, username, Utc::now())
    }

    pub(crate) fn issue_at(&self, user_id: &str, username: &str, now: DateTime<Utc>) -> String {
        let exp = (self.ttl_hours > 0)
            .then(|| (now + Duration::hours(self.ttl_hours as i64)).timestamp());
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            iat: now.timestamp(),
            exp,
        };

        // Serialising a struct of strings and integers cannot fail.
        let json = serde_json::to_vec(&claims).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(payload.as_bytes()));
        format!("{}.{}", payload, signature)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub(crate) fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let (payload, signature) = token.trim().split_once('.').ok_or(TokenError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&json).map_err(|_| TokenError::Malformed)?;

        if let Some(exp) = claims.exp {
            if exp <= now.timestamp() {
                return Err(TokenError::Expired);
            }
        }

        Ok(claims)
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}
