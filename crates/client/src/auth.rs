//! Authentication strategies for outbound API calls.
//!
//! Two interchangeable variants behind one `header()` capability: a fixed
//! `Api-Key` header, or a time-boxed HS256 bearer token minted on demand
//! and cached until stale.

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::error::{ClientError, Result};

/// Issuer claim stamped into signed tokens.
const TOKEN_ISSUER: &str = "promosync";

/// Default lifetime of a signed token in seconds.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

/// Claims carried by a signed bearer token.
#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    iss: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug)]
struct CachedToken {
    token: String,
    issued_at: i64,
}

/// Signed-token authentication with reuse of the minted token until its
/// age reaches the expiry window.
#[derive(Debug)]
pub struct SignedTokenAuth {
    secret: String,
    ttl_secs: i64,
    cached: Mutex<Option<CachedToken>>,
}

impl SignedTokenAuth {
    /// Fails fast when the signing secret is missing. There is no fallback
    /// to static-key auth.
    pub fn new(secret: impl Into<String>, ttl_secs: i64) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(ClientError::config(
                "signed-token auth selected but the signing secret is empty",
            ));
        }
        Ok(Self {
            secret,
            ttl_secs,
            cached: Mutex::new(None),
        })
    }

    fn mint(&self, now: i64) -> Result<String> {
        let claims = TokenClaims {
            iss: TOKEN_ISSUER.to_string(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// Current bearer token, reusing the cached one while it is fresh.
    fn bearer(&self) -> Result<String> {
        let now = Utc::now().timestamp();
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = cached.as_ref() {
            if now - existing.issued_at < self.ttl_secs {
                return Ok(existing.token.clone());
            }
        }
        let token = self.mint(now)?;
        *cached = Some(CachedToken {
            token: token.clone(),
            issued_at: now,
        });
        Ok(token)
    }
}

/// Closed set of authentication strategies.
#[derive(Debug)]
pub enum Authenticator {
    /// Fixed `Api-Key` header value set at construction.
    ApiKey(String),
    /// Time-boxed HS256 bearer token.
    SignedToken(SignedTokenAuth),
}

impl Authenticator {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::ApiKey(key.into())
    }

    pub fn signed_token(secret: impl Into<String>, ttl_secs: i64) -> Result<Self> {
        Ok(Self::SignedToken(SignedTokenAuth::new(secret, ttl_secs)?))
    }

    /// Header name/value attached to an outbound call. Obtained fresh on
    /// every attempt so token refresh stays transparent to the executor.
    pub fn header(&self) -> Result<(&'static str, String)> {
        match self {
            Self::ApiKey(key) => Ok(("Api-Key", key.clone())),
            Self::SignedToken(auth) => Ok(("Authorization", format!("Bearer {}", auth.bearer()?))),
        }
    }
}
