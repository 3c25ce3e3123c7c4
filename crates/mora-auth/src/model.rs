//! Token models
//!
//! This file defines the claims carried inside a signed token and the
//! failure kinds reported by verification.

use serde::{Deserialize, Serialize};

// Auth configuration keys
pub const JWT_SECRET_KEY: &str = "auth.jwt.secret";
pub const JWT_TTL_SECONDS_KEY: &str = "auth.jwt.ttl_seconds";
pub const AUTH_SKIP_PATHS_KEY: &str = "auth.skip_paths";
pub const DEFAULT_TOKEN_TTL_SECONDS: i64 = 86400;
/// Largest token lifetime, in either direction, that a `chrono::Duration` can hold
pub const MAX_TOKEN_TTL_SECONDS: i64 = i64::MAX / 1000;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const TOKEN_PREFIX: &str = "Bearer ";

/// Result type for token operations
pub type TokenResult<T> = Result<T, TokenError>;

/// Reasons a token could not be issued or accepted
#[derive(thiserror::Error, Debug)]
pub enum TokenError {
    /// Empty input, signature mismatch, unexpected algorithm or unrecognized claims
    #[error("invalid token")]
    InvalidToken,

    /// The artifact could not be split and decoded into header, payload and signature
    #[error("malformed token")]
    MalformedToken,

    /// Signature is valid but the expiry has passed
    #[error("token expired")]
    ExpiredToken,

    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Verified identity assertion carried by a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "user_id")]
    pub subject_id: String,
    #[serde(rename = "username", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub sub: String,
    #[serde(rename = "iat", default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<i64>,
    #[serde(rename = "exp", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Claims {
    /// Build claims valid from `now` for `ttl`.
    ///
    /// A zero or negative `ttl` yields claims that are already expired.
    pub fn new(
        subject_id: impl Into<String>,
        display_name: Option<String>,
        ttl: chrono::Duration,
    ) -> Self {
        let subject_id = subject_id.into();
        let now = chrono::Utc::now();
        let expires_at = now
            .checked_add_signed(ttl)
            .unwrap_or(now)
            .timestamp();

        Self {
            sub: subject_id.clone(),
            subject_id,
            display_name: display_name.filter(|name| !name.is_empty()),
            issued_at: Some(now.timestamp()),
            expires_at: Some(expires_at),
        }
    }

    /// Whether the claims have expired at `now` (unix seconds).
    ///
    /// An expiry at exactly `now` counts as expired. Missing expiry never expires.
    pub fn is_expired_at(&self, now: i64) -> bool {
        match self.expires_at {
            Some(exp) => exp <= now,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }
}

/// Identity attached to a request after successful verification
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub subject_id: String,
    pub claims: Claims,
}

impl From<Claims> for AuthContext {
    fn from(claims: Claims) -> Self {
        Self {
            subject_id: claims.subject_id.clone(),
            claims,
        }
    }
}
