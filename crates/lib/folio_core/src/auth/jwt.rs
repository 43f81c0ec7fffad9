// @zen-component: AUTH-TokenService
//
//! JWT token issuance and verification.
//!
//! `TokenService` is stateless: verification depends only on the token bytes,
//! the shared secret and the wall clock. There is no revocation state, so a
//! token stays usable until its `exp` passes.

use std::path::PathBuf;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use thiserror::Error;
use tracing::info;

use crate::models::auth::{TokenClaims, TokenKind};

pub use jsonwebtoken::Algorithm;

/// Access token lifetime: 30 minutes.
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 30 * 60;

/// Refresh token lifetime: 7 days.
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Token verification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("expected {expected} token, got {actual}")]
    WrongType {
        expected: TokenKind,
        actual: TokenKind,
    },

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("jwt encode: {0}")]
    Encode(String),
}

/// Signing configuration for [`TokenService`].
#[derive(Clone)]
pub struct TokenConfig {
    /// Shared MAC secret.
    pub secret: String,
    /// One of HS256, HS384, HS512.
    pub algorithm: Algorithm,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenConfig {
    /// HS256 with the default lifetimes.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            algorithm: Algorithm::HS256,
            access_ttl: Duration::seconds(DEFAULT_ACCESS_TOKEN_TTL_SECS),
            refresh_ttl: Duration::seconds(DEFAULT_REFRESH_TOKEN_TTL_SECS),
        }
    }
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// Parse a symmetric MAC algorithm name (`HS256`, `HS384`, `HS512`).
pub fn parse_algorithm(name: &str) -> Result<Algorithm, TokenError> {
    match name.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(TokenError::Malformed(format!(
            "unsupported signing algorithm: {other}"
        ))),
    }
}

/// Issues and verifies access/refresh tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            algorithm: config.algorithm,
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    /// Lifetime of freshly issued access tokens.
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Lifetime of freshly issued refresh tokens.
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue a short-lived access token for `subject`.
    pub fn issue_access(&self, subject: &str) -> Result<String, TokenError> {
        self.issue(subject, TokenKind::Access, self.access_ttl)
    }

    /// Issue a long-lived refresh token for `subject`.
    pub fn issue_refresh(&self, subject: &str) -> Result<String, TokenError> {
        self.issue(subject, TokenKind::Refresh, self.refresh_ttl)
    }

    fn issue(&self, subject: &str, kind: TokenKind, ttl: Duration) -> Result<String, TokenError> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(ttl)
            .ok_or_else(|| TokenError::Encode(format!("{kind} token lifetime out of range")))?;
        let claims = TokenClaims {
            sub: subject.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            kind,
        };
        encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }

    /// Verify a token of the `expected` class and return its claims.
    ///
    /// Checks run in order: signature, expiry (`exp <= now` is expired), class.
    pub fn claims(&self, token: &str, expected: TokenKind) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        // Expiry is checked below without leeway.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<TokenClaims>(token, &self.decoding, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::InvalidSignature
                }
                _ => TokenError::Malformed(e.to_string()),
            })?
            .claims;

        if claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        if claims.kind != expected {
            return Err(TokenError::WrongType {
                expected,
                actual: claims.kind,
            });
        }
        Ok(claims)
    }

    /// Verify a token of the `expected` class and return its subject.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<String, TokenError> {
        self.claims(token, expected).map(|c| c.sub)
    }
}

/// Resolve the JWT secret: env var `JWT_SECRET` → `SECRET_KEY` → persisted file.
pub fn resolve_jwt_secret() -> String {
    for var in ["JWT_SECRET", "SECRET_KEY"] {
        if let Ok(secret) = std::env::var(var)
            && !secret.is_empty()
        {
            return secret;
        }
    }
    let secret_path = jwt_secret_path();
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(&secret_path, &secret);
    info!(path = %secret_path.display(), "generated new JWT secret");
    secret
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("folio")
        .join("jwt-secret")
}
