// @zen-component: AUTH-IdentityResolver
//
//! Caller identity resolution from a bearer credential.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::debug;

use super::store::CredentialStore;
use super::{AuthError, TokenService};
use crate::models::auth::{TokenKind, User};
use crate::ratelimit::IdentityClass;

/// Resolved caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Verified, active user.
    User(User),
    /// Caller without usable credentials, keyed by network address.
    Anonymous(IpAddr),
}

impl Identity {
    pub fn class(&self) -> IdentityClass {
        match self {
            Identity::User(_) => IdentityClass::Authenticated,
            Identity::Anonymous(_) => IdentityClass::Anonymous,
        }
    }

    /// Key the rate limiter tracks this caller under.
    pub fn rate_limit_key(&self) -> String {
        match self {
            Identity::User(user) => user.id.clone(),
            Identity::Anonymous(addr) => addr.to_string(),
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::User(user) => Some(user),
            Identity::Anonymous(_) => None,
        }
    }
}

/// Extract the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively; an empty token is rejected.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Binds bearer credentials to users via [`TokenService`] and a [`CredentialStore`].
#[derive(Clone)]
pub struct IdentityResolver {
    tokens: Arc<TokenService>,
    credentials: Arc<dyn CredentialStore>,
}

impl IdentityResolver {
    pub fn new(tokens: Arc<TokenService>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            tokens,
            credentials,
        }
    }

    /// Resolve an `Authorization` header value to an active user.
    ///
    /// Fails with `Unauthenticated` when the header is missing or not a bearer
    /// credential, the access token does not verify, or its subject is unknown
    /// or inactive. Store failures are also reported as `Unauthenticated`.
    pub async fn resolve_required(&self, authorization: Option<&str>) -> Result<User, AuthError> {
        let header = authorization
            .ok_or_else(|| AuthError::Unauthenticated("Missing authorization header".into()))?;
        let token = bearer_token(header)
            .ok_or_else(|| AuthError::Unauthenticated("Invalid authorization scheme".into()))?;

        let username = self.tokens.verify(token, TokenKind::Access).map_err(|e| {
            debug!(error = %e, "access token rejected");
            AuthError::Unauthenticated("Could not validate credentials".into())
        })?;

        let found = self.credentials.find_by_username(&username).await.map_err(|e| {
            debug!(error = %e, "credential store lookup failed");
            AuthError::Unauthenticated("Could not validate credentials".into())
        })?;

        match found {
            Some(entry) if entry.user.is_active => Ok(entry.user),
            Some(_) => Err(AuthError::Unauthenticated("Inactive user".into())),
            None => Err(AuthError::Unauthenticated("User not found".into())),
        }
    }

    /// Like [`Self::resolve_required`], but any failure degrades to the
    /// anonymous identity for `peer`.
    pub async fn resolve_optional(&self, authorization: Option<&str>, peer: IpAddr) -> Identity {
        if authorization.is_none() {
            return Identity::Anonymous(peer);
        }
        match self.resolve_required(authorization).await {
            Ok(user) => Identity::User(user),
            Err(e) => {
                debug!(peer = %peer, error = %e, "treating caller as anonymous");
                Identity::Anonymous(peer)
            }
        }
    }
}
