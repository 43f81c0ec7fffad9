// @zen-component: AUTH-AccessGuard
//
//! Access guard: identity resolution followed by quota admission.
//!
//! Handlers call the guard explicitly as their first step:
//!
//! - [`AccessGuard::require`] for protected routes (401, then 429)
//! - [`AccessGuard::optional`] for mixed routes, limited under the resolved class
//! - [`AccessGuard::authenticate`] where a user is needed but no quota applies

use std::net::IpAddr;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use folio_core::auth::{Identity, IdentityResolver};
use folio_core::models::auth::User;
use folio_core::ratelimit::{Admission, IdentityClass, RateLimiter};
use tracing::debug;

use crate::error::{AppError, AppResult};

/// Raw `Authorization` header value, if present and valid UTF-8.
pub fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

/// Composes an [`IdentityResolver`] with a [`RateLimiter`].
#[derive(Clone)]
pub struct AccessGuard {
    resolver: IdentityResolver,
    limiter: RateLimiter,
}

impl AccessGuard {
    pub fn new(resolver: IdentityResolver, limiter: RateLimiter) -> Self {
        Self { resolver, limiter }
    }

    /// Resolve the caller to an active user without consuming quota.
    pub async fn authenticate(&self, headers: &HeaderMap) -> AppResult<User> {
        Ok(self.resolver.resolve_required(authorization(headers)).await?)
    }

    /// Required-auth admission: fails with 401 before any quota is consumed,
    /// then with 429 once the authenticated quota is spent.
    pub async fn require(&self, headers: &HeaderMap) -> AppResult<User> {
        let user = self.authenticate(headers).await?;
        self.admit(&user.id, IdentityClass::Authenticated).await?;
        Ok(user)
    }

    /// Mixed admission: never fails authentication, limits under whichever
    /// class the caller resolved to.
    pub async fn optional(&self, headers: &HeaderMap, peer: IpAddr) -> AppResult<Identity> {
        let identity = self
            .resolver
            .resolve_optional(authorization(headers), peer)
            .await;
        self.admit(&identity.rate_limit_key(), identity.class())
            .await?;
        Ok(identity)
    }

    async fn admit(&self, identity: &str, class: IdentityClass) -> AppResult<()> {
        match self.limiter.check(identity, class).await {
            Admission::Admitted { .. } | Admission::BackendUnavailable(_) => Ok(()),
            Admission::Rejected { retry_after_secs } => {
                let quota = self.limiter.config().quota(class);
                debug!(identity, class = %class, retry_after_secs, "quota exceeded");
                Err(AppError::TooManyRequests {
                    message: format!(
                        "Rate limit exceeded. Max {} requests per {} seconds for {} users.",
                        quota.limit, quota.period_secs, class
                    ),
                    retry_after_secs,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    use axum::http::HeaderValue;
    use folio_core::auth::{CredentialStore, InMemoryCredentialStore, TokenConfig, TokenService};
    use folio_core::models::auth::NewUser;
    use folio_core::ratelimit::{InMemoryCounterStore, Quota, RateLimitConfig};

    use super::*;

    const PEER: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));

    async fn setup() -> (AccessGuard, Arc<TokenService>) {
        let store = Arc::new(InMemoryCredentialStore::new());
        store
            .create_user(&NewUser {
                username: "bob".into(),
                email: "bob@example.com".into(),
                password: "pw".into(),
            })
            .await
            .unwrap();
        let tokens = Arc::new(TokenService::new(&TokenConfig::new("guard-secret")));
        let resolver = IdentityResolver::new(tokens.clone(), store);
        let config = RateLimitConfig {
            anonymous: Quota {
                limit: 1,
                period_secs: 60,
            },
            authenticated: Quota {
                limit: 2,
                period_secs: 60,
            },
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::new(Arc::new(InMemoryCounterStore::new()), config);
        (AccessGuard::new(resolver, limiter), tokens)
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn require_rejects_before_consuming_quota() {
        let (guard, tokens) = setup().await;
        for _ in 0..5 {
            assert!(matches!(
                guard.require(&HeaderMap::new()).await,
                Err(AppError::Unauthorized(_))
            ));
        }
        let headers = bearer(&tokens.issue_access("bob").unwrap());
        assert!(guard.require(&headers).await.is_ok());
        assert!(guard.require(&headers).await.is_ok());
        assert!(matches!(
            guard.require(&headers).await,
            Err(AppError::TooManyRequests {
                retry_after_secs: 60,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn authenticate_is_not_limited() {
        let (guard, tokens) = setup().await;
        let headers = bearer(&tokens.issue_access("bob").unwrap());
        for _ in 0..5 {
            assert_eq!(guard.authenticate(&headers).await.unwrap().username, "bob");
        }
    }

    #[tokio::test]
    async fn optional_limits_by_resolved_class() {
        let (guard, tokens) = setup().await;
        let anon = guard.optional(&HeaderMap::new(), PEER).await.unwrap();
        assert_eq!(anon, Identity::Anonymous(PEER));
        assert!(guard.optional(&HeaderMap::new(), PEER).await.is_err());

        // A bad token degrades to the same anonymous bucket.
        assert!(guard.optional(&bearer("junk"), PEER).await.is_err());

        let headers = bearer(&tokens.issue_access("bob").unwrap());
        let identity = guard.optional(&headers, PEER).await.unwrap();
        assert_eq!(identity.class(), IdentityClass::Authenticated);
    }
}
