//! Sliding-window log rate limiter.
//!
//! For each check: prune entries at or before `now - period`, count what is
//! left, reject if the count has reached the limit, otherwise record `now`
//! and reset the key's idle expiry.
//!
//! The prune/count/record steps are separate store round trips, so
//! concurrent requests for one key can each see a stale count and the
//! admitted rate may overshoot `limit` by the number of requests in flight.
//! The record step itself is a single store write.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::storage::CounterStore;
use super::{Admission, IdentityClass, Quota, RateLimitConfig, StoreError};

/// Sliding-window admission control keyed by `(identity, class)`.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Store key for an identity; classes never share a key.
    pub fn key(&self, identity: &str, class: IdentityClass) -> String {
        format!("{}:{}:{}", self.config.key_prefix, class.as_str(), identity)
    }

    /// Check and, if admitted, record a request for `identity` now.
    pub async fn check(&self, identity: &str, class: IdentityClass) -> Admission {
        self.check_at(identity, class, Utc::now().timestamp_millis())
            .await
    }

    /// Same as [`Self::check`] with an explicit clock reading in unix milliseconds.
    pub async fn check_at(&self, identity: &str, class: IdentityClass, now_ms: i64) -> Admission {
        let quota = self.config.quota(class);
        let key = self.key(identity, class);

        match self.evaluate(&key, quota, now_ms).await {
            Ok(admission) => {
                if let Admission::Rejected { retry_after_secs } = admission {
                    debug!(
                        key = %key,
                        class = %class,
                        limit = quota.limit,
                        retry_after_secs,
                        "Rate limit exceeded"
                    );
                }
                admission
            }
            Err(e) => {
                warn!(key = %key, class = %class, error = %e, "Rate limiter store error, admitting request");
                Admission::BackendUnavailable(e.to_string())
            }
        }
    }

    async fn evaluate(&self, key: &str, quota: Quota, now_ms: i64) -> Result<Admission, StoreError> {
        let window_start = now_ms.saturating_sub(quota.period_millis());
        self.store.prune(key, window_start).await?;

        let count = self.store.count(key).await?;
        if count >= u64::from(quota.limit) {
            return Ok(Admission::Rejected {
                retry_after_secs: quota.period_secs,
            });
        }

        let member = format!("{now_ms}-{}", Uuid::new_v4().simple());
        self.store
            .record(key, now_ms, &member, quota.period_secs)
            .await?;

        let used = u32::try_from(count).unwrap_or(u32::MAX).saturating_add(1);
        Ok(Admission::Admitted {
            remaining: quota.limit.saturating_sub(used),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::ratelimit::InMemoryCounterStore;

    const T0: i64 = 1_700_000_000_000;

    fn limiter() -> (Arc<InMemoryCounterStore>, RateLimiter) {
        let store = Arc::new(InMemoryCounterStore::new());
        let limiter = RateLimiter::new(store.clone(), RateLimitConfig::default());
        (store, limiter)
    }

    /// Counter store whose every call fails.
    struct FailingStore {
        calls: AtomicU32,
    }

    #[async_trait]
    impl CounterStore for FailingStore {
        async fn prune(&self, _key: &str, _max_score: i64) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn count(&self, _key: &str) -> Result<u64, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn record(
            &self,
            _key: &str,
            _score: i64,
            _member: &str,
            _ttl_secs: u64,
        ) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn anonymous_quota_admits_two_then_rejects() {
        let (_, limiter) = limiter();
        let anon = IdentityClass::Anonymous;

        assert_eq!(
            limiter.check_at("10.0.0.1", anon, T0).await,
            Admission::Admitted { remaining: 1 }
        );
        assert_eq!(
            limiter.check_at("10.0.0.1", anon, T0 + 1_000).await,
            Admission::Admitted { remaining: 0 }
        );
        assert_eq!(
            limiter.check_at("10.0.0.1", anon, T0 + 2_000).await,
            Admission::Rejected { retry_after_secs: 60 }
        );
    }

    #[tokio::test]
    async fn rejected_attempt_is_not_recorded() {
        let (store, limiter) = limiter();
        let anon = IdentityClass::Anonymous;
        for offset in 0..5 {
            limiter.check_at("10.0.0.1", anon, T0 + offset).await;
        }
        let key = limiter.key("10.0.0.1", anon);
        assert_eq!(store.count(&key).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn window_slides_after_period() {
        let (_, limiter) = limiter();
        let anon = IdentityClass::Anonymous;

        limiter.check_at("10.0.0.1", anon, T0).await;
        limiter.check_at("10.0.0.1", anon, T0 + 30_000).await;
        assert!(!limiter.check_at("10.0.0.1", anon, T0 + 59_999).await.is_admitted());

        // Request 1 has aged out; request 2 is still inside the window.
        assert_eq!(
            limiter.check_at("10.0.0.1", anon, T0 + 60_000).await,
            Admission::Admitted { remaining: 0 }
        );
        assert!(!limiter.check_at("10.0.0.1", anon, T0 + 60_001).await.is_admitted());
    }

    #[tokio::test]
    async fn classes_use_disjoint_keys() {
        let (_, limiter) = limiter();
        assert_ne!(
            limiter.key("10.0.0.1", IdentityClass::Anonymous),
            limiter.key("10.0.0.1", IdentityClass::Authenticated)
        );

        for i in 0..2 {
            limiter.check_at("10.0.0.1", IdentityClass::Anonymous, T0 + i).await;
        }
        assert!(!limiter
            .check_at("10.0.0.1", IdentityClass::Anonymous, T0 + 10)
            .await
            .is_admitted());
        assert_eq!(
            limiter
                .check_at("10.0.0.1", IdentityClass::Authenticated, T0 + 10)
                .await,
            Admission::Admitted { remaining: 9 }
        );
    }

    #[tokio::test]
    async fn authenticated_quota_is_ten() {
        let (_, limiter) = limiter();
        let auth = IdentityClass::Authenticated;
        for i in 0..10 {
            assert!(limiter.check_at("user-1", auth, T0 + i).await.is_admitted());
        }
        assert_eq!(
            limiter.check_at("user-1", auth, T0 + 10).await,
            Admission::Rejected { retry_after_secs: 60 }
        );
        // Other identities are unaffected.
        assert!(limiter.check_at("user-2", auth, T0 + 10).await.is_admitted());
    }

    #[tokio::test]
    async fn custom_quota_is_honored() {
        let store = Arc::new(InMemoryCounterStore::new());
        let config = RateLimitConfig {
            anonymous: Quota { limit: 1, period_secs: 5 },
            key_prefix: "test".into(),
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::new(store, config);
        let anon = IdentityClass::Anonymous;

        assert_eq!(limiter.key("a", anon), "test:anonymous:a");
        assert!(limiter.check_at("a", anon, T0).await.is_admitted());
        assert_eq!(
            limiter.check_at("a", anon, T0 + 1).await,
            Admission::Rejected { retry_after_secs: 5 }
        );
        assert!(limiter.check_at("a", anon, T0 + 5_000).await.is_admitted());
    }

    #[tokio::test]
    async fn store_failure_fails_open() {
        let store = Arc::new(FailingStore {
            calls: AtomicU32::new(0),
        });
        let limiter = RateLimiter::new(store.clone(), RateLimitConfig::default());

        for i in 0..5 {
            let admission = limiter
                .check_at("10.0.0.1", IdentityClass::Anonymous, T0 + i)
                .await;
            assert!(matches!(admission, Admission::BackendUnavailable(_)));
            assert!(admission.is_admitted());
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn check_uses_wall_clock() {
        let (_, limiter) = limiter();
        assert!(limiter.check("10.0.0.2", IdentityClass::Anonymous).await.is_admitted());
        assert!(limiter.check("10.0.0.2", IdentityClass::Anonymous).await.is_admitted());
        assert!(!limiter.check("10.0.0.2", IdentityClass::Anonymous).await.is_admitted());
    }
}
