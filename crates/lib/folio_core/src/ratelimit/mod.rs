// @zen-component: RL-RateLimiter
//
//! Per-identity admission control.
//!
//! - Sliding-window log algorithm keyed by `(identity, identity class)`
//! - Distinct quotas for anonymous and authenticated traffic
//! - Redis storage for a fleet-wide counter, in-memory storage for single
//!   instances and tests
//!
//! The limiter fails open: a store error yields
//! [`Admission::BackendUnavailable`], which callers treat as admitted.

pub mod sliding_window;
pub mod storage;

use std::str::FromStr;

use thiserror::Error;

pub use sliding_window::RateLimiter;
pub use storage::{CounterStore, InMemoryCounterStore, RedisCounterStore};

/// Default anonymous quota: 2 requests per 60 seconds.
pub const DEFAULT_ANONYMOUS_QUOTA: Quota = Quota {
    limit: 2,
    period_secs: 60,
};

/// Default authenticated quota: 10 requests per 60 seconds.
pub const DEFAULT_AUTHENTICATED_QUOTA: Quota = Quota {
    limit: 10,
    period_secs: 60,
};

/// Default prefix for counter store keys.
pub const DEFAULT_KEY_PREFIX: &str = "rate_limit";

/// Quota bucket a caller falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityClass {
    Anonymous,
    Authenticated,
}

impl IdentityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityClass::Anonymous => "anonymous",
            IdentityClass::Authenticated => "authenticated",
        }
    }
}

impl std::fmt::Display for IdentityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `limit` requests per trailing `period_secs` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub period_secs: u64,
}

impl Quota {
    pub fn period_millis(&self) -> i64 {
        i64::try_from(self.period_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }
}

impl FromStr for Quota {
    type Err = String;

    /// Parses `"<limit>/<period_secs>"`, e.g. `"10/60"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (limit, period) = s
            .split_once('/')
            .ok_or_else(|| format!("expected <limit>/<period_secs>, got {s:?}"))?;
        let limit = limit
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid quota limit {limit:?}: {e}"))?;
        let period_secs = period
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("invalid quota period {period:?}: {e}"))?;
        if period_secs == 0 {
            return Err("quota period must be positive".into());
        }
        Ok(Self { limit, period_secs })
    }
}

/// Quota table and key layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub anonymous: Quota,
    pub authenticated: Quota,
    pub key_prefix: String,
}

impl RateLimitConfig {
    pub fn quota(&self, class: IdentityClass) -> Quota {
        match class {
            IdentityClass::Anonymous => self.anonymous,
            IdentityClass::Authenticated => self.authenticated,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            anonymous: DEFAULT_ANONYMOUS_QUOTA,
            authenticated: DEFAULT_AUTHENTICATED_QUOTA,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Recorded; `remaining` further requests fit in the window.
    Admitted { remaining: u32 },
    /// Quota exhausted; nothing was recorded.
    Rejected { retry_after_secs: u64 },
    /// The counter store failed. Treated as admitted.
    BackendUnavailable(String),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Admission::Rejected { .. })
    }
}

/// Counter store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Counter store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_quotas() {
        let config = RateLimitConfig::default();
        assert_eq!(config.quota(IdentityClass::Anonymous), Quota { limit: 2, period_secs: 60 });
        assert_eq!(
            config.quota(IdentityClass::Authenticated),
            Quota { limit: 10, period_secs: 60 }
        );
    }

    #[test]
    fn quota_parses_limit_and_period() {
        assert_eq!("5/30".parse::<Quota>().unwrap(), Quota { limit: 5, period_secs: 30 });
        assert_eq!(" 7 / 120 ".parse::<Quota>().unwrap().period_secs, 120);
        assert!("5".parse::<Quota>().is_err());
        assert!("x/60".parse::<Quota>().is_err());
        assert!("5/0".parse::<Quota>().is_err());
    }

    #[test]
    fn backend_unavailable_counts_as_admitted() {
        assert!(Admission::BackendUnavailable("down".into()).is_admitted());
        assert!(Admission::Admitted { remaining: 0 }.is_admitted());
        assert!(!Admission::Rejected { retry_after_secs: 60 }.is_admitted());
    }
}
