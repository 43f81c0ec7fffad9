//! API server configuration.

use chrono::{Duration, Utc};
use folio_core::auth::TokenConfig;
use folio_core::auth::jwt::{parse_algorithm, resolve_jwt_secret};
use folio_core::ratelimit::{Quota, RateLimitConfig};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8000").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Redis URL for the rate-limit counter store.
    pub redis_url: String,
    /// Token signing settings.
    pub token: TokenConfig,
    /// Anonymous/authenticated quota table.
    pub rate_limit: RateLimitConfig,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                      | Default                                  |
    /// |-------------------------------|------------------------------------------|
    /// | `BIND_ADDR`                   | `127.0.0.1:8000`                         |
    /// | `DATABASE_URL`                | `postgres://localhost:5432/folio`        |
    /// | `REDIS_URL`                   | `redis://localhost:6379`                 |
    /// | `JWT_SECRET` / `SECRET_KEY`   | generated & persisted to file            |
    /// | `JWT_ALGORITHM`               | `HS256`                                  |
    /// | `ACCESS_TOKEN_EXPIRE_MINUTES` | `30`                                     |
    /// | `REFRESH_TOKEN_EXPIRE_DAYS`   | `7`                                      |
    /// | `RATE_LIMIT_ANONYMOUS`        | `2/60` (requests / seconds)              |
    /// | `RATE_LIMIT_AUTHENTICATED`    | `10/60`                                  |
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut token = TokenConfig::new(resolve_jwt_secret());
        if let Some(alg) = env_opt("JWT_ALGORITHM") {
            token.algorithm = parse_algorithm(&alg).map_err(|e| ConfigError::Invalid {
                var: "JWT_ALGORITHM",
                reason: e.to_string(),
            })?;
        }
        if let Some(minutes) = env_parse::<i64>("ACCESS_TOKEN_EXPIRE_MINUTES")? {
            token.access_ttl =
                lifetime("ACCESS_TOKEN_EXPIRE_MINUTES", minutes, Duration::try_minutes)?;
        }
        if let Some(days) = env_parse::<i64>("REFRESH_TOKEN_EXPIRE_DAYS")? {
            token.refresh_ttl = lifetime("REFRESH_TOKEN_EXPIRE_DAYS", days, Duration::try_days)?;
        }

        let mut rate_limit = RateLimitConfig::default();
        if let Some(quota) = env_parse::<Quota>("RATE_LIMIT_ANONYMOUS")? {
            rate_limit.anonymous = quota;
        }
        if let Some(quota) = env_parse::<Quota>("RATE_LIMIT_AUTHENTICATED")? {
            rate_limit.authenticated = quota;
        }

        Ok(Self {
            bind_addr: env_opt("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8000".into()),
            database_url: env_opt("DATABASE_URL")
                .unwrap_or_else(|| "postgres://localhost:5432/folio".into()),
            redis_url: env_opt("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".into()),
            token,
            rate_limit,
        })
    }
}

/// A positive token lifetime that still yields a representable expiry.
fn lifetime(
    var: &'static str,
    amount: i64,
    to_duration: fn(i64) -> Option<Duration>,
) -> Result<Duration, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        var,
        reason: reason.to_string(),
    };
    if amount <= 0 {
        return Err(invalid("must be positive"));
    }
    let ttl = to_duration(amount).ok_or_else(|| invalid("out of range"))?;
    Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| invalid("out of range"))?;
    Ok(ttl)
}

fn env_opt(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(var)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                var,
                reason: e.to_string(),
            })
        })
        .transpose()
}
