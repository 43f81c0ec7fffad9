//! Counter store backends for the sliding-window log.
//!
//! Each key holds a set of `(score, member)` entries where the score is the
//! request timestamp in milliseconds:
//! - Redis sorted sets for distributed, production use
//! - In-memory map for development and single-instance deployments

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::RedisResult;
use redis::aio::MultiplexedConnection;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::StoreError;

/// Upper bound on establishing a Redis connection.
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Upper bound on a single Redis command.
const RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Pause between reconnect attempts after a failed connect.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Storage primitives needed by [`super::RateLimiter`].
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Remove every entry of `key` whose score is `<= max_score`.
    async fn prune(&self, key: &str, max_score: i64) -> Result<(), StoreError>;

    /// Number of entries currently held under `key`.
    async fn count(&self, key: &str) -> Result<u64, StoreError>;

    /// Add one entry and reset the key's expiry to `ttl_secs`, as a single write.
    async fn record(
        &self,
        key: &str,
        score: i64,
        member: &str,
        ttl_secs: u64,
    ) -> Result<(), StoreError>;
}

/// Redis storage backend using sorted sets.
///
/// Connects lazily: construction only parses the URL, so an unreachable
/// server surfaces as [`StoreError`] from individual calls, never at startup.
/// A dropped connection is discarded and re-established on a later call, at
/// most once per [`RECONNECT_BACKOFF`].
#[derive(Clone)]
pub struct RedisCounterStore {
    client: redis::Client,
    link: Arc<RwLock<Link>>,
}

#[derive(Default)]
struct Link {
    conn: Option<MultiplexedConnection>,
    retry_at: Option<Instant>,
}

impl RedisCounterStore {
    /// Build a store for `url` without contacting the server.
    pub fn new(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| {
            warn!("Invalid Redis URL for rate limiting: {}", e);
            StoreError::Redis(e)
        })?;
        Ok(Self {
            client,
            link: Arc::new(RwLock::new(Link::default())),
        })
    }

    /// Round-trip a `PING`, connecting first if needed.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let result = redis::cmd("PING").query_async::<String>(&mut conn).await;
        self.checked(result).await?;
        Ok(())
    }

    async fn conn(&self) -> Result<MultiplexedConnection, StoreError> {
        if let Some(conn) = self.link.read().await.conn.as_ref() {
            return Ok(conn.clone());
        }

        let mut link = self.link.write().await;
        if let Some(conn) = link.conn.as_ref() {
            return Ok(conn.clone());
        }
        if let Some(retry_at) = link.retry_at
            && Instant::now() < retry_at
        {
            return Err(StoreError::Unavailable(
                "waiting to reconnect to Redis".into(),
            ));
        }

        match self
            .client
            .get_multiplexed_async_connection_with_timeouts(RESPONSE_TIMEOUT, CONNECT_TIMEOUT)
            .await
        {
            Ok(conn) => {
                debug!("Connected to Redis for rate limiting");
                link.conn = Some(conn.clone());
                link.retry_at = None;
                Ok(conn)
            }
            Err(e) => {
                link.retry_at = Some(Instant::now() + RECONNECT_BACKOFF);
                Err(StoreError::Redis(e))
            }
        }
    }

    /// Drop the cached connection when `result` shows it is unusable.
    async fn checked<T>(&self, result: RedisResult<T>) -> Result<T, StoreError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() {
                    self.link.write().await.conn = None;
                }
                Err(StoreError::Redis(e))
            }
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn prune(&self, key: &str, max_score: i64) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let result = redis::cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg(max_score)
            .query_async::<i64>(&mut conn)
            .await;
        self.checked(result).await?;
        Ok(())
    }

    async fn count(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn().await?;
        let result = redis::cmd("ZCARD")
            .arg(key)
            .query_async::<u64>(&mut conn)
            .await;
        self.checked(result).await
    }

    async fn record(
        &self,
        key: &str,
        score: i64,
        member: &str,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let result = redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .ignore()
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs)
            .ignore()
            .query_async::<()>(&mut conn)
            .await;
        self.checked(result).await
    }
}

/// Entries for one key plus its idle expiry.
struct WindowLog {
    entries: BTreeSet<(i64, String)>,
    expires_at: Instant,
}

/// In-memory storage backend.
#[derive(Default)]
pub struct InMemoryCounterStore {
    windows: DashMap<String, WindowLog>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop keys whose idle expiry has passed.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.windows.retain(|_, log| log.expires_at > now);
        debug!(keys = self.windows.len(), "Completed rate limit storage cleanup");
    }

    fn evict_if_expired(&self, key: &str) {
        self.windows
            .remove_if(key, |_, log| log.expires_at <= Instant::now());
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn prune(&self, key: &str, max_score: i64) -> Result<(), StoreError> {
        self.evict_if_expired(key);
        if let Some(mut log) = self.windows.get_mut(key) {
            log.entries.retain(|(score, _)| *score > max_score);
        }
        Ok(())
    }

    async fn count(&self, key: &str) -> Result<u64, StoreError> {
        self.evict_if_expired(key);
        Ok(self
            .windows
            .get(key)
            .map(|log| log.entries.len() as u64)
            .unwrap_or(0))
    }

    async fn record(
        &self,
        key: &str,
        score: i64,
        member: &str,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_secs);
        let mut log = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| WindowLog {
                entries: BTreeSet::new(),
                expires_at,
            });
        log.entries.insert((score, member.to_string()));
        log.expires_at = expires_at;
        Ok(())
    }
}
