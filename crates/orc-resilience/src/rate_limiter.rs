//! Sliding-window rate limiter backed by a shared store so multiple
//! orchestrator instances enforce one quota per resource key.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::types::{RateLimitRule, ResourceKey};

#[derive(Debug, Error)]
pub enum WindowStoreError {
    #[error("window store backend unavailable: {0}")]
    Backend(String),
}

/// Backing store for the sliding window: an ordered timestamp sequence per
/// key. `record_and_count` evicts entries older than `window` then records
/// the current attempt, returning the count *after* eviction and insertion.
#[async_trait]
pub trait WindowStore: Send + Sync {
    async fn record_and_count(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<u32, WindowStoreError>;
}

/// In-process store; sufficient for a single instance or for tests. The
/// distributed case swaps this for [`redis_store::RedisWindowStore`] so
/// the window is shared across orchestrator instances, as required by the
/// admission rule (rate limiter -> breaker -> retry -> transport).
#[derive(Default)]
pub struct InMemoryWindowStore {
    windows: Mutex<HashMap<String, Vec<u128>>>,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

#[async_trait]
impl WindowStore for InMemoryWindowStore {
    async fn record_and_count(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<u32, WindowStoreError> {
        let now = now_millis();
        let cutoff = now.saturating_sub(window.as_millis());

        let mut windows = self.windows.lock();
        let entries = windows.entry(key.to_string()).or_default();
        entries.retain(|&ts| ts > cutoff);
        entries.push(now);
        Ok(entries.len() as u32)
    }
}

pub mod redis_store {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use async_trait::async_trait;
    use redis::{aio::ConnectionManager, Script};

    use super::{WindowStore, WindowStoreError};

    /// Redis-backed sliding window, one sorted set per resource key (score
    /// and member both derived from the attempt timestamp, with a random
    /// tie-breaker so same-millisecond attempts don't collide). Shared by
    /// every orchestrator instance, so a quota is enforced fleet-wide
    /// rather than per process, the same guarantee `RedisLockBackend`
    /// gives the distributed lock.
    pub struct RedisWindowStore {
        conn: ConnectionManager,
    }

    impl RedisWindowStore {
        pub async fn connect(redis_url: &str) -> Result<Self, WindowStoreError> {
            let client = redis::Client::open(redis_url).map_err(|e| WindowStoreError::Backend(e.to_string()))?;
            let conn = client
                .get_connection_manager()
                .await
                .map_err(|e| WindowStoreError::Backend(e.to_string()))?;
            Ok(Self { conn })
        }
    }

    // Evicts entries older than the window, records the current attempt,
    // and returns the post-eviction cardinality, all atomically.
    const RECORD_AND_COUNT_SCRIPT: &str = r#"
        local now = tonumber(ARGV[1])
        local window = tonumber(ARGV[2])
        redis.call("ZREMRANGEBYSCORE", KEYS[1], "-inf", now - window)
        redis.call("ZADD", KEYS[1], now, ARGV[1] .. "-" .. ARGV[3])
        redis.call("PEXPIRE", KEYS[1], window)
        return redis.call("ZCARD", KEYS[1])
    "#;

    #[async_trait]
    impl WindowStore for RedisWindowStore {
        async fn record_and_count(&self, key: &str, window: Duration) -> Result<u32, WindowStoreError> {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64;
            let tiebreak: u32 = rand::random();

            let mut conn = self.conn.clone();
            let count: u64 = Script::new(RECORD_AND_COUNT_SCRIPT)
                .key(format!("orc:ratelimit:{key}"))
                .arg(now)
                .arg(window.as_millis() as u64)
                .arg(tiebreak)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| WindowStoreError::Backend(e.to_string()))?;
            Ok(count as u32)
        }
    }
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded for {0}")]
    Exceeded(ResourceKey),
    #[error(transparent)]
    Store(#[from] WindowStoreError),
}

/// Sliding-window admission control, one rule per resource key, shared
/// store for cross-instance quotas.
pub struct RateLimiter {
    store: Box<dyn WindowStore>,
    default_rule: RateLimitRule,
    overrides: HashMap<ResourceKey, RateLimitRule>,
}

impl RateLimiter {
    pub fn new(store: Box<dyn WindowStore>, default_rule: RateLimitRule) -> Self {
        Self {
            store,
            default_rule,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, resource: impl Into<ResourceKey>, rule: RateLimitRule) -> Self {
        self.overrides.insert(resource.into(), rule);
        self
    }

    fn rule_for(&self, resource: &str) -> &RateLimitRule {
        self.overrides.get(resource).unwrap_or(&self.default_rule)
    }

    /// Evicts stale entries, then admits iff the post-eviction count is
    /// still under the limit.
    pub async fn admit(&self, resource: &str) -> Result<(), RateLimitError> {
        let rule = self.rule_for(resource);
        let count = self.store.record_and_count(resource, rule.window).await?;
        if count > rule.limit {
            return Err(RateLimitError::Exceeded(resource.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new(
            Box::new(InMemoryWindowStore::default()),
            RateLimitRule {
                limit: 3,
                window: Duration::from_secs(60),
            },
        );

        for _ in 0..3 {
            assert!(limiter.admit("agent:1").await.is_ok());
        }
        assert!(limiter.admit("agent:1").await.is_err());
    }

    #[tokio::test]
    async fn resource_keys_are_independent() {
        let limiter = RateLimiter::new(
            Box::new(InMemoryWindowStore::default()),
            RateLimitRule {
                limit: 1,
                window: Duration::from_secs(60),
            },
        );

        assert!(limiter.admit("agent:1").await.is_ok());
        assert!(limiter.admit("agent:2").await.is_ok());
        assert!(limiter.admit("agent:1").await.is_err());
    }

    #[tokio::test]
    async fn override_rule_applies_per_resource() {
        let limiter = RateLimiter::new(
            Box::new(InMemoryWindowStore::default()),
            RateLimitRule {
                limit: 1,
                window: Duration::from_secs(60),
            },
        )
        .with_override(
            "agent:burst",
            RateLimitRule {
                limit: 5,
                window: Duration::from_secs(60),
            },
        );

        for _ in 0..5 {
            assert!(limiter.admit("agent:burst").await.is_ok());
        }
        assert!(limiter.admit("agent:burst").await.is_err());
    }
}
