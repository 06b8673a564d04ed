//! Storage backends for the lock service. `LockBackend` is the seam the
//! service talks to; swapping the in-memory backend for the Redis one is
//! how a single orchestrator instance becomes a fleet that still agrees on
//! at-most-one supervisor per session.

use std::time::Duration;

use async_trait::async_trait;

use crate::types::{LockError, LockName};

#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Attempts to acquire `name` for `holder`. On success returns a fresh,
    /// strictly-increasing fencing counter for this lock name. On failure
    /// because another holder currently owns it, returns `LockError::Busy`.
    async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration) -> Result<u64, LockError>;

    /// Releases `name` iff `holder` is still the current owner. A mismatch
    /// (stale holder, already expired) is not an error: release is
    /// idempotent from the caller's perspective.
    async fn release(&self, name: &str, holder: &str) -> Result<(), LockError>;

    /// Extends the TTL of `name` iff `holder` is still the current owner.
    async fn extend(&self, name: &str, holder: &str, ttl: Duration) -> Result<(), LockError>;
}

pub mod memory {
    use std::collections::HashMap;
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::LockBackend;
    use crate::types::LockError;

    struct Entry {
        holder: String,
        fence: u64,
        expires_at: Instant,
    }

    /// Single-process lock backend. Sufficient for tests and for running a
    /// lone orchestrator instance; the fencing counter for a name keeps
    /// increasing across acquisitions even after the entry expires and is
    /// evicted, so it is tracked separately from the live entry map.
    #[derive(Default)]
    pub struct InMemoryLockBackend {
        entries: Mutex<HashMap<String, Entry>>,
        fences: Mutex<HashMap<String, u64>>,
    }

    impl InMemoryLockBackend {
        fn next_fence(&self, name: &str) -> u64 {
            let mut fences = self.fences.lock();
            let fence = fences.entry(name.to_string()).or_insert(0);
            *fence += 1;
            *fence
        }
    }

    #[async_trait]
    impl LockBackend for InMemoryLockBackend {
        async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration) -> Result<u64, LockError> {
            let mut entries = self.entries.lock();
            let now = Instant::now();

            if let Some(existing) = entries.get(name) {
                if existing.expires_at > now {
                    return Err(LockError::Busy(name.to_string()));
                }
            }

            let fence = self.next_fence(name);
            entries.insert(
                name.to_string(),
                Entry {
                    holder: holder.to_string(),
                    fence,
                    expires_at: now + ttl,
                },
            );
            Ok(fence)
        }

        async fn release(&self, name: &str, holder: &str) -> Result<(), LockError> {
            let mut entries = self.entries.lock();
            if let Some(existing) = entries.get(name) {
                if existing.holder == holder {
                    entries.remove(name);
                }
            }
            Ok(())
        }

        async fn extend(&self, name: &str, holder: &str, ttl: Duration) -> Result<(), LockError> {
            let mut entries = self.entries.lock();
            match entries.get_mut(name) {
                Some(existing) if existing.holder == holder => {
                    existing.expires_at = Instant::now() + ttl;
                    Ok(())
                }
                _ => Err(LockError::NotHolder(name.to_string())),
            }
        }
    }
}

pub mod redis_backend {
    use std::time::Duration;

    use async_trait::async_trait;
    use redis::{aio::ConnectionManager, Script};

    use super::LockBackend;
    use crate::types::LockError;

    /// Redis-backed lock shared by every orchestrator instance. Acquisition,
    /// release, and extension are each a single Lua script so the
    /// check-then-act sequence is atomic from Redis's point of view.
    pub struct RedisLockBackend {
        conn: ConnectionManager,
    }

    impl RedisLockBackend {
        pub async fn connect(redis_url: &str) -> Result<Self, LockError> {
            let client = redis::Client::open(redis_url).map_err(|_| LockError::BackendUnavailable)?;
            let conn = client
                .get_connection_manager()
                .await
                .map_err(|_| LockError::BackendUnavailable)?;
            Ok(Self { conn })
        }
    }

    const ACQUIRE_SCRIPT: &str = r#"
        local fence_key = KEYS[1] .. ":fence"
        local current = redis.call("GET", KEYS[1])
        if current then
            return {err = "busy"}
        end
        local fence = redis.call("INCR", fence_key)
        redis.call("SET", KEYS[1], ARGV[1] .. ":" .. fence, "PX", ARGV[2])
        return fence
    "#;

    const RELEASE_SCRIPT: &str = r#"
        local current = redis.call("GET", KEYS[1])
        if current and string.sub(current, 1, string.len(ARGV[1]) + 1) == ARGV[1] .. ":" then
            redis.call("DEL", KEYS[1])
        end
        return 1
    "#;

    const EXTEND_SCRIPT: &str = r#"
        local current = redis.call("GET", KEYS[1])
        if current and string.sub(current, 1, string.len(ARGV[1]) + 1) == ARGV[1] .. ":" then
            redis.call("PEXPIRE", KEYS[1], ARGV[2])
            return 1
        end
        return 0
    "#;

    #[async_trait]
    impl LockBackend for RedisLockBackend {
        async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration) -> Result<u64, LockError> {
            let mut conn = self.conn.clone();
            let result: Result<u64, redis::RedisError> = Script::new(ACQUIRE_SCRIPT)
                .key(format!("orc:lock:{name}"))
                .arg(holder)
                .arg(ttl.as_millis() as u64)
                .invoke_async(&mut conn)
                .await;

            match result {
                Ok(fence) => Ok(fence),
                Err(err) if err.to_string().contains("busy") => Err(LockError::Busy(name.to_string())),
                Err(_) => Err(LockError::BackendUnavailable),
            }
        }

        async fn release(&self, name: &str, holder: &str) -> Result<(), LockError> {
            let mut conn = self.conn.clone();
            let _: () = Script::new(RELEASE_SCRIPT)
                .key(format!("orc:lock:{name}"))
                .arg(holder)
                .invoke_async(&mut conn)
                .await
                .map_err(|_| LockError::BackendUnavailable)?;
            Ok(())
        }

        async fn extend(&self, name: &str, holder: &str, ttl: Duration) -> Result<(), LockError> {
            let mut conn = self.conn.clone();
            let extended: i64 = Script::new(EXTEND_SCRIPT)
                .key(format!("orc:lock:{name}"))
                .arg(holder)
                .arg(ttl.as_millis() as u64)
                .invoke_async(&mut conn)
                .await
                .map_err(|_| LockError::BackendUnavailable)?;

            if extended == 1 {
                Ok(())
            } else {
                Err(LockError::NotHolder(name.to_string()))
            }
        }
    }
}
