//! Lock service: the public API the supervisor drives. Wraps a
//! [`LockBackend`] with the polling/backoff acquisition policy and the
//! scoped `with_lock` helper, the intended way most callers should touch
//! a lock.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::backend::LockBackend;
use crate::types::{AcquireConfig, LockError, LockToken};

#[derive(Clone)]
pub struct LockService {
    backend: Arc<dyn LockBackend>,
}

impl LockService {
    pub fn new(backend: Arc<dyn LockBackend>) -> Self {
        Self { backend }
    }

    /// Polls `try_acquire` with capped exponential backoff until it
    /// succeeds or `config.deadline` elapses. Returns `Busy` if the
    /// deadline is reached while another holder still owns the lock.
    pub async fn acquire(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
        config: &AcquireConfig,
    ) -> Result<LockToken, LockError> {
        if ttl.is_zero() {
            return Err(LockError::InvalidTtl);
        }

        let deadline = tokio::time::Instant::now() + config.deadline;
        let mut backoff = config.initial_backoff;

        loop {
            match self.backend.try_acquire(name, holder, ttl).await {
                Ok(fence) => {
                    debug!(lock = name, holder, fence, "lock acquired");
                    return Ok(LockToken {
                        name: name.to_string(),
                        holder: holder.to_string(),
                        fence,
                        acquired_at: Utc::now(),
                        ttl,
                    });
                }
                Err(LockError::Busy(_)) => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(LockError::Busy(name.to_string()));
                    }
                    tokio::time::sleep(backoff.min(config.max_backoff)).await;
                    backoff = (backoff * 2).min(config.max_backoff);
                }
                Err(err) => {
                    warn!(lock = name, error = %err, "lock backend failed, failing closed");
                    return Err(err);
                }
            }
        }
    }

    pub async fn release(&self, token: &LockToken) -> Result<(), LockError> {
        self.backend.release(&token.name, &token.holder).await
    }

    pub async fn extend(&self, token: &mut LockToken, ttl: Duration) -> Result<(), LockError> {
        self.backend.extend(&token.name, &token.holder, ttl).await?;
        token.ttl = ttl;
        Ok(())
    }

    /// Extends by name/holder directly, for callers (progress/checkpoint
    /// pushes) that only kept those strings around rather than the full
    /// token. Equivalent to `extend` without needing a `&mut LockToken`.
    pub async fn touch(&self, name: &str, holder: &str, ttl: Duration) -> Result<(), LockError> {
        self.backend.extend(name, holder, ttl).await
    }

    /// Acquires `name`, runs `f`, and releases on every exit path —
    /// including `f` returning an error or panicking. The normal-return
    /// path awaits the release directly, so the lock is actually gone by
    /// the time `with_lock` returns; the guard only spawns a best-effort
    /// release if `f` panics and unwinds past it.
    pub async fn with_lock<F, Fut, T>(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
        config: &AcquireConfig,
        f: F,
    ) -> Result<T, LockError>
    where
        F: FnOnce(LockToken) -> Fut,
        Fut: Future<Output = T>,
    {
        let token = self.acquire(name, holder, ttl, config).await?;
        let mut guard = ReleaseGuard {
            service: self.clone(),
            token: Some(token.clone()),
        };
        let result = f(token).await;
        if let Some(token) = guard.token.take() {
            if let Err(err) = self.release(&token).await {
                warn!(lock = %token.name, error = %err, "failed to release lock after with_lock closure returned");
            }
        }
        Ok(result)
    }
}

/// Releases the lock on drop if it hasn't already been released. The
/// `with_lock` success path defuses this via `token.take()` before
/// returning and awaits the release itself; this `Drop` impl only fires
/// the spawned best-effort release when `f` panics and unwinds past it,
/// since `Drop` cannot await.
struct ReleaseGuard {
    service: LockService,
    token: Option<LockToken>,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            let service = self.service.clone();
            tokio::spawn(async move {
                if let Err(err) = service.release(&token).await {
                    warn!(lock = %token.name, error = %err, "failed to release lock on guard drop");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemoryLockBackend;

    fn service() -> LockService {
        LockService::new(Arc::new(InMemoryLockBackend::default()))
    }

    #[tokio::test]
    async fn second_acquire_is_busy_until_release() {
        let svc = service();
        let config = AcquireConfig {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            deadline: Duration::from_millis(20),
        };

        let token = svc
            .acquire("session:1", "holder-a", Duration::from_secs(5), &config)
            .await
            .unwrap();

        let err = svc
            .acquire("session:1", "holder-b", Duration::from_secs(5), &config)
            .await
            .unwrap_err();
        assert_eq!(err, LockError::Busy("session:1".to_string()));

        svc.release(&token).await.unwrap();

        let second = svc
            .acquire("session:1", "holder-b", Duration::from_secs(5), &config)
            .await
            .unwrap();
        assert!(second.fence > token.fence);
    }

    #[tokio::test]
    async fn fencing_counter_strictly_increases_across_holders() {
        let svc = service();
        let config = AcquireConfig::default();

        let t1 = svc
            .acquire("session:2", "a", Duration::from_millis(10), &config)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let t2 = svc
            .acquire("session:2", "b", Duration::from_secs(5), &config)
            .await
            .unwrap();

        assert!(t2.fence > t1.fence);
    }

    #[tokio::test]
    async fn zero_ttl_is_rejected() {
        let svc = service();
        let err = svc
            .acquire("session:3", "a", Duration::from_secs(0), &AcquireConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err, LockError::InvalidTtl);
    }

    #[tokio::test]
    async fn extend_refreshes_ttl_for_current_holder_only() {
        let svc = service();
        let config = AcquireConfig::default();
        let mut token = svc
            .acquire("session:4", "a", Duration::from_millis(30), &config)
            .await
            .unwrap();

        svc.extend(&mut token, Duration::from_secs(5)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = svc
            .acquire("session:4", "b", Duration::from_millis(10), &config)
            .await
            .unwrap_err();
        assert_eq!(err, LockError::Busy("session:4".to_string()));
    }

    #[tokio::test]
    async fn with_lock_releases_after_closure_runs() {
        let svc = service();
        let config = AcquireConfig::default();

        let result = svc
            .with_lock("session:5", "a", Duration::from_secs(5), &config, |token| async move {
                token.fence
            })
            .await
            .unwrap();
        assert_eq!(result, 1);

        // with_lock awaits the release itself before returning, so the
        // lock is already free here.
        let reacquired = svc
            .acquire("session:5", "b", Duration::from_secs(5), &config)
            .await;
        assert!(reacquired.is_ok());
    }
}
