//! `ResilientCaller` — the single entry point every outbound call goes
//! through: rate limiter -> breaker -> retrying caller -> transport.

use std::future::Future;

use tracing::debug;

use crate::circuit_breaker::{Admission, CircuitBreakerRegistry};
use crate::rate_limiter::RateLimiter;
use crate::retry::call_with_retry;
use crate::types::{Classification, Classify, ResilienceError, RetryConfig};

pub struct ResilientCaller {
    breakers: CircuitBreakerRegistry,
    limiter: RateLimiter,
    retry: RetryConfig,
}

impl ResilientCaller {
    pub fn new(breakers: CircuitBreakerRegistry, limiter: RateLimiter, retry: RetryConfig) -> Self {
        Self {
            breakers,
            limiter,
            retry,
        }
    }

    /// Runs `f` against `resource`, applying (in order): rate-limit
    /// admission, circuit-breaker admission, retry-with-backoff, and
    /// records the outcome back into the breaker.
    pub async fn call<F, Fut, T, E>(&self, resource: &str, f: F) -> Result<T, ResilienceError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        if self.limiter.admit(resource).await.is_err() {
            return Err(ResilienceError::RateLimited(resource.to_string()));
        }

        let breaker = self.breakers.get(resource);
        if matches!(breaker.admit(), Admission::Refused) {
            return Err(ResilienceError::UpstreamUnavailable(resource.to_string()));
        }

        let outcome = call_with_retry(&self.retry, &f).await;

        match &outcome {
            Ok(_) => breaker.record_success(),
            Err(err) => match err.classify() {
                Classification::Permanent => {
                    debug!(resource, "permanent failure, breaker untouched");
                }
                Classification::Transient => breaker.record_failure(),
                Classification::Success => {}
            },
        }

        outcome.map_err(ResilienceError::Inner)
    }

    pub fn breaker_status(&self, resource: &str) -> crate::types::CircuitStatus {
        self.breakers.get(resource).status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::InMemoryWindowStore;
    use crate::types::{CircuitBreakerConfig, RateLimitRule};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct TestError(Classification);

    impl Classify for TestError {
        fn classify(&self) -> Classification {
            self.0
        }
    }

    fn caller() -> ResilientCaller {
        ResilientCaller::new(
            CircuitBreakerRegistry::new(CircuitBreakerConfig {
                failure_threshold: 2,
                recovery_timeout: Duration::from_secs(30),
                half_open_required_successes: 1,
            }),
            RateLimiter::new(
                Box::new(InMemoryWindowStore::default()),
                RateLimitRule {
                    limit: 100,
                    window: Duration::from_secs(60),
                },
            ),
            RetryConfig {
                base_delay: Duration::from_millis(1),
                multiplier: 1.0,
                max_delay: Duration::from_millis(2),
                max_attempts: 2,
                jitter: false,
            },
        )
    }

    #[tokio::test]
    async fn trips_breaker_after_repeated_transient_failures() {
        let caller = caller();
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let _ = caller
                .call("agent:x", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(TestError(Classification::Transient)) }
                })
                .await;
        }

        let result = caller
            .call("agent:x", || async { Ok::<_, TestError>(1) })
            .await;

        assert!(matches!(result, Err(ResilienceError::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn permanent_failure_bypasses_retry_and_breaker() {
        let caller = caller();
        let calls = AtomicU32::new(0);

        let result = caller
            .call("agent:y", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(TestError(Classification::Permanent)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            caller.breaker_status("agent:y").consecutive_failures,
            0
        );
    }
}
