//! Retrying caller: retries transient failures with exponential backoff,
//! never retries permanent ones.

use std::future::Future;

use tracing::{debug, warn};

use crate::types::{Classification, Classify, RetryConfig};

/// Runs `f` up to `config.max_attempts` times. Stops immediately on a
/// `Permanent` classification. Sleeps between attempts using the computed
/// backoff delay.
pub async fn call_with_retry<F, Fut, T, E>(config: &RetryConfig, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let classification = err.classify();
                if classification == Classification::Permanent {
                    debug!("non-retryable error, surfacing immediately");
                    return Err(err);
                }

                attempt += 1;
                if attempt >= config.max_attempts {
                    warn!(attempt, "retry attempts exhausted");
                    return Err(err);
                }

                let delay = config.delay_for_attempt(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after transient failure");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct TestError(Classification);

    impl Classify for TestError {
        fn classify(&self) -> Classification {
            self.0
        }
    }

    fn fast_config() -> RetryConfig {
        RetryConfig {
            base_delay: Duration::from_millis(1),
            multiplier: 1.0,
            max_delay: Duration::from_millis(5),
            max_attempts: 3,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, TestError> = call_with_retry(&fast_config(), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TestError(Classification::Transient))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_permanent() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, TestError> = call_with_retry(&fast_config(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err(TestError(Classification::Permanent)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_attempts_then_surfaces() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, TestError> = call_with_retry(&fast_config(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err(TestError(Classification::Transient)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
