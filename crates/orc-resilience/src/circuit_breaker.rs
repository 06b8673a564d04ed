//! Per-resource circuit breaker: closed -> open -> half-open -> closed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::types::{CircuitBreakerConfig, CircuitState, CircuitStatus, ResourceKey};

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
}

/// A single named circuit breaker. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: ResourceKey,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<Inner>>,
}

/// Whether a call may proceed, and what to do with its outcome.
pub enum Admission {
    /// Call is allowed to proceed.
    Admitted,
    /// The breaker is open; the caller must fail fast without dispatching.
    Refused,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<ResourceKey>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                opened_at: None,
                last_failure_at: None,
            })),
        }
    }

    /// Check admission and, if the open window has elapsed, transition into
    /// half-open so the caller's next attempt becomes the probe.
    pub fn admit(&self) -> Admission {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Admission::Admitted,
            CircuitState::HalfOpen => Admission::Admitted,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or_default();
                if elapsed >= self.config.recovery_timeout {
                    debug!(resource = %self.name, "circuit recovery timeout elapsed, admitting probe");
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    Admission::Admitted
                } else {
                    Admission::Refused
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_sub(1);
            }
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_required_successes {
                    debug!(resource = %self.name, "circuit closing after half-open successes");
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_successes = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.last_failure_at = Some(Utc::now());
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(resource = %self.name, failures = inner.consecutive_failures, "circuit opening");
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                warn!(resource = %self.name, "probe failed in half-open, reopening circuit");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.half_open_successes = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn status(&self) -> CircuitStatus {
        let inner = self.inner.lock();
        CircuitStatus {
            state: inner.state.into(),
            consecutive_failures: inner.consecutive_failures,
            last_failure_at: inner.last_failure_at,
        }
    }
}

/// Registry of named breakers, all sharing one default config unless a
/// resource-specific override is registered.
pub struct CircuitBreakerRegistry {
    default_config: CircuitBreakerConfig,
    overrides: HashMap<ResourceKey, CircuitBreakerConfig>,
    breakers: Mutex<HashMap<ResourceKey, CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            default_config,
            overrides: HashMap::new(),
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_override(mut self, resource: impl Into<ResourceKey>, config: CircuitBreakerConfig) -> Self {
        self.overrides.insert(resource.into(), config);
        self
    }

    pub fn get(&self, resource: &str) -> CircuitBreaker {
        let mut breakers = self.breakers.lock();
        if let Some(existing) = breakers.get(resource) {
            return existing.clone();
        }
        let config = self
            .overrides
            .get(resource)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone());
        let breaker = CircuitBreaker::new(resource.to_string(), config);
        breakers.insert(resource.to_string(), breaker.clone());
        breaker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(50),
            half_open_required_successes: 2,
        }
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let breaker = CircuitBreaker::new("agent:1", test_config());

        for _ in 0..3 {
            assert!(matches!(breaker.admit(), Admission::Admitted));
            breaker.record_failure();
        }

        assert!(matches!(breaker.admit(), Admission::Refused));
    }

    #[test]
    fn success_decrements_failure_count_but_not_below_zero() {
        let breaker = CircuitBreaker::new("agent:1", test_config());
        breaker.record_failure();
        breaker.record_success();
        breaker.record_success();
        assert_eq!(breaker.status().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_closes_after_required_successes() {
        let breaker = CircuitBreaker::new("agent:1", test_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert!(matches!(breaker.admit(), Admission::Refused));

        tokio::time::advance(Duration::from_millis(60)).await;

        assert!(matches!(breaker.admit(), Admission::Admitted));
        breaker.record_success();
        assert!(matches!(breaker.admit(), Admission::Admitted));
        breaker.record_success();

        assert_eq!(breaker.status().state, crate::types::CircuitStateView::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_in_half_open_reopens() {
        let breaker = CircuitBreaker::new("agent:1", test_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(matches!(breaker.admit(), Admission::Admitted));
        breaker.record_failure();

        assert!(matches!(breaker.admit(), Admission::Refused));
    }
}
