//! Shared types for the resilience toolkit.
//!
//! A single generic breaker + retry + rate-limiter trio is reused for every
//! outbound call the orchestrator makes (agent dispatch, cache, lock),
//! parameterised by a resource name rather than duplicated per caller.

use std::time::Duration;

use thiserror::Error;

/// Identifies the resource a resilience call is protecting, e.g.
/// `"agent:{agent_id}"` or `"cache"`. Breakers, limiters, and retry policies
/// are keyed by this string so callers share state per resource.
pub type ResourceKey = String;

/// Classification an outbound call result must provide so the retrying
/// caller knows whether to retry and the breaker knows whether to count a
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Call succeeded.
    Success,
    /// Call failed in a way that should trip the breaker and may be retried
    /// (transport errors, 5xx, 429).
    Transient,
    /// Call failed in a way that must never be retried and must never count
    /// against the breaker (validation errors, 4xx other than 429).
    Permanent,
}

/// Implemented by error types passed through [`crate::caller::ResilientCaller`]
/// so it can decide retry/breaker bookkeeping without knowing the concrete
/// error type of each call site.
pub trait Classify {
    fn classify(&self) -> Classification;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub half_open_required_successes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            half_open_required_successes: 2,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CircuitStatus {
    pub state: CircuitStateView,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStateView {
    Closed,
    Open,
    HalfOpen,
}

impl From<CircuitState> for CircuitStateView {
    fn from(s: CircuitState) -> Self {
        match s {
            CircuitState::Closed => CircuitStateView::Closed,
            CircuitState::Open => CircuitStateView::Open,
            CircuitState::HalfOpen => CircuitStateView::HalfOpen,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Base delay for the first retry.
    pub base_delay: Duration,
    /// Multiplier applied to the delay on each subsequent attempt.
    pub multiplier: f64,
    /// Hard cap on the computed delay.
    pub max_delay: Duration,
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Add up to +/-20% jitter to each computed delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(200),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 3,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt as i32);
        let computed_ms = self.base_delay.as_millis() as f64 * exp;
        let capped_ms = computed_ms.min(self.max_delay.as_millis() as f64);

        let jittered_ms = if self.jitter {
            let jitter_factor = 0.8 + rand::random::<f64>() * 0.4;
            capped_ms * jitter_factor
        } else {
            capped_ms
        };

        Duration::from_millis(jittered_ms.max(0.0) as u64)
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitRule {
    pub limit: u32,
    pub window: Duration,
}

impl Default for RateLimitRule {
    fn default() -> Self {
        Self {
            limit: 1000,
            window: Duration::from_secs(60),
        }
    }
}

/// Error surfaced by [`crate::caller::ResilientCaller::call`]. Wraps the
/// call site's own error type for permanent/transient failures, or signals
/// that the call never reached the transport at all.
#[derive(Debug, Error)]
pub enum ResilienceError<E> {
    #[error("rate limit exceeded for resource {0}")]
    RateLimited(ResourceKey),
    #[error("circuit open for resource {0}")]
    UpstreamUnavailable(ResourceKey),
    #[error("call failed: {0}")]
    Inner(E),
}

impl<E> ResilienceError<E> {
    pub fn into_inner(self) -> Option<E> {
        match self {
            ResilienceError::Inner(e) => Some(e),
            _ => None,
        }
    }
}
