//! Resilience primitives shared by every outbound call the orchestrator
//! makes: a circuit breaker, a retrying caller, and a sliding-window rate
//! limiter, collapsed into one toolkit parameterised by resource name
//! rather than duplicated per external system.

pub mod caller;
pub mod circuit_breaker;
pub mod metrics;
pub mod rate_limiter;
pub mod retry;
pub mod types;

pub use caller::ResilientCaller;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry};
pub use rate_limiter::redis_store::RedisWindowStore;
pub use rate_limiter::{InMemoryWindowStore, RateLimiter, WindowStore, WindowStoreError};
pub use types::{
    Classification, Classify, CircuitBreakerConfig, CircuitStatus, RateLimitRule,
    ResilienceError, RetryConfig,
};
