//! Prometheus instrumentation for the resilience toolkit.

use prometheus::{IntCounterVec, Opts, Registry};

pub struct ResilienceMetrics {
    pub breaker_trips: IntCounterVec,
    pub rate_limited: IntCounterVec,
    pub retry_attempts: IntCounterVec,
}

impl ResilienceMetrics {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let breaker_trips = IntCounterVec::new(
            Opts::new("orc_breaker_trips_total", "Circuit breaker open transitions"),
            &["resource"],
        )?;
        let rate_limited = IntCounterVec::new(
            Opts::new("orc_rate_limited_total", "Calls refused by the rate limiter"),
            &["resource"],
        )?;
        let retry_attempts = IntCounterVec::new(
            Opts::new("orc_retry_attempts_total", "Retry attempts made after a transient failure"),
            &["resource"],
        )?;

        registry.register(Box::new(breaker_trips.clone()))?;
        registry.register(Box::new(rate_limited.clone()))?;
        registry.register(Box::new(retry_attempts.clone()))?;

        Ok(Self {
            breaker_trips,
            rate_limited,
            retry_attempts,
        })
    }
}
