//! Supervisor-local configuration and the outcome type returned by one
//! supervision attempt.

use std::time::Duration;

use orc_registry::Capability;
use orc_engine::SessionType;

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Identifies this orchestrator process in lock holder ids and
    /// `holder = "{instance}:{session_id}:{now}"` strings.
    pub instance_id: String,
    /// Cap on the per-attempt lock TTL; the effective TTL is
    /// `min(session.max_duration, lock_ttl_cap)`.
    pub lock_ttl_cap: Duration,
    /// How often a durable checkpoint is written from adapter progress
    /// pushes, absent an explicit checkpoint push from the agent.
    pub checkpoint_interval: Duration,
    /// Base delay for the retry requeue backoff: `retry_delay * backoff^retry_count`.
    pub retry_delay: Duration,
    pub retry_backoff: f64,
    pub lock_acquire: orc_lock::AcquireConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            instance_id: "orchestrator-0".to_string(),
            lock_ttl_cap: Duration::from_secs(30 * 60),
            checkpoint_interval: Duration::from_secs(300),
            retry_delay: Duration::from_secs(5),
            retry_backoff: 2.0,
            lock_acquire: orc_lock::AcquireConfig::default(),
        }
    }
}

/// The result of one call to [`crate::supervisor::Supervisor::supervise`].
/// A single call is one attempt — retries come back around through the
/// caller's own re-enqueue of the session, not a loop inside this type.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisionOutcome {
    /// Another supervisor already holds the lock; this attempt did nothing.
    LockContended,
    /// The session was already in a status that cannot transition to
    /// *running* (e.g. already terminal); this attempt released the lock
    /// and did nothing else.
    NoOp,
    Completed,
    PartiallyCompleted,
    Failed,
    TimedOut,
    Cancelled,
    /// Transient failure, requeued for a future retry attempt.
    Requeued { retry_count: u32, retry_after: Duration },
}

/// Maps a session's classification to the capability the registry should
/// match an agent on. Planning sessions are documentation-shaped work
/// (specs, design notes); the other four map directly onto the capability
/// a human would expect.
pub fn required_capability(session_type: SessionType) -> Capability {
    match session_type {
        SessionType::Planning => Capability::Documentation,
        SessionType::Execution => Capability::CodeGeneration,
        SessionType::Review => Capability::CodeReview,
        SessionType::Debug => Capability::Debugging,
        SessionType::Integration => Capability::Testing,
    }
}
