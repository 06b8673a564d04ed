//! Shared types for the distributed lock service.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub type LockName = String;

/// A held lock. The fencing counter is the only thing downstream writers
/// should trust: if a later holder's counter is higher, this token is
/// stale and any write gated on it must be rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub name: LockName,
    pub holder: String,
    pub fence: u64,
    pub acquired_at: DateTime<Utc>,
    pub ttl: Duration,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("lock {0} is held by another holder")]
    Busy(LockName),
    #[error("ttl must be greater than zero")]
    InvalidTtl,
    #[error("token for {0} does not match the current holder, refusing to release/extend")]
    NotHolder(LockName),
    #[error("lock backend unavailable, failing closed")]
    BackendUnavailable,
}

/// Poll policy for `acquire` when the lock is currently busy.
#[derive(Debug, Clone)]
pub struct AcquireConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub deadline: Duration,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
            deadline: Duration::from_secs(10),
        }
    }
}
