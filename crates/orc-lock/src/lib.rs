//! Distributed named-mutex lock service. Guarantees at-most-one supervisor
//! per session name, with TTL-based expiry for crash recovery and a
//! monotonic fencing counter so a stale holder's writes can always be
//! rejected downstream.

pub mod backend;
pub mod service;
pub mod types;

pub use backend::memory::InMemoryLockBackend;
pub use backend::redis_backend::RedisLockBackend;
pub use backend::LockBackend;
pub use service::LockService;
pub use types::{AcquireConfig, LockError, LockName, LockToken};
