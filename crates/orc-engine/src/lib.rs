//! Session lifecycle engine: the state machine, checkpointing, and health
//! scoring around a session. Pure and in-memory — persistence is the
//! repository's job, locking is the supervisor's.

pub mod error;
pub mod session;
pub mod types;
pub mod validation;

pub use error::EngineError;
pub use session::NewSession;
pub use types::{
    Checkpoint as DurableCheckpoint, EntityCheckpoint, ExecutionMetrics, Priority, Session,
    SessionStatus, SessionType, Warning, MAX_ENTITY_CHECKPOINTS, MAX_RETRIES,
};
pub use validation::ValidationError;
