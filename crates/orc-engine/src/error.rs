use thiserror::Error;

use crate::types::SessionStatus;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("cannot transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },
    #[error("session is not recoverable")]
    NotRecoverable,
}
