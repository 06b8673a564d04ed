use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("session {0} not found")]
    NotFound(Uuid),
    #[error("session {0} was updated concurrently, expected version {expected}", expected = .1)]
    Conflict(Uuid, u64),
    #[error("operation not permitted on session {0} in its current status")]
    InvalidState(Uuid),
    #[error("repository backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        RepositoryError::Backend(err.to_string())
    }
}
