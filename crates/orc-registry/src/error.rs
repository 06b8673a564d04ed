use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no agent available for the requested capability")]
    NoAgentAvailable,
    #[error("agent {0} not found")]
    NotFound(String),
}
