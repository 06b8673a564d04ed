use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("tenant {0} unknown")]
    UnknownTenant(String),
    #[error("tenant {tenant} quota of {quota} active sessions exceeded")]
    QuotaExceeded { tenant: String, quota: u64 },
    #[error("role {role:?} is not permitted to {action}")]
    Forbidden { role: orc_repository::Role, action: &'static str },
    #[error(transparent)]
    Repository(#[from] orc_repository::RepositoryError),
    #[error(transparent)]
    Lock(#[from] orc_lock::LockError),
    #[error(transparent)]
    Registry(#[from] orc_registry::RegistryError),
    #[error(transparent)]
    Engine(#[from] orc_engine::EngineError),
    #[error("no supervision work to do, session already terminal")]
    AlreadyTerminal,
    #[error("session validation failed: {0:?}")]
    InvalidSession(orc_engine::ValidationError),
}
