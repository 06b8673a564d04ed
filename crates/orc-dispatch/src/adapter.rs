//! The adapter contract both the internal and external dispatch
//! implementations satisfy.

use async_trait::async_trait;
use orc_engine::Session;
use tokio_util::sync::CancellationToken;

use crate::types::{DispatchError, ExecutionCallbacks, ExecutionResult};

#[async_trait]
pub trait DispatchAdapter: Send + Sync {
    async fn execute(
        &self,
        session: &Session,
        callbacks: ExecutionCallbacks<'_>,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, DispatchError>;

    /// Aborts an in-flight remote execution. Always invoked by the
    /// supervisor before the engine moves to *cancelled*/*stopped*.
    async fn abort(&self, remote_id: &str) -> Result<(), DispatchError>;
}
