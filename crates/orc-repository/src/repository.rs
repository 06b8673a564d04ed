//! The session repository port. Every implementation scopes reads and
//! writes by the tenant id carried in `RequestContext` — cross-tenant
//! access is impossible through this interface.

use async_trait::async_trait;
use orc_engine::Session;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::RepositoryError;
use crate::filter::{Page, PageResult, SessionFilter};

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, ctx: &RequestContext, session: Session) -> Result<Session, RepositoryError>;

    async fn get(&self, ctx: &RequestContext, id: Uuid) -> Result<Session, RepositoryError>;

    /// Succeeds iff the stored version equals `expected_version`; bumps
    /// the stored version by one on success.
    async fn update(
        &self,
        ctx: &RequestContext,
        session: Session,
        expected_version: u64,
    ) -> Result<Session, RepositoryError>;

    async fn list(
        &self,
        ctx: &RequestContext,
        filter: SessionFilter,
        page: Page,
    ) -> Result<PageResult<Session>, RepositoryError>;

    /// Only permitted when the session's status is terminal.
    async fn delete(&self, ctx: &RequestContext, id: Uuid) -> Result<(), RepositoryError>;

    /// Count of sessions in non-terminal statuses for the tenant, used by
    /// the quota gate.
    async fn count_active(&self, ctx: &RequestContext, tenant_id: &str) -> Result<u64, RepositoryError>;
}
