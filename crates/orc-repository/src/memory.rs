//! In-memory repository: the reference implementation every unit test in
//! the workspace is written against.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use orc_engine::Session;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::RepositoryError;
use crate::filter::{Page, PageResult, SessionFilter};
use crate::repository::SessionRepository;

#[derive(Clone, Default)]
pub struct InMemorySessionRepository {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn matches_filter(session: &Session, tenant_id: &str, filter: &SessionFilter) -> bool {
        if session.tenant_id != tenant_id {
            return false;
        }
        if let Some(status) = filter.status {
            if session.status != status {
                return false;
            }
        }
        if let Some(priority) = filter.priority {
            if session.priority != priority {
                return false;
            }
        }
        if let Some(after) = filter.created_after {
            if session.created_at < after {
                return false;
            }
        }
        if let Some(before) = filter.created_before {
            if session.created_at > before {
                return false;
            }
        }
        if let Some(search) = &filter.search {
            let needle = search.to_lowercase();
            if !session.title.to_lowercase().contains(&needle) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn create(&self, ctx: &RequestContext, mut session: Session) -> Result<Session, RepositoryError> {
        session.tenant_id = ctx.tenant_id.clone();
        let mut sessions = self.sessions.write();
        sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get(&self, ctx: &RequestContext, id: Uuid) -> Result<Session, RepositoryError> {
        let sessions = self.sessions.read();
        let session = sessions.get(&id).ok_or(RepositoryError::NotFound(id))?;
        if session.tenant_id != ctx.tenant_id {
            return Err(RepositoryError::NotFound(id));
        }
        Ok(session.clone())
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        mut session: Session,
        expected_version: u64,
    ) -> Result<Session, RepositoryError> {
        let mut sessions = self.sessions.write();
        let stored = sessions.get(&session.id).ok_or(RepositoryError::NotFound(session.id))?;

        if stored.tenant_id != ctx.tenant_id {
            return Err(RepositoryError::NotFound(session.id));
        }
        if stored.version != expected_version {
            return Err(RepositoryError::Conflict(session.id, stored.version));
        }

        session.version = stored.version + 1;
        sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn list(
        &self,
        ctx: &RequestContext,
        filter: SessionFilter,
        page: Page,
    ) -> Result<PageResult<Session>, RepositoryError> {
        let sessions = self.sessions.read();
        let mut matching: Vec<Session> = sessions
            .values()
            .filter(|s| Self::matches_filter(s, &ctx.tenant_id, &filter))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        let total = matching.len() as u64;

        let items = matching
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect();

        Ok(PageResult { items, total })
    }

    async fn delete(&self, ctx: &RequestContext, id: Uuid) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write();
        let session = sessions.get(&id).ok_or(RepositoryError::NotFound(id))?;
        if session.tenant_id != ctx.tenant_id {
            return Err(RepositoryError::NotFound(id));
        }
        if !session.status.is_terminal() {
            return Err(RepositoryError::InvalidState(id));
        }
        sessions.remove(&id);
        Ok(())
    }

    async fn count_active(&self, _ctx: &RequestContext, tenant_id: &str) -> Result<u64, RepositoryError> {
        let sessions = self.sessions.read();
        Ok(sessions
            .values()
            .filter(|s| s.tenant_id == tenant_id && !s.status.is_terminal())
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Role;
    use orc_engine::{NewSession, Priority, SessionType};
    use std::collections::HashMap as StdHashMap;

    fn ctx(tenant: &str) -> RequestContext {
        RequestContext::new(tenant, Role::Contributor, "req-1")
    }

    fn new_session(tenant: &str) -> Session {
        Session::create(NewSession {
            tenant_id: tenant.to_string(),
            session_type: SessionType::Execution,
            priority: Priority::Medium,
            title: "Implement resilient auth retries".to_string(),
            description: None,
            initial_prompt: "Implement resilient auth".to_string(),
            agent_config: StdHashMap::new(),
            model: None,
            max_duration_secs: 600,
            cpu_limit: None,
            memory_limit_mb: None,
            parent_id: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn update_with_stale_version_conflicts() {
        let repo = InMemorySessionRepository::new();
        let ctx = ctx("t1");
        let session = repo.create(&ctx, new_session("t1")).await.unwrap();

        let mut updated = session.clone();
        updated.title = "renamed".to_string();
        let saved = repo.update(&ctx, updated.clone(), 0).await.unwrap();
        assert_eq!(saved.version, 1);

        let err = repo.update(&ctx, updated, 0).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_, 1)));
    }

    #[tokio::test]
    async fn cross_tenant_get_is_not_found() {
        let repo = InMemorySessionRepository::new();
        repo.create(&ctx("t1"), new_session("t1")).await.unwrap();

        let sessions = repo.list(&ctx("t2"), SessionFilter::default(), Page::default()).await.unwrap();
        assert_eq!(sessions.total, 0);
    }

    #[tokio::test]
    async fn delete_requires_terminal_status() {
        let repo = InMemorySessionRepository::new();
        let ctx = ctx("t1");
        let session = repo.create(&ctx, new_session("t1")).await.unwrap();

        let err = repo.delete(&ctx, session.id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidState(_)));
    }

    #[tokio::test]
    async fn count_active_excludes_terminal_sessions() {
        let repo = InMemorySessionRepository::new();
        let ctx = ctx("t1");
        repo.create(&ctx, new_session("t1")).await.unwrap();
        assert_eq!(repo.count_active(&ctx, "t1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_orders_by_created_at_desc_then_id() {
        let repo = InMemorySessionRepository::new();
        let ctx = ctx("t1");
        let first = repo.create(&ctx, new_session("t1")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = repo.create(&ctx, new_session("t1")).await.unwrap();

        let page = repo.list(&ctx, SessionFilter::default(), Page::default()).await.unwrap();
        assert_eq!(page.items[0].id, second.id);
        assert_eq!(page.items[1].id, first.id);
    }
}
