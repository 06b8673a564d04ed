//! Tenant directory and the quota/RBAC gate guarding session create/start.
//! The directory is a small in-memory port: tenants are provisioning-time
//! data in this core, not something sessions mutate.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use orc_repository::{RequestContext, Role, SessionRepository};

use crate::error::SupervisorError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub display_name: String,
    pub active_session_quota: u64,
}

#[derive(Clone, Default)]
pub struct TenantDirectory {
    tenants: Arc<RwLock<HashMap<String, Tenant>>>,
}

impl TenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tenant: Tenant) {
        self.tenants.write().insert(tenant.id.clone(), tenant);
    }

    pub fn get(&self, id: &str) -> Option<Tenant> {
        self.tenants.read().get(id).cloned()
    }

    /// All provisioned tenants, for callers (the supervision poll loop)
    /// that need to sweep every tenant rather than look one up.
    pub fn list(&self) -> Vec<Tenant> {
        self.tenants.read().values().cloned().collect()
    }
}

/// Gate checked on every create/start: the request carries a tenant id and
/// role (`RequestContext`), the role permits the operation, and — for
/// create/start — the tenant's active-session count is under quota.
#[derive(Clone)]
pub struct QuotaGate<R: SessionRepository> {
    tenants: TenantDirectory,
    repository: Arc<R>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatedAction {
    Create,
    Start,
    Cancel,
    Delete,
    ManageAgents,
    Read,
}

impl GatedAction {
    fn minimum_role(self) -> Role {
        match self {
            GatedAction::Read => Role::Viewer,
            GatedAction::Create => Role::Contributor,
            GatedAction::Start | GatedAction::Cancel => Role::Operator,
            GatedAction::Delete | GatedAction::ManageAgents => Role::Admin,
        }
    }

    fn name(self) -> &'static str {
        match self {
            GatedAction::Create => "create",
            GatedAction::Start => "start",
            GatedAction::Cancel => "cancel",
            GatedAction::Delete => "delete",
            GatedAction::ManageAgents => "manage agents",
            GatedAction::Read => "read",
        }
    }

    fn quota_checked(self) -> bool {
        matches!(self, GatedAction::Create | GatedAction::Start)
    }
}

impl<R: SessionRepository> QuotaGate<R> {
    pub fn new(tenants: TenantDirectory, repository: Arc<R>) -> Self {
        Self { tenants, repository }
    }

    /// Runs the three §4.9 checks in order. Returns the resolved
    /// [`Tenant`] record on success so callers don't need a second lookup.
    pub async fn check(&self, ctx: &RequestContext, action: GatedAction) -> Result<Tenant, SupervisorError> {
        let tenant = self
            .tenants
            .get(&ctx.tenant_id)
            .ok_or_else(|| SupervisorError::UnknownTenant(ctx.tenant_id.clone()))?;

        let minimum = action.minimum_role();
        if ctx.role < minimum {
            return Err(SupervisorError::Forbidden {
                role: ctx.role,
                action: action.name(),
            });
        }

        if action.quota_checked() {
            let active = self.repository.count_active(ctx, &tenant.id).await?;
            if active >= tenant.active_session_quota {
                return Err(SupervisorError::QuotaExceeded {
                    tenant: tenant.id.clone(),
                    quota: tenant.active_session_quota,
                });
            }
        }

        Ok(tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_repository::InMemorySessionRepository;

    fn ctx(tenant: &str, role: Role) -> RequestContext {
        RequestContext::new(tenant, role, "req-1")
    }

    fn gate() -> QuotaGate<InMemorySessionRepository> {
        let tenants = TenantDirectory::new();
        tenants.register(Tenant {
            id: "t1".to_string(),
            display_name: "Tenant One".to_string(),
            active_session_quota: 1,
        });
        QuotaGate::new(tenants, Arc::new(InMemorySessionRepository::new()))
    }

    #[tokio::test]
    async fn viewer_cannot_create() {
        let gate = gate();
        let err = gate.check(&ctx("t1", Role::Viewer), GatedAction::Create).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn unknown_tenant_rejected() {
        let gate = gate();
        let err = gate
            .check(&ctx("ghost", Role::Contributor), GatedAction::Create)
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::UnknownTenant(_)));
    }

    #[tokio::test]
    async fn quota_exceeded_when_active_at_ceiling() {
        use orc_engine::{NewSession, Priority, Session, SessionType};
        use std::collections::HashMap as StdHashMap;

        let gate = gate();
        let ctx1 = ctx("t1", Role::Contributor);
        let session = Session::create(NewSession {
            tenant_id: "t1".to_string(),
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
        .unwrap();
        gate.repository.create(&ctx1, session).await.unwrap();

        let err = gate.check(&ctx1, GatedAction::Create).await.unwrap_err();
        assert!(matches!(err, SupervisorError::QuotaExceeded { .. }));
    }
}
