use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use orc_dispatch::ExternalAgentGateway;
use orc_engine::{NewSession, Session};
use orc_eventbus::EventBus;
use orc_lock::LockService;
use orc_registry::AgentRegistry;
use orc_repository::{RequestContext, SessionRepository};
use orc_supervisor::{GatedAction, QuotaGate, Supervisor, SupervisorError, TenantDirectory};

use crate::platform::config::PlatformConfig;

#[derive(Clone)]
pub struct PlatformContext {
    shared: Arc<SharedState>,
    shutdown: CancellationToken,
}

struct SharedState {
    config: PlatformConfig,
    repository: Arc<dyn SessionRepository>,
    locks: LockService,
    events: EventBus,
    registry: AgentRegistry,
    tenants: TenantDirectory,
    supervisor: Supervisor,
    gateway: ExternalAgentGateway,
}

impl PlatformContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: PlatformConfig,
        repository: Arc<dyn SessionRepository>,
        locks: LockService,
        events: EventBus,
        registry: AgentRegistry,
        tenants: TenantDirectory,
        supervisor: Supervisor,
        gateway: ExternalAgentGateway,
        shutdown: CancellationToken,
    ) -> Self {
        let shared = SharedState {
            config,
            repository,
            locks,
            events,
            registry,
            tenants,
            supervisor,
            gateway,
        };

        Self {
            shared: Arc::new(shared),
            shutdown,
        }
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.shared.config
    }

    pub fn repository(&self) -> Arc<dyn SessionRepository> {
        self.shared.repository.clone()
    }

    pub fn locks(&self) -> LockService {
        self.shared.locks.clone()
    }

    pub fn events(&self) -> EventBus {
        self.shared.events.clone()
    }

    pub fn registry(&self) -> AgentRegistry {
        self.shared.registry.clone()
    }

    pub fn tenants(&self) -> TenantDirectory {
        self.shared.tenants.clone()
    }

    pub fn supervisor(&self) -> Supervisor {
        self.shared.supervisor.clone()
    }

    /// Registry of external-agent task ids awaiting an EAP callback. The
    /// HTTP ingestion endpoint that delivers those callbacks lives outside
    /// this core; this handle is what it would call.
    pub fn external_gateway(&self) -> ExternalAgentGateway {
        self.shared.gateway.clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// The entry point for bringing a new session into the system: runs
    /// the §4.9 role/quota gate (`QuotaGate::check`) before the session is
    /// validated and persisted, so `active_sessions(tenant) <= quota(tenant)`
    /// actually holds for sessions created through the platform rather than
    /// being an invariant only the gate's own tests exercise.
    pub async fn create_session(&self, ctx: &RequestContext, new_session: NewSession) -> Result<Session, SupervisorError> {
        let gate = QuotaGate::new(self.shared.tenants.clone(), self.shared.repository.clone());
        gate.check(ctx, GatedAction::Create).await?;

        let session = Session::create(new_session).map_err(SupervisorError::InvalidSession)?;
        Ok(self.shared.repository.create(ctx, session).await?)
    }
}
