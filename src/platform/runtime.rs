use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use orc_dispatch::{ExternalAgentGateway, InternalHttpAdapter};
use orc_eventbus::EventBus;
use orc_lock::{InMemoryLockBackend, LockService, RedisLockBackend};
use orc_registry::AgentRegistry;
use orc_repository::{InMemorySessionRepository, PostgresSessionRepository, SessionRepository};
use orc_resilience::{
    CircuitBreakerConfig, CircuitBreakerRegistry, InMemoryWindowStore, RateLimitRule, RateLimiter,
    RedisWindowStore, ResilientCaller, RetryConfig, WindowStore,
};
use orc_supervisor::adapters::DefaultAdapterResolver;
use orc_supervisor::{Supervisor, SupervisorConfig, TenantDirectory};

use crate::platform::config::{AgentApiSettings, CacheSettings, DatabaseSettings, OrchestratorSettings, PlatformConfig};
use crate::platform::context::PlatformContext;
use crate::platform::service::ServiceRegistration;
use crate::platform::supervision::{heartbeat_sweep_service, supervision_loop_service};
use crate::platform::telemetry::telemetry_service;

pub struct Platform {
    config: PlatformConfig,
    services: Vec<ServiceRegistration>,
    tenants: TenantDirectory,
}

impl Platform {
    pub fn new(config: PlatformConfig) -> Self {
        let mut services = Vec::new();
        services.push(telemetry_service(config.observability.clone()));

        Self {
            config,
            services,
            tenants: TenantDirectory::new(),
        }
    }

    pub fn register_service(&mut self, service: ServiceRegistration) {
        self.services.push(service);
    }

    /// Registers a tenant ahead of `start`; the supervision poll loop and
    /// quota gate only know about tenants registered here. Tenants are
    /// provisioning-time data in this core, not something created over
    /// the wire.
    pub fn register_tenant(&mut self, tenant: orc_supervisor::Tenant) {
        self.tenants.register(tenant);
    }

    pub async fn start(self) -> Result<PlatformRuntime> {
        initialize_logging(&self.config);

        let repository = build_repository(&self.config.database).await?;
        let locks = build_lock_service(&self.config.cache).await?;
        let events = EventBus::default();
        let registry = AgentRegistry::with_event_bus(events.clone());

        let caller = Arc::new(build_resilient_caller(&self.config.agent_api, &self.config.cache).await?);
        let internal = Arc::new(InternalHttpAdapter::new(self.config.agent_api.base_url.clone(), caller.clone()));
        let gateway = ExternalAgentGateway::new();
        let adapters = Arc::new(DefaultAdapterResolver::new(internal, caller, gateway.clone()));

        let supervisor_config = supervisor_config_from(&self.config.orchestrator);
        let supervisor = Supervisor::new(
            repository.clone(),
            locks.clone(),
            registry.clone(),
            events.clone(),
            adapters,
            supervisor_config,
        );

        let root_token = CancellationToken::new();
        let context = PlatformContext::new(
            self.config.clone(),
            repository,
            locks,
            events,
            registry,
            self.tenants.clone(),
            supervisor,
            gateway,
            root_token.child_token(),
        );

        let mut tasks = Vec::new();
        let mut services = self.services;
        services.push(supervision_loop_service(self.tenants.clone(), self.config.orchestrator.clone()));
        services.push(heartbeat_sweep_service(self.config.orchestrator.clone()));

        for service in services {
            let handle = service.spawn(context.clone(), root_token.child_token());
            tasks.push((service.name().to_string(), handle));
        }

        info!("platform boot completed");

        Ok(PlatformRuntime {
            context,
            cancel_token: root_token,
            tasks,
        })
    }
}

pub struct PlatformRuntime {
    context: PlatformContext,
    cancel_token: CancellationToken,
    tasks: Vec<(String, JoinHandle<Result<()>>)>,
}

impl PlatformRuntime {
    pub fn context(&self) -> PlatformContext {
        self.context.clone()
    }

    pub async fn shutdown(self) -> Result<()> {
        self.cancel_token.cancel();

        for (name, handle) in self.tasks {
            match handle.await {
                Ok(Ok(())) => info!(service = %name, "service shutdown cleanly"),
                Ok(Err(err)) => {
                    return Err(err);
                }
                Err(err) => {
                    return Err(err.into());
                }
            }
        }

        Ok(())
    }
}

fn initialize_logging(config: &PlatformConfig) {
    let filter = &config.observability.log_level;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter.as_str())
        .try_init();
}

async fn build_repository(settings: &DatabaseSettings) -> Result<Arc<dyn SessionRepository>> {
    if settings.use_postgres {
        let repo = PostgresSessionRepository::connect(&settings.connection_url(), settings.pool_size).await?;
        repo.migrate().await?;
        Ok(Arc::new(repo))
    } else {
        info!("using in-memory session repository (database.use_postgres is false)");
        Ok(Arc::new(InMemorySessionRepository::new()))
    }
}

async fn build_lock_service(settings: &CacheSettings) -> Result<LockService> {
    if settings.use_redis {
        let backend = RedisLockBackend::connect(&settings.connection_url())
            .await
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
        Ok(LockService::new(Arc::new(backend)))
    } else {
        info!("using in-memory lock backend (cache.use_redis is false)");
        Ok(LockService::new(Arc::new(InMemoryLockBackend::default())))
    }
}

async fn build_resilient_caller(settings: &AgentApiSettings, cache: &CacheSettings) -> Result<ResilientCaller> {
    let breakers = CircuitBreakerRegistry::new(CircuitBreakerConfig {
        failure_threshold: settings.circuit_failure_threshold,
        recovery_timeout: Duration::from_secs(settings.circuit_reset_timeout_secs),
        ..CircuitBreakerConfig::default()
    });
    let store: Box<dyn WindowStore> = if cache.use_redis {
        let store = RedisWindowStore::connect(&cache.connection_url())
            .await
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
        Box::new(store)
    } else {
        info!("using in-memory rate-limit window store (cache.use_redis is false)");
        Box::new(InMemoryWindowStore::default())
    };
    let limiter = RateLimiter::new(
        store,
        RateLimitRule {
            limit: settings.requests_per_minute,
            window: Duration::from_secs(60),
        },
    );
    Ok(ResilientCaller::new(breakers, limiter, RetryConfig::default()))
}

fn supervisor_config_from(settings: &OrchestratorSettings) -> SupervisorConfig {
    SupervisorConfig {
        instance_id: "orchestrator-0".to_string(),
        lock_ttl_cap: Duration::from_secs(settings.lock_ttl_cap_secs),
        checkpoint_interval: Duration::from_secs(settings.checkpoint_interval_secs),
        retry_delay: Duration::from_secs(settings.retry_delay_secs),
        retry_backoff: settings.retry_backoff,
        ..SupervisorConfig::default()
    }
}
