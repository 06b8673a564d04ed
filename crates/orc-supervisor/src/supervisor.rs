//! The supervision loop: fence, load & transition, resolve agent,
//! dispatch, observe, finalise, release. One call to [`Supervisor::supervise`]
//! is one attempt; re-entrancy (crash recovery, retries) comes from calling
//! it again on the same session id, not from a loop inside this type.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use orc_dispatch::{DispatchError, ExecutionCallbacks, ExecutionResult};
use orc_engine::{Session, SessionStatus};
use orc_eventbus::{EventBus, OrchestratorEvent};
use orc_lock::{LockError, LockService, LockToken};
use orc_registry::AgentRegistry;
use orc_repository::{RepositoryError, RequestContext, SessionRepository};
use orc_resilience::{Classification, Classify};

use crate::adapters::AdapterResolver;
use crate::error::SupervisorError;
use crate::types::{required_capability, SupervisionOutcome, SupervisorConfig};

/// Everything one supervision attempt needs. Cheap to clone: every field is
/// itself a handle (`Arc`/channel-backed) shared across the orchestrator
/// process.
#[derive(Clone)]
pub struct Supervisor {
    repository: Arc<dyn SessionRepository>,
    locks: LockService,
    registry: AgentRegistry,
    events: EventBus,
    adapters: Arc<dyn AdapterResolver>,
    config: SupervisorConfig,
    in_flight: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl Supervisor {
    pub fn new(
        repository: Arc<dyn SessionRepository>,
        locks: LockService,
        registry: AgentRegistry,
        events: EventBus,
        adapters: Arc<dyn AdapterResolver>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            repository,
            locks,
            registry,
            events,
            adapters,
            config,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// External cancellation entry point. Writes `cancelled` directly for a
    /// pre-running session; for one already being supervised, signals the
    /// in-flight attempt's cancellation token instead and lets the
    /// supervisor drive the adapter's `abort` before the engine moves to
    /// its terminal status.
    pub async fn cancel(&self, ctx: &RequestContext, session_id: Uuid) -> Result<(), SupervisorError> {
        if let Some(token) = self.in_flight.lock().get(&session_id).cloned() {
            token.cancel();
            return Ok(());
        }

        let mut session = self.repository.get(ctx, session_id).await?;
        let version = session.version;
        session.cancel()?;
        let events = session.drain_events();
        self.persist(ctx, session, version).await?;
        self.publish_all(events);
        Ok(())
    }

    pub async fn supervise(&self, ctx: &RequestContext, session_id: Uuid) -> Result<SupervisionOutcome, SupervisorError> {
        let probe = self.repository.get(ctx, session_id).await?;
        let ttl = self.lock_ttl(&probe);
        let lock_name = format!("session:{session_id}");
        let holder = format!("{}:{}:{}", self.config.instance_id, session_id, Utc::now().timestamp_nanos_opt().unwrap_or_default());

        let outcome = self
            .locks
            .with_lock(&lock_name, &holder, ttl, &self.config.lock_acquire, |token| {
                let this = self.clone();
                let ctx = ctx.clone();
                async move { this.run_locked(&ctx, &lock_name, &holder, ttl, token, session_id).await }
            })
            .await;

        match outcome {
            Ok(inner) => inner,
            Err(LockError::Busy(_)) => Ok(SupervisionOutcome::LockContended),
            Err(err) => Err(err.into()),
        }
    }

    fn lock_ttl(&self, session: &Session) -> Duration {
        Duration::from_secs(session.max_duration_secs as u64).min(self.config.lock_ttl_cap)
    }

    async fn run_locked(
        &self,
        ctx: &RequestContext,
        lock_name: &str,
        holder: &str,
        ttl: Duration,
        _token: LockToken,
        session_id: Uuid,
    ) -> Result<SupervisionOutcome, SupervisorError> {
        let cancel_token = CancellationToken::new();
        self.in_flight.lock().insert(session_id, cancel_token.clone());
        let result = self.drive(ctx, lock_name, holder, ttl, session_id, cancel_token).await;
        self.in_flight.lock().remove(&session_id);
        result
    }

    async fn drive(
        &self,
        ctx: &RequestContext,
        lock_name: &str,
        holder: &str,
        ttl: Duration,
        session_id: Uuid,
        cancel_token: CancellationToken,
    ) -> Result<SupervisionOutcome, SupervisorError> {
        let mut session = self.repository.get(ctx, session_id).await?;

        // Step 2: load & transition. Already-`Running` sessions are a crash
        // recovery resume — no transition needed, just re-drive dispatch.
        if session.status != SessionStatus::Running {
            if session.status == SessionStatus::Pending {
                session.enqueue().map_err(|_| SupervisorError::AlreadyTerminal)?;
            }
            if session.start().is_err() {
                return Ok(SupervisionOutcome::NoOp);
            }
            let version = session.version;
            let events = session.drain_events();
            session = self.persist(ctx, session, version).await?;
            self.publish_all(events);
        }

        // Step 3: resolve agent.
        let capability = required_capability(session.session_type);
        let agent = match self.registry.pick(capability, &ctx.tenant_id) {
            Ok(agent) => agent,
            Err(_) => {
                let version = session.version;
                let _ = session.fail("no_agent", "no agent available for the required capability");
                let events = session.drain_events();
                self.persist(ctx, session, version).await?;
                self.publish_all(events);
                return Ok(SupervisionOutcome::Failed);
            }
        };

        let adapter = match self.adapters.resolve(&agent) {
            Ok(adapter) => adapter,
            Err(msg) => {
                let version = session.version;
                let _ = session.fail("dispatch_unavailable", msg);
                let events = session.drain_events();
                self.persist(ctx, session, version).await?;
                self.publish_all(events);
                return Ok(SupervisionOutcome::Failed);
            }
        };

        // Step 4 + 5: dispatch and observe.
        let pending_checkpoints: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let callbacks = self.build_callbacks(ctx, lock_name, holder, ttl, session_id, pending_checkpoints.clone());

        info!(agent_id = %agent.id, "dispatching session");
        let exec_result = adapter.execute(&session, callbacks, cancel_token.clone()).await;

        for value in pending_checkpoints.lock().drain(..) {
            session.add_checkpoint(value);
        }

        // Step 6: finalise.
        self.finalise(ctx, session, exec_result).await
    }

    async fn finalise(
        &self,
        ctx: &RequestContext,
        mut session: Session,
        exec_result: Result<ExecutionResult, DispatchError>,
    ) -> Result<SupervisionOutcome, SupervisorError> {
        let version = session.version;

        match exec_result {
            Ok(result) => {
                session.complete(json!({
                    "remote_id": result.remote_id,
                    "result": result.result,
                    "diff": result.diff,
                }))?;
                let events = session.drain_events();
                self.persist(ctx, session, version).await?;
                self.publish_all(events);
                Ok(SupervisionOutcome::Completed)
            }
            Err(DispatchError::Timeout) => {
                session.timeout()?;
                let events = session.drain_events();
                self.persist(ctx, session, version).await?;
                self.publish_all(events);
                Ok(SupervisionOutcome::TimedOut)
            }
            Err(DispatchError::Cancelled) => {
                session.cancel()?;
                let events = session.drain_events();
                self.persist(ctx, session, version).await?;
                self.publish_all(events);
                Ok(SupervisionOutcome::Cancelled)
            }
            Err(err) => {
                let transient = matches!(err.classify(), Classification::Transient);
                session.fail(failure_kind(&err), err.to_string())?;

                if transient && session.is_recoverable() {
                    session.requeue_for_retry()?;
                    let retry_count = session.metrics.retry_count;
                    let events = session.drain_events();
                    self.persist(ctx, session, version).await?;
                    self.publish_all(events);

                    let retry_after = Duration::from_secs_f64(
                        self.config.retry_delay.as_secs_f64() * self.config.retry_backoff.powi(retry_count as i32),
                    );
                    Ok(SupervisionOutcome::Requeued { retry_count, retry_after })
                } else {
                    let events = session.drain_events();
                    self.persist(ctx, session, version).await?;
                    self.publish_all(events);
                    Ok(SupervisionOutcome::Failed)
                }
            }
        }
    }

    fn build_callbacks<'a>(
        &self,
        ctx: &RequestContext,
        lock_name: &str,
        holder: &str,
        ttl: Duration,
        session_id: Uuid,
        pending_checkpoints: Arc<Mutex<Vec<Value>>>,
    ) -> ExecutionCallbacks<'a> {
        let last_checkpoint = Arc::new(Mutex::new(Instant::now() - self.config.checkpoint_interval));
        let checkpoint_interval = self.config.checkpoint_interval;

        let on_progress = {
            let locks = self.locks.clone();
            let lock_name = lock_name.to_string();
            let holder = holder.to_string();
            let last_checkpoint = last_checkpoint.clone();
            let repository = self.repository.clone();
            let events = self.events.clone();
            let ctx = ctx.clone();
            let pending = pending_checkpoints.clone();
            Box::new(move |progress: Value| {
                spawn_lock_extend(locks.clone(), lock_name.clone(), holder.clone(), ttl);

                let due = {
                    let mut last = last_checkpoint.lock();
                    if last.elapsed() >= checkpoint_interval {
                        *last = Instant::now();
                        true
                    } else {
                        false
                    }
                };
                if due {
                    pending.lock().push(progress.clone());
                    spawn_checkpoint_write(
                        repository.clone(),
                        events.clone(),
                        ctx.clone(),
                        session_id,
                        "interval".to_string(),
                        progress,
                    );
                }
            }) as Box<dyn FnMut(Value) + Send>
        };

        let on_checkpoint = {
            let locks = self.locks.clone();
            let lock_name = lock_name.to_string();
            let holder = holder.to_string();
            let repository = self.repository.clone();
            let events = self.events.clone();
            let ctx = ctx.clone();
            let pending = pending_checkpoints;
            Box::new(move |data: Value| {
                spawn_lock_extend(locks.clone(), lock_name.clone(), holder.clone(), ttl);
                pending.lock().push(data.clone());
                spawn_checkpoint_write(
                    repository.clone(),
                    events.clone(),
                    ctx.clone(),
                    session_id,
                    "agent_push".to_string(),
                    data,
                );
            }) as Box<dyn FnMut(Value) + Send>
        };

        let on_log = Box::new(move |line: String| {
            tracing::debug!(session_id = %session_id, "{line}");
        }) as Box<dyn FnMut(String) + Send>;

        ExecutionCallbacks {
            on_progress,
            on_checkpoint,
            on_log,
        }
    }

    async fn persist(&self, ctx: &RequestContext, mut session: Session, expected_version: u64) -> Result<Session, SupervisorError> {
        match self.repository.update(ctx, session.clone(), expected_version).await {
            Ok(saved) => Ok(saved),
            Err(RepositoryError::Conflict(_, stored_version)) => {
                warn!(session_id = %session.id, stored_version, "optimistic concurrency conflict, retrying once");
                session.version = stored_version;
                Ok(self.repository.update(ctx, session, stored_version).await?)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn publish_all(&self, events: Vec<OrchestratorEvent>) {
        for event in events {
            self.events.publish(event);
        }
    }
}

fn failure_kind(err: &DispatchError) -> &'static str {
    match err {
        DispatchError::Transport(_) => "upstream_unavailable",
        DispatchError::RemoteError(_) => "remote_error",
        DispatchError::Validation(_) => "validation",
        DispatchError::Timeout | DispatchError::Cancelled => unreachable!("handled by caller"),
    }
}

fn spawn_lock_extend(locks: LockService, name: String, holder: String, ttl: Duration) {
    tokio::spawn(async move {
        if let Err(err) = locks.touch(&name, &holder, ttl).await {
            warn!(lock = %name, error = %err, "failed to extend lock TTL on progress push");
        }
    });
}

fn spawn_checkpoint_write(
    repository: Arc<dyn SessionRepository>,
    events: EventBus,
    ctx: RequestContext,
    session_id: Uuid,
    trigger: String,
    data: Value,
) {
    tokio::spawn(async move {
        if let Ok(mut session) = repository.get(&ctx, session_id).await {
            session.add_checkpoint(json!({ "trigger": trigger, "data": data }));
            let version = session.version;
            let drained = session.drain_events();
            match repository.update(&ctx, session, version).await {
                Ok(_) => {
                    for event in drained {
                        events.publish(event);
                    }
                }
                Err(err) => {
                    warn!(session_id = %session_id, error = %err, "failed to persist durable checkpoint");
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AdapterResolver, DefaultAdapterResolver};
    use crate::types::SupervisorConfig;
    use async_trait::async_trait;
    use orc_dispatch::DispatchAdapter;
    use orc_engine::{NewSession, Priority, SessionType};
    use orc_lock::InMemoryLockBackend;
    use orc_registry::{Agent, AgentKind, AgentStatus, AgentType, Capability, PerformanceTier};
    use orc_repository::{InMemorySessionRepository, Role};
    use std::collections::{HashMap as StdHashMap, HashSet};

    fn ctx(tenant: &str) -> RequestContext {
        RequestContext::new(tenant, Role::Operator, "req-1")
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

    fn test_agent(tenant: &str) -> Agent {
        let now = Utc::now();
        Agent {
            id: "agent-1".to_string(),
            tenant_id: tenant.to_string(),
            name: "agent-1".to_string(),
            kind: AgentKind::Internal,
            agent_type: AgentType::Implementer,
            capabilities: HashSet::from([Capability::CodeGeneration]),
            status: AgentStatus::Active,
            tier: PerformanceTier::Standard,
            load: 0.1,
            max_concurrent_tasks: 4,
            tasks_completed: 0,
            success_rate: 1.0,
            registered_at: now,
            last_heartbeat: now,
            heartbeat_interval_secs: 15,
            consecutive_missed_heartbeats: 0,
            external: None,
        }
    }

    struct StubAdapter {
        result: Arc<Mutex<Option<Result<ExecutionResult, DispatchError>>>>,
    }

    #[async_trait]
    impl DispatchAdapter for StubAdapter {
        async fn execute(
            &self,
            _session: &Session,
            mut callbacks: ExecutionCallbacks<'_>,
            _cancel: CancellationToken,
        ) -> Result<ExecutionResult, DispatchError> {
            (callbacks.on_progress)(json!({"pct": 50}));
            (callbacks.on_log)("working".to_string());
            self.result.lock().take().expect("stub configured")
        }

        async fn abort(&self, _remote_id: &str) -> Result<(), DispatchError> {
            Ok(())
        }
    }

    struct StubResolver {
        result: Arc<Mutex<Option<Result<ExecutionResult, DispatchError>>>>,
    }

    impl AdapterResolver for StubResolver {
        fn resolve(&self, _agent: &Agent) -> Result<Arc<dyn DispatchAdapter>, String> {
            Ok(Arc::new(StubAdapter {
                result: self.result.clone(),
            }))
        }
    }

    fn supervisor_with(
        repo: Arc<InMemorySessionRepository>,
        outcome: Result<ExecutionResult, DispatchError>,
    ) -> Supervisor {
        let registry = AgentRegistry::new();
        registry.register(test_agent("t1"));

        let resolver: Arc<dyn AdapterResolver> = Arc::new(StubResolver {
            result: Arc::new(Mutex::new(Some(outcome))),
        });

        Supervisor::new(
            repo,
            LockService::new(Arc::new(InMemoryLockBackend::default())),
            registry,
            EventBus::default(),
            resolver,
            SupervisorConfig {
                checkpoint_interval: Duration::from_secs(1),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn happy_path_reaches_completed() {
        let repo = Arc::new(InMemorySessionRepository::new());
        let ctx = ctx("t1");
        let session = repo.create(&ctx, new_session("t1")).await.unwrap();

        let supervisor = supervisor_with(
            repo.clone(),
            Ok(ExecutionResult {
                remote_id: "remote-1".to_string(),
                result: json!({"status": "completed"}),
                diff: Some("diff".to_string()),
            }),
        );

        let outcome = supervisor.supervise(&ctx, session.id).await.unwrap();
        assert_eq!(outcome, SupervisionOutcome::Completed);

        let stored = repo.get(&ctx, session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Completed);
        assert!(stored.metrics.execution_duration_ms.is_some());
    }

    #[tokio::test]
    async fn rerunning_completed_session_is_a_noop() {
        let repo = Arc::new(InMemorySessionRepository::new());
        let ctx = ctx("t1");
        let session = repo.create(&ctx, new_session("t1")).await.unwrap();

        let supervisor = supervisor_with(
            repo.clone(),
            Ok(ExecutionResult {
                remote_id: "remote-1".to_string(),
                result: json!({}),
                diff: None,
            }),
        );
        supervisor.supervise(&ctx, session.id).await.unwrap();

        let outcome = supervisor.supervise(&ctx, session.id).await.unwrap();
        assert_eq!(outcome, SupervisionOutcome::NoOp);
    }

    #[tokio::test]
    async fn no_agent_available_fails_session() {
        let repo = Arc::new(InMemorySessionRepository::new());
        let ctx = ctx("t2");
        let session = repo.create(&ctx, new_session("t2")).await.unwrap();

        let registry = AgentRegistry::new();
        let resolver: Arc<dyn AdapterResolver> = Arc::new(StubResolver {
            result: Arc::new(Mutex::new(None)),
        });
        let supervisor = Supervisor::new(
            repo.clone(),
            LockService::new(Arc::new(InMemoryLockBackend::default())),
            registry,
            EventBus::default(),
            resolver,
            SupervisorConfig::default(),
        );

        let outcome = supervisor.supervise(&ctx, session.id).await.unwrap();
        assert_eq!(outcome, SupervisionOutcome::Failed);

        let stored = repo.get(&ctx, session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Failed);
        assert_eq!(stored.error_kind.as_deref(), Some("no_agent"));
    }

    #[tokio::test]
    async fn transient_failure_with_checkpoint_requeues() {
        let repo = Arc::new(InMemorySessionRepository::new());
        let ctx = ctx("t1");
        let session = repo.create(&ctx, new_session("t1")).await.unwrap();

        let supervisor = supervisor_with(repo.clone(), Err(DispatchError::Transport("boom".to_string())));
        let outcome = supervisor.supervise(&ctx, session.id).await.unwrap();

        match outcome {
            SupervisionOutcome::Requeued { retry_count, .. } => assert_eq!(retry_count, 1),
            other => panic!("expected Requeued, got {other:?}"),
        }

        let stored = repo.get(&ctx, session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Queued);
        assert_eq!(stored.metrics.retry_count, 1);
        assert!(!stored.checkpoints.is_empty());
    }

    #[tokio::test]
    async fn lock_contention_leaves_loser_untouched() {
        let repo = Arc::new(InMemorySessionRepository::new());
        let ctx = ctx("t1");
        let session = repo.create(&ctx, new_session("t1")).await.unwrap();

        let backend = Arc::new(InMemoryLockBackend::default());
        let locks = LockService::new(backend);
        let held = locks
            .acquire(
                &format!("session:{}", session.id),
                "other-holder",
                Duration::from_secs(600),
                &orc_lock::AcquireConfig {
                    deadline: Duration::from_millis(10),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let registry = AgentRegistry::new();
        let resolver: Arc<dyn AdapterResolver> = Arc::new(StubResolver {
            result: Arc::new(Mutex::new(None)),
        });
        let supervisor = Supervisor::new(
            repo.clone(),
            locks.clone(),
            registry,
            EventBus::default(),
            resolver,
            SupervisorConfig {
                lock_acquire: orc_lock::AcquireConfig {
                    deadline: Duration::from_millis(10),
                    ..Default::default()
                },
                ..Default::default()
            },
        );

        let outcome = supervisor.supervise(&ctx, session.id).await.unwrap();
        assert_eq!(outcome, SupervisionOutcome::LockContended);

        let stored = repo.get(&ctx, session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Pending);

        locks.release(&held).await.unwrap();
    }
}
