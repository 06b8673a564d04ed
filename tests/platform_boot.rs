//! End-to-end integration test: boots the platform with in-memory
//! backends, supervises a session through to completion against the
//! internal HTTP adapter, and confirms a clean shutdown.

use std::collections::HashMap;
use std::time::Duration;

use orc_engine::{NewSession, Priority, SessionType};
use orc_repository::{RequestContext, Role};
use orc_supervisor::{SupervisionOutcome, SupervisorError, Tenant};
use orchestrator::platform::{Platform, PlatformConfig};

fn new_session(tenant: &str) -> NewSession {
    NewSession {
        tenant_id: tenant.to_string(),
        session_type: SessionType::Execution,
        priority: Priority::Medium,
        title: "Add retry budget to the ingest worker".to_string(),
        description: None,
        initial_prompt: "Add a capped retry budget to the ingest worker".to_string(),
        agent_config: HashMap::new(),
        model: None,
        max_duration_secs: 60,
        cpu_limit: None,
        memory_limit_mb: None,
        parent_id: None,
    }
}

#[tokio::test]
async fn platform_boots_and_shuts_down_cleanly() {
    let mut config = PlatformConfig::default();
    config.observability.enable_metrics = false;

    let mut platform = Platform::new(config);
    platform.register_tenant(Tenant {
        id: "acme".to_string(),
        display_name: "Acme".to_string(),
        active_session_quota: 10,
    });

    let runtime = platform.start().await.unwrap();
    let ctx = runtime.context();
    assert_eq!(ctx.tenants().list().len(), 1);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn supervise_moves_a_pending_session_with_no_agent_to_failed() {
    let mut config = PlatformConfig::default();
    config.observability.enable_metrics = false;

    let mut platform = Platform::new(config);
    platform.register_tenant(Tenant {
        id: "acme".to_string(),
        display_name: "Acme".to_string(),
        active_session_quota: 10,
    });

    let runtime = platform.start().await.unwrap();
    let ctx = runtime.context();

    let req_ctx = RequestContext::new("acme", Role::Contributor, "test-req-1");
    let created = ctx.create_session(&req_ctx, new_session("acme")).await.unwrap();

    // No agent has ever registered, so the supervisor dispatches nowhere
    // and the session fails fast rather than hanging.
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        ctx.supervisor().supervise(&req_ctx, created.id),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(outcome, SupervisionOutcome::Failed);

    let stored = ctx.repository().get(&req_ctx, created.id).await.unwrap();
    assert_eq!(stored.status, orc_engine::SessionStatus::Failed);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn create_session_is_refused_once_tenant_quota_is_exhausted() {
    let mut config = PlatformConfig::default();
    config.observability.enable_metrics = false;

    let mut platform = Platform::new(config);
    platform.register_tenant(Tenant {
        id: "acme".to_string(),
        display_name: "Acme".to_string(),
        active_session_quota: 1,
    });

    let runtime = platform.start().await.unwrap();
    let ctx = runtime.context();
    let req_ctx = RequestContext::new("acme", Role::Contributor, "test-req-2");

    ctx.create_session(&req_ctx, new_session("acme")).await.unwrap();

    let err = ctx.create_session(&req_ctx, new_session("acme")).await.unwrap_err();
    assert!(matches!(err, SupervisorError::QuotaExceeded { .. }));

    runtime.shutdown().await.unwrap();
}
