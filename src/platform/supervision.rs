//! The two background services a running orchestrator instance owns
//! outright: the supervision poll loop that drives queued sessions through
//! [`orc_supervisor::Supervisor::supervise`], and the agent-registry
//! heartbeat sweep. Both follow the same spawn-on-a-tick shape as the
//! teacher's layer services, registered through [`ServiceRegistration`]
//! like every other platform service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use orc_repository::{Page, RequestContext, Role, SessionFilter};
use orc_supervisor::TenantDirectory;

use crate::platform::config::OrchestratorSettings;
use crate::platform::context::PlatformContext;
use crate::platform::service::ServiceRegistration;

const SYSTEM_REQUEST_ID: &str = "supervision-loop";

/// One tick: for every registered tenant, lists sessions not yet dispatched
/// or resuming from a crash (pending, queued, running) and hands each to
/// the supervisor, bounded by `max_concurrent_supervisors` in flight.
pub fn supervision_loop_service(tenants: TenantDirectory, settings: OrchestratorSettings) -> ServiceRegistration {
    ServiceRegistration::new(
        "supervision-loop",
        Arc::new(move |ctx: PlatformContext, token: CancellationToken| {
            let tenants = tenants.clone();
            let interval = Duration::from_secs(settings.supervision_poll_interval_secs.max(1));
            let permits = Arc::new(Semaphore::new(settings.max_concurrent_supervisors.max(1)));

            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                let outcome: Result<()> = loop {
                    tokio::select! {
                        _ = token.cancelled() => break Ok(()),
                        _ = ticker.tick() => {
                            run_tick(&ctx, &tenants, &permits).await;
                        }
                    }
                };
                outcome
            })
        }),
    )
}

async fn run_tick(ctx: &PlatformContext, tenants: &TenantDirectory, permits: &Arc<Semaphore>) {
    let repository = ctx.repository();
    let supervisor = ctx.supervisor();

    for tenant in tenants.list() {
        let req_ctx = RequestContext::new(tenant.id.clone(), Role::Admin, SYSTEM_REQUEST_ID.to_string());

        for status in dispatchable_statuses() {
            let page = match repository
                .list(
                    &req_ctx,
                    SessionFilter {
                        status: Some(status),
                        ..SessionFilter::default()
                    },
                    Page { offset: 0, limit: 100 },
                )
                .await
            {
                Ok(page) => page,
                Err(err) => {
                    error!(tenant = %tenant.id, error = %err, "failed to list sessions for supervision sweep");
                    continue;
                }
            };

            for session in page.items {
                let permit = match permits.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        debug!("supervision concurrency cap reached, deferring to next tick");
                        break;
                    }
                };

                let supervisor = supervisor.clone();
                let req_ctx = req_ctx.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    match supervisor.supervise(&req_ctx, session.id).await {
                        Ok(outcome) => crate::platform::metrics::record_outcome(&outcome),
                        Err(err) => {
                            crate::platform::metrics::record_error();
                            warn!(session_id = %session.id, error = %err, "supervision attempt failed");
                        }
                    }
                });
            }
        }
    }
}

fn dispatchable_statuses() -> [orc_engine::SessionStatus; 3] {
    use orc_engine::SessionStatus::*;
    [Pending, Queued, Running]
}

pub fn heartbeat_sweep_service(settings: OrchestratorSettings) -> ServiceRegistration {
    ServiceRegistration::new(
        "heartbeat-sweep",
        Arc::new(move |ctx: PlatformContext, token: CancellationToken| {
            let interval = Duration::from_secs(settings.heartbeat_sweep_interval_secs.max(1));
            tokio::spawn(async move {
                let registry = ctx.registry();
                let mut ticker = tokio::time::interval(interval);
                let outcome: Result<()> = loop {
                    tokio::select! {
                        _ = token.cancelled() => break Ok(()),
                        _ = ticker.tick() => {
                            registry.sweep_missed_heartbeats();
                        }
                    }
                };
                outcome
            })
        }),
    )
}
