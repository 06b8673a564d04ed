//! External (webhook/EAP) adapter. The orchestrator's only outbound call
//! is the task assignment POST; everything else — heartbeats, the task
//! result — arrives as an inbound callback through
//! [`ExternalAgentGateway::deliver_result`], which the out-of-core
//! ingestion endpoint is expected to call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::json;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use orc_engine::Session;
use orc_resilience::ResilientCaller;

use crate::adapter::DispatchAdapter;
use crate::types::{
    Artifact, DispatchError, ExecutionCallbacks, ExecutionResult, TaskAssignment, TaskResult,
    TaskResultStatus,
};

/// Registry of task ids awaiting a result, shared between the adapter and
/// whatever ingests inbound `TaskResult` callbacks.
#[derive(Clone, Default)]
pub struct ExternalAgentGateway {
    waiters: Arc<Mutex<HashMap<Uuid, oneshot::Sender<TaskResult>>>>,
}

impl ExternalAgentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, task_id: Uuid) -> oneshot::Receiver<TaskResult> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(task_id, tx);
        rx
    }

    /// Called by the inbound ingestion endpoint when a `TaskResult`
    /// callback arrives. Returns `true` if a waiter was found, `false` if
    /// it already timed out or the task id is unknown.
    pub fn deliver_result(&self, result: TaskResult) -> bool {
        if let Some(tx) = self.waiters.lock().remove(&result.task_id) {
            tx.send(result).is_ok()
        } else {
            false
        }
    }
}

pub struct ExternalWebhookAdapter {
    client: Client,
    endpoint_url: String,
    auth_token: String,
    caller: Arc<ResilientCaller>,
    gateway: ExternalAgentGateway,
}

impl ExternalWebhookAdapter {
    pub fn new(
        endpoint_url: impl Into<String>,
        auth_token: impl Into<String>,
        caller: Arc<ResilientCaller>,
        gateway: ExternalAgentGateway,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint_url: endpoint_url.into(),
            auth_token: auth_token.into(),
            caller,
            gateway,
        }
    }
}

#[async_trait]
impl DispatchAdapter for ExternalWebhookAdapter {
    async fn execute(
        &self,
        session: &Session,
        mut callbacks: ExecutionCallbacks<'_>,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, DispatchError> {
        let task_id = Uuid::new_v4();
        let assignment = TaskAssignment {
            task_id,
            context: json!({ "session_id": session.id, "tenant_id": session.tenant_id }),
            input: session.initial_prompt.clone(),
            requirements: Vec::new(),
        };

        let receiver = self.gateway.register(task_id);

        info!(task_id = %task_id, endpoint = %self.endpoint_url, "posting task assignment");
        self.caller
            .call("agent:external", || {
                let client = self.client.clone();
                let url = self.endpoint_url.clone();
                let token = self.auth_token.clone();
                let assignment = assignment.clone();
                async move {
                    let response = client
                        .post(&url)
                        .header("X-Agent-Token", token)
                        .json(&assignment)
                        .send()
                        .await
                        .map_err(|e| DispatchError::Transport(e.to_string()))?;

                    let status = response.status();
                    if status.is_server_error() || status.as_u16() == 429 {
                        return Err(DispatchError::Transport(format!("status {status}")));
                    }
                    if !status.is_success() {
                        // The webhook endpoint itself rejected the
                        // assignment (bad auth, malformed payload, ...) —
                        // fail fast rather than retry.
                        return Err(DispatchError::Validation(format!("status {status}")));
                    }
                    Ok(())
                }
            })
            .await
            .map_err(|e| e.into_inner().unwrap_or(DispatchError::Transport("rate limited or breaker open".into())))?;

        (callbacks.on_log)(format!("task {task_id} assigned, awaiting callback"));

        let timeout = Duration::from_secs(session.max_duration_secs as u64);
        tokio::select! {
            result = receiver => {
                let result = result.map_err(|_| DispatchError::Transport("result channel closed".into()))?;
                match result.status {
                    TaskResultStatus::Completed => {
                        (callbacks.on_checkpoint)(json!({ "task_id": task_id }));
                        Ok(ExecutionResult {
                            remote_id: task_id.to_string(),
                            result: json!({ "metrics": result.metrics }),
                            diff: diff_from_artifacts(&result.artifacts),
                        })
                    }
                    TaskResultStatus::Failed => Err(DispatchError::RemoteError("external agent reported failure".into())),
                }
            }
            _ = tokio::time::sleep(timeout) => {
                self.abort(&task_id.to_string()).await?;
                Err(DispatchError::Timeout)
            }
            _ = cancel.cancelled() => {
                self.abort(&task_id.to_string()).await?;
                Err(DispatchError::Cancelled)
            }
        }
    }

    async fn abort(&self, remote_id: &str) -> Result<(), DispatchError> {
        // The protocol never calls the external process except to assign
        // the task; cancellation here only stops waiting for its result.
        warn!(task_id = remote_id, "giving up on external task, no abort call exists in EAP");
        Ok(())
    }
}

fn diff_from_artifacts(artifacts: &[Artifact]) -> Option<String> {
    if artifacts.is_empty() {
        return None;
    }
    Some(
        artifacts
            .iter()
            .map(|a| format!("--- {}\n{}", a.path, a.content))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivering_unknown_task_id_is_a_noop() {
        let gateway = ExternalAgentGateway::new();
        let delivered = gateway.deliver_result(TaskResult {
            task_id: Uuid::new_v4(),
            status: TaskResultStatus::Completed,
            artifacts: vec![],
            metrics: json!({}),
        });
        assert!(!delivered);
    }

    #[tokio::test]
    async fn registered_waiter_receives_delivered_result() {
        let gateway = ExternalAgentGateway::new();
        let task_id = Uuid::new_v4();
        let receiver = gateway.register(task_id);

        let delivered = gateway.deliver_result(TaskResult {
            task_id,
            status: TaskResultStatus::Completed,
            artifacts: vec![],
            metrics: json!({}),
        });
        assert!(delivered);

        let result = receiver.await.unwrap();
        assert_eq!(result.task_id, task_id);
    }
}
