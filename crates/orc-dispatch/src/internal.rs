//! Internal adapter: reaches the agent through its own HTTP API. Creates a
//! remote session, sends the initial prompt, polls to completion with
//! capped exponential backoff, and fetches the diff on success.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use orc_engine::Session;
use orc_resilience::ResilientCaller;

use crate::adapter::DispatchAdapter;
use crate::types::{DispatchError, ExecutionCallbacks, ExecutionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RemoteStatus {
    Running,
    Idle,
    Completed,
    Failed,
}

#[derive(Debug, Deserialize)]
struct RemoteStatusResponse {
    status: RemoteStatus,
    progress: Option<Value>,
}

const POLL_INITIAL: Duration = Duration::from_secs(2);
const POLL_MULTIPLIER: f64 = 1.5;
const POLL_MAX: Duration = Duration::from_secs(30);

pub struct InternalHttpAdapter {
    client: Client,
    base_url: String,
    caller: Arc<ResilientCaller>,
}

impl InternalHttpAdapter {
    pub fn new(base_url: impl Into<String>, caller: Arc<ResilientCaller>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            caller,
        }
    }

    async fn create_remote_session(&self, session: &Session) -> Result<String, DispatchError> {
        let url = format!("{}/api/v1/sessions", self.base_url);
        let body = json!({
            "title": session.title,
            "model": session.model,
            "max_duration_secs": session.max_duration_secs,
        });

        let response: Value = self
            .caller
            .call("agent:internal", || {
                let client = self.client.clone();
                let url = url.clone();
                let body = body.clone();
                async move { send_json(&client, &url, &body).await }
            })
            .await
            .map_err(|e| e.into_inner().unwrap_or(DispatchError::Transport("rate limited or breaker open".into())))?;

        response
            .get("remote_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DispatchError::RemoteError("missing remote_id in response".into()))
    }

    async fn send_prompt(&self, remote_id: &str, prompt: &str) -> Result<(), DispatchError> {
        let url = format!("{}/api/v1/sessions/{}/messages", self.base_url, remote_id);
        let body = json!({ "content": prompt, "async": true });

        self.caller
            .call("agent:internal", || {
                let client = self.client.clone();
                let url = url.clone();
                let body = body.clone();
                async move { send_json(&client, &url, &body).await }
            })
            .await
            .map_err(|e| e.into_inner().unwrap_or(DispatchError::Transport("rate limited or breaker open".into())))?;
        Ok(())
    }

    async fn fetch_status(&self, remote_id: &str) -> Result<RemoteStatusResponse, DispatchError> {
        let url = format!("{}/api/v1/sessions/{}/status", self.base_url, remote_id);

        self.caller
            .call("agent:internal", || {
                let client = self.client.clone();
                let url = url.clone();
                async move {
                    let response = client
                        .get(&url)
                        .send()
                        .await
                        .map_err(|e| DispatchError::Transport(e.to_string()))?;
                    status_from_response(response).await
                }
            })
            .await
            .map_err(|e| e.into_inner().unwrap_or(DispatchError::Transport("rate limited or breaker open".into())))
    }

    async fn fetch_diff(&self, remote_id: &str) -> Result<Option<String>, DispatchError> {
        let url = format!("{}/api/v1/sessions/{}/diff", self.base_url, remote_id);

        let value: Value = self
            .caller
            .call("agent:internal", || {
                let client = self.client.clone();
                let url = url.clone();
                async move {
                    let response = client
                        .get(&url)
                        .send()
                        .await
                        .map_err(|e| DispatchError::Transport(e.to_string()))?;
                    json_from_response(response).await
                }
            })
            .await
            .map_err(|e| e.into_inner().unwrap_or(DispatchError::Transport("rate limited or breaker open".into())))?;

        Ok(value.get("diff").and_then(Value::as_str).map(str::to_string))
    }
}

async fn send_json(client: &Client, url: &str, body: &Value) -> Result<Value, DispatchError> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| DispatchError::Transport(e.to_string()))?;
    json_from_response(response).await
}

async fn json_from_response(response: reqwest::Response) -> Result<Value, DispatchError> {
    let status = response.status();
    if status.is_server_error() || status.as_u16() == 429 {
        return Err(DispatchError::Transport(format!("status {status}")));
    }
    if !status.is_success() {
        // Anything else (400/401/403/404/...) is the agent API rejecting
        // the request itself, not a transient condition — fail fast
        // rather than retry or count it against the breaker.
        return Err(DispatchError::Validation(format!("status {status}")));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| DispatchError::Transport(e.to_string()))
}

async fn status_from_response(response: reqwest::Response) -> Result<RemoteStatusResponse, DispatchError> {
    let value = json_from_response(response).await?;
    serde_json::from_value(value).map_err(|e| DispatchError::RemoteError(e.to_string()))
}

#[async_trait]
impl DispatchAdapter for InternalHttpAdapter {
    async fn execute(
        &self,
        session: &Session,
        mut callbacks: ExecutionCallbacks<'_>,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, DispatchError> {
        let remote_id = self.create_remote_session(session).await?;
        info!(remote_id = %remote_id, session_id = %session.id, "created remote session");

        self.send_prompt(&remote_id, &session.initial_prompt).await?;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(session.max_duration_secs as u64);
        let mut backoff = POLL_INITIAL;

        loop {
            if cancel.is_cancelled() {
                self.abort(&remote_id).await?;
                return Err(DispatchError::Cancelled);
            }
            if tokio::time::Instant::now() >= deadline {
                self.abort(&remote_id).await?;
                return Err(DispatchError::Timeout);
            }

            let status = self.fetch_status(&remote_id).await?;
            if let Some(progress) = status.progress.clone() {
                (callbacks.on_progress)(progress);
            }
            debug!(remote_id = %remote_id, status = ?status.status, "polled remote status");

            match status.status {
                RemoteStatus::Completed => {
                    let diff = self.fetch_diff(&remote_id).await?;
                    (callbacks.on_checkpoint)(json!({ "remote_id": remote_id, "at": Utc::now() }));
                    return Ok(ExecutionResult {
                        remote_id,
                        result: json!({ "status": "completed" }),
                        diff,
                    });
                }
                RemoteStatus::Failed => {
                    return Err(DispatchError::RemoteError("remote agent reported failure".into()));
                }
                RemoteStatus::Idle => {
                    let diff = self.fetch_diff(&remote_id).await?;
                    return Ok(ExecutionResult {
                        remote_id,
                        result: json!({ "status": "idle" }),
                        diff,
                    });
                }
                RemoteStatus::Running => {
                    (callbacks.on_log)(format!("remote session {remote_id} still running"));
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff.min(POLL_MAX)) => {}
                _ = cancel.cancelled() => continue,
            }
            backoff = Duration::from_secs_f64((backoff.as_secs_f64() * POLL_MULTIPLIER).min(POLL_MAX.as_secs_f64()));
        }
    }

    async fn abort(&self, remote_id: &str) -> Result<(), DispatchError> {
        let url = format!("{}/api/v1/sessions/{}/abort", self.base_url, remote_id);
        warn!(remote_id, "aborting remote session");

        self.caller
            .call("agent:internal", || {
                let client = self.client.clone();
                let url = url.clone();
                async move {
                    let response = client
                        .post(&url)
                        .send()
                        .await
                        .map_err(|e| DispatchError::Transport(e.to_string()))?;
                    json_from_response(response).await
                }
            })
            .await
            .map_err(|e| e.into_inner().unwrap_or(DispatchError::Transport("rate limited or breaker open".into())))?;
        Ok(())
    }
}
