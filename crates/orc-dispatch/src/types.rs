//! Shared dispatch types: the adapter contract, callbacks, and EAP wire
//! shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use orc_resilience::Classification;

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub remote_id: String,
    pub result: Value,
    pub diff: Option<String>,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("remote call failed: {0}")]
    Transport(String),
    #[error("remote agent returned an error status: {0}")]
    RemoteError(String),
    #[error("execution exceeded max_duration")]
    Timeout,
    #[error("execution was cancelled")]
    Cancelled,
    #[error("request was rejected as malformed: {0}")]
    Validation(String),
}

impl orc_resilience::Classify for DispatchError {
    fn classify(&self) -> Classification {
        match self {
            DispatchError::Transport(_) | DispatchError::RemoteError(_) => Classification::Transient,
            DispatchError::Timeout | DispatchError::Cancelled | DispatchError::Validation(_) => {
                Classification::Permanent
            }
        }
    }
}

/// Callbacks an adapter drives while a session executes. Each
/// progress/checkpoint call is the supervisor's cue to extend the lock TTL
/// and, at most once per `checkpoint_interval`, persist a durable
/// checkpoint.
pub struct ExecutionCallbacks<'a> {
    pub on_progress: Box<dyn FnMut(Value) + Send + 'a>,
    pub on_checkpoint: Box<dyn FnMut(Value) + Send + 'a>,
    pub on_log: Box<dyn FnMut(String) + Send + 'a>,
}

/// Task assignment posted to an external agent's `endpoint_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub task_id: Uuid,
    pub context: Value,
    pub input: String,
    pub requirements: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResultStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub path: String,
    pub content: String,
}

/// Callback delivered by the external agent to the public ingestion
/// endpoint, keyed by `task_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: Uuid,
    pub status: TaskResultStatus,
    pub artifacts: Vec<Artifact>,
    pub metrics: Value,
}
