//! The session data model: identity, classification, workload, resources,
//! metrics, and checkpoints.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Planning,
    Execution,
    Review,
    Debug,
    Integration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Deferred,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Queued,
    Running,
    Paused,
    Completed,
    PartiallyCompleted,
    Failed,
    Timeout,
    Stopped,
    Cancelled,
    Orphaned,
    Degraded,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed
                | SessionStatus::PartiallyCompleted
                | SessionStatus::Failed
                | SessionStatus::Timeout
                | SessionStatus::Stopped
                | SessionStatus::Cancelled
                | SessionStatus::Orphaned
        )
    }

    /// The transition matrix of the lifecycle engine. All pairs not listed
    /// here are forbidden.
    ///
    /// `Failed`/`Timeout`/`Stopped` admit exactly one outgoing edge, back to
    /// `Queued`, for the supervisor's retry path (`Session::requeue_for_retry`).
    /// That edge is gated entirely by `Session::is_recoverable` rather than
    /// being open to any caller. `is_terminal` still reports these three as
    /// terminal for deletion and quota counting — only the engine's own
    /// recovery path may move them.
    pub fn allowed_targets(self) -> &'static [SessionStatus] {
        use SessionStatus::*;
        match self {
            Pending => &[Queued, Cancelled, Failed],
            Queued => &[Running, Cancelled, Failed],
            Running => &[Completed, PartiallyCompleted, Failed, Timeout, Paused, Stopped, Degraded],
            Paused => &[Running, Stopped, Cancelled],
            Degraded => &[Running, Failed, Completed, Stopped],
            PartiallyCompleted => &[Running, Completed],
            Failed | Timeout | Stopped => &[Queued],
            Completed | Cancelled | Orphaned => &[],
        }
    }

    pub fn can_transition_to(self, target: SessionStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Queued => "queued",
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::PartiallyCompleted => "partially_completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Timeout => "timeout",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Orphaned => "orphaned",
            SessionStatus::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    pub kind: String,
    pub message: String,
    pub at: DateTime<Utc>,
    pub context: Option<Value>,
}

/// In-entity checkpoint, bounded to 100 entries, used for health scoring.
/// Distinct from the durable `Checkpoint` the supervisor persists through
/// the repository on the `checkpoint_interval` cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityCheckpoint {
    pub sequence: u32,
    pub at: DateTime<Utc>,
    pub data: Value,
}

pub const MAX_ENTITY_CHECKPOINTS: usize = 100;
pub const MAX_RETRIES: u32 = 3;

/// Durable checkpoint the supervisor persists through the repository, on
/// the `checkpoint_interval` cadence, separate from the bounded in-entity
/// checkpoints used only for health scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: Uuid,
    pub sequence: u32,
    pub at: DateTime<Utc>,
    pub trigger: String,
    pub data: Value,
    pub content_hash: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,

    pub queue_duration_ms: Option<i64>,
    pub execution_duration_ms: Option<i64>,
    pub total_duration_ms: Option<i64>,

    pub api_calls: u32,
    pub api_errors: u32,
    pub retry_count: u32,
    pub checkpoint_count: u32,

    pub cpu_percent: Option<f64>,
    pub memory_mb: Option<f64>,
    pub disk_mb: Option<f64>,
    pub network_bytes_sent: Option<u64>,
    pub network_bytes_received: Option<u64>,

    pub success_rate: Option<f64>,
    pub confidence: Option<f64>,
    pub cost_estimate: Option<f64>,

    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub tenant_id: String,
    pub created_at: DateTime<Utc>,

    pub session_type: SessionType,
    pub priority: Priority,

    pub status: SessionStatus,
    pub status_updated_at: DateTime<Utc>,

    pub title: String,
    pub description: Option<String>,
    pub initial_prompt: String,
    pub agent_config: HashMap<String, Value>,
    pub model: Option<String>,

    pub max_duration_secs: u32,
    pub cpu_limit: Option<f64>,
    pub memory_limit_mb: Option<u64>,

    pub parent_id: Option<Uuid>,
    pub child_ids: Vec<Uuid>,

    pub metrics: ExecutionMetrics,
    pub checkpoints: Vec<EntityCheckpoint>,

    pub result: Option<Value>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,

    pub version: u64,

    #[serde(skip)]
    pub(crate) uncommitted_events: Vec<orc_eventbus::OrchestratorEvent>,
}
