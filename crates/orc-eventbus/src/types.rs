//! Event families and room routing for the typed pub/sub bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every event the orchestrator publishes. Variants carry just enough
/// identity (`session_id`/`agent_id` plus timestamps) for consumers to
/// de-duplicate at-least-once delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    SessionCreated {
        session_id: Uuid,
        tenant_id: String,
        created_at: DateTime<Utc>,
    },
    SessionStatusChanged {
        session_id: Uuid,
        from: String,
        to: String,
        at: DateTime<Utc>,
    },
    SessionCheckpointCreated {
        session_id: Uuid,
        checkpoint_seq: u32,
        at: DateTime<Utc>,
    },
    SessionMetricsUpdated {
        session_id: Uuid,
        at: DateTime<Utc>,
    },
    SessionCompleted {
        session_id: Uuid,
        at: DateTime<Utc>,
    },
    SessionFailed {
        session_id: Uuid,
        reason: String,
        at: DateTime<Utc>,
    },
    AgentRegistered {
        agent_id: String,
        at: DateTime<Utc>,
    },
    AgentHeartbeat {
        agent_id: String,
        at: DateTime<Utc>,
    },
    AgentDegraded {
        agent_id: String,
        missed_heartbeats: u32,
        at: DateTime<Utc>,
    },
}

impl OrchestratorEvent {
    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            OrchestratorEvent::SessionCreated { session_id, .. }
            | OrchestratorEvent::SessionStatusChanged { session_id, .. }
            | OrchestratorEvent::SessionCheckpointCreated { session_id, .. }
            | OrchestratorEvent::SessionMetricsUpdated { session_id, .. }
            | OrchestratorEvent::SessionCompleted { session_id, .. }
            | OrchestratorEvent::SessionFailed { session_id, .. } => Some(*session_id),
            _ => None,
        }
    }

    pub fn agent_id(&self) -> Option<&str> {
        match self {
            OrchestratorEvent::AgentRegistered { agent_id, .. }
            | OrchestratorEvent::AgentHeartbeat { agent_id, .. }
            | OrchestratorEvent::AgentDegraded { agent_id, .. } => Some(agent_id),
            _ => None,
        }
    }
}

/// A room scopes delivery: a session's own subscribers, an agent's own
/// subscribers, or everyone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    Global,
    Session(Uuid),
    Agent(String),
}

impl Room {
    pub fn key(&self) -> String {
        match self {
            Room::Global => "global".to_string(),
            Room::Session(id) => format!("session:{id}"),
            Room::Agent(id) => format!("agent:{id}"),
        }
    }
}

/// Envelope delivered to subscribers. `(session_id, from, to, at)` (for
/// status-change events) or the equivalent identity fields on other
/// variants are what a consumer should key its de-duplication on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: OrchestratorEvent,
    pub published_at: DateTime<Utc>,
}
