//! Agent registry data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Architect,
    Implementer,
    Reviewer,
    Debugger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CodeGeneration,
    CodeReview,
    Debugging,
    Refactoring,
    Testing,
    Documentation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Idle,
    Busy,
    Degraded,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    Probation,
    Standard,
    Elite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalEndpoint {
    pub endpoint_url: String,
    pub auth_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub kind: AgentKind,
    pub agent_type: AgentType,
    pub capabilities: HashSet<Capability>,

    pub status: AgentStatus,
    pub tier: PerformanceTier,
    pub load: f64,
    pub max_concurrent_tasks: u32,
    pub tasks_completed: u64,
    pub success_rate: f64,

    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub heartbeat_interval_secs: u32,
    pub consecutive_missed_heartbeats: u32,

    pub external: Option<ExternalEndpoint>,
}

impl Agent {
    pub fn is_dispatchable_externally(&self) -> bool {
        matches!(self.kind, AgentKind::External) && self.external.is_some()
    }
}
