//! The in-memory agent registry. A cache-backed variant for multi-instance
//! deployments is future work; selection and heartbeat degradation are
//! process-local, matching the resilience toolkit's per-process circuit
//! breaker state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use orc_eventbus::{EventBus, OrchestratorEvent, Room};

use crate::error::RegistryError;
use crate::types::{Agent, AgentKind, AgentStatus, Capability};

const MISSED_HEARTBEATS_FOR_DEGRADATION: u32 = 3;

#[derive(Clone)]
pub struct AgentRegistry {
    agents: Arc<RwLock<HashMap<String, Agent>>>,
    events: Option<EventBus>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
            events: None,
        }
    }

    pub fn with_event_bus(events: EventBus) -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
            events: Some(events),
        }
    }

    fn publish(&self, event: OrchestratorEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    pub fn register(&self, agent: Agent) {
        let agent_id = agent.id.clone();
        info!(agent_id = %agent_id, kind = ?agent.kind, "registering agent");
        self.agents.write().insert(agent_id.clone(), agent);

        self.publish(OrchestratorEvent::AgentRegistered {
            agent_id,
            at: Utc::now(),
        });
    }

    /// Idempotent: removing an agent that doesn't exist is not an error.
    pub fn deregister(&self, agent_id: &str) {
        self.agents.write().remove(agent_id);
    }

    /// Updates load/status and resets the missed-heartbeat counter. Also
    /// checks every known agent for having missed its own declared
    /// interval, applying the three-miss degradation rule uniformly.
    pub fn heartbeat(&self, agent_id: &str, load: f64, status: AgentStatus) -> Result<(), RegistryError> {
        let now = Utc::now();
        let mut agents = self.agents.write();
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| RegistryError::NotFound(agent_id.to_string()))?;

        agent.last_heartbeat = now;
        agent.load = load;
        agent.consecutive_missed_heartbeats = 0;
        if agent.status == AgentStatus::Degraded {
            debug!(agent_id, "agent recovered, returning to active");
            agent.status = AgentStatus::Active;
        } else {
            agent.status = status;
        }

        Ok(())
    }

    /// Scans every agent and degrades any whose last heartbeat is older
    /// than three times its declared interval. Intended to be called on a
    /// periodic tick by the runtime.
    pub fn sweep_missed_heartbeats(&self) {
        let now = Utc::now();
        let mut degraded = Vec::new();

        {
            let mut agents = self.agents.write();
            for agent in agents.values_mut() {
                if agent.status == AgentStatus::Offline {
                    continue;
                }
                let elapsed = (now - agent.last_heartbeat).num_seconds().max(0) as u32;
                let interval = agent.heartbeat_interval_secs.max(1);
                let missed = elapsed / interval;

                if missed >= MISSED_HEARTBEATS_FOR_DEGRADATION && agent.status != AgentStatus::Degraded {
                    warn!(agent_id = %agent.id, missed, "agent missed heartbeats, degrading");
                    agent.status = AgentStatus::Degraded;
                    agent.consecutive_missed_heartbeats = missed;
                    degraded.push((agent.id.clone(), missed));
                }
            }
        }

        for (agent_id, missed) in degraded {
            self.publish(OrchestratorEvent::AgentDegraded {
                agent_id,
                missed_heartbeats: missed,
                at: now,
            });
        }
    }

    /// Returns the active agent of `tenant` with the required capability,
    /// lowest load, ties broken elite > standard > probation.
    pub fn pick(&self, required_capability: Capability, tenant_id: &str) -> Result<Agent, RegistryError> {
        let agents = self.agents.read();

        agents
            .values()
            .filter(|a| a.tenant_id == tenant_id)
            .filter(|a| a.status == AgentStatus::Active)
            .filter(|a| a.capabilities.contains(&required_capability))
            .min_by(|a, b| {
                a.load
                    .partial_cmp(&b.load)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.tier.cmp(&a.tier))
            })
            .cloned()
            .ok_or(RegistryError::NoAgentAvailable)
    }

    pub fn get(&self, agent_id: &str) -> Option<Agent> {
        self.agents.read().get(agent_id).cloned()
    }

    pub fn list_for_tenant(&self, tenant_id: &str) -> Vec<Agent> {
        self.agents
            .read()
            .values()
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
            .collect()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn is_external(kind: AgentKind) -> bool {
    matches!(kind, AgentKind::External)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentType, PerformanceTier};
    use std::collections::HashSet;

    fn test_agent(id: &str, tenant: &str, load: f64, tier: PerformanceTier) -> Agent {
        let now = Utc::now();
        Agent {
            id: id.to_string(),
            tenant_id: tenant.to_string(),
            name: id.to_string(),
            kind: AgentKind::Internal,
            agent_type: AgentType::Implementer,
            capabilities: HashSet::from([Capability::CodeGeneration]),
            status: AgentStatus::Active,
            tier,
            load,
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

    #[test]
    fn pick_chooses_lowest_load() {
        let registry = AgentRegistry::new();
        registry.register(test_agent("a", "t1", 0.8, PerformanceTier::Standard));
        registry.register(test_agent("b", "t1", 0.2, PerformanceTier::Standard));

        let picked = registry.pick(Capability::CodeGeneration, "t1").unwrap();
        assert_eq!(picked.id, "b");
    }

    #[test]
    fn pick_ties_broken_by_tier() {
        let registry = AgentRegistry::new();
        registry.register(test_agent("probation", "t1", 0.5, PerformanceTier::Probation));
        registry.register(test_agent("elite", "t1", 0.5, PerformanceTier::Elite));
        registry.register(test_agent("standard", "t1", 0.5, PerformanceTier::Standard));

        let picked = registry.pick(Capability::CodeGeneration, "t1").unwrap();
        assert_eq!(picked.id, "elite");
    }

    #[test]
    fn pick_scopes_by_tenant_and_capability() {
        let registry = AgentRegistry::new();
        registry.register(test_agent("other-tenant", "t2", 0.1, PerformanceTier::Elite));

        let err = registry.pick(Capability::CodeGeneration, "t1").unwrap_err();
        assert_eq!(err, RegistryError::NoAgentAvailable);
    }

    #[test]
    fn heartbeat_recovers_degraded_agent_to_active() {
        let registry = AgentRegistry::new();
        let mut agent = test_agent("a", "t1", 0.1, PerformanceTier::Standard);
        agent.status = AgentStatus::Degraded;
        registry.register(agent);

        registry.heartbeat("a", 0.2, AgentStatus::Active).unwrap();
        assert_eq!(registry.get("a").unwrap().status, AgentStatus::Active);
    }

    #[test]
    fn sweep_degrades_agent_after_three_missed_intervals() {
        let registry = AgentRegistry::new();
        let mut agent = test_agent("a", "t1", 0.1, PerformanceTier::Standard);
        agent.heartbeat_interval_secs = 1;
        agent.last_heartbeat = Utc::now() - chrono::Duration::seconds(10);
        registry.register(agent);

        registry.sweep_missed_heartbeats();
        assert_eq!(registry.get("a").unwrap().status, AgentStatus::Degraded);
    }

    #[test]
    fn deregister_is_idempotent() {
        let registry = AgentRegistry::new();
        registry.deregister("nonexistent");
        registry.register(test_agent("a", "t1", 0.1, PerformanceTier::Standard));
        registry.deregister("a");
        registry.deregister("a");
        assert!(registry.get("a").is_none());
    }
}
