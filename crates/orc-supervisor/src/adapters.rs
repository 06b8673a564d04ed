//! Resolves the dispatch adapter (§4.6) for a picked agent: the single
//! shared internal adapter for internal agents, or a freshly built
//! external webhook adapter scoped to that agent's own endpoint and token.

use std::sync::Arc;

use orc_dispatch::{DispatchAdapter, ExternalAgentGateway, ExternalWebhookAdapter, InternalHttpAdapter};
use orc_registry::{Agent, AgentKind};
use orc_resilience::ResilientCaller;

pub trait AdapterResolver: Send + Sync {
    fn resolve(&self, agent: &Agent) -> Result<Arc<dyn DispatchAdapter>, String>;
}

pub struct DefaultAdapterResolver {
    internal: Arc<InternalHttpAdapter>,
    caller: Arc<ResilientCaller>,
    gateway: ExternalAgentGateway,
}

impl DefaultAdapterResolver {
    pub fn new(internal: Arc<InternalHttpAdapter>, caller: Arc<ResilientCaller>, gateway: ExternalAgentGateway) -> Self {
        Self { internal, caller, gateway }
    }

    pub fn gateway(&self) -> ExternalAgentGateway {
        self.gateway.clone()
    }
}

impl AdapterResolver for DefaultAdapterResolver {
    fn resolve(&self, agent: &Agent) -> Result<Arc<dyn DispatchAdapter>, String> {
        match agent.kind {
            AgentKind::Internal => Ok(self.internal.clone()),
            AgentKind::External => {
                let endpoint = agent
                    .external
                    .as_ref()
                    .ok_or_else(|| format!("external agent {} missing endpoint", agent.id))?;
                Ok(Arc::new(ExternalWebhookAdapter::new(
                    endpoint.endpoint_url.clone(),
                    endpoint.auth_token.clone(),
                    self.caller.clone(),
                    self.gateway.clone(),
                )))
            }
        }
    }
}
