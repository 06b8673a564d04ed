//! Agent registry: tracks internal and external agents, their
//! capabilities, health, and load, and selects a dispatch target per
//! session.

pub mod error;
pub mod registry;
pub mod types;

pub use error::RegistryError;
pub use registry::AgentRegistry;
pub use types::{
    Agent, AgentKind, AgentStatus, AgentType, Capability, ExternalEndpoint, PerformanceTier,
};
