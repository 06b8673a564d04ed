//! The supervision loop (C8) plus the tenant/quota gate (C9): the heart of
//! the orchestrator. Fences a session behind the distributed lock,
//! transitions it through the engine, resolves and dispatches to an
//! agent, observes progress, and finalises to a terminal or requeued
//! outcome — publishing every buffered event atomically with the
//! persisted state.

pub mod adapters;
pub mod error;
pub mod supervisor;
pub mod tenant;
pub mod types;

pub use adapters::{AdapterResolver, DefaultAdapterResolver};
pub use error::SupervisorError;
pub use supervisor::Supervisor;
pub use tenant::{GatedAction, QuotaGate, Tenant, TenantDirectory};
pub use types::{required_capability, SupervisionOutcome, SupervisorConfig};
