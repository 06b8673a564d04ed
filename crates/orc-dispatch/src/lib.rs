//! Agent dispatch: a common adapter contract with two implementations —
//! the internal HTTP-polling API and the external webhook (EAP) protocol.
//! Both run every outbound call through the resilience toolkit.

pub mod adapter;
pub mod external;
pub mod internal;
pub mod types;

pub use adapter::DispatchAdapter;
pub use external::{ExternalAgentGateway, ExternalWebhookAdapter};
pub use internal::InternalHttpAdapter;
pub use types::{
    Artifact, DispatchError, ExecutionCallbacks, ExecutionResult, TaskAssignment, TaskResult,
    TaskResultStatus,
};
