//! Orchestrator for autonomous coding sessions: validates and enqueues a
//! session, dispatches it to a backend agent (internal HTTP API or
//! external webhook), observes it to completion while checkpointing
//! recoverable state, and streams status events to subscribers.
//!
//! This crate is the platform wiring layer — configuration, runtime
//! boot/shutdown, and telemetry — around the `orc-*` component crates,
//! each of which owns one piece of the design: resilience primitives,
//! the distributed lock, the event bus, the session repository, the
//! agent registry, dispatch adapters, the lifecycle engine, and the
//! supervisor.

pub mod platform;

pub use orc_dispatch as dispatch;
pub use orc_engine as engine;
pub use orc_eventbus as eventbus;
pub use orc_lock as lock;
pub use orc_registry as registry;
pub use orc_repository as repository;
pub use orc_resilience as resilience;
pub use orc_supervisor as supervisor;
