//! Typed pub/sub event bus. Subscribers register by room (a session, an
//! agent, or everyone); delivery is best-effort and ordered per room, with
//! slow subscribers dropped from the backlog rather than blocking
//! publication. No durability — the repository is the source of truth for
//! history.

pub mod bus;
pub mod idempotent;
pub mod types;

pub use bus::{forward_until_closed, EventBus};
pub use idempotent::{identity_of, EventIdentity, IdempotentSubscriber};
pub use types::{EventEnvelope, OrchestratorEvent, Room};
