//! Reference idempotent consumer. Events are at-least-once; a consumer
//! that cares about exactly-once side effects de-duplicates by identity
//! before acting, as `SessionStatusChanged` illustrates with
//! `(session_id, from, to, at)`.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::types::{EventEnvelope, OrchestratorEvent};

/// Identity a consumer de-duplicates on. Two envelopes with the same key
/// represent the same logical event, possibly redelivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventIdentity {
    StatusChange {
        session_id: uuid::Uuid,
        from: String,
        to: String,
        at_millis: i64,
    },
    Other {
        discriminant: &'static str,
        at_millis: i64,
    },
}

pub fn identity_of(envelope: &EventEnvelope) -> EventIdentity {
    match &envelope.event {
        OrchestratorEvent::SessionStatusChanged { session_id, from, to, at } => {
            EventIdentity::StatusChange {
                session_id: *session_id,
                from: from.clone(),
                to: to.clone(),
                at_millis: at.timestamp_millis(),
            }
        }
        other => EventIdentity::Other {
            discriminant: discriminant_name(other),
            at_millis: envelope.published_at.timestamp_millis(),
        },
    }
}

fn discriminant_name(event: &OrchestratorEvent) -> &'static str {
    match event {
        OrchestratorEvent::SessionCreated { .. } => "session.created",
        OrchestratorEvent::SessionStatusChanged { .. } => "session.status_changed",
        OrchestratorEvent::SessionCheckpointCreated { .. } => "session.checkpoint_created",
        OrchestratorEvent::SessionMetricsUpdated { .. } => "session.metrics_updated",
        OrchestratorEvent::SessionCompleted { .. } => "session.completed",
        OrchestratorEvent::SessionFailed { .. } => "session.failed",
        OrchestratorEvent::AgentRegistered { .. } => "agent.registered",
        OrchestratorEvent::AgentHeartbeat { .. } => "agent.heartbeat",
        OrchestratorEvent::AgentDegraded { .. } => "agent.degraded",
    }
}

/// Wraps a handler so redelivered envelopes (same identity) are a no-op.
/// Unbounded growth is acceptable for the reference implementation; a
/// production consumer would evict by age.
pub struct IdempotentSubscriber<F> {
    seen: Mutex<HashSet<EventIdentity>>,
    handler: F,
}

impl<F> IdempotentSubscriber<F>
where
    F: FnMut(&EventEnvelope),
{
    pub fn new(handler: F) -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
            handler,
        }
    }

    /// Returns `true` if the handler actually ran (first delivery of this
    /// identity), `false` if it was a duplicate and was skipped.
    pub fn handle(&mut self, envelope: &EventEnvelope) -> bool {
        let identity = identity_of(envelope);
        let is_new = self.seen.lock().insert(identity);
        if is_new {
            (self.handler)(envelope);
        }
        is_new
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    #[test]
    fn duplicate_status_change_is_skipped() {
        let calls = AtomicU32::new(0);
        let mut subscriber = IdempotentSubscriber::new(|_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });

        let at = Utc::now();
        let envelope = EventEnvelope {
            event: OrchestratorEvent::SessionStatusChanged {
                session_id: Uuid::new_v4(),
                from: "pending".to_string(),
                to: "running".to_string(),
                at,
            },
            published_at: at,
        };

        assert!(subscriber.handle(&envelope));
        assert!(!subscriber.handle(&envelope.clone()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_transitions_both_run() {
        let calls = AtomicU32::new(0);
        let mut subscriber = IdempotentSubscriber::new(|_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
        let session_id = Uuid::new_v4();

        let first = EventEnvelope {
            event: OrchestratorEvent::SessionStatusChanged {
                session_id,
                from: "pending".to_string(),
                to: "running".to_string(),
                at: Utc::now(),
            },
            published_at: Utc::now(),
        };
        let second = EventEnvelope {
            event: OrchestratorEvent::SessionStatusChanged {
                session_id,
                from: "running".to_string(),
                to: "completed".to_string(),
                at: Utc::now(),
            },
            published_at: Utc::now(),
        };

        assert!(subscriber.handle(&first));
        assert!(subscriber.handle(&second));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
