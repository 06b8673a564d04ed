//! Session state machine operations: `start`, `complete`, `fail`,
//! checkpointing, health scoring, and event draining.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use orc_eventbus::OrchestratorEvent;

use crate::error::EngineError;
use crate::types::{
    EntityCheckpoint, ExecutionMetrics, Priority, Session, SessionStatus, SessionType, Warning,
    MAX_ENTITY_CHECKPOINTS, MAX_RETRIES,
};
use crate::validation::{validate_initial_prompt, validate_max_duration, validate_title, ValidationError};
use std::collections::HashMap;

pub struct NewSession {
    pub tenant_id: String,
    pub session_type: SessionType,
    pub priority: Priority,
    pub title: String,
    pub description: Option<String>,
    pub initial_prompt: String,
    pub agent_config: HashMap<String, Value>,
    pub model: Option<String>,
    pub max_duration_secs: u32,
    pub cpu_limit: Option<f64>,
    pub memory_limit_mb: Option<u64>,
    pub parent_id: Option<Uuid>,
}

impl Session {
    pub fn create(new: NewSession) -> Result<Self, ValidationError> {
        validate_title(&new.title)?;
        validate_initial_prompt(&new.initial_prompt)?;
        validate_max_duration(new.max_duration_secs)?;

        let now = Utc::now();
        let id = Uuid::new_v4();

        let mut session = Session {
            id,
            tenant_id: new.tenant_id.clone(),
            created_at: now,
            session_type: new.session_type,
            priority: new.priority,
            status: SessionStatus::Pending,
            status_updated_at: now,
            title: new.title,
            description: new.description,
            initial_prompt: new.initial_prompt,
            agent_config: new.agent_config,
            model: new.model,
            max_duration_secs: new.max_duration_secs,
            cpu_limit: new.cpu_limit,
            memory_limit_mb: new.memory_limit_mb,
            parent_id: new.parent_id,
            child_ids: Vec::new(),
            metrics: ExecutionMetrics {
                created_at: Some(now),
                ..Default::default()
            },
            checkpoints: Vec::new(),
            result: None,
            error_kind: None,
            error_message: None,
            version: 0,
            uncommitted_events: Vec::new(),
        };

        session.uncommitted_events.push(OrchestratorEvent::SessionCreated {
            session_id: id,
            tenant_id: new.tenant_id,
            created_at: now,
        });

        Ok(session)
    }

    /// Validates and performs a status transition, stamping
    /// `status_updated_at` and buffering the `session.status_changed`
    /// event. Internal: callers go through the named operations below.
    fn transition(&mut self, target: SessionStatus) -> Result<(), EngineError> {
        if !self.status.can_transition_to(target) {
            return Err(EngineError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }

        let from = self.status;
        let now = Utc::now();
        self.status = target;
        self.status_updated_at = now;

        self.uncommitted_events.push(OrchestratorEvent::SessionStatusChanged {
            session_id: self.id,
            from: from.as_str().to_string(),
            to: target.as_str().to_string(),
            at: now,
        });

        Ok(())
    }

    /// Moves a freshly created session from *pending* into the dispatch
    /// queue. The supervisor calls this before `start()` on its first
    /// attempt; a retried session re-enters *queued* via
    /// `requeue_for_retry` instead.
    pub fn enqueue(&mut self) -> Result<(), EngineError> {
        self.transition(SessionStatus::Queued)
    }

    pub fn start(&mut self) -> Result<(), EngineError> {
        self.transition(SessionStatus::Running)?;
        let now = Utc::now();
        self.metrics.started_at = Some(now);
        if let Some(created_at) = self.metrics.created_at {
            self.metrics.queue_duration_ms = Some((now - created_at).num_milliseconds());
        }
        Ok(())
    }

    pub fn complete(&mut self, result: Value) -> Result<(), EngineError> {
        self.transition(SessionStatus::Completed)?;
        let now = Utc::now();
        self.metrics.completed_at = Some(now);
        self.stamp_durations(now);
        self.result = Some(result);

        self.uncommitted_events.push(OrchestratorEvent::SessionCompleted {
            session_id: self.id,
            at: now,
        });
        Ok(())
    }

    pub fn partially_complete(&mut self, result: Value) -> Result<(), EngineError> {
        self.transition(SessionStatus::PartiallyCompleted)?;
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, error_kind: impl Into<String>, message: impl Into<String>) -> Result<(), EngineError> {
        self.transition(SessionStatus::Failed)?;
        let now = Utc::now();
        self.metrics.failed_at = Some(now);
        self.stamp_durations(now);
        self.error_kind = Some(error_kind.into());
        self.error_message = Some(message.into());

        self.uncommitted_events.push(OrchestratorEvent::SessionFailed {
            session_id: self.id,
            reason: self.error_message.clone().unwrap_or_default(),
            at: now,
        });
        Ok(())
    }

    pub fn timeout(&mut self) -> Result<(), EngineError> {
        self.transition(SessionStatus::Timeout)?;
        let now = Utc::now();
        self.metrics.failed_at = Some(now);
        self.stamp_durations(now);
        self.error_kind = Some("timeout".to_string());
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        self.transition(SessionStatus::Paused)
    }

    pub fn stop(&mut self) -> Result<(), EngineError> {
        self.transition(SessionStatus::Stopped)
    }

    pub fn cancel(&mut self) -> Result<(), EngineError> {
        self.transition(SessionStatus::Cancelled)
    }

    pub fn degrade(&mut self) -> Result<(), EngineError> {
        self.transition(SessionStatus::Degraded)
    }

    /// Transitions a recoverable terminal session (`Failed`/`Timeout`/
    /// `Stopped`, at least one checkpoint, `retry_count < 3`) back to
    /// *queued* for a fresh supervision attempt, incrementing
    /// `retry_count`. This is the engine's one source of truth for
    /// "how many retries has this session had" (see DESIGN.md); the
    /// supervisor never maintains its own counter.
    pub fn requeue_for_retry(&mut self) -> Result<(), EngineError> {
        if !self.is_recoverable() {
            return Err(EngineError::NotRecoverable);
        }
        self.transition(SessionStatus::Queued)?;
        self.metrics.retry_count += 1;
        Ok(())
    }

    fn stamp_durations(&mut self, end: chrono::DateTime<Utc>) {
        if let Some(started_at) = self.metrics.started_at {
            self.metrics.execution_duration_ms = Some((end - started_at).num_milliseconds());
        }
        if let Some(created_at) = self.metrics.created_at {
            self.metrics.total_duration_ms = Some((end - created_at).num_milliseconds());
        }
    }

    pub fn record_warning(&mut self, kind: impl Into<String>, message: impl Into<String>, context: Option<Value>) {
        self.metrics.warnings.push(Warning {
            kind: kind.into(),
            message: message.into(),
            at: Utc::now(),
            context,
        });
    }

    /// Appends a checkpoint, evicting the oldest when the bound is
    /// exceeded. Sequence numbers stay 1-based and contiguous among the
    /// entries retained.
    pub fn add_checkpoint(&mut self, data: Value) {
        let sequence = self.metrics.checkpoint_count + 1;
        self.checkpoints.push(EntityCheckpoint {
            sequence,
            at: Utc::now(),
            data,
        });
        self.metrics.checkpoint_count += 1;

        if self.checkpoints.len() > MAX_ENTITY_CHECKPOINTS {
            let overflow = self.checkpoints.len() - MAX_ENTITY_CHECKPOINTS;
            self.checkpoints.drain(0..overflow);
        }

        self.uncommitted_events.push(OrchestratorEvent::SessionCheckpointCreated {
            session_id: self.id,
            checkpoint_seq: sequence,
            at: Utc::now(),
        });
    }

    pub fn latest_checkpoint(&self) -> Option<&EntityCheckpoint> {
        self.checkpoints.last()
    }

    /// `1.0` if completed, `0.0` if failed, otherwise a function of how
    /// much of `max_duration` has elapsed since `started_at`.
    pub fn health_score(&self) -> f64 {
        match self.status {
            SessionStatus::Completed => 1.0,
            SessionStatus::Failed => 0.0,
            SessionStatus::Running => {
                let Some(started_at) = self.metrics.started_at else {
                    return 0.8;
                };
                let elapsed = (Utc::now() - started_at).num_seconds().max(0) as f64;
                let budget = self.max_duration_secs as f64;
                let fraction = if budget > 0.0 { elapsed / budget } else { 1.0 };

                if fraction < 0.7 {
                    0.9
                } else if fraction < 0.9 {
                    0.7
                } else {
                    0.3
                }
            }
            _ => 0.8,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Failed | SessionStatus::Timeout | SessionStatus::Stopped
        ) && !self.checkpoints.is_empty()
            && self.metrics.retry_count < MAX_RETRIES
    }

    pub fn drain_events(&mut self) -> Vec<OrchestratorEvent> {
        std::mem::take(&mut self.uncommitted_events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_session() -> Session {
        Session::create(NewSession {
            tenant_id: "tenant-1".to_string(),
            session_type: SessionType::Execution,
            priority: Priority::Medium,
            title: "Implement resilient auth retries".to_string(),
            description: None,
            initial_prompt: "Implement resilient auth".to_string(),
            agent_config: HashMap::new(),
            model: None,
            max_duration_secs: 600,
            cpu_limit: None,
            memory_limit_mb: None,
            parent_id: None,
        })
        .unwrap()
    }

    #[test]
    fn happy_path_pending_to_completed() {
        let mut session = new_session();
        assert_eq!(session.status, SessionStatus::Pending);

        session.transition(SessionStatus::Queued).unwrap();
        session.start().unwrap();
        assert_eq!(session.status, SessionStatus::Running);
        assert!(session.metrics.started_at.is_some());

        session.complete(Value::String("done".to_string())).unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.metrics.execution_duration_ms.is_some());
    }

    #[test]
    fn enqueue_then_start_reaches_running() {
        let mut session = new_session();
        session.enqueue().unwrap();
        assert_eq!(session.status, SessionStatus::Queued);
        session.start().unwrap();
        assert_eq!(session.status, SessionStatus::Running);
    }

    #[test]
    fn second_start_after_completion_is_invalid_transition() {
        let mut session = new_session();
        session.transition(SessionStatus::Queued).unwrap();
        session.start().unwrap();
        session.complete(Value::Null).unwrap();

        let err = session.start().unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidTransition {
                from: SessionStatus::Completed,
                to: SessionStatus::Running,
            }
        );
    }

    #[test]
    fn checkpoints_bounded_to_100_with_contiguous_sequence() {
        let mut session = new_session();
        for i in 0..150 {
            session.add_checkpoint(Value::Number(i.into()));
        }
        assert_eq!(session.checkpoints.len(), 100);
        assert_eq!(session.checkpoints.first().unwrap().sequence, 51);
        assert_eq!(session.checkpoints.last().unwrap().sequence, 150);
    }

    #[test]
    fn is_recoverable_requires_checkpoint_and_retry_budget() {
        let mut session = new_session();
        session.transition(SessionStatus::Queued).unwrap();
        session.start().unwrap();
        session.fail("upstream_unavailable", "boom").unwrap();
        assert!(!session.is_recoverable());

        session.checkpoints.push(EntityCheckpoint {
            sequence: 1,
            at: Utc::now(),
            data: Value::Null,
        });
        assert!(session.is_recoverable());

        session.metrics.retry_count = MAX_RETRIES;
        assert!(!session.is_recoverable());
    }

    #[test]
    fn requeue_for_retry_requires_recoverable_and_increments_count() {
        let mut session = new_session();
        session.transition(SessionStatus::Queued).unwrap();
        session.start().unwrap();
        session.fail("upstream_unavailable", "boom").unwrap();

        let err = session.requeue_for_retry().unwrap_err();
        assert_eq!(err, EngineError::NotRecoverable);

        session.add_checkpoint(Value::Null);
        session.requeue_for_retry().unwrap();
        assert_eq!(session.status, SessionStatus::Queued);
        assert_eq!(session.metrics.retry_count, 1);
    }

    #[test]
    fn drain_events_empties_buffer() {
        let mut session = new_session();
        assert!(!session.drain_events().is_empty());
        assert!(session.drain_events().is_empty());
    }

    #[test]
    fn health_score_terminal_states() {
        let mut session = new_session();
        session.transition(SessionStatus::Queued).unwrap();
        session.start().unwrap();
        session.complete(Value::Null).unwrap();
        assert_eq!(session.health_score(), 1.0);
    }
}
