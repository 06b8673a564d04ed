//! In-process event bus. One `broadcast` channel per room; slow
//! subscribers that fall behind the bounded backlog observe a `Lagged`
//! error and resume from the oldest event still buffered, rather than
//! blocking the publisher.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::warn;

use crate::types::{EventEnvelope, OrchestratorEvent, Room};

const DEFAULT_ROOM_CAPACITY: usize = 256;

struct Inner {
    rooms: Mutex<HashMap<String, broadcast::Sender<EventEnvelope>>>,
    capacity: usize,
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_ROOM_CAPACITY)
    }
}

impl EventBus {
    pub fn new(room_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                rooms: Mutex::new(HashMap::new()),
                capacity: room_capacity,
            }),
        }
    }

    fn sender_for(&self, room: &Room) -> broadcast::Sender<EventEnvelope> {
        let mut rooms = self.inner.rooms.lock();
        rooms
            .entry(room.key())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .clone()
    }

    /// Publishes `event` to the global room plus its session/agent room, if
    /// any. Never blocks: a room with no subscribers simply drops the send.
    pub fn publish(&self, event: OrchestratorEvent) {
        let envelope = EventEnvelope {
            event: event.clone(),
            published_at: Utc::now(),
        };

        let mut rooms = vec![Room::Global];
        if let Some(session_id) = event.session_id() {
            rooms.push(Room::Session(session_id));
        }
        if let Some(agent_id) = event.agent_id() {
            rooms.push(Room::Agent(agent_id.to_string()));
        }

        for room in rooms {
            let sender = self.sender_for(&room);
            // No receivers is not an error; the event simply has no audience yet.
            let _ = sender.send(envelope.clone());
        }
    }

    /// Subscribes to `room`. Ordering within the room is preserved; if the
    /// subscriber falls more than the room's backlog behind, the next
    /// `recv()` surfaces `RecvError::Lagged` per `tokio::sync::broadcast`
    /// semantics rather than replaying the entire backlog.
    pub fn subscribe(&self, room: Room) -> broadcast::Receiver<EventEnvelope> {
        self.sender_for(&room).subscribe()
    }
}

/// Drains a receiver into `sink`, logging and continuing past `Lagged`
/// errors instead of treating them as fatal. Stops when the bus itself (all
/// senders for the room) is dropped.
pub async fn forward_until_closed<F>(mut rx: broadcast::Receiver<EventEnvelope>, mut sink: F)
where
    F: FnMut(EventEnvelope),
{
    loop {
        match rx.recv().await {
            Ok(envelope) => sink(envelope),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event subscriber fell behind, dropping backlog");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn session_room_only_receives_its_own_events() {
        let bus = EventBus::default();
        let session_a = Uuid::new_v4();
        let session_b = Uuid::new_v4();

        let mut rx_a = bus.subscribe(Room::Session(session_a));
        let mut rx_b = bus.subscribe(Room::Session(session_b));

        bus.publish(OrchestratorEvent::SessionCreated {
            session_id: session_a,
            tenant_id: "tenant-1".to_string(),
            created_at: Utc::now(),
        });

        let received = rx_a.recv().await.unwrap();
        assert_eq!(received.event.session_id(), Some(session_a));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn global_room_receives_every_event() {
        let bus = EventBus::default();
        let mut global = bus.subscribe(Room::Global);
        let session_id = Uuid::new_v4();

        bus.publish(OrchestratorEvent::SessionCompleted {
            session_id,
            at: Utc::now(),
        });

        let received = global.recv().await.unwrap();
        assert_eq!(received.event.session_id(), Some(session_id));
    }

    #[tokio::test]
    async fn ordering_preserved_within_a_room() {
        let bus = EventBus::default();
        let session_id = Uuid::new_v4();
        let mut rx = bus.subscribe(Room::Session(session_id));

        for i in 0..5u32 {
            bus.publish(OrchestratorEvent::SessionCheckpointCreated {
                session_id,
                checkpoint_seq: i,
                at: Utc::now(),
            });
        }

        for expected in 0..5u32 {
            let envelope = rx.recv().await.unwrap();
            match envelope.event {
                OrchestratorEvent::SessionCheckpointCreated { checkpoint_seq, .. } => {
                    assert_eq!(checkpoint_seq, expected);
                }
                _ => panic!("unexpected event variant"),
            }
        }
    }

    #[tokio::test]
    async fn slow_subscriber_lags_without_blocking_publisher() {
        let bus = EventBus::new(2);
        let session_id = Uuid::new_v4();
        let mut rx = bus.subscribe(Room::Session(session_id));

        for i in 0..10u32 {
            bus.publish(OrchestratorEvent::SessionCheckpointCreated {
                session_id,
                checkpoint_seq: i,
                at: Utc::now(),
            });
        }

        let result = rx.recv().await;
        assert!(matches!(result, Err(broadcast::error::RecvError::Lagged(_))));
    }
}
