//! Sync event types and the event bus that carries them to the UI.
//!
//! The sync layer never talks to the UI directly. Commits, rollbacks and
//! other transient notices are broadcast here; the UI subscribes and renders
//! toasts or refreshes its projection. With no subscribers, events are
//! dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::Error;

/// Something the UI may want to react to.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A create was confirmed; `temp_id` is the placeholder it replaced.
    NoteCreated { temp_id: Uuid, note_id: Uuid },
    /// An update was confirmed by the store.
    NoteCommitted { note_id: Uuid, version: i64 },
    /// An optimistic write was undone.
    NoteRolledBack {
        note_id: Uuid,
        error: String,
        transient: bool,
    },
    NoteDeleted { note_id: Uuid },
    VersionRecorded { note_id: Uuid, version: i64 },
    /// A fetch finished after its query key stopped being current.
    FetchDiscarded { query_key: String },
    /// Free-form user-facing notice.
    Notice { message: String },
}

impl SyncEvent {
    /// Dot-namespaced event name (e.g. `"note.committed"`).
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::NoteCreated { .. } => "note.created",
            SyncEvent::NoteCommitted { .. } => "note.committed",
            SyncEvent::NoteRolledBack { .. } => "note.rolled_back",
            SyncEvent::NoteDeleted { .. } => "note.deleted",
            SyncEvent::VersionRecorded { .. } => "version.recorded",
            SyncEvent::FetchDiscarded { .. } => "fetch.discarded",
            SyncEvent::Notice { .. } => "notice",
        }
    }

    /// Rollback notice for a failed write.
    pub fn rolled_back(note_id: Uuid, error: &Error) -> Self {
        SyncEvent::NoteRolledBack {
            note_id,
            error: error.to_string(),
            transient: error.is_transient(),
        }
    }
}

/// An emitted event with its emission time.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub occurred_at: DateTime<Utc>,
    pub event: SyncEvent,
}

/// Broadcast channel for sync events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers. Silently dropped if there are none.
    pub fn emit(&self, event: SyncEvent) {
        let envelope = EventEnvelope {
            occurred_at: Utc::now(),
            event,
        };
        tracing::debug!(
            event_type = envelope.event.event_type(),
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    /// Subscribe to receive events. Each subscriber gets its own stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_subscriber() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();
        bus.emit(SyncEvent::NoteDeleted { note_id: id });

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event.event_type(), "note.deleted");
        match envelope.event {
            SyncEvent::NoteDeleted { note_id } => assert_eq!(note_id, id),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(8);
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(SyncEvent::Notice {
            message: "nobody listening".into(),
        });
    }

    #[test]
    fn test_rolled_back_marks_transient_errors() {
        let id = Uuid::new_v4();
        let event = SyncEvent::rolled_back(id, &Error::NetworkFailure("offline".into()));
        match event {
            SyncEvent::NoteRolledBack { transient, .. } => assert!(transient),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(SyncEvent::NoteCommitted {
            note_id: Uuid::nil(),
            version: 3,
        })
        .unwrap();
        assert_eq!(json["type"], "note_committed");
        assert_eq!(json["version"], 3);
    }
}
