//! Version history recorder.
//!
//! Every committed title/content change appends an immutable snapshot. The
//! history of a note is linear: version 1 is its initial state and each
//! content commit adds the next number. Restoring a version is an ordinary
//! content mutation (see `MutationEngine::restore`), so it appends rather
//! than truncates.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use nexus_core::{Error, EventBus, NewNoteVersion, NoteVersion, RemoteStore, Result, SyncEvent};

/// Appends and lists note versions.
#[derive(Clone)]
pub struct VersionRecorder {
    store: Arc<dyn RemoteStore>,
    events: EventBus,
}

impl VersionRecorder {
    pub fn new(store: Arc<dyn RemoteStore>, events: EventBus) -> Self {
        Self { store, events }
    }

    /// Append a snapshot. Only called after the content change committed.
    pub async fn record(
        &self,
        note_id: Uuid,
        title: &str,
        content: &str,
        version: i64,
        author_id: Uuid,
    ) -> Result<NoteVersion> {
        let recorded = self
            .store
            .insert_version(NewNoteVersion {
                note_id,
                title: title.to_string(),
                content: content.to_string(),
                version,
                author_id,
            })
            .await?;

        info!(note_id = %note_id, version, "Version recorded");
        self.events
            .emit(SyncEvent::VersionRecorded { note_id, version });
        Ok(recorded)
    }

    /// History of a note, newest first. Each call re-reads the store.
    pub async fn list(&self, note_id: Uuid) -> Result<Vec<NoteVersion>> {
        let mut versions = self.store.list_versions(note_id).await?;
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        debug!(note_id = %note_id, result_count = versions.len(), "Listed versions");
        Ok(versions)
    }

    /// One version of a note.
    pub async fn get(&self, note_id: Uuid, version: i64) -> Result<NoteVersion> {
        self.list(note_id)
            .await?
            .into_iter()
            .find(|v| v.version == version)
            .ok_or_else(|| {
                Error::NotFound(format!("version {} of note {}", version, note_id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nexus_core::NoteDraft;
    use nexus_store::MemoryStore;

    fn store_with_note() -> (Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let note = NoteDraft::text("t", "c")
            .into_record(Uuid::new_v4(), None, 1)
            .into_note(Uuid::new_v4(), Utc::now());
        let id = note.id;
        store.seed_note(note);
        (store, id)
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let (store, note_id) = store_with_note();
        let recorder = VersionRecorder::new(store, EventBus::default());
        let author = Uuid::new_v4();

        for v in [1, 3, 2] {
            recorder
                .record(note_id, "t", &format!("c{}", v), v, author)
                .await
                .unwrap();
        }

        let versions: Vec<i64> = recorder
            .list(note_id)
            .await
            .unwrap()
            .iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(versions, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_record_emits_event() {
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let (store, note_id) = store_with_note();
        let recorder = VersionRecorder::new(store, events);

        recorder
            .record(note_id, "t", "c", 1, Uuid::new_v4())
            .await
            .unwrap();

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event.event_type(), "version.recorded");
    }

    #[tokio::test]
    async fn test_get_unknown_version_is_not_found() {
        let recorder = VersionRecorder::new(Arc::new(MemoryStore::new()), EventBus::default());
        let err = recorder.get(Uuid::new_v4(), 7).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
