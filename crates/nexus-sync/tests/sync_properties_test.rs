//! End-to-end properties of the sync layer against the in-memory store.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use nexus_core::{Error, Note, NoteDraft, SyncEvent, View};
use nexus_store::{MemoryStore, StoreOp};
use nexus_sync::{NoteSync, SyncConfig};

async fn loaded_session() -> (Arc<MemoryStore>, NoteSync) {
    let store = Arc::new(MemoryStore::new());
    let sync = NoteSync::new(store.clone(), Some(Uuid::new_v4()), SyncConfig::default());
    sync.load().await.unwrap();
    (store, sync)
}

fn cached(sync: &NoteSync, id: Uuid) -> Note {
    sync.cache().notes.find(id).unwrap()
}

#[tokio::test]
async fn test_exclusive_flags_hold_after_every_toggle() {
    let (_store, sync) = loaded_session().await;
    let note = sync.create_note(NoteDraft::text("t", "c")).await.unwrap();

    #[derive(Debug, Clone, Copy)]
    enum Toggle {
        Pin,
        Archive,
        Trash,
    }
    let sequence = [
        Toggle::Pin,
        Toggle::Archive,
        Toggle::Pin,
        Toggle::Trash,
        Toggle::Archive,
        Toggle::Pin,
        Toggle::Trash,
        Toggle::Trash,
        Toggle::Pin,
        Toggle::Archive,
    ];

    for toggle in sequence {
        let _ = match toggle {
            Toggle::Pin => sync.toggle_pin(note.id).await,
            Toggle::Archive => sync.toggle_archive(note.id).await,
            Toggle::Trash => sync.toggle_trash(note.id).await,
        };
        let n = cached(&sync, note.id);
        assert!(
            !(n.is_archived && n.is_trashed),
            "archived and trashed after {:?}",
            toggle
        );
        assert!(
            !n.is_pinned || (!n.is_archived && !n.is_trashed),
            "pinned while archived or trashed after {:?}",
            toggle
        );
    }
}

#[tokio::test]
async fn test_archive_clears_pin_in_one_write() {
    let (store, sync) = loaded_session().await;
    let note = sync.create_note(NoteDraft::text("t", "c")).await.unwrap();
    sync.toggle_pin(note.id).await.unwrap();
    let before = store.call_count(StoreOp::UpdateNote);

    let archived = sync.toggle_archive(note.id).await.unwrap();
    assert!(archived.is_archived);
    assert!(!archived.is_pinned);
    assert_eq!(store.call_count(StoreOp::UpdateNote), before + 1);
}

#[tokio::test]
async fn test_failed_write_rolls_back_to_previous_content() {
    let (store, sync) = loaded_session().await;
    let mut events = sync.events().subscribe();
    let note = sync.create_note(NoteDraft::text("t", "C0")).await.unwrap();

    store.fail_next(StoreOp::UpdateNote, 1);
    let err = sync.edit(note.id, "t", "C1").await.unwrap_err();

    assert!(matches!(err, Error::NetworkFailure(_)));
    assert_eq!(cached(&sync, note.id).content, "C0");
    assert_eq!(cached(&sync, note.id), note);
    assert_eq!(store.note(note.id).unwrap().content, "C0");

    let mut rolled_back = None;
    while let Ok(envelope) = events.try_recv() {
        if let SyncEvent::NoteRolledBack { transient, .. } = envelope.event {
            rolled_back = Some(transient);
        }
    }
    assert_eq!(rolled_back, Some(true));
}

#[tokio::test]
async fn test_restore_appends_to_lineage() {
    let (_store, sync) = loaded_session().await;
    let note = sync.create_note(NoteDraft::text("v", "one")).await.unwrap();
    sync.edit(note.id, "v", "two").await.unwrap();
    sync.edit(note.id, "v", "three").await.unwrap();

    let restored = sync.restore(note.id, 1).await.unwrap();
    assert_eq!(restored.version, 4);
    assert_eq!(restored.content, "one");

    let history = sync.history(note.id).await.unwrap();
    let versions: Vec<i64> = history.iter().map(|v| v.version).collect();
    assert_eq!(versions, vec![4, 3, 2, 1]);
    assert_eq!(history[0].content, history[3].content);
}

#[tokio::test]
async fn test_flag_changes_do_not_create_versions() {
    let (store, sync) = loaded_session().await;
    let note = sync.create_note(NoteDraft::text("t", "c")).await.unwrap();
    sync.toggle_pin(note.id).await.unwrap();
    sync.set_color(note.id, "#ff0000").await.unwrap();

    assert_eq!(cached(&sync, note.id).version, 1);
    assert_eq!(store.versions(note.id).len(), 1);
}

#[tokio::test]
async fn test_filters_compose() {
    let (_store, sync) = loaded_session().await;
    let x = sync.create_label("x", None).await.unwrap();
    let y = sync.create_label("y", None).await.unwrap();

    let a = sync
        .create_note(NoteDraft {
            labels: BTreeSet::from([x.id]),
            ..NoteDraft::text("shopping", "")
        })
        .await
        .unwrap();
    let b = sync
        .create_note(NoteDraft {
            labels: BTreeSet::from([y.id]),
            ..NoteDraft::text("shopping list", "")
        })
        .await
        .unwrap();
    sync.toggle_archive(b.id).await.unwrap();
    sync.create_note(NoteDraft::text("unrelated", "")).await.unwrap();

    sync.navigate(|s| s.with_view(View::Notes).toggle_label(x.id).with_search("shop"));

    let ids: Vec<Uuid> = sync.visible_notes().unwrap().notes().map(|n| n.id).collect();
    assert_eq!(ids, vec![a.id]);
}

#[tokio::test]
async fn test_projection_is_deterministic() {
    let (_store, sync) = loaded_session().await;
    for title in ["a", "b", "c"] {
        let note = sync.create_note(NoteDraft::text(title, "")).await.unwrap();
        if title == "a" {
            sync.toggle_pin(note.id).await.unwrap();
        }
    }

    let first = sync.visible_notes().unwrap();
    let second = sync.visible_notes().unwrap();
    assert_eq!(first, second);

    let titles: Vec<&str> = first.notes().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, vec!["a", "c", "b"]);
}

#[tokio::test(start_paused = true)]
async fn test_same_note_mutations_commit_in_order() {
    let (store, sync) = loaded_session().await;
    let sync = Arc::new(sync);
    let note = sync.create_note(NoteDraft::text("start", "")).await.unwrap();

    // The first write answers slowly; the second would overtake it if raced.
    store.delay_next(StoreOp::UpdateNote, Duration::from_millis(50));

    let first = tokio::spawn({
        let sync = sync.clone();
        async move { sync.edit(note.id, "A", "").await }
    });
    tokio::task::yield_now().await;
    let second = tokio::spawn({
        let sync = sync.clone();
        async move { sync.edit(note.id, "B", "").await }
    });

    assert_eq!(first.await.unwrap().unwrap().title, "A");
    assert_eq!(second.await.unwrap().unwrap().title, "B");
    assert_eq!(cached(&sync, note.id).title, "B");
    assert_eq!(store.note(note.id).unwrap().title, "B");
    assert_eq!(sync.engine().pending_entities(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_create_flag_clears_after_confirmation() {
    let (store, sync) = loaded_session().await;
    let sync = Arc::new(sync);
    store.delay_next(StoreOp::InsertNote, Duration::from_millis(100));

    let create = tokio::spawn({
        let sync = sync.clone();
        async move { sync.create_note(NoteDraft::text("slow", "")).await }
    });
    tokio::task::yield_now().await;

    assert!(sync.is_creating());
    let pending = sync.visible_notes().unwrap();
    assert_eq!(pending.len(), 1);
    let temp_id = pending.others[0].id;

    let note = create.await.unwrap().unwrap();
    assert!(!sync.is_creating());
    assert_ne!(note.id, temp_id);
    let ids: Vec<Uuid> = sync.visible_notes().unwrap().notes().map(|n| n.id).collect();
    assert_eq!(ids, vec![note.id]);
}

#[tokio::test]
async fn test_deleted_note_leaves_every_collection() {
    let (store, sync) = loaded_session().await;
    let ws = sync.create_workspace("Home", None, None, false).await.unwrap();
    sync.navigate(|s| s.with_workspace(Some(ws.id)));
    sync.load().await.unwrap();
    let note = sync.create_note(NoteDraft::text("t", "")).await.unwrap();
    sync.toggle_trash(note.id).await.unwrap();

    sync.delete(note.id).await.unwrap();

    assert!(sync.cache().notes.find(note.id).is_none());
    assert!(store.versions(note.id).is_empty());
    sync.navigate(|s| s.with_view(View::Trash));
    assert!(sync.visible_notes().unwrap().is_empty());
}
