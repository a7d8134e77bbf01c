//! Freshness, eviction and fetch de-duplication under controlled time.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use nexus_core::{NoteDraft, SyncEvent};
use nexus_store::{MemoryStore, StoreOp};
use nexus_sync::{LoadOutcome, NoteSync, NotesKey, SyncConfig};

fn session() -> (Arc<MemoryStore>, Arc<NoteSync>) {
    let store = Arc::new(MemoryStore::new());
    let sync = NoteSync::new(store.clone(), Some(Uuid::new_v4()), SyncConfig::default());
    (store, Arc::new(sync))
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_loads_share_one_fetch() {
    let (store, sync) = session();
    store.delay_next(StoreOp::ListNotes, Duration::from_millis(100));

    let (a, b) = tokio::join!(sync.load(), sync.load());
    assert!(matches!(a.unwrap(), LoadOutcome::Loaded(_)));
    assert!(matches!(b.unwrap(), LoadOutcome::Loaded(_)));

    assert_eq!(store.call_count(StoreOp::ListNotes), 1);
    assert_eq!(sync.cache().notes.stats().deduplicated, 1);
}

#[tokio::test(start_paused = true)]
async fn test_entry_refetched_once_stale() {
    let (store, sync) = session();
    sync.load().await.unwrap();

    tokio::time::advance(Duration::from_secs(299)).await;
    sync.load().await.unwrap();
    assert_eq!(store.call_count(StoreOp::ListNotes), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    sync.load().await.unwrap();
    assert_eq!(store.call_count(StoreOp::ListNotes), 2);
}

#[tokio::test(start_paused = true)]
async fn test_idle_entries_evicted_unless_watched() {
    let (_store, sync) = session();
    sync.load().await.unwrap();
    let owner = sync.owner_id().unwrap();
    let watched = sync.watch().unwrap();
    assert_eq!(watched.key(), &NotesKey::new(owner, None));

    tokio::time::advance(Duration::from_secs(601)).await;
    sync.evict_idle();

    assert!(sync.cache().notes.contains_key(watched.key()));
    assert!(!sync.cache().labels.contains_key(&owner));
    assert!(!sync.cache().workspaces.contains_key(&owner));

    drop(watched);
    tokio::time::advance(Duration::from_secs(601)).await;
    sync.evict_idle();
    assert!(sync.cache().notes.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_idle_entries_swept_in_background() {
    let (_store, sync) = session();
    sync.load().await.unwrap();
    let owner = sync.owner_id().unwrap();
    for _ in 0..5 {
        let ws = Uuid::new_v4();
        sync.navigate(|s| s.with_workspace(Some(ws)));
        sync.load().await.unwrap();
    }
    assert_eq!(sync.cache().notes.len(), 6);

    tokio::time::advance(Duration::from_secs(3600)).await;
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }

    assert!(sync.cache().notes.is_empty());
    assert!(!sync.cache().labels.contains_key(&owner));
    assert_eq!(sync.cache().notes.stats().evicted, 6);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_session_stops_sweeper() {
    let (_store, sync) = session();
    let notes = Arc::clone(&sync.cache().notes);
    assert!(Arc::strong_count(&notes) > 2);

    drop(sync);
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }
    assert_eq!(Arc::strong_count(&notes), 1);
}

#[tokio::test(start_paused = true)]
async fn test_recent_reads_keep_entry_alive() {
    let (_store, sync) = session();
    sync.load().await.unwrap();

    tokio::time::advance(Duration::from_secs(400)).await;
    sync.load().await.unwrap();
    tokio::time::advance(Duration::from_secs(400)).await;

    assert_eq!(sync.evict_idle(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_superseded_by_navigation_is_discarded() {
    let (store, sync) = session();
    let mut events = sync.events().subscribe();
    store.delay_next(StoreOp::ListNotes, Duration::from_millis(100));

    let load = tokio::spawn({
        let sync = sync.clone();
        async move { sync.load().await }
    });
    tokio::task::yield_now().await;

    let ws = Uuid::new_v4();
    sync.navigate(|s| s.with_workspace(Some(ws)));

    let outcome = load.await.unwrap().unwrap();
    assert!(matches!(outcome, LoadOutcome::Superseded { .. }));

    let mut discarded = false;
    while let Ok(envelope) = events.try_recv() {
        discarded |= matches!(envelope.event, SyncEvent::FetchDiscarded { .. });
    }
    assert!(discarded);
    assert!(sync.visible_notes().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_write_during_fetch_is_not_overwritten() {
    let (store, sync) = session();
    sync.load().await.unwrap();
    let note = sync.create_note(NoteDraft::text("t", "")).await.unwrap();
    let owner = sync.owner_id().unwrap();
    sync.cache().notes.invalidate(&NotesKey::new(owner, None));

    store.delay_next(StoreOp::ListNotes, Duration::from_millis(100));
    let load = tokio::spawn({
        let sync = sync.clone();
        async move { sync.load().await }
    });
    tokio::task::yield_now().await;

    // The refetch is in flight; a local write lands first.
    sync.toggle_pin(note.id).await.unwrap();

    load.await.unwrap().unwrap();
    assert!(sync.cache().notes.find(note.id).unwrap().is_pinned);
    assert_eq!(sync.cache().notes.stats().discarded, 1);
}
