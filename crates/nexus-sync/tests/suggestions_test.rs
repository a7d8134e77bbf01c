//! Assistant output merged into notes through the session.

use std::sync::Arc;

use uuid::Uuid;

use nexus_assist::MockAssistant;
use nexus_core::{Analysis, Error, NoteDraft, NoteType, Suggestion};
use nexus_store::{MemoryStore, StoreOp};
use nexus_sync::{NoteSync, SyncConfig};

async fn session_with(assistant: MockAssistant) -> (Arc<MemoryStore>, NoteSync) {
    let store = Arc::new(MemoryStore::new());
    let sync = NoteSync::new(store.clone(), Some(Uuid::new_v4()), SyncConfig::default())
        .with_assistant(Arc::new(assistant));
    sync.load().await.unwrap();
    (store, sync)
}

#[tokio::test]
async fn test_analysis_suggestions_apply_through_engine() {
    let assistant = MockAssistant::new().with_analysis(Analysis {
        summary: "Weekly shop".into(),
        tags: vec!["GROCERIES".into(), "nonexistent".into()],
        todos: vec!["buy milk".into()],
        suggestions: vec![],
    });
    let (store, sync) = session_with(assistant.clone()).await;
    let groceries = sync.create_label("Groceries", None).await.unwrap();
    let note = sync
        .create_note(NoteDraft::text("Shop", "need milk"))
        .await
        .unwrap();

    let analysis = sync.analyze(note.id).await.unwrap();
    assert_eq!(assistant.call_count(), 1);

    for suggestion in analysis.actionable() {
        sync.apply_suggestion(note.id, suggestion).await.unwrap();
    }

    let updated = sync.cache().notes.find(note.id).unwrap();
    assert!(updated.labels.contains(&groceries.id));
    assert_eq!(updated.labels.len(), 1);
    assert_eq!(updated.note_type, NoteType::Checklist);
    assert_eq!(updated.checklist_items.len(), 1);
    assert_eq!(updated.checklist_items[0].text, "buy milk");
    assert!(!updated.checklist_items[0].completed);
    assert_eq!(store.note(note.id).unwrap(), updated);
}

#[tokio::test]
async fn test_tag_already_attached_is_noop() {
    let (store, sync) = session_with(MockAssistant::new()).await;
    let label = sync.create_label("work", None).await.unwrap();
    let note = sync.create_note(NoteDraft::text("t", "c")).await.unwrap();
    sync.apply_suggestion(note.id, Suggestion::Tag("Work".into()))
        .await
        .unwrap();
    let writes = store.call_count(StoreOp::UpdateNote);

    let same = sync
        .apply_suggestion(note.id, Suggestion::Tag("work".into()))
        .await
        .unwrap();
    assert!(same.labels.contains(&label.id));
    assert_eq!(store.call_count(StoreOp::UpdateNote), writes);
}

#[tokio::test]
async fn test_generated_text_appended_after_blank_line() {
    let (store, sync) = session_with(MockAssistant::new().with_generated("More ideas.")).await;
    let note = sync.create_note(NoteDraft::text("t", "First.")).await.unwrap();

    let updated = sync.generate_into(note.id, "expand").await.unwrap();
    assert_eq!(updated.content, "First.\n\nMore ideas.");
    assert_eq!(updated.version, 2);
    assert_eq!(store.versions(note.id).len(), 2);
}

#[tokio::test]
async fn test_missing_credential_is_config_missing() {
    let (_store, sync) = session_with(
        MockAssistant::new().failing(Error::ConfigMissing("OPENAI_API_KEY".into())),
    )
    .await;
    let note = sync.create_note(NoteDraft::text("t", "c")).await.unwrap();

    let err = sync.analyze(note.id).await.unwrap_err();
    assert!(matches!(err, Error::ConfigMissing(_)));
    assert_eq!(sync.cache().notes.find(note.id), Some(note));
}

#[tokio::test]
async fn test_blank_prompt_never_reaches_assistant() {
    let assistant = MockAssistant::new();
    let (_store, sync) = session_with(assistant.clone()).await;
    let note = sync.create_note(NoteDraft::text("t", "c")).await.unwrap();

    let err = sync.generate_into(note.id, "   ").await.unwrap_err();
    assert!(matches!(err, Error::ValidationFailure(_)));
    assert_eq!(assistant.call_count(), 0);
}
