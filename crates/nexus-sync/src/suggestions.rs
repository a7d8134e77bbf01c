//! Merging assistant output into notes.
//!
//! Assistant calls never write anything themselves. Their results become
//! [`Suggestion`] values, and a suggestion reaches a note only through the
//! mutation engine, with the same optimistic write and rollback as any edit.

use tracing::{debug, info};
use uuid::Uuid;

use nexus_core::{AiAssistant, Analysis, Error, Note, NotePatch, Result, Suggestion};

use crate::mutation::MutationEngine;

/// Apply one suggestion to a note.
///
/// - `Content` appends the text after a blank line.
/// - `Tag` attaches the owner's label with that name (ignoring case). An
///   unknown or already attached label leaves the note unchanged.
/// - `Todo` adds an unchecked checklist item, turning the note into a
///   checklist if needed.
pub async fn apply_suggestion(
    engine: &MutationEngine,
    note_id: Uuid,
    suggestion: Suggestion,
) -> Result<Note> {
    match suggestion {
        Suggestion::Content(text) => engine.append_content(note_id, &text).await,
        Suggestion::Todo(text) => engine.append_checklist_item(note_id, &text).await,
        Suggestion::Tag(name) => {
            let note = engine
                .cache()
                .notes
                .find(note_id)
                .ok_or_else(|| Error::NotFound(format!("note {}", note_id)))?;
            let label = engine
                .cache()
                .labels
                .get(&note.owner_id)
                .and_then(|entry| entry.data.into_iter().find(|l| l.name_matches(&name)));

            let Some(label) = label else {
                debug!(note_id = %note_id, tag = %name, "No label matches suggested tag");
                return Ok(note);
            };
            if note.labels.contains(&label.id) {
                return Ok(note);
            }
            engine
                .mutate_with("apply_tag", note_id, move |current| {
                    let mut labels = current.labels.clone();
                    labels.insert(label.id);
                    Ok(NotePatch {
                        labels: Some(labels),
                        ..Default::default()
                    })
                })
                .await
        }
    }
}

/// Analyze a note's content.
pub async fn analyze_note(assistant: &dyn AiAssistant, note: &Note) -> Result<Analysis> {
    if note.content.trim().is_empty() {
        return Err(Error::ValidationFailure(
            "note has no content to analyze".to_string(),
        ));
    }
    let analysis = assistant.analyze(&note.content).await?.truncated();
    info!(
        note_id = %note.id,
        model = assistant.model_name(),
        tags = analysis.tags.len(),
        todos = analysis.todos.len(),
        "Note analyzed"
    );
    Ok(analysis)
}

/// Generate text from a prompt as a content suggestion.
pub async fn generate_suggestion(assistant: &dyn AiAssistant, prompt: &str) -> Result<Suggestion> {
    if prompt.trim().is_empty() {
        return Err(Error::ValidationFailure("prompt is required".to_string()));
    }
    let text = assistant.generate(prompt).await?;
    Ok(Suggestion::Content(text.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nexus_assist::MockAssistant;
    use nexus_core::NoteDraft;

    fn note(content: &str) -> Note {
        NoteDraft::text("t", content)
            .into_record(Uuid::new_v4(), None, 1)
            .into_note(Uuid::new_v4(), Utc::now())
    }

    #[tokio::test]
    async fn test_blank_content_rejected_before_assistant_call() {
        let assistant = MockAssistant::new();
        let err = analyze_note(&assistant, &note("  \n")).await.unwrap_err();
        assert!(matches!(err, Error::ValidationFailure(_)));
        assert_eq!(assistant.call_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_prompt_rejected_before_assistant_call() {
        let assistant = MockAssistant::new();
        assert!(generate_suggestion(&assistant, "").await.is_err());
        assert_eq!(assistant.call_count(), 0);
    }

    #[tokio::test]
    async fn test_generated_text_becomes_content_suggestion() {
        let assistant = MockAssistant::new().with_generated("  Hello there \n");
        let suggestion = generate_suggestion(&assistant, "greet").await.unwrap();
        assert_eq!(suggestion, Suggestion::Content("Hello there".into()));
    }
}
