//! View projection: the filtered, ordered note list the UI renders.

use serde::Serialize;

use nexus_core::{AppState, Note, View};

use crate::cache::{EntityCache, NotesKey};

/// Projector output. Pinned and unpinned notes are kept apart; each group
/// is ordered by position, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Projection {
    pub pinned: Vec<Note>,
    pub others: Vec<Note>,
}

impl Projection {
    /// Pinned group followed by the others.
    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.pinned.iter().chain(self.others.iter())
    }

    pub fn len(&self) -> usize {
        self.pinned.len() + self.others.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty() && self.others.is_empty()
    }

    pub fn into_vec(self) -> Vec<Note> {
        let mut all = self.pinned;
        all.extend(self.others);
        all
    }
}

fn in_view(note: &Note, view: View) -> bool {
    match view {
        View::Notes => note.is_active(),
        View::Reminders => note.is_active() && note.reminder_at.is_some(),
        View::Archive => note.is_archived,
        View::Trash => note.is_trashed,
        View::Analytics => false,
    }
}

/// Project a notes collection through the app state.
///
/// Filters apply in order: workspace scope, view flag, reminder presence,
/// label intersection, then case-insensitive search on title or content.
pub fn project(notes: &[Note], state: &AppState) -> Projection {
    let needle = state.search_needle();

    let mut visible: Vec<&Note> = notes
        .iter()
        .filter(|n| {
            state.current_workspace.is_none() || n.workspace_id == state.current_workspace
        })
        .filter(|n| in_view(n, state.current_view))
        .filter(|n| {
            state.selected_labels.is_empty()
                || n.labels.intersection(&state.selected_labels).next().is_some()
        })
        .filter(|n| needle.as_deref().map_or(true, |q| n.matches_lowercase(q)))
        .collect();

    visible.sort_by(|a, b| b.position.cmp(&a.position).then_with(|| a.id.cmp(&b.id)));

    let (pinned, others): (Vec<&Note>, Vec<&Note>) = visible.into_iter().partition(|n| n.is_pinned);
    Projection {
        pinned: pinned.into_iter().cloned().collect(),
        others: others.into_iter().cloned().collect(),
    }
}

/// Project the cached collection for the state's workspace scope. Returns
/// an empty projection when that collection is not loaded.
pub fn project_cached(cache: &EntityCache, owner_id: uuid::Uuid, state: &AppState) -> Projection {
    cache
        .notes
        .get(&NotesKey::new(owner_id, state.current_workspace))
        .map(|entry| project(&entry.data, state))
        .unwrap_or_default()
}
