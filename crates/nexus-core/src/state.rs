//! Session-scoped UI navigation state.
//!
//! `AppState` is a plain value: every transition consumes the old state and
//! returns a new one, so the projector can be handed a snapshot that never
//! changes underneath it.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Which slice of notes the UI is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Notes,
    Archive,
    Trash,
    Reminders,
    Analytics,
}

impl View {
    pub fn as_str(&self) -> &'static str {
        match self {
            View::Notes => "notes",
            View::Archive => "archive",
            View::Trash => "trash",
            View::Reminders => "reminders",
            View::Analytics => "analytics",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for View {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "notes" => Ok(View::Notes),
            "archive" => Ok(View::Archive),
            "trash" => Ok(View::Trash),
            "reminders" => Ok(View::Reminders),
            "analytics" => Ok(View::Analytics),
            other => Err(Error::ValidationFailure(format!("unknown view: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppState {
    pub current_view: View,
    /// `None` is the virtual "all notes" workspace.
    pub current_workspace: Option<Uuid>,
    pub search_query: String,
    pub selected_labels: BTreeSet<Uuid>,
}

impl AppState {
    pub fn with_view(self, view: View) -> Self {
        Self {
            current_view: view,
            ..self
        }
    }

    pub fn with_workspace(self, workspace: Option<Uuid>) -> Self {
        Self {
            current_workspace: workspace,
            ..self
        }
    }

    pub fn with_search(self, query: impl Into<String>) -> Self {
        Self {
            search_query: query.into(),
            ..self
        }
    }

    /// Add the label to the filter, or remove it if already selected.
    pub fn toggle_label(self, label: Uuid) -> Self {
        let mut selected_labels = self.selected_labels;
        if !selected_labels.remove(&label) {
            selected_labels.insert(label);
        }
        Self {
            selected_labels,
            ..self
        }
    }

    pub fn clear_filters(self) -> Self {
        Self {
            search_query: String::new(),
            selected_labels: BTreeSet::new(),
            ..self
        }
    }

    /// Lowercased, trimmed search needle, or `None` when no search is active.
    pub fn search_needle(&self) -> Option<String> {
        let trimmed = self.search_query.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = AppState::default();
        assert_eq!(state.current_view, View::Notes);
        assert!(state.current_workspace.is_none());
        assert!(state.search_needle().is_none());
        assert!(state.selected_labels.is_empty());
    }

    #[test]
    fn test_transitions_leave_other_fields_alone() {
        let ws = Uuid::new_v4();
        let state = AppState::default()
            .with_search("Shop")
            .with_workspace(Some(ws))
            .with_view(View::Archive);
        assert_eq!(state.current_view, View::Archive);
        assert_eq!(state.current_workspace, Some(ws));
        assert_eq!(state.search_needle().as_deref(), Some("shop"));
    }

    #[test]
    fn test_toggle_label_twice_is_identity() {
        let label = Uuid::new_v4();
        let state = AppState::default().toggle_label(label);
        assert!(state.selected_labels.contains(&label));
        let state = state.toggle_label(label);
        assert!(state.selected_labels.is_empty());
    }

    #[test]
    fn test_whitespace_query_is_inactive() {
        assert!(AppState::default().with_search("   ").search_needle().is_none());
    }

    #[test]
    fn test_view_parse() {
        assert_eq!("TRASH".parse::<View>().unwrap(), View::Trash);
        assert!("inbox".parse::<View>().is_err());
    }
}
