//! Domain models for notes, labels, workspaces and version history.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};

// =============================================================================
// NOTE TYPES
// =============================================================================

/// Kind of note body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteType {
    #[default]
    Text,
    Checklist,
    Image,
    Audio,
    Video,
}

impl NoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteType::Text => "text",
            NoteType::Checklist => "checklist",
            NoteType::Image => "image",
            NoteType::Audio => "audio",
            NoteType::Video => "video",
        }
    }

    /// Whether notes of this type carry a media URL.
    pub fn is_media(&self) -> bool {
        matches!(self, NoteType::Image | NoteType::Audio | NoteType::Video)
    }
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(NoteType::Text),
            "checklist" => Ok(NoteType::Checklist),
            "image" => Ok(NoteType::Image),
            "audio" => Ok(NoteType::Audio),
            "video" => Ok(NoteType::Video),
            other => Err(Error::ValidationFailure(format!(
                "unknown note type: {}",
                other
            ))),
        }
    }
}

/// One entry of a checklist note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

impl ChecklistItem {
    /// New unchecked item with a fresh id.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            completed: false,
        }
    }
}

// =============================================================================
// NOTE
// =============================================================================

/// A note as held by the entity cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub note_type: NoteType,
    pub color: String,
    pub labels: BTreeSet<Uuid>,
    pub is_pinned: bool,
    pub is_archived: bool,
    pub is_trashed: bool,
    pub is_encrypted: bool,
    pub workspace_id: Option<Uuid>,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reminder_at: Option<DateTime<Utc>>,
    pub checklist_items: Vec<ChecklistItem>,
    pub media_url: Option<String>,
    pub version: i64,
    /// Manual ordering key; larger sorts first.
    pub position: i64,
}

impl Note {
    /// Merge `patch` into a copy of this note. `version` and `updated_at`
    /// are left to the caller.
    pub fn apply(&self, patch: &NotePatch) -> Note {
        let mut next = self.clone();
        if let Some(title) = &patch.title {
            next.title = title.clone();
        }
        if let Some(content) = &patch.content {
            next.content = content.clone();
        }
        if let Some(note_type) = patch.note_type {
            next.note_type = note_type;
        }
        if let Some(color) = &patch.color {
            next.color = color.clone();
        }
        if let Some(labels) = &patch.labels {
            next.labels = labels.clone();
        }
        if let Some(pinned) = patch.is_pinned {
            next.is_pinned = pinned;
        }
        if let Some(archived) = patch.is_archived {
            next.is_archived = archived;
        }
        if let Some(trashed) = patch.is_trashed {
            next.is_trashed = trashed;
        }
        if let Some(encrypted) = patch.is_encrypted {
            next.is_encrypted = encrypted;
        }
        if let Some(workspace_id) = patch.workspace_id {
            next.workspace_id = workspace_id;
        }
        if let Some(reminder_at) = patch.reminder_at {
            next.reminder_at = reminder_at;
        }
        if let Some(items) = &patch.checklist_items {
            next.checklist_items = items.clone();
        }
        if let Some(media_url) = &patch.media_url {
            next.media_url = media_url.clone();
        }
        if let Some(position) = patch.position {
            next.position = position;
        }
        next
    }

    /// Whether applying `patch` would change the title or content.
    pub fn content_changed_by(&self, patch: &NotePatch) -> bool {
        patch.title.as_ref().is_some_and(|t| *t != self.title)
            || patch.content.as_ref().is_some_and(|c| *c != self.content)
    }

    /// Archived and trashed are mutually exclusive, and neither may be
    /// combined with pinned.
    pub fn flags_consistent(&self) -> bool {
        let parked = self.is_archived || self.is_trashed;
        !(self.is_archived && self.is_trashed) && !(self.is_pinned && parked)
    }

    /// Neither archived nor trashed.
    pub fn is_active(&self) -> bool {
        !self.is_archived && !self.is_trashed
    }

    /// Case-insensitive substring match on title or content.
    /// `needle` must already be lowercase.
    pub fn matches_lowercase(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle) || self.content.to_lowercase().contains(needle)
    }
}

/// Partial update for a note. `None` leaves a field untouched; for nullable
/// fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub note_type: Option<NoteType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeSet<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_pinned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_trashed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_encrypted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<Option<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checklist_items: Option<Vec<ChecklistItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    /// Set by the mutation engine; ignored when supplied by callers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

impl NotePatch {
    /// Title and content replacement (edits and version restores).
    pub fn text(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Flip `is_pinned` only.
    pub fn toggle_pin(note: &Note) -> Self {
        Self {
            is_pinned: Some(!note.is_pinned),
            ..Default::default()
        }
    }

    /// Flip `is_archived`; clears pinned and trashed in the same patch.
    pub fn toggle_archive(note: &Note) -> Self {
        Self {
            is_archived: Some(!note.is_archived),
            is_pinned: Some(false),
            is_trashed: Some(false),
            ..Default::default()
        }
    }

    /// Flip `is_trashed`; clears pinned and archived in the same patch.
    pub fn toggle_trash(note: &Note) -> Self {
        Self {
            is_trashed: Some(!note.is_trashed),
            is_pinned: Some(false),
            is_archived: Some(false),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == NotePatch::default()
    }

    pub fn touches_labels(&self) -> bool {
        self.labels.is_some()
    }

    /// Reject patches that could never yield a consistent note.
    pub fn validate(&self) -> Result<()> {
        if self.is_archived == Some(true) && self.is_trashed == Some(true) {
            return Err(Error::ValidationFailure(
                "a note cannot be archived and trashed at once".to_string(),
            ));
        }
        if let Some(Some(url)) = &self.media_url {
            if url.trim().is_empty() {
                return Err(Error::ValidationFailure(
                    "media URL must not be blank".to_string(),
                ));
            }
        }
        if let Some(color) = &self.color {
            if color.trim().is_empty() {
                return Err(Error::ValidationFailure("color must not be blank".to_string()));
            }
        }
        Ok(())
    }
}

/// User input for a new note.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    #[serde(default, rename = "type")]
    pub note_type: NoteType,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub labels: BTreeSet<Uuid>,
    #[serde(default)]
    pub is_encrypted: bool,
    #[serde(default)]
    pub reminder_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub checklist_items: Vec<ChecklistItem>,
    #[serde(default)]
    pub media_url: Option<String>,
}

impl NoteDraft {
    pub fn text(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() && self.content.trim().is_empty() {
            return Err(Error::ValidationFailure(
                "a note needs a title or content".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the insert record. Checklist items survive only on checklist
    /// notes, media URLs only on media notes.
    pub fn into_record(
        self,
        owner_id: Uuid,
        workspace_id: Option<Uuid>,
        position: i64,
    ) -> NewNote {
        let checklist_items = if self.note_type == NoteType::Checklist {
            self.checklist_items
        } else {
            Vec::new()
        };
        let media_url = if self.note_type.is_media() {
            self.media_url.filter(|u| !u.trim().is_empty())
        } else {
            None
        };
        NewNote {
            title: self.title,
            content: self.content,
            note_type: self.note_type,
            color: self
                .color
                .unwrap_or_else(|| defaults::NOTE_COLOR.to_string()),
            labels: self.labels,
            is_pinned: false,
            is_archived: false,
            is_trashed: false,
            is_encrypted: self.is_encrypted,
            workspace_id,
            owner_id,
            reminder_at: self.reminder_at,
            checklist_items,
            media_url,
            position,
            version: defaults::INITIAL_VERSION,
        }
    }
}

/// Insert record for a note; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub note_type: NoteType,
    pub color: String,
    pub labels: BTreeSet<Uuid>,
    pub is_pinned: bool,
    pub is_archived: bool,
    pub is_trashed: bool,
    pub is_encrypted: bool,
    pub workspace_id: Option<Uuid>,
    pub owner_id: Uuid,
    pub reminder_at: Option<DateTime<Utc>>,
    pub checklist_items: Vec<ChecklistItem>,
    pub media_url: Option<String>,
    pub position: i64,
    pub version: i64,
}

impl NewNote {
    /// Materialize the record under a caller-chosen id.
    pub fn into_note(self, id: Uuid, now: DateTime<Utc>) -> Note {
        Note {
            id,
            title: self.title,
            content: self.content,
            note_type: self.note_type,
            color: self.color,
            labels: self.labels,
            is_pinned: self.is_pinned,
            is_archived: self.is_archived,
            is_trashed: self.is_trashed,
            is_encrypted: self.is_encrypted,
            workspace_id: self.workspace_id,
            owner_id: self.owner_id,
            created_at: now,
            updated_at: now,
            reminder_at: self.reminder_at,
            checklist_items: self.checklist_items,
            media_url: self.media_url,
            version: self.version,
            position: self.position,
        }
    }
}

// =============================================================================
// LABELS AND WORKSPACES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Label {
    /// Case-insensitive name comparison, as used for AI tag matching.
    pub fn name_matches(&self, name: &str) -> bool {
        self.name.trim().to_lowercase() == name.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLabel {
    pub name: String,
    pub color: String,
    pub owner_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorkspace {
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub owner_id: Uuid,
    pub is_default: bool,
}

// =============================================================================
// VERSION HISTORY
// =============================================================================

/// Immutable snapshot of a note's title and content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteVersion {
    pub id: Uuid,
    pub note_id: Uuid,
    pub title: String,
    pub content: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub author_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNoteVersion {
    pub note_id: Uuid,
    pub title: String,
    pub content: String,
    pub version: i64,
    pub author_id: Uuid,
}

// =============================================================================
// ASSISTANT OUTPUT
// =============================================================================

/// Result of analyzing a note's content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub todos: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl Analysis {
    /// Clamp to the documented limits and drop blank entries.
    pub fn truncated(mut self) -> Self {
        fn clean(items: Vec<String>, max: usize) -> Vec<String> {
            items
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .take(max)
                .collect()
        }

        let words: Vec<&str> = self.summary.split_whitespace().collect();
        if words.len() > defaults::AI_SUMMARY_MAX_WORDS {
            self.summary = words[..defaults::AI_SUMMARY_MAX_WORDS].join(" ");
        } else {
            self.summary = self.summary.trim().to_string();
        }
        self.tags = clean(self.tags, defaults::AI_MAX_TAGS);
        self.todos = clean(self.todos, defaults::AI_MAX_TODOS);
        self.suggestions = clean(self.suggestions, defaults::AI_MAX_SUGGESTIONS);
        self
    }

    /// Tags and todos as applicable suggestions, tags first.
    pub fn actionable(&self) -> Vec<Suggestion> {
        self.tags
            .iter()
            .cloned()
            .map(Suggestion::Tag)
            .chain(self.todos.iter().cloned().map(Suggestion::Todo))
            .collect()
    }
}

/// A single AI suggestion that can be merged into a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Suggestion {
    /// Text appended to the note content.
    Content(String),
    /// Name of a label to attach.
    Tag(String),
    /// Action item to add to the checklist.
    Todo(String),
}
