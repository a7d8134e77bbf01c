//! Persisted row layout for the hosted backend.
//!
//! Rows use snake_case column names, keep media in one URL column per media
//! type, and store checklist items as JSON. Optional columns may be absent
//! or null; decoding substitutes defaults (empty checklist, `false` flags,
//! version 1).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nexus_core::defaults;
use nexus_core::{
    ChecklistItem, Label, NewLabel, NewNote, NewNoteVersion, NewWorkspace, Note, NotePatch,
    NoteType, NoteVersion, Workspace,
};

fn default_version() -> i64 {
    defaults::INITIAL_VERSION
}

fn default_note_color() -> String {
    defaults::NOTE_COLOR.to_string()
}

// =============================================================================
// NOTES
// =============================================================================

/// Embedded `note_labels(label_id)` relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteLabelRef {
    pub label_id: Uuid,
}

/// Join row linking a note to a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteLabelRow {
    pub note_id: Uuid,
    pub label_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NoteRow {
    pub id: Uuid,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, rename = "type")]
    pub note_type: Option<NoteType>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_pinned: Option<bool>,
    #[serde(default)]
    pub is_archived: Option<bool>,
    #[serde(default)]
    pub is_trashed: Option<bool>,
    #[serde(default)]
    pub is_encrypted: Option<bool>,
    #[serde(default)]
    pub workspace_id: Option<Uuid>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub reminder_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub checklist_items: Option<Vec<ChecklistItem>>,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub note_labels: Option<Vec<NoteLabelRef>>,
}

impl From<NoteRow> for Note {
    fn from(row: NoteRow) -> Self {
        let note_type = row.note_type.unwrap_or_default();
        let media_url = match note_type {
            NoteType::Image => row.image_url,
            NoteType::Audio => row.audio_url,
            NoteType::Video => row.video_url,
            NoteType::Text | NoteType::Checklist => None,
        };
        Note {
            id: row.id,
            title: row.title.unwrap_or_default(),
            content: row.content.unwrap_or_default(),
            note_type,
            color: row.color.unwrap_or_else(default_note_color),
            labels: row
                .note_labels
                .unwrap_or_default()
                .into_iter()
                .map(|r| r.label_id)
                .collect(),
            is_pinned: row.is_pinned.unwrap_or(false),
            is_archived: row.is_archived.unwrap_or(false),
            is_trashed: row.is_trashed.unwrap_or(false),
            is_encrypted: row.is_encrypted.unwrap_or(false),
            workspace_id: row.workspace_id,
            owner_id: row.user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            reminder_at: row.reminder_date,
            checklist_items: row.checklist_items.unwrap_or_default(),
            media_url,
            version: row.version.unwrap_or_else(default_version),
            position: row.position.unwrap_or(0),
        }
    }
}

/// Media URL split into the per-type column layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MediaColumns {
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
    pub video_url: Option<String>,
}

impl MediaColumns {
    pub fn split(note_type: NoteType, url: Option<String>) -> Self {
        let mut cols = MediaColumns::default();
        match note_type {
            NoteType::Image => cols.image_url = url,
            NoteType::Audio => cols.audio_url = url,
            NoteType::Video => cols.video_url = url,
            NoteType::Text | NoteType::Checklist => {}
        }
        cols
    }
}

/// Insert body for the notes table. Labels travel separately through
/// `note_labels`.
#[derive(Debug, Clone, Serialize)]
pub struct NoteInsertRow {
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub note_type: NoteType,
    pub color: String,
    pub is_pinned: bool,
    pub is_archived: bool,
    pub is_trashed: bool,
    pub is_encrypted: bool,
    pub workspace_id: Option<Uuid>,
    pub user_id: Uuid,
    pub reminder_date: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub media: MediaColumns,
    pub checklist_items: Vec<ChecklistItem>,
    pub position: i64,
    pub version: i64,
}

impl From<&NewNote> for NoteInsertRow {
    fn from(record: &NewNote) -> Self {
        NoteInsertRow {
            title: record.title.clone(),
            content: record.content.clone(),
            note_type: record.note_type,
            color: record.color.clone(),
            is_pinned: record.is_pinned,
            is_archived: record.is_archived,
            is_trashed: record.is_trashed,
            is_encrypted: record.is_encrypted,
            workspace_id: record.workspace_id,
            user_id: record.owner_id,
            reminder_date: record.reminder_at,
            media: MediaColumns::split(record.note_type, record.media_url.clone()),
            checklist_items: record.checklist_items.clone(),
            position: record.position,
            version: record.version,
        }
    }
}

/// PATCH body for the notes table; untouched columns are omitted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NoteUpdateRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub note_type: Option<NoteType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_pinned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_trashed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_encrypted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<Option<Uuid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_date: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checklist_items: Option<Vec<ChecklistItem>>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaColumns>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl NoteUpdateRow {
    /// Encode a patch. Media columns are only written when the patch names
    /// both the note type and the URL, so the right column is known.
    pub fn from_patch(patch: &NotePatch, now: DateTime<Utc>) -> Self {
        let media = match (patch.note_type, &patch.media_url) {
            (Some(note_type), Some(url)) => Some(MediaColumns::split(note_type, url.clone())),
            _ => None,
        };
        NoteUpdateRow {
            title: patch.title.clone(),
            content: patch.content.clone(),
            note_type: patch.note_type,
            color: patch.color.clone(),
            is_pinned: patch.is_pinned,
            is_archived: patch.is_archived,
            is_trashed: patch.is_trashed,
            is_encrypted: patch.is_encrypted,
            workspace_id: patch.workspace_id,
            reminder_date: patch.reminder_at,
            checklist_items: patch.checklist_items.clone(),
            media,
            position: patch.position,
            version: patch.version,
            updated_at: now,
        }
    }
}

/// Join rows for a full label set.
pub fn note_label_rows(note_id: Uuid, labels: &BTreeSet<Uuid>) -> Vec<NoteLabelRow> {
    labels
        .iter()
        .map(|label_id| NoteLabelRow {
            note_id,
            label_id: *label_id,
        })
        .collect()
}

// =============================================================================
// LABELS, WORKSPACES, VERSIONS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelRow {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<LabelRow> for Label {
    fn from(row: LabelRow) -> Self {
        Label {
            id: row.id,
            name: row.name,
            color: row
                .color
                .unwrap_or_else(|| defaults::LABEL_COLOR.to_string()),
            owner_id: row.user_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelInsertRow {
    pub name: String,
    pub color: String,
    pub user_id: Uuid,
}

impl From<&NewLabel> for LabelInsertRow {
    fn from(record: &NewLabel) -> Self {
        LabelInsertRow {
            name: record.name.clone(),
            color: record.color.clone(),
            user_id: record.owner_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceRow {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_default: Option<bool>,
}

impl From<WorkspaceRow> for Workspace {
    fn from(row: WorkspaceRow) -> Self {
        Workspace {
            id: row.id,
            name: row.name,
            description: row.description,
            color: row
                .color
                .unwrap_or_else(|| defaults::WORKSPACE_COLOR.to_string()),
            owner_id: row.user_id,
            created_at: row.created_at,
            is_default: row.is_default.unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceInsertRow {
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub user_id: Uuid,
    pub is_default: bool,
}

impl From<&NewWorkspace> for WorkspaceInsertRow {
    fn from(record: &NewWorkspace) -> Self {
        WorkspaceInsertRow {
            name: record.name.clone(),
            description: record.description.clone(),
            color: record.color.clone(),
            user_id: record.owner_id,
            is_default: record.is_default,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRow {
    pub id: Uuid,
    pub note_id: Uuid,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub version: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub user_id: Uuid,
}

impl From<VersionRow> for NoteVersion {
    fn from(row: VersionRow) -> Self {
        NoteVersion {
            id: row.id,
            note_id: row.note_id,
            title: row.title.unwrap_or_default(),
            content: row.content.unwrap_or_default(),
            version: row.version.unwrap_or_else(default_version),
            created_at: row.created_at,
            author_id: row.user_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionInsertRow {
    pub note_id: Uuid,
    pub title: String,
    pub content: String,
    pub version: i64,
    pub user_id: Uuid,
}

impl From<&NewNoteVersion> for VersionInsertRow {
    fn from(record: &NewNoteVersion) -> Self {
        VersionInsertRow {
            note_id: record.note_id,
            title: record.title.clone(),
            content: record.content.clone(),
            version: record.version,
            user_id: record.author_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sparse_note_row_uses_defaults() {
        let row: NoteRow = serde_json::from_value(json!({
            "id": "00000000-0000-0000-0000-000000000001",
            "user_id": "00000000-0000-0000-0000-0000000000aa",
            "created_at": "2024-05-01T10:00:00+00:00",
            "updated_at": "2024-05-01T10:00:00+00:00",
            "checklist_items": null,
            "is_pinned": null
        }))
        .unwrap();
        let note = Note::from(row);
        assert_eq!(note.version, 1);
        assert!(note.checklist_items.is_empty());
        assert!(!note.is_pinned && !note.is_archived && !note.is_trashed && !note.is_encrypted);
        assert_eq!(note.note_type, NoteType::Text);
        assert_eq!(note.color, defaults::NOTE_COLOR);
        assert!(note.labels.is_empty());
    }

    #[test]
    fn test_note_row_reads_embedded_labels_and_media() {
        let label = Uuid::new_v4();
        let row: NoteRow = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "title": "Sunset",
            "type": "image",
            "user_id": Uuid::new_v4(),
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-02T10:00:00Z",
            "image_url": "https://cdn.example/sunset.png",
            "audio_url": "https://cdn.example/ignored.mp3",
            "position": 1714557600000_i64,
            "version": 4,
            "note_labels": [{"label_id": label}]
        }))
        .unwrap();
        let note = Note::from(row);
        assert_eq!(note.media_url.as_deref(), Some("https://cdn.example/sunset.png"));
        assert_eq!(note.version, 4);
        assert_eq!(note.position, 1714557600000);
        assert!(note.labels.contains(&label));
    }

    #[test]
    fn test_update_row_omits_untouched_columns() {
        let patch = NotePatch {
            is_archived: Some(true),
            is_pinned: Some(false),
            is_trashed: Some(false),
            version: Some(2),
            ..Default::default()
        };
        let body = serde_json::to_value(NoteUpdateRow::from_patch(&patch, Utc::now())).unwrap();
        let obj = body.as_object().unwrap();
        assert_eq!(obj["is_archived"], json!(true));
        assert_eq!(obj["version"], json!(2));
        assert!(!obj.contains_key("title"));
        assert!(!obj.contains_key("image_url"));
        assert!(obj.contains_key("updated_at"));
    }

    #[test]
    fn test_update_row_clears_reminder_with_null() {
        let patch = NotePatch {
            reminder_at: Some(None),
            ..Default::default()
        };
        let body = serde_json::to_value(NoteUpdateRow::from_patch(&patch, Utc::now())).unwrap();
        assert_eq!(body["reminder_date"], serde_json::Value::Null);
    }

    #[test]
    fn test_media_columns_follow_type() {
        let cols = MediaColumns::split(NoteType::Audio, Some("a.mp3".into()));
        assert_eq!(cols.audio_url.as_deref(), Some("a.mp3"));
        assert!(cols.image_url.is_none() && cols.video_url.is_none());
    }

    #[test]
    fn test_version_row_defaults() {
        let row: VersionRow = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "note_id": Uuid::new_v4(),
            "created_at": "2024-05-01T10:00:00Z",
            "user_id": Uuid::new_v4()
        }))
        .unwrap();
        let version = NoteVersion::from(row);
        assert_eq!(version.version, 1);
        assert!(version.title.is_empty());
    }
}
