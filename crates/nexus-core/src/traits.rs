//! Core traits for notenexus abstractions.
//!
//! These traits define the collaborator interfaces that concrete
//! implementations must satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// CACHED ENTITIES
// =============================================================================

/// Anything the entity cache can hold.
pub trait Entity: Clone + Send + Sync + 'static {
    fn id(&self) -> Uuid;
}

impl Entity for Note {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Entity for Label {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Entity for Workspace {
    fn id(&self) -> Uuid {
        self.id
    }
}

// =============================================================================
// REMOTE STORE
// =============================================================================

/// Authoritative backend for notes, labels, workspaces and note versions.
///
/// Row-level ownership is enforced by the backend; a record the caller does
/// not own is reported as `NotFound`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Notes owned by `owner_id`, optionally scoped to one workspace,
    /// ordered by position descending.
    async fn list_notes(&self, owner_id: Uuid, workspace_id: Option<Uuid>) -> Result<Vec<Note>>;

    /// Insert a note; returns the canonical record with server id and timestamps.
    async fn insert_note(&self, record: NewNote) -> Result<Note>;

    /// Apply a partial update; returns the canonical record.
    async fn update_note(&self, id: Uuid, patch: &NotePatch) -> Result<Note>;

    /// Permanently delete a note. Its versions go with it.
    async fn delete_note(&self, id: Uuid) -> Result<()>;

    async fn list_labels(&self, owner_id: Uuid) -> Result<Vec<Label>>;

    async fn insert_label(&self, record: NewLabel) -> Result<Label>;

    /// Workspaces owned by `owner_id`, default first.
    async fn list_workspaces(&self, owner_id: Uuid) -> Result<Vec<Workspace>>;

    async fn insert_workspace(&self, record: NewWorkspace) -> Result<Workspace>;

    async fn insert_version(&self, record: NewNoteVersion) -> Result<NoteVersion>;

    /// Versions of one note, newest first.
    async fn list_versions(&self, note_id: Uuid) -> Result<Vec<NoteVersion>>;
}

// =============================================================================
// AI ASSISTANT
// =============================================================================

/// Text completion service used for note suggestions.
///
/// Implementations fail with `ConfigMissing` when no credential is present.
#[async_trait]
pub trait AiAssistant: Send + Sync {
    /// Summarize the content and propose tags, todos and suggestions.
    async fn analyze(&self, content: &str) -> Result<Analysis>;

    /// Generate note content from a free-form prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Model name, for logging.
    fn model_name(&self) -> &str;
}
