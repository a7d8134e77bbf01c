//! Optimistic mutation engine.
//!
//! Every write follows the same path:
//!
//! 1. validate the input (invalid input never touches the cache),
//! 2. merge the patch into the cached entity and write it to the cache,
//!    keeping the [`Rollback`](crate::cache::Rollback) captured by that write,
//! 3. submit the remote write,
//! 4. on success replace the cached copy with the server record, or on
//!    failure apply the rollback and emit a rollback event.
//!
//! A write the store applied only in part (the note row landed, its label
//! rows did not) is never rolled back: the affected entries are invalidated
//! and the note is re-read from the store.
//!
//! Mutations on the same note id run one at a time in arrival order. The
//! patch for a queued mutation is computed from the note as it stands when
//! the mutation reaches the front of the queue, so toggles never act on a
//! stale copy.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

use nexus_core::defaults;
use nexus_core::{
    Error, EventBus, Label, NewLabel, NewWorkspace, Note, NoteDraft, NotePatch, NoteType,
    RemoteStore, Result, SyncEvent, Workspace,
};

use crate::cache::EntityCache;
use crate::versions::VersionRecorder;

type EntityLocks = Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>;

fn lock_map(locks: &EntityLocks) -> MutexGuard<'_, HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds the per-entity queue slot; the map entry is dropped with the last
/// holder.
struct EntityGuard<'a> {
    locks: &'a EntityLocks,
    id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for EntityGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = lock_map(self.locks);
        if locks
            .get(&self.id)
            .is_some_and(|m| Arc::strong_count(m) == 1)
        {
            locks.remove(&self.id);
        }
    }
}

/// Counts creates in flight.
struct CreatingGuard<'a>(&'a AtomicUsize);

impl<'a> CreatingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for CreatingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Applies optimistic writes and reconciles them with the store.
pub struct MutationEngine {
    store: Arc<dyn RemoteStore>,
    cache: EntityCache,
    recorder: VersionRecorder,
    events: EventBus,
    locks: EntityLocks,
    last_position: AtomicI64,
    creating: AtomicUsize,
}

impl MutationEngine {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        cache: EntityCache,
        recorder: VersionRecorder,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            cache,
            recorder,
            events,
            locks: Mutex::new(HashMap::new()),
            last_position: AtomicI64::new(0),
            creating: AtomicUsize::new(0),
        }
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    pub fn recorder(&self) -> &VersionRecorder {
        &self.recorder
    }

    /// True while at least one note create awaits confirmation.
    pub fn is_creating(&self) -> bool {
        self.creating.load(Ordering::SeqCst) > 0
    }

    /// Number of entity queues currently held or waited on.
    pub fn pending_entities(&self) -> usize {
        lock_map(&self.locks).len()
    }

    async fn lock_entity(&self, id: Uuid) -> EntityGuard<'_> {
        let mutex = Arc::clone(lock_map(&self.locks).entry(id).or_default());
        let guard = mutex.lock_owned().await;
        EntityGuard {
            locks: &self.locks,
            id,
            guard: Some(guard),
        }
    }

    /// Strictly increasing ordering key: wall-clock milliseconds, bumped
    /// past the previous key when two creates land in the same millisecond.
    fn next_position(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let prev = match self
            .last_position
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            }) {
            Ok(prev) | Err(prev) => prev,
        };
        now.max(prev + 1)
    }

    // =========================================================================
    // NOTE UPDATES
    // =========================================================================

    /// Run one queued mutation. `build` derives the patch from the note as
    /// cached when this mutation reaches the front of its queue.
    pub async fn mutate_with<F>(&self, op: &'static str, id: Uuid, build: F) -> Result<Note>
    where
        F: FnOnce(&Note) -> Result<NotePatch> + Send,
    {
        let _guard = self.lock_entity(id).await;

        let current = self
            .cache
            .notes
            .find(id)
            .ok_or_else(|| Error::NotFound(format!("note {}", id)))?;

        let mut patch = build(&current)?;
        patch.version = None;
        patch.validate()?;
        if current.apply(&patch) == current {
            debug!(op, note_id = %id, "Patch changes nothing, skipped");
            return Ok(current);
        }

        // Media URL and type travel together so the store can pick the column.
        if patch.media_url.is_some() || patch.note_type.is_some() {
            let merged = current.apply(&patch);
            patch.note_type = Some(merged.note_type);
            patch.media_url = Some(merged.media_url);
        }

        let content_changed = current.content_changed_by(&patch);
        let version = if content_changed {
            current.version + 1
        } else {
            current.version
        };
        patch.version = Some(version);

        let mut next = current.apply(&patch);
        next.version = version;
        next.updated_at = Utc::now();
        if !next.flags_consistent() {
            return Err(Error::ValidationFailure(
                "pinned, archived and trashed are mutually exclusive".to_string(),
            ));
        }

        let rollback = self.cache.notes.update(id, |_| next.clone());
        debug!(op, note_id = %id, version, "Optimistic write applied");

        match self.store.update_note(id, &patch).await {
            Ok(server) => {
                self.cache.notes.replace(id, server.clone());
                if patch.workspace_id.is_some() {
                    let owner = server.owner_id;
                    self.cache
                        .notes
                        .invalidate_where(|k| k.owner_id == owner && k.workspace_id.is_some());
                }
                info!(op, note_id = %id, version = server.version, "Note committed");
                self.events.emit(SyncEvent::NoteCommitted {
                    note_id: id,
                    version: server.version,
                });
                if content_changed {
                    self.record_version(&server).await;
                }
                Ok(server)
            }
            Err(e) if e.is_partial() && patch.touches_labels() => {
                warn!(op, note_id = %id, error = %e, "Remote write partially applied, refetching");
                // The row write carried the new version number.
                if content_changed {
                    self.record_version(&next).await;
                }
                self.refetch(current.owner_id, Some(id)).await;
                self.events.emit(SyncEvent::Notice {
                    message: format!("Saved, but labels were not updated: {}", e),
                });
                Err(e)
            }
            Err(e) => {
                self.cache.notes.rollback(rollback);
                warn!(op, note_id = %id, error = %e, "Remote write failed, rolled back");
                self.events.emit(SyncEvent::rolled_back(id, &e));
                Err(e)
            }
        }
    }

    /// Invalidate the owner's note entries and re-read `note_id` from the
    /// store, so the cache reflects what the store actually holds.
    async fn refetch(&self, owner_id: Uuid, note_id: Option<Uuid>) {
        self.cache.notes.invalidate_where(|k| k.owner_id == owner_id);
        let Some(id) = note_id else {
            return;
        };
        match self.store.list_notes(owner_id, None).await {
            Ok(notes) => match notes.into_iter().find(|n| n.id == id) {
                Some(server) => {
                    self.cache.notes.replace(id, server);
                }
                None => {
                    let _ = self.cache.notes.remove(id);
                }
            },
            Err(e) => {
                warn!(note_id = %id, error = %e, "Refetch after partial write failed");
            }
        }
    }

    async fn record_version(&self, note: &Note) {
        if let Err(e) = self
            .recorder
            .record(note.id, &note.title, &note.content, note.version, note.owner_id)
            .await
        {
            warn!(note_id = %note.id, version = note.version, error = %e, "Version record failed");
            self.events.emit(SyncEvent::Notice {
                message: format!("Saved, but version history was not updated: {}", e),
            });
        }
    }

    /// Apply a caller-supplied patch.
    pub async fn update(&self, id: Uuid, patch: NotePatch) -> Result<Note> {
        self.mutate_with("update", id, move |_| Ok(patch)).await
    }

    /// Replace title and content.
    pub async fn edit(
        &self,
        id: Uuid,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Note> {
        self.update(id, NotePatch::text(title, content)).await
    }

    /// Flip pinned. Archived and trashed notes cannot be pinned.
    pub async fn toggle_pin(&self, id: Uuid) -> Result<Note> {
        self.mutate_with("toggle_pin", id, |note| {
            if !note.is_pinned && !note.is_active() {
                return Err(Error::ValidationFailure(
                    "archived or trashed notes cannot be pinned".to_string(),
                ));
            }
            Ok(NotePatch::toggle_pin(note))
        })
        .await
    }

    pub async fn toggle_archive(&self, id: Uuid) -> Result<Note> {
        self.mutate_with("toggle_archive", id, |note| Ok(NotePatch::toggle_archive(note)))
            .await
    }

    pub async fn toggle_trash(&self, id: Uuid) -> Result<Note> {
        self.mutate_with("toggle_trash", id, |note| Ok(NotePatch::toggle_trash(note)))
            .await
    }

    pub async fn set_reminder(&self, id: Uuid, at: Option<DateTime<Utc>>) -> Result<Note> {
        let patch = NotePatch {
            reminder_at: Some(at),
            ..Default::default()
        };
        self.mutate_with("set_reminder", id, move |_| Ok(patch)).await
    }

    pub async fn set_color(&self, id: Uuid, color: impl Into<String>) -> Result<Note> {
        let patch = NotePatch {
            color: Some(color.into()),
            ..Default::default()
        };
        self.mutate_with("set_color", id, move |_| Ok(patch)).await
    }

    pub async fn set_labels(&self, id: Uuid, labels: BTreeSet<Uuid>) -> Result<Note> {
        let patch = NotePatch {
            labels: Some(labels),
            ..Default::default()
        };
        self.mutate_with("set_labels", id, move |_| Ok(patch)).await
    }

    /// Flip one checklist item's completed flag.
    pub async fn toggle_checklist_item(&self, id: Uuid, item_id: &str) -> Result<Note> {
        let item_id = item_id.to_string();
        self.mutate_with("toggle_checklist_item", id, move |note| {
            let mut items = note.checklist_items.clone();
            let item = items
                .iter_mut()
                .find(|i| i.id == item_id)
                .ok_or_else(|| Error::NotFound(format!("checklist item {}", item_id)))?;
            item.completed = !item.completed;
            Ok(NotePatch {
                checklist_items: Some(items),
                ..Default::default()
            })
        })
        .await
    }

    /// Bring back an earlier title and content as a new version.
    ///
    /// Restoring a version whose title and content equal the current note
    /// changes nothing, so no write is sent and no version is recorded.
    pub async fn restore(&self, id: Uuid, version: i64) -> Result<Note> {
        let snapshot = self.recorder.get(id, version).await?;
        info!(note_id = %id, from_version = version, "Restoring version");
        self.mutate_with("restore", id, move |_| {
            Ok(NotePatch::text(snapshot.title, snapshot.content))
        })
        .await
    }

    // =========================================================================
    // CREATE AND DELETE
    // =========================================================================

    /// Create a note. It shows up at once under a placeholder id, which is
    /// swapped for the server id when the insert is confirmed.
    pub async fn create_note(
        &self,
        owner_id: Uuid,
        workspace_id: Option<Uuid>,
        draft: NoteDraft,
    ) -> Result<Note> {
        draft.validate()?;
        let _creating = CreatingGuard::enter(&self.creating);

        let record = draft.into_record(owner_id, workspace_id, self.next_position());
        let temp_id = Uuid::new_v4();
        let placeholder = record.clone().into_note(temp_id, Utc::now());
        let rollback = self
            .cache
            .notes
            .insert_where(placeholder, |k| k.admits(owner_id, workspace_id));
        debug!(temp_id = %temp_id, position = record.position, "Placeholder inserted");

        match self.store.insert_note(record).await {
            Ok(note) => {
                self.cache.notes.replace(temp_id, note.clone());
                info!(note_id = %note.id, temp_id = %temp_id, "Note created");
                self.events.emit(SyncEvent::NoteCreated {
                    temp_id,
                    note_id: note.id,
                });
                self.record_version(&note).await;
                Ok(note)
            }
            Err(e) if e.is_partial() => {
                // The row exists under an id only the store knows.
                self.cache.notes.rollback(rollback);
                warn!(temp_id = %temp_id, error = %e, "Create partially applied, refetching");
                self.refetch(owner_id, None).await;
                self.events.emit(SyncEvent::Notice {
                    message: format!("Note created, but its labels were not saved: {}", e),
                });
                Err(e)
            }
            Err(e) => {
                self.cache.notes.rollback(rollback);
                warn!(temp_id = %temp_id, error = %e, "Create failed, placeholder removed");
                self.events.emit(SyncEvent::rolled_back(temp_id, &e));
                Err(e)
            }
        }
    }

    /// Copy a note's body into a new, unpinned, active note.
    pub async fn duplicate(&self, id: Uuid) -> Result<Note> {
        let source = self
            .cache
            .notes
            .find(id)
            .ok_or_else(|| Error::NotFound(format!("note {}", id)))?;
        let draft = NoteDraft {
            title: source.title,
            content: source.content,
            note_type: source.note_type,
            color: Some(source.color),
            labels: source.labels,
            is_encrypted: source.is_encrypted,
            reminder_at: None,
            checklist_items: source.checklist_items,
            media_url: source.media_url,
        };
        self.create_note(source.owner_id, source.workspace_id, draft)
            .await
    }

    /// Permanently delete a trashed note.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let _guard = self.lock_entity(id).await;

        let current = self
            .cache
            .notes
            .find(id)
            .ok_or_else(|| Error::NotFound(format!("note {}", id)))?;
        if !current.is_trashed {
            return Err(Error::ValidationFailure(
                "only trashed notes can be deleted".to_string(),
            ));
        }

        let rollback = self.cache.notes.remove(id);
        match self.store.delete_note(id).await {
            Ok(()) => {
                info!(note_id = %id, "Note deleted");
                self.events.emit(SyncEvent::NoteDeleted { note_id: id });
                Ok(())
            }
            Err(e) => {
                self.cache.notes.rollback(rollback);
                warn!(note_id = %id, error = %e, "Delete failed, note restored");
                self.events.emit(SyncEvent::rolled_back(id, &e));
                Err(e)
            }
        }
    }

    // =========================================================================
    // LABELS AND WORKSPACES
    // =========================================================================

    /// Create a label. Names are trimmed and unique per owner ignoring case.
    pub async fn create_label(
        &self,
        owner_id: Uuid,
        name: &str,
        color: Option<String>,
    ) -> Result<Label> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::ValidationFailure("label name is required".to_string()));
        }
        let existing = match self.cache.labels.get(&owner_id) {
            Some(entry) => entry.data,
            None => self.store.list_labels(owner_id).await?,
        };
        if existing.iter().any(|l| l.name_matches(name)) {
            return Err(Error::ValidationFailure(format!(
                "label '{}' already exists",
                name
            )));
        }

        let record = NewLabel {
            name: name.to_string(),
            color: color.unwrap_or_else(|| defaults::LABEL_COLOR.to_string()),
            owner_id,
        };
        let temp_id = Uuid::new_v4();
        let rollback = self.cache.labels.append_where(
            Label {
                id: temp_id,
                name: record.name.clone(),
                color: record.color.clone(),
                owner_id,
                created_at: Utc::now(),
            },
            |k| *k == owner_id,
        );

        match self.store.insert_label(record).await {
            Ok(label) => {
                self.cache.labels.replace(temp_id, label.clone());
                info!(label_id = %label.id, "Label created");
                Ok(label)
            }
            Err(e) => {
                self.cache.labels.rollback(rollback);
                warn!(error = %e, "Label create failed");
                self.events.emit(SyncEvent::Notice {
                    message: format!("Could not create label: {}", e),
                });
                Err(e)
            }
        }
    }

    /// Create a workspace. The owner's first workspace becomes the default;
    /// asking for a second default is rejected.
    pub async fn create_workspace(
        &self,
        owner_id: Uuid,
        name: &str,
        description: Option<String>,
        color: Option<String>,
        is_default: bool,
    ) -> Result<Workspace> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::ValidationFailure(
                "workspace name is required".to_string(),
            ));
        }
        let existing = match self.cache.workspaces.get(&owner_id) {
            Some(entry) => entry.data,
            None => self.store.list_workspaces(owner_id).await?,
        };
        let has_default = existing.iter().any(|w| w.is_default);
        if is_default && has_default {
            return Err(Error::ValidationFailure(
                "a default workspace already exists".to_string(),
            ));
        }

        let record = NewWorkspace {
            name: name.to_string(),
            description: description.filter(|d| !d.trim().is_empty()),
            color: color.unwrap_or_else(|| defaults::WORKSPACE_COLOR.to_string()),
            owner_id,
            is_default: is_default || existing.is_empty(),
        };
        let temp_id = Uuid::new_v4();
        let rollback = self.cache.workspaces.append_where(
            Workspace {
                id: temp_id,
                name: record.name.clone(),
                description: record.description.clone(),
                color: record.color.clone(),
                owner_id,
                created_at: Utc::now(),
                is_default: record.is_default,
            },
            |k| *k == owner_id,
        );

        match self.store.insert_workspace(record).await {
            Ok(workspace) => {
                self.cache.workspaces.replace(temp_id, workspace.clone());
                info!(workspace_id = %workspace.id, is_default = workspace.is_default, "Workspace created");
                Ok(workspace)
            }
            Err(e) => {
                self.cache.workspaces.rollback(rollback);
                warn!(error = %e, "Workspace create failed");
                self.events.emit(SyncEvent::Notice {
                    message: format!("Could not create workspace: {}", e),
                });
                Err(e)
            }
        }
    }

    // =========================================================================
    // CONTENT HELPERS
    // =========================================================================

    /// Append text to a note's content, separated by a blank line.
    pub async fn append_content(&self, id: Uuid, text: &str) -> Result<Note> {
        let text = text.to_string();
        self.mutate_with("append_content", id, move |note| {
            let content = if note.content.is_empty() {
                text
            } else {
                format!("{}{}{}", note.content, defaults::APPENDED_CONTENT_SEPARATOR, text)
            };
            Ok(NotePatch {
                content: Some(content),
                ..Default::default()
            })
        })
        .await
    }

    /// Add an unchecked checklist item, converting the note to a checklist.
    pub async fn append_checklist_item(&self, id: Uuid, text: &str) -> Result<Note> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(Error::ValidationFailure(
                "checklist item text is required".to_string(),
            ));
        }
        self.mutate_with("append_checklist_item", id, move |note| {
            let mut items = note.checklist_items.clone();
            items.push(nexus_core::ChecklistItem::new(text));
            Ok(NotePatch {
                note_type: (note.note_type != NoteType::Checklist).then_some(NoteType::Checklist),
                checklist_items: Some(items),
                ..Default::default()
            })
        })
        .await
    }
}
