//! In-process remote store with latency and failure injection.
//!
//! Behaves like the hosted backend (server-assigned ids and timestamps,
//! version cascade on note delete, default-first workspace order) and lets
//! tests control response timing per call and force transient failures.
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use nexus_store::{MemoryStore, StoreOp};
//!
//! let store = MemoryStore::new();
//! store.delay_next(StoreOp::UpdateNote, Duration::from_millis(50));
//! store.fail_next(StoreOp::UpdateNote, 1);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use nexus_core::{
    Error, Label, NewLabel, NewNote, NewNoteVersion, NewWorkspace, Note, NotePatch, NoteVersion,
    RemoteStore, Result, Workspace,
};

/// Store operation, for fault injection and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListNotes,
    InsertNote,
    UpdateNote,
    /// The label rows written after a note insert or update.
    ReplaceNoteLabels,
    DeleteNote,
    ListLabels,
    InsertLabel,
    ListWorkspaces,
    InsertWorkspace,
    InsertVersion,
    ListVersions,
}

#[derive(Default)]
struct Tables {
    notes: BTreeMap<Uuid, Note>,
    labels: Vec<Label>,
    workspaces: Vec<Workspace>,
    versions: Vec<NoteVersion>,
}

#[derive(Default)]
struct Faults {
    offline: bool,
    failures: HashMap<StoreOp, usize>,
    delays: HashMap<StoreOp, VecDeque<Duration>>,
    calls: HashMap<StoreOp, usize>,
}

/// Shared handle; clones see the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Mutex<Faults>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Seeding and inspection ────────────────────────────────────────────

    /// Put a note straight into the backing table.
    pub fn seed_note(&self, note: Note) {
        lock(&self.tables).notes.insert(note.id, note);
    }

    pub fn seed_label(&self, label: Label) {
        lock(&self.tables).labels.push(label);
    }

    pub fn seed_workspace(&self, workspace: Workspace) {
        lock(&self.tables).workspaces.push(workspace);
    }

    /// Server-side copy of a note.
    pub fn note(&self, id: Uuid) -> Option<Note> {
        lock(&self.tables).notes.get(&id).cloned()
    }

    pub fn note_count(&self) -> usize {
        lock(&self.tables).notes.len()
    }

    /// Server-side versions of a note, in insertion order.
    pub fn versions(&self, note_id: Uuid) -> Vec<NoteVersion> {
        lock(&self.tables)
            .versions
            .iter()
            .filter(|v| v.note_id == note_id)
            .cloned()
            .collect()
    }

    // ─── Fault injection ───────────────────────────────────────────────────

    /// While offline every call fails with `NetworkFailure`.
    pub fn set_offline(&self, offline: bool) {
        lock(&self.faults).offline = offline;
    }

    /// Fail the next `count` calls of `op` with `NetworkFailure`.
    pub fn fail_next(&self, op: StoreOp, count: usize) {
        *lock(&self.faults).failures.entry(op).or_default() += count;
    }

    /// Delay the next call of `op`. Queued delays are consumed in call order.
    pub fn delay_next(&self, op: StoreOp, delay: Duration) {
        lock(&self.faults)
            .delays
            .entry(op)
            .or_default()
            .push_back(delay);
    }

    pub fn call_count(&self, op: StoreOp) -> usize {
        lock(&self.faults).calls.get(&op).copied().unwrap_or(0)
    }

    /// Record the call, wait out its latency, then apply any injected fault.
    async fn enter(&self, op: StoreOp) -> Result<()> {
        let delay = {
            let mut faults = lock(&self.faults);
            *faults.calls.entry(op).or_default() += 1;
            faults
                .delays
                .get_mut(&op)
                .and_then(|q| q.pop_front())
                .unwrap_or_default()
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut faults = lock(&self.faults);
        if faults.offline {
            return Err(Error::NetworkFailure("store unreachable".to_string()));
        }
        if let Some(remaining) = faults.failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                tracing::debug!(?op, "Injected store failure");
                return Err(Error::NetworkFailure(format!("injected failure: {:?}", op)));
            }
        }
        Ok(())
    }

    /// Second phase of a note write: clear the join rows, then insert the
    /// new set. A failure leaves the note with no labels.
    async fn write_labels(&self, note_id: Uuid, labels: BTreeSet<Uuid>) -> Result<()> {
        if let Some(note) = lock(&self.tables).notes.get_mut(&note_id) {
            note.labels.clear();
        }
        if let Err(e) = self.enter(StoreOp::ReplaceNoteLabels).await {
            return Err(Error::PartiallyApplied(format!(
                "note {} saved but its labels were not: {}",
                note_id, e
            )));
        }
        if let Some(note) = lock(&self.tables).notes.get_mut(&note_id) {
            note.labels = labels;
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list_notes(&self, owner_id: Uuid, workspace_id: Option<Uuid>) -> Result<Vec<Note>> {
        self.enter(StoreOp::ListNotes).await?;
        let tables = lock(&self.tables);
        let mut notes: Vec<Note> = tables
            .notes
            .values()
            .filter(|n| n.owner_id == owner_id)
            .filter(|n| workspace_id.is_none() || n.workspace_id == workspace_id)
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.position.cmp(&a.position).then(a.id.cmp(&b.id)));
        Ok(notes)
    }

    async fn insert_note(&self, record: NewNote) -> Result<Note> {
        self.enter(StoreOp::InsertNote).await?;
        let labels = record.labels.clone();
        let mut note = record.into_note(Uuid::now_v7(), Utc::now());
        note.labels.clear();
        lock(&self.tables).notes.insert(note.id, note.clone());

        if !labels.is_empty() {
            self.write_labels(note.id, labels.clone()).await?;
            note.labels = labels;
        }
        Ok(note)
    }

    async fn update_note(&self, id: Uuid, patch: &NotePatch) -> Result<Note> {
        self.enter(StoreOp::UpdateNote).await?;
        let mut next = {
            let mut tables = lock(&self.tables);
            let current = tables
                .notes
                .get(&id)
                .ok_or_else(|| Error::NotFound(format!("note {}", id)))?;
            let mut next = current.apply(patch);
            if let Some(version) = patch.version {
                next.version = version;
            }
            next.updated_at = Utc::now();
            // Labels land in the second phase.
            if patch.touches_labels() {
                next.labels = current.labels.clone();
            }
            tables.notes.insert(id, next.clone());
            next
        };

        if let Some(ref labels) = patch.labels {
            self.write_labels(id, labels.clone()).await?;
            next.labels = labels.clone();
        }
        Ok(next)
    }

    async fn delete_note(&self, id: Uuid) -> Result<()> {
        self.enter(StoreOp::DeleteNote).await?;
        let mut tables = lock(&self.tables);
        if tables.notes.remove(&id).is_none() {
            return Err(Error::NotFound(format!("note {}", id)));
        }
        tables.versions.retain(|v| v.note_id != id);
        Ok(())
    }

    async fn list_labels(&self, owner_id: Uuid) -> Result<Vec<Label>> {
        self.enter(StoreOp::ListLabels).await?;
        let tables = lock(&self.tables);
        Ok(tables
            .labels
            .iter()
            .filter(|l| l.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn insert_label(&self, record: NewLabel) -> Result<Label> {
        self.enter(StoreOp::InsertLabel).await?;
        let mut tables = lock(&self.tables);
        let duplicate = tables
            .labels
            .iter()
            .any(|l| l.owner_id == record.owner_id && l.name_matches(&record.name));
        if duplicate {
            return Err(Error::ValidationFailure(format!(
                "label '{}' already exists",
                record.name
            )));
        }
        let label = Label {
            id: Uuid::now_v7(),
            name: record.name,
            color: record.color,
            owner_id: record.owner_id,
            created_at: Utc::now(),
        };
        tables.labels.push(label.clone());
        Ok(label)
    }

    async fn list_workspaces(&self, owner_id: Uuid) -> Result<Vec<Workspace>> {
        self.enter(StoreOp::ListWorkspaces).await?;
        let tables = lock(&self.tables);
        let mut workspaces: Vec<Workspace> = tables
            .workspaces
            .iter()
            .filter(|w| w.owner_id == owner_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order within each group.
        workspaces.sort_by_key(|w| !w.is_default);
        Ok(workspaces)
    }

    async fn insert_workspace(&self, record: NewWorkspace) -> Result<Workspace> {
        self.enter(StoreOp::InsertWorkspace).await?;
        let workspace = Workspace {
            id: Uuid::now_v7(),
            name: record.name,
            description: record.description,
            color: record.color,
            owner_id: record.owner_id,
            created_at: Utc::now(),
            is_default: record.is_default,
        };
        lock(&self.tables).workspaces.push(workspace.clone());
        Ok(workspace)
    }

    async fn insert_version(&self, record: NewNoteVersion) -> Result<NoteVersion> {
        self.enter(StoreOp::InsertVersion).await?;
        let mut tables = lock(&self.tables);
        if !tables.notes.contains_key(&record.note_id) {
            return Err(Error::NotFound(format!("note {}", record.note_id)));
        }
        let version = NoteVersion {
            id: Uuid::now_v7(),
            note_id: record.note_id,
            title: record.title,
            content: record.content,
            version: record.version,
            created_at: Utc::now(),
            author_id: record.author_id,
        };
        tables.versions.push(version.clone());
        Ok(version)
    }

    async fn list_versions(&self, note_id: Uuid) -> Result<Vec<NoteVersion>> {
        self.enter(StoreOp::ListVersions).await?;
        let tables = lock(&self.tables);
        let mut versions: Vec<NoteVersion> = tables
            .versions
            .iter()
            .filter(|v| v.note_id == note_id)
            .cloned()
            .collect();
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::NoteDraft;

    fn record(owner: Uuid, title: &str, position: i64) -> NewNote {
        NoteDraft::text(title, "").into_record(owner, None, position)
    }

    #[tokio::test]
    async fn test_list_notes_orders_by_position_desc() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        store.insert_note(record(owner, "old", 1)).await.unwrap();
        store.insert_note(record(owner, "new", 2)).await.unwrap();
        store
            .insert_note(record(Uuid::new_v4(), "someone else", 3))
            .await
            .unwrap();

        let titles: Vec<String> = store
            .list_notes(owner, None)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(titles, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed() {
        let store = MemoryStore::new();
        store.fail_next(StoreOp::ListLabels, 1);
        let owner = Uuid::new_v4();
        assert!(matches!(
            store.list_labels(owner).await,
            Err(Error::NetworkFailure(_))
        ));
        assert!(store.list_labels(owner).await.is_ok());
        assert_eq!(store.call_count(StoreOp::ListLabels), 2);
    }

    #[tokio::test]
    async fn test_update_unknown_note_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_note(Uuid::new_v4(), &NotePatch::text("a", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_label_failure_keeps_row_write() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let note = store.insert_note(record(owner, "t", 1)).await.unwrap();
        store.fail_next(StoreOp::ReplaceNoteLabels, 1);

        let mut patch = NotePatch::text("t", "edited");
        patch.labels = Some(BTreeSet::from([Uuid::new_v4()]));
        patch.version = Some(2);
        let err = store.update_note(note.id, &patch).await.unwrap_err();

        assert!(err.is_partial());
        let server = store.note(note.id).unwrap();
        assert_eq!(server.content, "edited");
        assert_eq!(server.version, 2);
        assert!(server.labels.is_empty());
        assert_eq!(store.note_count(), 1);
    }

    #[tokio::test]
    async fn test_offline_fails_every_call_until_restored() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        store.set_offline(true);
        assert!(store.list_notes(owner, None).await.unwrap_err().is_transient());
        assert!(store.insert_note(record(owner, "t", 1)).await.is_err());
        assert_eq!(store.note_count(), 0);

        store.set_offline(false);
        assert!(store.list_notes(owner, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_cascades_versions() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let note = store.insert_note(record(owner, "t", 1)).await.unwrap();
        store
            .insert_version(NewNoteVersion {
                note_id: note.id,
                title: "t".into(),
                content: String::new(),
                version: 1,
                author_id: owner,
            })
            .await
            .unwrap();
        store.delete_note(note.id).await.unwrap();
        assert!(store.versions(note.id).is_empty());
    }

    #[tokio::test]
    async fn test_workspaces_listed_default_first() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        for (name, is_default) in [("side", false), ("main", true)] {
            store
                .insert_workspace(NewWorkspace {
                    name: name.into(),
                    description: None,
                    color: "#000".into(),
                    owner_id: owner,
                    is_default,
                })
                .await
                .unwrap();
        }
        let names: Vec<String> = store
            .list_workspaces(owner)
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.name)
            .collect();
        assert_eq!(names, vec!["main", "side"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_delays_apply_in_call_order() {
        let store = MemoryStore::new();
        store.delay_next(StoreOp::ListLabels, Duration::from_secs(5));
        let started = tokio::time::Instant::now();
        store.list_labels(Uuid::new_v4()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        store.list_labels(Uuid::new_v4()).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
