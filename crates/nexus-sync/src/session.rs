//! Session facade.
//!
//! [`NoteSync`] is what a UI holds for the lifetime of a signed-in session:
//! the owner, the current [`AppState`], and the cache, engine and recorder
//! wired to one store. Without an owner every operation fails with
//! [`Error::AuthRequired`].
//!
//! A session created inside a Tokio runtime also runs an idle sweeper that
//! evicts unwatched cache entries; it stops when the session is dropped.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use nexus_core::{
    AiAssistant, Analysis, AppState, Error, EventBus, Label, Note, NoteDraft, NotePatch,
    NoteVersion, RemoteStore, Result, Suggestion, SyncEvent, Workspace,
};

use crate::analytics::{self, AnalyticsSummary};
use crate::cache::{EntityCache, NotesKey, Subscription};
use crate::config::SyncConfig;
use crate::mutation::MutationEngine;
use crate::projector::{self, Projection};
use crate::suggestions;
use crate::versions::VersionRecorder;

/// What a [`NoteSync::load`] produced.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// The collections for the current state are cached; here is the view.
    Loaded(Projection),
    /// The state moved to another workspace while the notes were in flight.
    Superseded { query_key: String },
}

/// A signed-in (or anonymous) client session.
pub struct NoteSync {
    owner_id: Option<Uuid>,
    state: RwLock<AppState>,
    store: Arc<dyn RemoteStore>,
    engine: Arc<MutationEngine>,
    events: EventBus,
    assistant: Option<Arc<dyn AiAssistant>>,
    config: SyncConfig,
    sweeper: Option<JoinHandle<()>>,
}

fn sweep(cache: &EntityCache) -> usize {
    let evicted = cache.evict_idle();
    if evicted > 0 {
        info!(evicted, "Idle cache entries evicted");
    }
    evicted
}

/// Evict idle entries every half eviction window, so nothing outlives the
/// window by more than half of it.
fn spawn_sweeper(cache: EntityCache, gc_after: Duration) -> Option<JoinHandle<()>> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("No async runtime, idle cache entries are only evicted on request");
        return None;
    };
    let period = (gc_after / 2).max(Duration::from_secs(1));
    Some(runtime.spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            sweep(&cache);
        }
    }))
}

impl Drop for NoteSync {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

impl NoteSync {
    pub fn new(store: Arc<dyn RemoteStore>, owner_id: Option<Uuid>, config: SyncConfig) -> Self {
        let events = EventBus::new(config.event_capacity);
        let cache = EntityCache::new(&config);
        let recorder = VersionRecorder::new(Arc::clone(&store), events.clone());
        let sweeper = spawn_sweeper(cache.clone(), config.gc_after);
        let engine = MutationEngine::new(Arc::clone(&store), cache, recorder, events.clone());
        Self {
            owner_id,
            state: RwLock::new(AppState::default()),
            store,
            engine: Arc::new(engine),
            events,
            assistant: None,
            config,
            sweeper,
        }
    }

    pub fn with_assistant(mut self, assistant: Arc<dyn AiAssistant>) -> Self {
        self.assistant = Some(assistant);
        self
    }

    fn owner(&self) -> Result<Uuid> {
        self.owner_id.ok_or(Error::AuthRequired)
    }

    fn assistant(&self) -> Result<&dyn AiAssistant> {
        self.assistant
            .as_deref()
            .ok_or_else(|| Error::ConfigMissing("no assistant configured".to_string()))
    }

    pub fn owner_id(&self) -> Option<Uuid> {
        self.owner_id
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn engine(&self) -> &MutationEngine {
        &self.engine
    }

    pub fn cache(&self) -> &EntityCache {
        self.engine.cache()
    }

    // =========================================================================
    // STATE AND LOADING
    // =========================================================================

    /// Snapshot of the current navigation state.
    pub fn state(&self) -> AppState {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Apply a state transition and return the new state.
    pub fn navigate(&self, transition: impl FnOnce(AppState) -> AppState) -> AppState {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let next = transition(state.clone());
        debug!(
            view = %next.current_view,
            workspace_id = ?next.current_workspace,
            "Navigated"
        );
        *state = next.clone();
        next
    }

    /// Load labels, workspaces and the notes collection for the current
    /// workspace filter. Fresh entries are served from memory.
    pub async fn load(&self) -> Result<LoadOutcome> {
        let owner_id = self.owner()?;
        let started = Instant::now();
        let key = NotesKey::new(owner_id, self.state().current_workspace);

        let store = Arc::clone(&self.store);
        let labels = self
            .cache()
            .labels
            .get_or_fetch(&owner_id, move || async move { store.list_labels(owner_id).await });

        let store = Arc::clone(&self.store);
        let workspaces = self.cache().workspaces.get_or_fetch(&owner_id, move || async move {
            store.list_workspaces(owner_id).await
        });

        let store = Arc::clone(&self.store);
        let workspace_id = key.workspace_id;
        let notes = self.cache().notes.get_or_fetch(&key, move || async move {
            store.list_notes(owner_id, workspace_id).await
        });

        let (labels, workspaces, notes) = futures::try_join!(labels, workspaces, notes)?;

        let state = self.state();
        if state.current_workspace != key.workspace_id {
            let query_key = key.to_string();
            warn!(query_key = %query_key, "Workspace changed during load, result discarded");
            self.events.emit(SyncEvent::FetchDiscarded {
                query_key: query_key.clone(),
            });
            return Ok(LoadOutcome::Superseded { query_key });
        }

        info!(
            owner_id = %owner_id,
            query_key = %key,
            notes = notes.data.len(),
            labels = labels.data.len(),
            workspaces = workspaces.data.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Session loaded"
        );
        Ok(LoadOutcome::Loaded(projector::project(&notes.data, &state)))
    }

    /// Projection of the cached notes for the current state.
    pub fn visible_notes(&self) -> Result<Projection> {
        let owner_id = self.owner()?;
        Ok(projector::project_cached(self.cache(), owner_id, &self.state()))
    }

    /// Keep the current notes collection from being evicted.
    pub fn watch(&self) -> Result<Subscription<NotesKey, Note>> {
        let owner_id = self.owner()?;
        let key = NotesKey::new(owner_id, self.state().current_workspace);
        Ok(self.cache().notes.subscribe(key))
    }

    /// Drop cache entries idle past the eviction window now, without
    /// waiting for the sweeper.
    pub fn evict_idle(&self) -> usize {
        sweep(self.cache())
    }

    /// Cached labels of the owner.
    pub fn labels(&self) -> Result<Vec<Label>> {
        let owner_id = self.owner()?;
        Ok(self
            .cache()
            .labels
            .get(&owner_id)
            .map(|entry| entry.data)
            .unwrap_or_default())
    }

    /// Cached workspaces of the owner, default first.
    pub fn workspaces(&self) -> Result<Vec<Workspace>> {
        let owner_id = self.owner()?;
        let mut workspaces = self
            .cache()
            .workspaces
            .get(&owner_id)
            .map(|entry| entry.data)
            .unwrap_or_default();
        workspaces.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(workspaces)
    }

    /// Case-insensitive label lookup.
    pub fn find_label_by_name(&self, name: &str) -> Result<Option<Label>> {
        Ok(self
            .labels()?
            .into_iter()
            .find(|label| label.name_matches(name)))
    }

    // =========================================================================
    // NOTES
    // =========================================================================

    /// Create a note in the current workspace.
    pub async fn create_note(&self, draft: NoteDraft) -> Result<Note> {
        let owner_id = self.owner()?;
        self.engine
            .create_note(owner_id, self.state().current_workspace, draft)
            .await
    }

    pub fn is_creating(&self) -> bool {
        self.engine.is_creating()
    }

    pub async fn update(&self, id: Uuid, patch: NotePatch) -> Result<Note> {
        self.owner()?;
        self.engine.update(id, patch).await
    }

    pub async fn edit(&self, id: Uuid, title: &str, content: &str) -> Result<Note> {
        self.owner()?;
        self.engine.edit(id, title, content).await
    }

    pub async fn toggle_pin(&self, id: Uuid) -> Result<Note> {
        self.owner()?;
        self.engine.toggle_pin(id).await
    }

    pub async fn toggle_archive(&self, id: Uuid) -> Result<Note> {
        self.owner()?;
        self.engine.toggle_archive(id).await
    }

    pub async fn toggle_trash(&self, id: Uuid) -> Result<Note> {
        self.owner()?;
        self.engine.toggle_trash(id).await
    }

    pub async fn set_reminder(&self, id: Uuid, at: Option<DateTime<Utc>>) -> Result<Note> {
        self.owner()?;
        self.engine.set_reminder(id, at).await
    }

    pub async fn set_color(&self, id: Uuid, color: &str) -> Result<Note> {
        self.owner()?;
        self.engine.set_color(id, color).await
    }

    pub async fn set_labels(&self, id: Uuid, labels: BTreeSet<Uuid>) -> Result<Note> {
        self.owner()?;
        self.engine.set_labels(id, labels).await
    }

    pub async fn toggle_checklist_item(&self, id: Uuid, item_id: &str) -> Result<Note> {
        self.owner()?;
        self.engine.toggle_checklist_item(id, item_id).await
    }

    pub async fn duplicate(&self, id: Uuid) -> Result<Note> {
        self.owner()?;
        self.engine.duplicate(id).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.owner()?;
        self.engine.delete(id).await
    }

    // =========================================================================
    // HISTORY
    // =========================================================================

    /// Version history, newest first.
    pub async fn history(&self, id: Uuid) -> Result<Vec<NoteVersion>> {
        self.owner()?;
        self.engine.recorder().list(id).await
    }

    pub async fn restore(&self, id: Uuid, version: i64) -> Result<Note> {
        self.owner()?;
        self.engine.restore(id, version).await
    }

    // =========================================================================
    // LABELS AND WORKSPACES
    // =========================================================================

    pub async fn create_label(&self, name: &str, color: Option<String>) -> Result<Label> {
        let owner_id = self.owner()?;
        self.engine.create_label(owner_id, name, color).await
    }

    pub async fn create_workspace(
        &self,
        name: &str,
        description: Option<String>,
        color: Option<String>,
        is_default: bool,
    ) -> Result<Workspace> {
        let owner_id = self.owner()?;
        self.engine
            .create_workspace(owner_id, name, description, color, is_default)
            .await
    }

    // =========================================================================
    // ASSISTANT
    // =========================================================================

    /// Analyze a cached note. Nothing is written.
    pub async fn analyze(&self, id: Uuid) -> Result<Analysis> {
        self.owner()?;
        let note = self
            .cache()
            .notes
            .find(id)
            .ok_or_else(|| Error::NotFound(format!("note {}", id)))?;
        let assistant = self.assistant()?;
        suggestions::analyze_note(assistant, &note)
            .await
            .inspect_err(|e| self.notify_assistant_failure(e))
    }

    /// Generate text from `prompt` and append it to the note.
    pub async fn generate_into(&self, id: Uuid, prompt: &str) -> Result<Note> {
        self.owner()?;
        let assistant = self.assistant()?;
        let suggestion = suggestions::generate_suggestion(assistant, prompt)
            .await
            .inspect_err(|e| self.notify_assistant_failure(e))?;
        suggestions::apply_suggestion(&self.engine, id, suggestion).await
    }

    pub async fn apply_suggestion(&self, id: Uuid, suggestion: Suggestion) -> Result<Note> {
        self.owner()?;
        suggestions::apply_suggestion(&self.engine, id, suggestion).await
    }

    fn notify_assistant_failure(&self, error: &Error) {
        if matches!(error, Error::ValidationFailure(_)) {
            return;
        }
        warn!(error = %error, "Assistant call failed");
        self.events.emit(SyncEvent::Notice {
            message: format!("Assistant unavailable: {}", error),
        });
    }

    // =========================================================================
    // ANALYTICS
    // =========================================================================

    /// Usage summary over the owner's notes in every workspace.
    pub async fn analytics(&self) -> Result<AnalyticsSummary> {
        let owner_id = self.owner()?;
        let key = NotesKey::new(owner_id, None);

        let store = Arc::clone(&self.store);
        let notes = self.cache().notes.get_or_fetch(&key, move || async move {
            store.list_notes(owner_id, None).await
        });
        let store = Arc::clone(&self.store);
        let labels = self
            .cache()
            .labels
            .get_or_fetch(&owner_id, move || async move { store.list_labels(owner_id).await });

        let (notes, labels) = futures::try_join!(notes, labels)?;
        Ok(analytics::summarize(&notes.data, &labels.data, Utc::now()))
    }
}
