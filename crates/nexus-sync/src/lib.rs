//! # nexus-sync
//!
//! Client-side synchronization layer for notenexus.
//!
//! Keeps an in-memory view of an owner's notes, labels and workspaces
//! consistent with the remote store:
//!
//! - [`cache`]: keyed collections with staleness, de-duplicated fetches and
//!   idle eviction
//! - [`mutation`]: optimistic writes with per-note FIFO ordering and rollback
//! - [`versions`]: append-only version history
//! - [`projector`]: the filtered, ordered list the UI renders
//! - [`suggestions`]: merging assistant output through the mutation path
//! - [`analytics`]: usage summary
//! - [`session`]: the [`NoteSync`] facade tying them together
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use nexus_store::MemoryStore;
//! use nexus_sync::{NoteSync, SyncConfig};
//!
//! let sync = NoteSync::new(Arc::new(MemoryStore::new()), Some(owner_id), SyncConfig::from_env());
//! sync.load().await?;
//! let note = sync.create_note(NoteDraft::text("Groceries", "milk")).await?;
//! sync.toggle_pin(note.id).await?;
//! let view = sync.visible_notes()?;
//! ```

pub mod analytics;
pub mod cache;
pub mod config;
pub mod mutation;
pub mod projector;
pub mod session;
pub mod suggestions;
pub mod versions;

pub use analytics::{AnalyticsSummary, DailyActivity, LabelUsage};
pub use cache::{CacheStats, CachedEntry, CollectionCache, EntityCache, NotesKey, Rollback, Subscription};
pub use config::SyncConfig;
pub use mutation::MutationEngine;
pub use projector::{project, Projection};
pub use session::{LoadOutcome, NoteSync};
pub use suggestions::apply_suggestion;
pub use versions::VersionRecorder;

pub use nexus_core::{AppState, Error, Result, View};
