//! # nexus-core
//!
//! Core types, traits, and abstractions for the notenexus note client.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the store, assistant and sync crates depend on.

pub mod defaults;
pub mod error;
pub mod events;
pub mod models;
pub mod state;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{EventBus, SyncEvent};
pub use models::*;
pub use state::{AppState, View};
pub use traits::*;
