//! # nexus-store
//!
//! Remote Store Client implementations for notenexus.
//!
//! - [`RestStore`]: PostgREST-style HTTP backend (notes, labels, workspaces,
//!   note versions, and the `note_labels` join).
//! - [`MemoryStore`]: in-process store with latency and failure injection,
//!   used by tests and the demo CLI.
//! - [`rows`]: persisted row layout and its conversion to domain models,
//!   substituting documented defaults for absent optional fields.

pub mod memory;
pub mod rest;
pub mod rows;

pub use memory::{MemoryStore, StoreOp};
pub use rest::{RestConfig, RestStore};

pub use nexus_core::{Error, RemoteStore, Result};
