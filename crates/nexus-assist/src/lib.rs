//! # nexus-assist
//!
//! AI assistant collaborator for notenexus.
//!
//! The assistant is a black box to the sync layer: `analyze` proposes a
//! summary, tags, todos and suggestions for a note's content, and `generate`
//! writes new content from a prompt. Its output only reaches a note through
//! the ordinary mutation path in `nexus-sync`.
//!
//! ## Backends
//!
//! - [`openai::OpenAIAssistant`]: any OpenAI-compatible chat-completions
//!   endpoint (OpenAI, Ollama, vLLM, LM Studio, ...).
//! - `mock::MockAssistant` (feature `mock`): canned responses and call
//!   counting for tests.

pub mod openai;
pub mod prompts;

#[cfg(feature = "mock")]
pub mod mock;

pub use openai::{AssistantConfig, OpenAIAssistant};

#[cfg(feature = "mock")]
pub use mock::MockAssistant;

pub use nexus_core::{AiAssistant, Analysis, Error, Result};
