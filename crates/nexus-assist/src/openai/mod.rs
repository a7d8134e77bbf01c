//! OpenAI-compatible assistant backend.
//!
//! Works with any endpoint that speaks the chat-completions protocol:
//!
//! - OpenAI cloud API
//! - Ollama (in OpenAI compatibility mode)
//! - vLLM, LocalAI, LM Studio
//!
//! # Example
//!
//! ```rust,no_run
//! use nexus_assist::openai::{AssistantConfig, OpenAIAssistant};
//! use nexus_core::AiAssistant;
//!
//! #[tokio::main]
//! async fn main() {
//!     let assistant = OpenAIAssistant::new(AssistantConfig {
//!         api_key: Some("sk-...".to_string()),
//!         ..Default::default()
//!     })
//!     .unwrap();
//!
//!     let analysis = assistant.analyze("Buy milk. Call the dentist.").await.unwrap();
//!     println!("{}", analysis.summary);
//! }
//! ```

mod backend;
mod error;
mod types;

pub use backend::{
    AssistantConfig, OpenAIAssistant, DEFAULT_GEN_MODEL, DEFAULT_OPENAI_URL, DEFAULT_TIMEOUT_SECS,
};
pub use error::ApiFailure;
pub use types::*;
