//! Error types for notenexus.

use thiserror::Error;

/// Result type alias using notenexus's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for notenexus operations.
///
/// `Clone` so that one de-duplicated fetch can hand the same outcome to
/// every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No signed-in session (or the store rejected the credentials).
    #[error("Authentication required")]
    AuthRequired,

    /// Entity missing, or not owned by the caller.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store unreachable or returned a transient failure.
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// Input rejected before anything was written.
    #[error("Validation failed: {0}")]
    ValidationFailure(String),

    /// A required credential or setting is absent.
    #[error("Configuration missing: {0}")]
    ConfigMissing(String),

    /// The note row was written but a follow-up write (its label rows)
    /// was not, so the store no longer matches either the old or the new
    /// state. Callers refetch instead of rolling back.
    #[error("Partially applied: {0}")]
    PartiallyApplied(String),

    /// The AI assistant call failed.
    #[error("Assistant error: {0}")]
    Assistant(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a later user-initiated retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::NetworkFailure(_))
    }

    /// Whether the store may hold some of the write, so the cached copy
    /// must be refetched rather than restored.
    pub fn is_partial(&self) -> bool {
        matches!(self, Error::PartiallyApplied(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::Serialization(e.to_string())
        } else {
            Error::NetworkFailure(e.to_string())
        }
    }
}
