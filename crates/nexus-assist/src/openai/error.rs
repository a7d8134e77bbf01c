//! Mapping chat-completions API failures onto [`nexus_core::Error`].
//!
//! Credential and model problems can only be fixed in configuration, so they
//! become `ConfigMissing`. Everything else is an `Assistant` error the UI
//! reports before leaving the note untouched.

use nexus_core::Error;

/// Why the completions API refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFailure {
    /// Key missing upstream, invalid or revoked.
    Credential,
    /// Model unknown or not available to this key.
    UnknownModel,
    Throttled,
    /// Note content exceeds the model's context window.
    TooLong,
    Upstream,
    Other,
}

impl ApiFailure {
    /// Classify from HTTP status and the API's `error.code` (or `error.type`
    /// when no code is given).
    pub fn classify(status: u16, error_type: &str) -> Self {
        match status {
            401 | 403 => Self::Credential,
            404 => Self::UnknownModel,
            _ if error_type == "model_not_found" => Self::UnknownModel,
            429 => Self::Throttled,
            400 if error_type.contains("context_length") => Self::TooLong,
            500..=599 => Self::Upstream,
            _ => Self::Other,
        }
    }

    pub fn into_error(self, message: &str) -> Error {
        match self {
            Self::Credential => Error::ConfigMissing(format!("assistant credential rejected: {}", message)),
            Self::UnknownModel => Error::ConfigMissing(format!("assistant model unavailable: {}", message)),
            Self::Throttled => Error::Assistant(format!("assistant is busy, try again later: {}", message)),
            Self::TooLong => Error::Assistant(format!("note is too long to analyze: {}", message)),
            Self::Upstream => Error::Assistant(format!("assistant service error: {}", message)),
            Self::Other => Error::Assistant(message.to_string()),
        }
    }
}
