//! Unified error types for uiv

use thiserror::Error;

/// Unified error type for all uiv operations
#[derive(Error, Debug)]
pub enum UivError {
    // Check-level outcomes
    #[error("element not found: {0}")]
    NotFound(String),

    #[error("timed out after {waited_ms}ms waiting for {what}")]
    Timeout { what: String, waited_ms: u64 },

    #[error("{0}")]
    AssertionMismatch(String),

    // Session errors
    #[error("session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("browser error: {0}")]
    Browser(String),

    // Construction-time errors
    #[error("invalid check '{check}': {reason}")]
    Config { check: String, reason: String },

    #[error("failed to parse suite file: {0}")]
    ConfigParse(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl UivError {
    /// Shorthand for a construction-time error on a named check
    pub fn config(check: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            check: check.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error means the check observed the page and disagreed,
    /// as opposed to being unable to observe it at all.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::AssertionMismatch(_))
    }

    /// Whether no further observation of the page is possible
    pub fn is_session_loss(&self) -> bool {
        matches!(self, Self::SessionUnavailable(_))
    }
}

/// Result type alias using UivError
pub type Result<T> = std::result::Result<T, UivError>;
