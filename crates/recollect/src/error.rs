//! Error types for Recollect
//!
//! Most of these are recovered close to where they happen: a missing agent
//! store yields "no injection", a slow vector channel degrades to keyword-only
//! results, and a failed summary leaves the simple placeholder in place.
//! Only explicit operator actions surface them to a caller.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Main error type for Recollect operations
#[derive(Error, Debug)]
pub enum RecollectError {
    /// The agent has no memory store attached
    #[error("Agent has no memory store: {0}")]
    MissingComponent(String),

    /// The vector-similarity channel did not answer within its deadline
    #[error("Vector retrieval timed out after {0:?}")]
    RetrievalTimeout(Duration),

    /// The external summarizer failed or produced nothing usable
    #[error("Summarization failed: {0}")]
    SummarizationFailure(String),

    /// No usable match-text sources are configured
    #[error("Invalid match configuration: {0}")]
    InvalidMatchConfiguration(String),

    /// An entry id did not resolve
    #[error("Entry not found: {0}")]
    NotFound(Uuid),

    /// A mutation violated a store invariant
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RecollectError {
    fn from(e: serde_json::Error) -> Self {
        RecollectError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for RecollectError {
    fn from(e: toml::de::Error) -> Self {
        RecollectError::Config(format!("Failed to parse config: {e}"))
    }
}

/// Result type alias for Recollect operations
pub type Result<T> = std::result::Result<T, RecollectError>;
