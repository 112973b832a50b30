//! Error types for the herd_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for herd_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required text field was blank after trimming
    #[error("{0} must not be empty")]
    EmptyInput(&'static str),

    /// A key that must be unique was reused (step day offset, assignment id)
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Protocol, subject, assignment or step does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed date string, or a date outside the convertible range
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persisted state violates a model invariant
    #[error("State error: {0}")]
    State(String),
}
