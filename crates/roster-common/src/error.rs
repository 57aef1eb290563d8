//! Error types shared across Roster crates

use thiserror::Error;

/// Result type alias for Roster operations
pub type Result<T> = std::result::Result<T, RosterError>;

/// Errors that are not specific to a single pipeline stage
#[derive(Error, Debug)]
pub enum RosterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl RosterError {
    pub fn config(message: impl Into<String>) -> Self {
        RosterError::Config(message.into())
    }

    pub fn parse(message: impl Into<String>) -> Self {
        RosterError::Parse(message.into())
    }
}
