//! Error types for the harvest pipeline
//!
//! Three families matter to callers:
//!
//! - [`SourceError`]: a listing or detail page could not be retrieved. These
//!   never leave the task that hit them; the page or item is dropped.
//! - [`LifecycleViolation`]: the tracker saw an impossible transition. Fatal.
//! - [`StoreError`]: the backing store rejected a write. Fatal.

use thiserror::Error;

use crate::models::Identifier;
use crate::tracker::LifecycleState;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Failure talking to the external directory
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Request to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },
}

/// An identifier moved through the lifecycle out of order
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleViolation {
    #[error("identifier {id} discovered twice")]
    DuplicateRegistration { id: Identifier, state: LifecycleState },

    #[error("identifier {id} was never discovered")]
    NotRegistered { id: Identifier },

    #[error("identifier {id} is {current:?}, cannot move to {attempted:?}")]
    IllegalTransition {
        id: Identifier,
        current: LifecycleState,
        attempted: LifecycleState,
    },
}

impl LifecycleViolation {
    pub fn id(&self) -> &str {
        match self {
            LifecycleViolation::DuplicateRegistration { id, .. }
            | LifecycleViolation::NotRegistered { id }
            | LifecycleViolation::IllegalTransition { id, .. } => id,
        }
    }
}

/// Failure writing to the backing store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Top-level pipeline error
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Lifecycle invariant violated: {0}")]
    Lifecycle(#[from] LifecycleViolation),

    #[error("Failed to persist {roll}: {source}")]
    Store {
        roll: Identifier,
        #[source]
        source: StoreError,
    },

    #[error("Schema setup failed: {0}")]
    Schema(#[source] StoreError),

    #[error("Harvest task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Fetch permits closed")]
    PermitsClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Common(#[from] roster_common::RosterError),
}

impl HarvestError {
    /// Whether this error stops the whole harvest
    ///
    /// Fatal errors mean the in-memory lifecycle state can no longer be
    /// trusted; the run has to be restarted from scratch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarvestError::Lifecycle(_)
                | HarvestError::Store { .. }
                | HarvestError::Schema(_)
                | HarvestError::Task(_)
                | HarvestError::PermitsClosed
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        HarvestError::Config(message.into())
    }
}
