//! Error types for PgDesk

use thiserror::Error;

/// Core error type reported by external collaborators
#[derive(Error, Debug)]
pub enum PgDeskError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    /// The attempt was superseded by a newer one (e.g. a newer connect).
    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl PgDeskError {
    /// Whether this error signals internal supersession rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PgDeskError::Cancelled)
    }
}

/// Result type alias for PgDesk operations
pub type Result<T> = std::result::Result<T, PgDeskError>;
