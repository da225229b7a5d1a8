use pgdesk_core::{PgDeskError, TableId};
use thiserror::Error;
use uuid::Uuid;

use crate::TabId;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service-level errors with user-facing messages
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(Uuid),

    #[error("Schema loading failed: {0}")]
    SchemaLoadFailed(String),

    #[error("Table load failed: {0}")]
    TableLoadFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Update failed: {0}")]
    UpdateFailed(String),

    #[error("Table {0} has no primary key")]
    NoPrimaryKey(TableId),

    #[error("Not connected")]
    NotConnected,

    #[error("No table selected")]
    NoTableSelected,

    #[error("No active tab")]
    NoActiveTab,

    #[error("Tab not found: {0}")]
    TabNotFound(TabId),

    #[error("Row not found in the current results")]
    RowNotFound,

    #[error("Saved query not found: {0}")]
    SavedQueryNotFound(Uuid),

    #[error("Saving workspace failed: {0}")]
    PersistenceFailed(String),
}

impl ServiceError {
    /// Wrap a collaborator error, keeping the driver message verbatim
    pub(crate) fn from_core(kind: fn(String) -> ServiceError, err: PgDeskError) -> Self {
        kind(err.to_string())
    }
}

/// Result of an operation that may have been superseded while it was suspended.
///
/// `Stale` is not an error: the operation's premise no longer matched live
/// state, so nothing was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Outcome {
    Applied,
    Stale,
}

impl Outcome {
    pub fn is_applied(self) -> bool {
        matches!(self, Outcome::Applied)
    }

    pub fn is_stale(self) -> bool {
        matches!(self, Outcome::Stale)
    }
}

/// Shorten a message for the status bar, appending an ellipsis when cut
pub fn truncate_for_status(message: &str, max_chars: usize) -> String {
    let message = message.trim();
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let mut truncated: String = message.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}
