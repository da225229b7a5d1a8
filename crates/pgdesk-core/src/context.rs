//! Query context snapshots
//!
//! A snapshot is captured immediately before an asynchronous fetch starts and
//! compared against the live selection when the fetch returns. Equality is the
//! only admission test for committing the result.

use uuid::Uuid;

use crate::TableId;

/// Immutable `(connection, database, table)` triple captured at operation start
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryContextSnapshot {
    pub connection_id: Option<Uuid>,
    pub database_name: Option<String>,
    pub table_id: Option<TableId>,
}

impl QueryContextSnapshot {
    pub fn capture(
        connection_id: Option<Uuid>,
        database_name: Option<&str>,
        table_id: Option<&TableId>,
    ) -> Self {
        Self {
            connection_id,
            database_name: database_name.map(str::to_string),
            table_id: table_id.cloned(),
        }
    }

    /// Compare against another snapshot of the live selection
    pub fn is_valid_against(&self, live: &QueryContextSnapshot) -> bool {
        is_context_valid(
            self,
            live.connection_id,
            live.database_name.as_deref(),
            live.table_id.as_ref(),
        )
    }
}

/// Field-wise equality between a captured snapshot and the live selection.
///
/// `None` matches `None`: no connection selected at start still matches no
/// connection selected at completion.
pub fn is_context_valid(
    snapshot: &QueryContextSnapshot,
    live_connection_id: Option<Uuid>,
    live_database_name: Option<&str>,
    live_table_id: Option<&TableId>,
) -> bool {
    snapshot.connection_id == live_connection_id
        && snapshot.database_name.as_deref() == live_database_name
        && snapshot.table_id.as_ref() == live_table_id
}
