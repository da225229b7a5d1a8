//! Result memoization
//!
//! Tabs keep the rows they last displayed (see [`crate::Tab`]); saved queries
//! keep theirs here, independent of any tab. Nothing in this module is ever
//! persisted.

use chrono::{DateTime, Utc};
use pgdesk_core::{TableId, TableRow};
use std::collections::HashMap;
use uuid::Uuid;

/// Whether a tab's cached rows can be shown for the selected table without
/// fetching again.
pub fn should_use_cached_results(
    has_results: bool,
    cached_table_id: Option<&TableId>,
    selected_table_id: Option<&TableId>,
) -> bool {
    has_results && cached_table_id.is_some() && cached_table_id == selected_table_id
}

/// Last result of a saved query
#[derive(Debug, Clone, PartialEq)]
pub struct SavedQueryResults {
    pub rows: Vec<TableRow>,
    pub column_names: Vec<String>,
    pub executed_at: DateTime<Utc>,
}

/// Results keyed by saved query id, restored verbatim on reselection
#[derive(Debug, Default)]
pub struct SavedQueryResultsCache {
    entries: HashMap<Uuid, SavedQueryResults>,
}

impl SavedQueryResultsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, saved_query_id: Uuid, column_names: Vec<String>, rows: Vec<TableRow>) {
        tracing::trace!(%saved_query_id, rows = rows.len(), "caching saved query results");
        self.entries.insert(
            saved_query_id,
            SavedQueryResults {
                rows,
                column_names,
                executed_at: Utc::now(),
            },
        );
    }

    pub fn get(&self, saved_query_id: Uuid) -> Option<&SavedQueryResults> {
        self.entries.get(&saved_query_id)
    }

    pub fn remove(&mut self, saved_query_id: Uuid) -> Option<SavedQueryResults> {
        self.entries.remove(&saved_query_id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
