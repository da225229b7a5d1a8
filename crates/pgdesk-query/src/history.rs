//! Executed statement history

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use uuid::Uuid;

/// One executed statement and how it ended
#[derive(Clone, Debug, PartialEq)]
pub struct QueryHistoryEntry {
    pub id: Uuid,

    pub sql: String,

    /// Connection the statement ran against
    pub connection_id: Option<Uuid>,

    /// Database the statement ran against
    pub database_name: Option<String>,

    pub executed_at: DateTime<Utc>,

    pub duration_ms: u64,

    /// Rows returned or affected
    pub row_count: Option<u64>,

    /// Error message if the statement failed
    pub error: Option<String>,

    /// The result arrived after the context moved on and was discarded
    pub superseded: bool,
}

impl QueryHistoryEntry {
    fn base(sql: impl Into<String>, connection_id: Option<Uuid>, database_name: Option<String>, duration_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            sql: sql.into(),
            connection_id,
            database_name,
            executed_at: Utc::now(),
            duration_ms,
            row_count: None,
            error: None,
            superseded: false,
        }
    }

    pub fn succeeded(
        sql: impl Into<String>,
        connection_id: Option<Uuid>,
        database_name: Option<String>,
        duration_ms: u64,
        row_count: u64,
    ) -> Self {
        Self {
            row_count: Some(row_count),
            ..Self::base(sql, connection_id, database_name, duration_ms)
        }
    }

    pub fn failed(
        sql: impl Into<String>,
        connection_id: Option<Uuid>,
        database_name: Option<String>,
        duration_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::base(sql, connection_id, database_name, duration_ms)
        }
    }

    /// Mark that the outcome never reached the grid
    pub fn superseded(mut self) -> Self {
        self.superseded = true;
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Bounded history, most recent first
#[derive(Debug)]
pub struct QueryHistory {
    entries: VecDeque<QueryHistoryEntry>,
    max_entries: usize,
}

impl QueryHistory {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn add(&mut self, entry: QueryHistoryEntry) {
        tracing::debug!(
            entry_id = %entry.id,
            success = entry.is_success(),
            superseded = entry.superseded,
            duration_ms = entry.duration_ms,
            "recording query in history"
        );
        self.entries.push_front(entry);
        self.entries.truncate(self.max_entries);
    }

    pub fn entries(&self) -> impl Iterator<Item = &QueryHistoryEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&QueryHistoryEntry> {
        self.entries.front()
    }

    pub fn for_connection(&self, connection_id: Uuid) -> impl Iterator<Item = &QueryHistoryEntry> {
        self.entries
            .iter()
            .filter(move |e| e.connection_id == Some(connection_id))
    }

    pub fn for_database<'a>(
        &'a self,
        connection_id: Uuid,
        database_name: &'a str,
    ) -> impl Iterator<Item = &'a QueryHistoryEntry> {
        self.for_connection(connection_id)
            .filter(move |e| e.database_name.as_deref() == Some(database_name))
    }

    /// Case-insensitive substring search over the SQL text
    pub fn search(&self, needle: &str) -> impl Iterator<Item = &QueryHistoryEntry> {
        let needle = needle.to_lowercase();
        self.entries
            .iter()
            .filter(move |e| e.sql.to_lowercase().contains(&needle))
    }

    pub fn clear(&mut self) {
        tracing::info!(entries_cleared = self.entries.len(), "clearing query history");
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for QueryHistory {
    fn default() -> Self {
        Self::new(500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_most_recent_within_capacity() {
        let mut history = QueryHistory::new(2);
        history.add(QueryHistoryEntry::succeeded("SELECT 1", None, None, 1, 1));
        history.add(QueryHistoryEntry::succeeded("SELECT 2", None, None, 1, 1));
        history.add(QueryHistoryEntry::failed("SELEC 3", None, None, 1, "syntax error"));

        let sql: Vec<_> = history.entries().map(|e| e.sql.as_str()).collect();
        assert_eq!(sql, vec!["SELEC 3", "SELECT 2"]);
        assert!(!history.latest().map(|e| e.is_success()).unwrap_or(true));
    }

    #[test]
    fn filters_by_connection_and_database() {
        let conn = Uuid::new_v4();
        let mut history = QueryHistory::default();
        history.add(QueryHistoryEntry::succeeded("SELECT a", Some(conn), Some("app".into()), 3, 0));
        history.add(QueryHistoryEntry::succeeded("SELECT b", Some(conn), Some("audit".into()), 3, 0));
        history.add(QueryHistoryEntry::succeeded("SELECT c", Some(Uuid::new_v4()), Some("app".into()), 3, 0).superseded());

        assert_eq!(history.for_connection(conn).count(), 2);
        let app: Vec<_> = history.for_database(conn, "app").map(|e| e.sql.clone()).collect();
        assert_eq!(app, vec!["SELECT a".to_string()]);
        assert_eq!(history.search("select B").count(), 1);
    }
}
