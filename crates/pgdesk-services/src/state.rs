//! Workspace state and change notifications
//!
//! `WorkspaceState` is the single source of truth for everything the UI
//! renders: the live selection, the result grid, loading and error text, and
//! the tabs. It is only ever mutated through [`crate::Workspace`], which holds
//! it behind a lock that is never held across a suspension point.

use pgdesk_core::{
    DatabaseInfo, QueryContextSnapshot, RowId, TableId, TableInfo, TableRow, TableSelection,
};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::metadata_cache::MetadataCache;
use crate::persistence::SavedQueryRecord;
use crate::results_cache::SavedQueryResultsCache;
use crate::tab_switch::TabSwitchPhase;
use crate::tabs::{Tab, TabId, TabRegistry};

/// Events emitted when workspace state changes
#[derive(Clone, Debug, PartialEq)]
pub enum WorkspaceEvent {
    // ===== Tabs =====
    TabOpened(TabId),
    TabClosed(TabId),
    ActiveTabChanged(Option<TabId>),
    TabSwitchPhaseChanged { tab_id: TabId, phase: TabSwitchPhase },

    // ===== Selection =====
    ConnectionChanged(Option<Uuid>),
    DatabaseChanged(Option<String>),
    DatabasesLoaded(usize),
    TablesLoaded(usize),
    TableSelected(Option<TableId>),

    // ===== Results =====
    LoadingChanged { tab_id: TabId, loading: bool },
    ResultsReplaced { version: u64, rows: usize },
    RowsRemoved(usize),
    RowsRestored(usize),
    RowUpdated { old: RowId, new: RowId },
    SelectionChanged(usize),

    // ===== Free-form queries =====
    QueryStarted { tab_id: TabId, query_id: u64 },
    QueryFinished { tab_id: TabId, query_id: u64, success: bool },
    QueryCancelled { tab_id: TabId },
    ElapsedTick { tab_id: TabId, elapsed: Duration },

    // ===== Status =====
    ErrorChanged(Option<String>),
    Notified(String),
    TabsSaved,
}

/// Short-lived status message, e.g. "3 rows affected"
#[derive(Clone, Debug)]
pub struct Notification {
    pub message: String,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl Notification {
    pub fn new(message: impl Into<String>, ttl: Duration) -> Self {
        Self {
            message: message.into(),
            created_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

/// Central workspace state container
#[derive(Debug, Default)]
pub struct WorkspaceState {
    // ===== Live selection =====
    pub(crate) connection_id: Option<Uuid>,
    pub(crate) database_name: Option<String>,
    pub(crate) selected_table: Option<TableSelection>,
    pub(crate) databases: Vec<DatabaseInfo>,
    pub(crate) tables: Vec<TableInfo>,
    pub(crate) is_connecting: bool,
    /// Connection and database the service is known to be open on, with schema loaded
    pub(crate) connected_to: Option<(Uuid, String)>,
    pub(crate) tab_switch_phase: Option<TabSwitchPhase>,

    // ===== Result grid =====
    pub(crate) rows: Vec<TableRow>,
    pub(crate) column_names: Vec<String>,
    pub(crate) results_shown: bool,
    pub(crate) selected_rows: HashSet<RowId>,
    pub(crate) results_version: u64,
    pub(crate) query_counter: u64,

    // ===== Status =====
    pub(crate) error_message: Option<String>,
    pub(crate) notification: Option<Notification>,

    // ===== Tabs and caches =====
    pub(crate) tabs: TabRegistry,
    pub(crate) active_tab_id: Option<TabId>,
    pub(crate) metadata: MetadataCache,
    pub(crate) saved_queries: Vec<SavedQueryRecord>,
    pub(crate) saved_query_results: SavedQueryResultsCache,
}

impl WorkspaceState {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Read accessors
    // =========================================================================

    pub fn connection_id(&self) -> Option<Uuid> {
        self.connection_id
    }

    pub fn database_name(&self) -> Option<&str> {
        self.database_name.as_deref()
    }

    pub fn selected_table(&self) -> Option<&TableSelection> {
        self.selected_table.as_ref()
    }

    pub fn selected_table_id(&self) -> Option<TableId> {
        self.selected_table.as_ref().map(TableSelection::id)
    }

    pub fn databases(&self) -> &[DatabaseInfo] {
        &self.databases
    }

    pub fn tables(&self) -> &[TableInfo] {
        &self.tables
    }

    pub fn is_connecting(&self) -> bool {
        self.is_connecting
    }

    pub fn connected_to(&self) -> Option<(Uuid, &str)> {
        self.connected_to.as_ref().map(|(id, db)| (*id, db.as_str()))
    }

    pub fn tab_switch_phase(&self) -> Option<TabSwitchPhase> {
        self.tab_switch_phase
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn results_shown(&self) -> bool {
        self.results_shown
    }

    pub fn selected_rows(&self) -> &HashSet<RowId> {
        &self.selected_rows
    }

    pub fn results_version(&self) -> u64 {
        self.results_version
    }

    pub fn query_counter(&self) -> u64 {
        self.query_counter
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Current notification, if it has not expired
    pub fn notification(&self) -> Option<&str> {
        self.notification
            .as_ref()
            .filter(|n| !n.is_expired())
            .map(|n| n.message.as_str())
    }

    pub fn tabs(&self) -> &TabRegistry {
        &self.tabs
    }

    pub fn active_tab_id(&self) -> Option<TabId> {
        self.active_tab_id
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.active_tab_id.and_then(|id| self.tabs.by_id(id))
    }

    /// Whether the active tab is waiting on a fetch or query
    pub fn is_loading(&self) -> bool {
        self.active_tab().is_some_and(|t| t.is_executing_query)
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    pub fn saved_queries(&self) -> &[SavedQueryRecord] {
        &self.saved_queries
    }

    pub fn saved_query_results(&self) -> &SavedQueryResultsCache {
        &self.saved_query_results
    }

    /// Snapshot of the live selection
    pub fn live_context(&self) -> QueryContextSnapshot {
        QueryContextSnapshot::capture(
            self.connection_id,
            self.database_name.as_deref(),
            self.selected_table_id().as_ref(),
        )
    }

    pub fn row_index(&self, row_id: RowId) -> Option<usize> {
        self.rows.iter().position(|r| r.id == row_id)
    }

    // =========================================================================
    // Mutations (crate-internal, always paired with events)
    // =========================================================================

    pub(crate) fn active_tab_mut(&mut self) -> Option<&mut Tab> {
        let id = self.active_tab_id?;
        self.tabs.by_id_mut(id)
    }

    /// Replace the grid wholesale. Bumps the results version.
    pub(crate) fn replace_results(
        &mut self,
        column_names: Vec<String>,
        rows: Vec<TableRow>,
        events: &mut Vec<WorkspaceEvent>,
    ) -> u64 {
        self.results_version += 1;
        self.column_names = column_names;
        self.rows = rows;
        self.results_shown = true;
        if !self.selected_rows.is_empty() {
            self.selected_rows.clear();
            events.push(WorkspaceEvent::SelectionChanged(0));
        }
        events.push(WorkspaceEvent::ResultsReplaced {
            version: self.results_version,
            rows: self.rows.len(),
        });
        self.results_version
    }

    pub(crate) fn clear_results(&mut self, events: &mut Vec<WorkspaceEvent>) {
        self.replace_results(Vec::new(), Vec::new(), events);
        self.results_shown = false;
    }

    pub(crate) fn set_error(&mut self, message: Option<String>, events: &mut Vec<WorkspaceEvent>) {
        if self.error_message != message {
            self.error_message = message.clone();
            events.push(WorkspaceEvent::ErrorChanged(message));
        }
    }

    pub(crate) fn notify(&mut self, message: String, ttl: Duration, events: &mut Vec<WorkspaceEvent>) {
        events.push(WorkspaceEvent::Notified(message.clone()));
        self.notification = Some(Notification::new(message, ttl));
    }

    pub(crate) fn set_tab_loading(&mut self, tab_id: TabId, loading: bool, events: &mut Vec<WorkspaceEvent>) {
        if let Some(tab) = self.tabs.by_id_mut(tab_id)
            && tab.is_executing_query != loading
        {
            tab.is_executing_query = loading;
            events.push(WorkspaceEvent::LoadingChanged { tab_id, loading });
        }
    }

    pub(crate) fn set_phase(&mut self, tab_id: TabId, phase: TabSwitchPhase, events: &mut Vec<WorkspaceEvent>) {
        self.tab_switch_phase = Some(phase);
        events.push(WorkspaceEvent::TabSwitchPhaseChanged { tab_id, phase });
    }

    /// Change the live table selection, mirroring it into the active tab
    pub(crate) fn set_selected_table(&mut self, table: Option<TableSelection>, events: &mut Vec<WorkspaceEvent>) {
        let id = table.as_ref().map(TableSelection::id);
        if let Some(tab) = self.active_tab_mut() {
            tab.selected_table = table.clone();
        }
        if self.selected_table_id() != id {
            self.selected_rows.clear();
            events.push(WorkspaceEvent::TableSelected(id));
        }
        self.selected_table = table;
    }

    /// Change the live connection and database, mirroring into the active tab.
    ///
    /// A different connection clears the database list; any change clears the
    /// table list and table selection.
    pub(crate) fn set_connection(
        &mut self,
        connection_id: Option<Uuid>,
        database_name: Option<String>,
        events: &mut Vec<WorkspaceEvent>,
    ) {
        if let Some(tab) = self.active_tab_mut() {
            tab.connection_id = connection_id;
            tab.database_name = database_name.clone();
        }
        let connection_changed = self.connection_id != connection_id;
        let database_changed = self.database_name != database_name;
        if connection_changed {
            self.connection_id = connection_id;
            self.databases.clear();
            events.push(WorkspaceEvent::ConnectionChanged(connection_id));
        }
        if connection_changed || database_changed {
            self.database_name = database_name.clone();
            self.tables.clear();
            self.selected_table = None;
            self.selected_rows.clear();
            events.push(WorkspaceEvent::DatabaseChanged(database_name));
        }
    }

    /// Row selection, restricted to rows currently displayed
    pub(crate) fn set_selected_rows(&mut self, ids: impl IntoIterator<Item = RowId>, events: &mut Vec<WorkspaceEvent>) {
        let displayed: HashSet<RowId> = self.rows.iter().map(|r| r.id).collect();
        self.selected_rows = ids.into_iter().filter(|id| displayed.contains(id)).collect();
        events.push(WorkspaceEvent::SelectionChanged(self.selected_rows.len()));
    }

    /// Copy the grid into the active tab's cache when that cache tracks the live table
    pub(crate) fn sync_active_cache(&mut self) {
        let live_table = self.selected_table_id();
        let rows = self.rows.clone();
        let columns = self.column_names.clone();
        if let Some(tab) = self.active_tab_mut()
            && tab.cached_results_table_id.is_some()
            && tab.cached_results_table_id == live_table
        {
            tab.store_results(columns, rows, live_table);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_results_bumps_version_and_clears_selection() {
        let mut state = WorkspaceState::new();
        let mut events = Vec::new();
        let row = TableRow::from_pairs([("id", pgdesk_core::Value::Int64(1))]);
        state.replace_results(vec!["id".into()], vec![row.clone()], &mut events);
        state.set_selected_rows([row.id, RowId::new()], &mut events);
        assert_eq!(state.selected_rows().len(), 1);

        let version = state.replace_results(vec![], vec![], &mut events);

        assert_eq!(version, 2);
        assert!(state.selected_rows().is_empty());
        assert!(events.contains(&WorkspaceEvent::ResultsReplaced { version: 2, rows: 0 }));
    }

    #[test]
    fn connection_change_resets_dependent_selection() {
        let mut state = WorkspaceState::new();
        let mut events = Vec::new();
        let conn = Uuid::new_v4();
        state.set_connection(Some(conn), Some("prod".into()), &mut events);
        state.tables = vec![TableInfo::new("public", "users")];
        state.databases = vec![DatabaseInfo::new("prod")];
        state.set_selected_table(Some(TableSelection::new("public", "users")), &mut events);

        state.set_connection(Some(conn), Some("staging".into()), &mut events);
        assert!(state.selected_table().is_none());
        assert!(state.tables().is_empty());
        assert_eq!(state.databases().len(), 1);

        state.set_connection(Some(Uuid::new_v4()), Some("staging".into()), &mut events);
        assert!(state.databases().is_empty());
    }

    #[test]
    fn live_context_reflects_selection() {
        let mut state = WorkspaceState::new();
        let mut events = Vec::new();
        let conn = Uuid::new_v4();
        state.set_connection(Some(conn), Some("prod".into()), &mut events);
        state.set_selected_table(Some(TableSelection::new("public", "users")), &mut events);

        let live = state.live_context();
        assert_eq!(live.connection_id, Some(conn));
        assert_eq!(live.database_name.as_deref(), Some("prod"));
        assert_eq!(live.table_id, Some(TableId::new("public", "users")));
    }

    #[test]
    fn expired_notifications_are_hidden() {
        let mut state = WorkspaceState::new();
        let mut events = Vec::new();
        state.notify("3 rows affected".into(), Duration::ZERO, &mut events);
        assert!(state.notification().is_none());

        state.notify("1 row affected".into(), Duration::from_secs(60), &mut events);
        assert_eq!(state.notification(), Some("1 row affected"));
    }
}
