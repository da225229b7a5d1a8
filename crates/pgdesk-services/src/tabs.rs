//! Tabs and the registry that owns them

use pgdesk_core::{QueryCancelHandle, TableId, TableRow, TableSelection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::ElapsedTicker;
use crate::results_cache::should_use_cached_results;

/// Handle to a tab.
///
/// Holders must check [`TabRegistry::is_valid`] after every suspension point;
/// the tab may have been closed in the meantime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabId(pub Uuid);

impl TabId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tab({})", self.0)
    }
}

/// One workspace tab: its selection, editor text, and session-only result cache
pub struct Tab {
    pub id: TabId,
    pub connection_id: Option<Uuid>,
    pub database_name: Option<String>,
    pub selected_table: Option<TableSelection>,
    pub schema_filter: Option<String>,
    pub query_text: String,
    pub saved_query_id: Option<Uuid>,

    // Memory-only, never persisted
    pub cached_results: Option<Vec<TableRow>>,
    pub cached_column_names: Option<Vec<String>>,
    pub cached_results_table_id: Option<TableId>,

    pub is_pending_deletion: bool,
    pub is_executing_query: bool,
    pub query_start_time: Option<Instant>,

    /// Counter value of the free-form query this tab is waiting on
    pub(crate) running_query_id: Option<u64>,
    cancel_handle: Option<Arc<dyn QueryCancelHandle>>,
    ticker: Option<ElapsedTicker>,
}

impl Tab {
    pub fn new() -> Self {
        Self::with_id(TabId::new())
    }

    pub fn with_id(id: TabId) -> Self {
        Self {
            id,
            connection_id: None,
            database_name: None,
            selected_table: None,
            schema_filter: None,
            query_text: String::new(),
            saved_query_id: None,
            cached_results: None,
            cached_column_names: None,
            cached_results_table_id: None,
            is_pending_deletion: false,
            is_executing_query: false,
            query_start_time: None,
            running_query_id: None,
            cancel_handle: None,
            ticker: None,
        }
    }

    pub fn selected_table_id(&self) -> Option<TableId> {
        self.selected_table.as_ref().map(TableSelection::id)
    }

    pub fn has_cached_results(&self) -> bool {
        self.cached_results.is_some()
    }

    /// Cached rows belong to the selected table and can be shown as-is
    pub fn can_reuse_cached_results(&self) -> bool {
        should_use_cached_results(
            self.has_cached_results(),
            self.cached_results_table_id.as_ref(),
            self.selected_table_id().as_ref(),
        )
    }

    /// Remember displayed results. `table_id` is `None` for free-form query output.
    pub fn store_results(&mut self, column_names: Vec<String>, rows: Vec<TableRow>, table_id: Option<TableId>) {
        self.cached_results = Some(rows);
        self.cached_column_names = Some(column_names);
        self.cached_results_table_id = table_id;
    }

    pub fn clear_cached_results(&mut self) {
        self.cached_results = None;
        self.cached_column_names = None;
        self.cached_results_table_id = None;
    }

    /// Time since the running query started
    pub fn elapsed(&self) -> Option<Duration> {
        self.query_start_time.map(|started| started.elapsed())
    }

    pub fn has_ticker(&self) -> bool {
        self.ticker.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub(crate) fn begin_query(
        &mut self,
        query_id: u64,
        started_at: Instant,
        cancel_handle: Option<Arc<dyn QueryCancelHandle>>,
        ticker: Option<ElapsedTicker>,
    ) {
        self.is_executing_query = true;
        self.running_query_id = Some(query_id);
        self.query_start_time = Some(started_at);
        self.cancel_handle = cancel_handle;
        self.ticker = ticker;
    }

    /// Tear down everything a running query holds
    pub(crate) fn finish_query(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.stop();
        }
        self.cancel_handle = None;
        self.running_query_id = None;
        self.query_start_time = None;
        self.is_executing_query = false;
    }

    /// Interrupt the running statement, if the service supports it, and tear down
    pub(crate) fn cancel_query(&mut self) -> bool {
        let was_running = self.running_query_id.is_some();
        if let Some(handle) = self.cancel_handle.take() {
            handle.cancel();
        }
        self.finish_query();
        was_running
    }
}

impl Default for Tab {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Tab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tab")
            .field("id", &self.id)
            .field("connection_id", &self.connection_id)
            .field("database_name", &self.database_name)
            .field("selected_table", &self.selected_table_id())
            .field("saved_query_id", &self.saved_query_id)
            .field("cached_rows", &self.cached_results.as_ref().map(Vec::len))
            .field("is_pending_deletion", &self.is_pending_deletion)
            .field("is_executing_query", &self.is_executing_query)
            .finish_non_exhaustive()
    }
}

/// Owns all tabs, in display order
#[derive(Debug, Default)]
pub struct TabRegistry {
    tabs: Vec<Tab>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tab, inheriting connection and database from `inheriting_from`
    pub fn create(&mut self, inheriting_from: Option<TabId>) -> TabId {
        let mut tab = Tab::new();
        if let Some(source) = inheriting_from.and_then(|id| self.by_id(id)) {
            tab.connection_id = source.connection_id;
            tab.database_name = source.database_name.clone();
            tab.schema_filter = source.schema_filter.clone();
        }
        let id = tab.id;
        tracing::debug!(tab_id = %id, inherited = inheriting_from.is_some(), "tab created");
        self.tabs.push(tab);
        id
    }

    /// Add a tab rebuilt from durable storage
    pub fn insert(&mut self, tab: Tab) -> TabId {
        let id = tab.id;
        self.tabs.push(tab);
        id
    }

    /// Mark a tab pending deletion and release its resources.
    ///
    /// The tab stays in the registry until [`TabRegistry::finish_close`], but
    /// is no longer valid. Returns `false` if the tab is unknown.
    pub fn close(&mut self, tab_id: TabId) -> bool {
        match self.by_id_mut(tab_id) {
            Some(tab) => {
                tab.is_pending_deletion = true;
                tab.cancel_query();
                tracing::debug!(%tab_id, "tab marked pending deletion");
                true
            }
            None => false,
        }
    }

    /// Remove a tab previously passed to [`TabRegistry::close`]
    pub fn finish_close(&mut self, tab_id: TabId) -> Option<Tab> {
        let index = self.tabs.iter().position(|t| t.id == tab_id)?;
        Some(self.tabs.remove(index))
    }

    /// The tab exists and is not being closed
    pub fn is_valid(&self, tab_id: TabId) -> bool {
        self.by_id(tab_id).is_some_and(|t| !t.is_pending_deletion)
    }

    pub fn by_id(&self, tab_id: TabId) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.id == tab_id)
    }

    pub fn by_id_mut(&mut self, tab_id: TabId) -> Option<&mut Tab> {
        self.tabs.iter_mut().find(|t| t.id == tab_id)
    }

    /// The valid tab to activate when `tab_id` goes away: the next one, else the previous one
    pub fn neighbor_of(&self, tab_id: TabId) -> Option<TabId> {
        let index = self.tabs.iter().position(|t| t.id == tab_id)?;
        let valid = |t: &&Tab| !t.is_pending_deletion && t.id != tab_id;
        self.tabs[index + 1..]
            .iter()
            .find(valid)
            .or_else(|| self.tabs[..index].iter().rev().find(valid))
            .map(|t| t.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tab> {
        self.tabs.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Tab> {
        self.tabs.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }
}
