//! The workspace root
//!
//! `Workspace` owns all mutable state and every collaborator. Operations take
//! `&self`, lock the state only for synchronous sections, and re-check their
//! premise after each suspension point before writing anything back.

use chrono::Utc;
use parking_lot::Mutex;
use pgdesk_connection::ConnectionManager;
use pgdesk_core::{
    ColumnInfo, DatabaseService, QueryContextSnapshot, RowId, TableId, TableSelection,
};
use pgdesk_query::{KeywordAnalyzer, QueryHistory, StatementAnalyzer};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::WorkspaceConfig;
use crate::error::{Outcome, ServiceError, ServiceResult, truncate_for_status};
use crate::generation::{Generation, GenerationCounter};
use crate::metadata_cache::{resolve_column_info, resolve_primary_keys};
use crate::persistence::{PersistedWorkspace, SavedQueryRecord, TabRecord, TabStore, save_with_retry};
use crate::state::{WorkspaceEvent, WorkspaceState};
use crate::tabs::TabId;

const EVENT_CAPACITY: usize = 256;

pub struct Workspace {
    pub(crate) service: Arc<dyn DatabaseService>,
    pub(crate) connections: Arc<ConnectionManager>,
    pub(crate) store: Arc<dyn TabStore>,
    pub(crate) analyzer: Arc<dyn StatementAnalyzer>,
    pub(crate) config: WorkspaceConfig,
    pub(crate) generation: GenerationCounter,
    pub(crate) history: Mutex<QueryHistory>,
    state: Mutex<WorkspaceState>,
    events: broadcast::Sender<WorkspaceEvent>,
}

impl Workspace {
    pub fn new(
        service: Arc<dyn DatabaseService>,
        connections: Arc<ConnectionManager>,
        store: Arc<dyn TabStore>,
        config: WorkspaceConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            service,
            connections,
            store,
            analyzer: Arc::new(KeywordAnalyzer::new()),
            history: Mutex::new(QueryHistory::new(config.history_size)),
            config,
            generation: GenerationCounter::new(),
            state: Mutex::new(WorkspaceState::new()),
            events,
        }
    }

    /// Replace the statement classifier used by the query executor
    pub fn with_analyzer(mut self, analyzer: Arc<dyn StatementAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    // =========================================================================
    // State access
    // =========================================================================

    /// Read the state. The lock is held only for the duration of `f`.
    pub fn read<R>(&self, f: impl FnOnce(&WorkspaceState) -> R) -> R {
        f(&self.state.lock())
    }

    /// Mutate the state and publish the events `f` produced once the lock is released
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut WorkspaceState, &mut Vec<WorkspaceEvent>) -> R) -> R {
        let mut events = Vec::new();
        let result = {
            let mut state = self.state.lock();
            f(&mut state, &mut events)
        };
        for event in events {
            // no subscribers is fine
            let _ = self.events.send(event);
        }
        result
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkspaceEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<WorkspaceEvent> {
        self.events.clone()
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn current_generation(&self) -> Generation {
        self.generation.current()
    }

    pub fn history<R>(&self, f: impl FnOnce(&QueryHistory) -> R) -> R {
        f(&self.history.lock())
    }

    /// Snapshot of the live `(connection, database, table)` selection
    pub fn capture_context(&self) -> QueryContextSnapshot {
        self.read(WorkspaceState::live_context)
    }

    pub(crate) fn status_text(&self, err: &ServiceError) -> String {
        truncate_for_status(&err.to_string(), self.config.status_message_max_chars)
    }

    pub(crate) fn report_error(&self, err: &ServiceError) {
        tracing::warn!(error = %err, "operation failed");
        let text = self.status_text(err);
        self.update(|state, events| state.set_error(Some(text), events));
    }

    pub fn dismiss_error(&self) {
        self.update(|state, events| state.set_error(None, events));
    }

    // =========================================================================
    // Tabs
    // =========================================================================

    /// Open a tab inheriting connection and database from the active tab.
    ///
    /// The first tab becomes active immediately; later tabs are activated with
    /// [`Workspace::handle_tab_change`].
    pub fn new_tab(&self) -> TabId {
        self.update(|state, events| {
            let id = state.tabs.create(state.active_tab_id);
            events.push(WorkspaceEvent::TabOpened(id));
            if state.active_tab_id.is_none() {
                state.active_tab_id = Some(id);
                events.push(WorkspaceEvent::ActiveTabChanged(Some(id)));
            }
            id
        })
    }

    /// Close a tab. In-flight work owned by the tab self-rejects when it completes.
    ///
    /// Closing the active tab activates its neighbor.
    #[tracing::instrument(skip(self), fields(%tab_id))]
    pub async fn close_tab(&self, tab_id: TabId) -> ServiceResult<Outcome> {
        let (was_active, next) = self.update(|state, _| {
            if !state.tabs.close(tab_id) {
                return Err(ServiceError::TabNotFound(tab_id));
            }
            Ok((state.active_tab_id == Some(tab_id), state.tabs.neighbor_of(tab_id)))
        })?;

        // let suspended operations observe the pending flag before removal
        tokio::task::yield_now().await;

        self.update(|state, events| {
            state.tabs.finish_close(tab_id);
            events.push(WorkspaceEvent::TabClosed(tab_id));
            if was_active {
                state.active_tab_id = None;
                events.push(WorkspaceEvent::ActiveTabChanged(None));
                if next.is_none() {
                    state.set_connection(None, None, events);
                    state.clear_results(events);
                }
            }
        });
        tracing::debug!("tab closed");

        match (was_active, next) {
            (true, Some(next)) => self.handle_tab_change(next).await,
            _ => Ok(Outcome::Applied),
        }
    }

    pub fn set_query_text(&self, tab_id: TabId, text: impl Into<String>) -> ServiceResult<()> {
        self.update(|state, _| {
            let tab = state
                .tabs
                .by_id_mut(tab_id)
                .ok_or(ServiceError::TabNotFound(tab_id))?;
            tab.query_text = text.into();
            Ok(())
        })
    }

    pub fn set_schema_filter(&self, tab_id: TabId, filter: Option<String>) -> ServiceResult<()> {
        self.update(|state, _| {
            let tab = state
                .tabs
                .by_id_mut(tab_id)
                .ok_or(ServiceError::TabNotFound(tab_id))?;
            tab.schema_filter = filter;
            Ok(())
        })
    }

    // =========================================================================
    // Selection
    // =========================================================================

    /// Point the active tab at a saved connection and open it.
    ///
    /// `database` defaults to the profile's database.
    #[tracing::instrument(skip(self), fields(%connection_id))]
    pub async fn connect(&self, connection_id: Uuid, database: Option<String>) -> ServiceResult<Outcome> {
        let Some(profile) = self.connections.get_saved(connection_id) else {
            let err = ServiceError::ConnectionNotFound(connection_id);
            self.report_error(&err);
            return Err(err);
        };
        let database = database.unwrap_or(profile.database);

        let tab_id = self.update(|state, events| {
            let tab_id = match state.active_tab_id {
                Some(id) => id,
                None => {
                    let id = state.tabs.create(None);
                    events.push(WorkspaceEvent::TabOpened(id));
                    id
                }
            };
            if let Some(tab) = state.tabs.by_id_mut(tab_id) {
                tab.connection_id = Some(connection_id);
                tab.database_name = Some(database);
                tab.selected_table = None;
                tab.clear_cached_results();
            }
            tab_id
        });

        self.handle_tab_change(tab_id).await
    }

    /// Switch the active tab to another database on the same connection
    pub async fn select_database(&self, database: impl Into<String>) -> ServiceResult<Outcome> {
        let database = database.into();
        let tab_id = self.update(|state, _| {
            let tab = state.active_tab_mut().ok_or(ServiceError::NoActiveTab)?;
            if tab.connection_id.is_none() {
                return Err(ServiceError::NotConnected);
            }
            tab.database_name = Some(database);
            tab.selected_table = None;
            tab.clear_cached_results();
            Ok(tab.id)
        })?;

        self.handle_tab_change(tab_id).await
    }

    /// Select a table in the sidebar and load its first page
    #[tracing::instrument(skip(self, table), fields(table = %table.id()))]
    pub async fn select_table(&self, table: TableSelection) -> ServiceResult<Outcome> {
        self.update(|state, events| {
            if state.active_tab_id.is_none() {
                return Err(ServiceError::NoActiveTab);
            }
            state.set_selected_table(Some(table.clone()), events);
            Ok(())
        })?;
        self.execute_table_query(&table).await
    }

    /// Clear the table selection and everything cached for it on the active tab
    pub fn deselect_table(&self) {
        self.update(|state, events| {
            let tab_id = state.active_tab_id;
            state.set_selected_table(None, events);
            if let Some(tab) = state.active_tab_mut() {
                tab.clear_cached_results();
            }
            if let Some(tab_id) = tab_id {
                state.set_tab_loading(tab_id, false, events);
            }
            state.clear_results(events);
        });
    }

    /// Forget a dropped table everywhere: metadata, tab caches, selections
    #[tracing::instrument(skip(self), fields(table = %table_id))]
    pub fn forget_table(&self, table_id: &TableId) {
        self.update(|state, events| {
            state.metadata.invalidate(table_id);
            state.tables.retain(|t| &t.id() != table_id);
            for tab in state.tabs.iter_mut() {
                if tab.cached_results_table_id.as_ref() == Some(table_id) {
                    tab.clear_cached_results();
                }
                if tab.selected_table_id().as_ref() == Some(table_id) {
                    tab.selected_table = None;
                }
            }
            events.push(WorkspaceEvent::TablesLoaded(state.tables.len()));
            if state.selected_table_id().as_ref() == Some(table_id) {
                state.set_selected_table(None, events);
                state.clear_results(events);
            }
        });
    }

    /// Drop cached primary keys and columns so the next lookup fetches them
    pub fn invalidate_metadata(&self, table_id: &TableId) -> bool {
        self.update(|state, _| state.metadata.invalidate(table_id))
    }

    /// Replace the row selection. Ids not currently displayed are ignored.
    pub fn select_rows(&self, row_ids: impl IntoIterator<Item = RowId>) {
        self.update(|state, events| state.set_selected_rows(row_ids, events));
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Primary-key columns of `table`, fetched once and then cached.
    ///
    /// Fails with [`ServiceError::NoPrimaryKey`] when the table has none.
    pub async fn primary_key_columns(&self, table: &TableSelection) -> ServiceResult<Vec<String>> {
        let known = self.read(|state| resolve_primary_keys(&state.metadata, table).into_known());
        let keys = match known {
            Some(keys) => keys,
            None => {
                tracing::debug!(table = %table.id(), "fetching primary key columns");
                let keys = self
                    .service
                    .fetch_primary_key_columns(&table.schema, &table.name)
                    .await
                    .map_err(|e| ServiceError::from_core(ServiceError::SchemaLoadFailed, e))?;
                self.update(|state, _| state.metadata.store_primary_keys(&table.id(), keys.clone()));
                keys
            }
        };
        if keys.is_empty() {
            return Err(ServiceError::NoPrimaryKey(table.id()));
        }
        Ok(keys)
    }

    /// Column info of `table`, fetched once and then cached
    pub async fn column_info(&self, table: &TableSelection) -> ServiceResult<Vec<ColumnInfo>> {
        if let Some(columns) = self.read(|state| resolve_column_info(&state.metadata, table).into_known()) {
            return Ok(columns);
        }
        let columns = self
            .service
            .fetch_column_info(&table.schema, &table.name)
            .await
            .map_err(|e| ServiceError::from_core(ServiceError::SchemaLoadFailed, e))?;
        self.update(|state, _| state.metadata.store_columns(&table.id(), columns.clone()));
        Ok(columns)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write tab and saved-query records, never result rows.
    ///
    /// Retries with backoff, then surfaces the failure in the status bar.
    #[tracing::instrument(skip(self))]
    pub async fn save_tabs(&self) -> ServiceResult<()> {
        let snapshot = self.read(|state| PersistedWorkspace {
            tabs: state
                .tabs
                .iter()
                .filter(|t| !t.is_pending_deletion)
                .map(TabRecord::from_tab)
                .collect(),
            saved_queries: state.saved_queries.clone(),
            active_tab_id: state.active_tab_id.map(|id| id.0),
        });

        let backoff = self.config.persistence_backoff();
        match save_with_retry(self.store.as_ref(), &snapshot, self.config.persistence_attempts, &backoff).await {
            Ok(()) => {
                self.update(|_, events| events.push(WorkspaceEvent::TabsSaved));
                Ok(())
            }
            Err(e) => {
                let err = ServiceError::from_core(ServiceError::PersistenceFailed, e);
                self.report_error(&err);
                Err(err)
            }
        }
    }

    /// Rebuild tabs from storage with empty result caches.
    ///
    /// Returns the tab to activate; call [`Workspace::handle_tab_change`] with it.
    #[tracing::instrument(skip(self))]
    pub async fn restore_tabs(&self) -> ServiceResult<Option<TabId>> {
        let persisted = match self.store.load().await {
            Ok(persisted) => persisted,
            Err(e) => {
                let err = ServiceError::from_core(ServiceError::PersistenceFailed, e);
                self.report_error(&err);
                return Err(err);
            }
        };

        let restored = self.update(|state, events| {
            let mut ids = Vec::with_capacity(persisted.tabs.len());
            for record in persisted.tabs {
                let id = state.tabs.insert(record.into_tab());
                events.push(WorkspaceEvent::TabOpened(id));
                ids.push(id);
            }
            state.saved_queries = persisted.saved_queries;
            persisted
                .active_tab_id
                .map(TabId)
                .filter(|id| ids.contains(id))
                .or_else(|| ids.first().copied())
        });
        tracing::info!(active = ?restored, "tabs restored");
        Ok(restored)
    }

    /// Save the tab's text as a saved query, updating the one it came from if any
    pub fn save_query(&self, tab_id: TabId, name: impl Into<String>) -> ServiceResult<Uuid> {
        let name = name.into();
        self.update(|state, _| {
            let tab = state.tabs.by_id(tab_id).ok_or(ServiceError::TabNotFound(tab_id))?;
            let sql = tab.query_text.clone();
            let connection_id = tab.connection_id;
            let database_name = tab.database_name.clone();
            let existing = tab.saved_query_id;

            let id = match existing.and_then(|id| state.saved_queries.iter_mut().find(|q| q.id == id)) {
                Some(record) => {
                    record.name = name;
                    record.sql = sql;
                    record.updated_at = Utc::now();
                    record.id
                }
                None => {
                    let mut record = SavedQueryRecord::new(name, sql);
                    record.connection_id = connection_id;
                    record.database_name = database_name;
                    let id = record.id;
                    state.saved_queries.push(record);
                    id
                }
            };
            if let Some(tab) = state.tabs.by_id_mut(tab_id) {
                tab.saved_query_id = Some(id);
            }
            Ok(id)
        })
    }

    /// Load a saved query into a tab.
    ///
    /// Its last results are restored verbatim when known; returns whether they were.
    pub fn select_saved_query(&self, tab_id: TabId, saved_query_id: Uuid) -> ServiceResult<bool> {
        self.update(|state, events| {
            let record = state
                .saved_queries
                .iter()
                .find(|q| q.id == saved_query_id)
                .cloned()
                .ok_or(ServiceError::SavedQueryNotFound(saved_query_id))?;
            let cached = state.saved_query_results.get(saved_query_id).cloned();
            let is_active = state.active_tab_id == Some(tab_id);

            {
                let tab = state
                    .tabs
                    .by_id_mut(tab_id)
                    .ok_or(ServiceError::TabNotFound(tab_id))?;
                tab.query_text = record.sql;
                tab.saved_query_id = Some(saved_query_id);
                if let Some(results) = &cached {
                    tab.store_results(results.column_names.clone(), results.rows.clone(), None);
                }
            }

            match cached {
                Some(results) => {
                    if is_active {
                        state.replace_results(results.column_names, results.rows, events);
                    }
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }
}
