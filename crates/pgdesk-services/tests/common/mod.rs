//! Common test utilities and mocks

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use pgdesk_connection::{ConnectionIdentity, ConnectionManager, MemoryKeychain};
use pgdesk_core::{
    ColumnInfo, ConnectionConfig, DatabaseInfo, DatabaseService, PgDeskError, QueryCancelHandle,
    QueryOutput, Result, RowId, TableId, TableInfo, TableRow, TableSelection, Value,
};
use pgdesk_services::{MemoryTabStore, TabStore, Workspace, WorkspaceConfig};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;

/// Scripted database service.
///
/// Every call is logged as `"<op>:<key>"`. A test can hold the next call for a
/// key with [`MockDatabaseService::hold_next`]; the call blocks until the
/// returned semaphore gets a permit, which lets a test force any interleaving
/// from a single task with `tokio::join!`. Data is read before the hold, so a
/// held call returns what the database held when the call was made.
#[derive(Default)]
pub struct MockDatabaseService {
    state: Mutex<MockState>,
    cancels: Arc<AtomicUsize>,
}

struct CountingCancelHandle(Arc<AtomicUsize>);

impl QueryCancelHandle for CountingCancelHandle {
    fn cancel(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MockState {
    connected: bool,
    databases: Vec<DatabaseInfo>,
    tables: HashMap<String, Vec<TableInfo>>,
    table_data: HashMap<String, (Vec<String>, Vec<TableRow>)>,
    primary_keys: HashMap<String, Vec<String>>,
    columns: HashMap<String, Vec<ColumnInfo>>,
    query_results: HashMap<String, QueryOutput>,
    holds: HashMap<String, VecDeque<Arc<Semaphore>>>,
    failures: HashMap<String, VecDeque<PgDeskError>>,
    call_log: Vec<String>,
}

impl MockDatabaseService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_databases(self, names: &[&str]) -> Self {
        self.state.lock().databases = names.iter().map(|n| DatabaseInfo::new(*n)).collect();
        self
    }

    /// Register a table in `database` with rows and primary key
    pub fn with_table(
        self,
        database: &str,
        table: &TableId,
        primary_keys: &[&str],
        columns: &[&str],
        rows: Vec<TableRow>,
    ) -> Self {
        {
            let mut state = self.state.lock();
            state
                .tables
                .entry(database.to_string())
                .or_default()
                .push(TableInfo::new(&table.schema, &table.name));
            state.primary_keys.insert(
                table.cache_key(),
                primary_keys.iter().map(|s| s.to_string()).collect(),
            );
            state.columns.insert(
                table.cache_key(),
                columns.iter().map(|c| ColumnInfo::new(*c, "text")).collect(),
            );
        }
        self.set_rows(table, columns, rows);
        self
    }

    /// Response for free-form SQL containing `pattern`
    pub fn with_query_result(self, pattern: &str, output: QueryOutput) -> Self {
        self.state
            .lock()
            .query_results
            .insert(pattern.to_string(), output);
        self
    }

    pub fn set_rows(&self, table: &TableId, columns: &[&str], rows: Vec<TableRow>) {
        self.state.lock().table_data.insert(
            table.cache_key(),
            (columns.iter().map(|c| c.to_string()).collect(), rows),
        );
    }

    /// Hold the next call to `"<op>:<key>"` until a permit is added
    pub fn hold_next(&self, call: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.state
            .lock()
            .holds
            .entry(call.to_string())
            .or_default()
            .push_back(gate.clone());
        gate
    }

    /// Fail the next call to `"<op>:<key>"` with `error`
    pub fn fail_next(&self, call: &str, error: PgDeskError) {
        self.state
            .lock()
            .failures
            .entry(call.to_string())
            .or_default()
            .push_back(error);
    }

    /// How many times a handed-out cancel handle fired
    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn call_log(&self) -> Vec<String> {
        self.state.lock().call_log.clone()
    }

    pub fn calls_to(&self, call: &str) -> usize {
        self.state
            .lock()
            .call_log
            .iter()
            .filter(|c| c.as_str() == call)
            .count()
    }

    async fn enter(&self, call: String) -> Result<()> {
        let (gate, failure) = {
            let mut state = self.state.lock();
            state.call_log.push(call.clone());
            let gate = state.holds.get_mut(&call).and_then(VecDeque::pop_front);
            let failure = state.failures.get_mut(&call).and_then(VecDeque::pop_front);
            (gate, failure)
        };
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|_| PgDeskError::Cancelled)?
                .forget();
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DatabaseService for MockDatabaseService {
    async fn connect(&self, config: &ConnectionConfig) -> Result<()> {
        self.enter(format!("connect:{}/{}", config.host, config.database))
            .await?;
        self.state.lock().connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.lock().connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn fetch_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let databases = self.state.lock().databases.clone();
        self.enter("databases:".to_string()).await?;
        Ok(databases)
    }

    async fn fetch_tables(&self, database: &str) -> Result<Vec<TableInfo>> {
        let tables = self
            .state
            .lock()
            .tables
            .get(database)
            .cloned()
            .unwrap_or_default();
        self.enter(format!("tables:{}", database)).await?;
        Ok(tables)
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryOutput> {
        let output = {
            let state = self.state.lock();
            state
                .query_results
                .iter()
                .find(|(pattern, _)| sql.contains(pattern.as_str()))
                .map(|(_, output)| output.clone())
                .unwrap_or_default()
        };
        self.enter(format!("execute:{}", sql)).await?;
        Ok(output)
    }

    async fn fetch_table_data(
        &self,
        schema: &str,
        table: &str,
        offset: usize,
        limit: usize,
    ) -> Result<QueryOutput> {
        let key = TableId::new(schema, table).cache_key();
        let data = self.state.lock().table_data.get(&key).cloned();
        self.enter(format!("fetch:{}", key)).await?;
        let (columns, rows) = data.ok_or_else(|| {
            PgDeskError::Query(format!("relation \"{}\" does not exist", key))
        })?;
        let page = rows.into_iter().skip(offset).take(limit).collect();
        Ok(QueryOutput::with_rows(columns, page))
    }

    async fn delete_rows(
        &self,
        schema: &str,
        table: &str,
        primary_key_columns: &[String],
        rows: &[TableRow],
    ) -> Result<u64> {
        let key = TableId::new(schema, table).cache_key();
        self.enter(format!("delete:{}", key)).await?;
        let mut state = self.state.lock();
        if let Some((_, data)) = state.table_data.get_mut(&key) {
            data.retain(|existing| {
                !rows.iter().any(|r| {
                    r.primary_key_values(primary_key_columns)
                        == existing.primary_key_values(primary_key_columns)
                })
            });
        }
        Ok(rows.len() as u64)
    }

    async fn update_row(
        &self,
        schema: &str,
        table: &str,
        _primary_key_columns: &[String],
        _original: &TableRow,
        _new_values: &HashMap<String, Value>,
    ) -> Result<()> {
        let key = TableId::new(schema, table).cache_key();
        self.enter(format!("update:{}", key)).await
    }

    async fn fetch_primary_key_columns(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        let key = TableId::new(schema, table).cache_key();
        let keys = self
            .state
            .lock()
            .primary_keys
            .get(&key)
            .cloned()
            .unwrap_or_default();
        self.enter(format!("primary_keys:{}", key)).await?;
        Ok(keys)
    }

    async fn fetch_column_info(&self, schema: &str, table: &str) -> Result<Vec<ColumnInfo>> {
        let key = TableId::new(schema, table).cache_key();
        let columns = self
            .state
            .lock()
            .columns
            .get(&key)
            .cloned()
            .unwrap_or_default();
        self.enter(format!("columns:{}", key)).await?;
        Ok(columns)
    }

    fn cancel_handle(&self) -> Option<Arc<dyn QueryCancelHandle>> {
        Some(Arc::new(CountingCancelHandle(self.cancels.clone())))
    }
}

/// `count` rows of `(id, name)` with ids starting at 1
pub fn user_rows(count: i64) -> Vec<TableRow> {
    user_rows_named(count, "user")
}

pub fn user_rows_named(count: i64, prefix: &str) -> Vec<TableRow> {
    (1..=count)
        .map(|i| {
            TableRow::from_pairs([
                ("id", Value::Int64(i)),
                ("name", Value::String(format!("{}-{}", prefix, i))),
            ])
        })
        .collect()
}

pub fn users() -> TableId {
    TableId::new("public", "users")
}

pub fn users_selection() -> TableSelection {
    TableSelection::new("public", "users")
}

/// Ids of displayed rows, in display order
pub fn displayed_ids(workspace: &Workspace) -> Vec<i64> {
    workspace.read(|state| {
        state
            .rows()
            .iter()
            .filter_map(|r| r.get("id").and_then(Value::as_i64))
            .collect()
    })
}

pub fn displayed_names(workspace: &Workspace) -> Vec<String> {
    workspace.read(|state| {
        state
            .rows()
            .iter()
            .filter_map(|r| r.get("name").and_then(Value::as_str).map(str::to_string))
            .collect()
    })
}

pub fn row_id_at(workspace: &Workspace, index: usize) -> RowId {
    workspace.read(|state| state.rows()[index].id)
}

pub fn test_config() -> WorkspaceConfig {
    WorkspaceConfig {
        persistence_backoff_initial_ms: 1,
        persistence_backoff_max_ms: 2,
        ticker_interval_ms: 5,
        ..WorkspaceConfig::default()
    }
}

/// Workspace over `service` with one open tab and an in-memory store
pub struct Harness {
    pub service: Arc<MockDatabaseService>,
    pub connections: Arc<ConnectionManager>,
    pub workspace: Workspace,
}

impl Harness {
    pub fn new(service: MockDatabaseService) -> Self {
        Self::with_store(service, Arc::new(MemoryTabStore::new()))
    }

    pub fn with_store(service: MockDatabaseService, store: Arc<dyn TabStore>) -> Self {
        let service = Arc::new(service);
        let connections = Arc::new(ConnectionManager::new(Arc::new(MemoryKeychain::new())));
        let workspace = Workspace::new(service.clone(), connections.clone(), store, test_config());
        workspace.new_tab();
        Self {
            service,
            connections,
            workspace,
        }
    }

    /// Save a profile for `host` with default database `database`
    pub async fn add_profile(&self, host: &str, database: &str) -> uuid::Uuid {
        let profile = ConnectionIdentity::new(host, host, database);
        let id = profile.id;
        self.connections
            .add_saved(profile, Some("secret"))
            .await
            .unwrap();
        id
    }
}

/// Mock with `app` and `postgres` databases and `public.users` holding `rows` rows
pub fn users_service(rows: i64) -> MockDatabaseService {
    MockDatabaseService::new()
        .with_databases(&["app", "postgres"])
        .with_table("app", &users(), &["id"], &["id", "name"], user_rows(rows))
}

/// A harness over `service` connected to `alpha/app`
pub async fn connected_harness_with(service: MockDatabaseService) -> (Harness, uuid::Uuid) {
    let harness = Harness::new(service);
    let alpha = harness.add_profile("alpha", "app").await;
    let outcome = harness.workspace.connect(alpha, None).await.unwrap();
    assert!(outcome.is_applied());
    (harness, alpha)
}

/// A harness connected to `alpha/app` whose `public.users` holds `rows` rows
pub async fn connected_harness(rows: i64) -> (Harness, uuid::Uuid) {
    connected_harness_with(users_service(rows)).await
}

/// Same as [`connected_harness_with`], with `public.users` selected and loaded
pub async fn users_harness_with(service: MockDatabaseService) -> (Harness, uuid::Uuid) {
    let (harness, alpha) = connected_harness_with(service).await;
    let outcome = harness
        .workspace
        .select_table(users_selection())
        .await
        .unwrap();
    assert!(outcome.is_applied());
    (harness, alpha)
}

pub async fn users_harness(rows: i64) -> (Harness, uuid::Uuid) {
    users_harness_with(users_service(rows)).await
}
