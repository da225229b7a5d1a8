//! External collaborator contracts
//!
//! The consistency layer never talks to the network itself. Everything that
//! suspends goes through these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::{ColumnInfo, DatabaseInfo, QueryOutput, Result, TableInfo, TableRow, Value};

/// PostgreSQL `sslmode`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }
}

/// Parameters for a single connect attempt
#[derive(Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub database: String,
    pub ssl_mode: SslMode,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("has_password", &self.password.is_some())
            .field("database", &self.database)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Handle for cancelling a running query from any thread.
///
/// Calling `cancel` more than once, or when nothing is running, is a no-op.
pub trait QueryCancelHandle: Send + Sync {
    fn cancel(&self);
}

/// The database collaborator.
///
/// Implementations own the live connection handle shared by every tab. When a
/// newer connect supersedes an older one still in flight, the older call must
/// fail with [`crate::PgDeskError::Cancelled`].
#[async_trait]
pub trait DatabaseService: Send + Sync {
    /// Connect, replacing any existing connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<()>;

    /// Close the live connection, if any
    async fn disconnect(&self) -> Result<()>;

    /// Whether a live connection exists right now
    fn is_connected(&self) -> bool;

    async fn fetch_databases(&self) -> Result<Vec<DatabaseInfo>>;

    async fn fetch_tables(&self, database: &str) -> Result<Vec<TableInfo>>;

    /// Execute free-form SQL
    async fn execute_query(&self, sql: &str) -> Result<QueryOutput>;

    /// Fetch one page of a table
    async fn fetch_table_data(
        &self,
        schema: &str,
        table: &str,
        offset: usize,
        limit: usize,
    ) -> Result<QueryOutput>;

    /// Delete rows identified by their primary key values. Returns rows affected.
    async fn delete_rows(
        &self,
        schema: &str,
        table: &str,
        primary_key_columns: &[String],
        rows: &[TableRow],
    ) -> Result<u64>;

    /// Update one row identified by its original primary key values
    async fn update_row(
        &self,
        schema: &str,
        table: &str,
        primary_key_columns: &[String],
        original: &TableRow,
        new_values: &HashMap<String, Value>,
    ) -> Result<()>;

    async fn fetch_primary_key_columns(&self, schema: &str, table: &str) -> Result<Vec<String>>;

    async fn fetch_column_info(&self, schema: &str, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Handle that interrupts the statement currently running, if supported
    fn cancel_handle(&self) -> Option<Arc<dyn QueryCancelHandle>> {
        None
    }
}

/// Credential storage keyed by connection id
#[async_trait]
pub trait KeychainService: Send + Sync {
    async fn get_password(&self, connection_id: Uuid) -> Result<Option<String>>;

    async fn save_password(&self, connection_id: Uuid, password: &str) -> Result<()>;

    async fn delete_password(&self, connection_id: Uuid) -> Result<()>;
}
