//! Durable tab and saved-query records
//!
//! Only the selection and editor text of a tab survive a restart. Result rows
//! are session-only and never written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pgdesk_connection::BackoffStrategy;
use pgdesk_core::{PgDeskError, Result, TableSelection};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::tabs::{Tab, TabId};

/// What a tab looks like on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabRecord {
    pub id: Uuid,
    pub connection_id: Option<Uuid>,
    pub database_name: Option<String>,
    #[serde(default)]
    pub query_text: String,
    pub saved_query_id: Option<Uuid>,
    pub selected_table_schema: Option<String>,
    pub selected_table_name: Option<String>,
    pub selected_schema_filter: Option<String>,
}

impl TabRecord {
    pub fn from_tab(tab: &Tab) -> Self {
        Self {
            id: tab.id.0,
            connection_id: tab.connection_id,
            database_name: tab.database_name.clone(),
            query_text: tab.query_text.clone(),
            saved_query_id: tab.saved_query_id,
            selected_table_schema: tab.selected_table.as_ref().map(|t| t.schema.clone()),
            selected_table_name: tab.selected_table.as_ref().map(|t| t.name.clone()),
            selected_schema_filter: tab.schema_filter.clone(),
        }
    }

    /// Rebuild a tab with an empty result cache
    pub fn into_tab(self) -> Tab {
        let mut tab = Tab::with_id(TabId(self.id));
        tab.connection_id = self.connection_id;
        tab.database_name = self.database_name;
        tab.query_text = self.query_text;
        tab.saved_query_id = self.saved_query_id;
        tab.schema_filter = self.selected_schema_filter;
        tab.selected_table = match (self.selected_table_schema, self.selected_table_name) {
            (Some(schema), Some(name)) => Some(TableSelection::new(schema, name)),
            _ => None,
        };
        tab
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedQueryRecord {
    pub id: Uuid,
    pub name: String,
    pub sql: String,
    pub connection_id: Option<Uuid>,
    pub database_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SavedQueryRecord {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            sql: sql.into(),
            connection_id: None,
            database_name: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Everything written for one workspace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedWorkspace {
    pub tabs: Vec<TabRecord>,
    #[serde(default)]
    pub saved_queries: Vec<SavedQueryRecord>,
    pub active_tab_id: Option<Uuid>,
}

/// Durable storage for workspace records
#[async_trait]
pub trait TabStore: Send + Sync {
    /// Load the last saved workspace; empty when nothing was saved yet
    async fn load(&self) -> Result<PersistedWorkspace>;

    async fn save(&self, workspace: &PersistedWorkspace) -> Result<()>;
}

/// JSON file store
pub struct JsonTabStore {
    path: PathBuf,
}

impl JsonTabStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl TabStore for JsonTabStore {
    #[tracing::instrument(skip(self), fields(path = ?self.path))]
    async fn load(&self) -> Result<PersistedWorkspace> {
        if !self.path.exists() {
            tracing::debug!("tabs file doesn't exist yet");
            return Ok(PersistedWorkspace::default());
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        let workspace: PersistedWorkspace = serde_json::from_str(&content)?;
        tracing::info!(tabs = workspace.tabs.len(), "workspace loaded from storage");
        Ok(workspace)
    }

    #[tracing::instrument(skip(self, workspace), fields(path = ?self.path, tabs = workspace.tabs.len()))]
    async fn save(&self, workspace: &PersistedWorkspace) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(workspace)?;
        tokio::fs::write(&self.path, content).await?;
        tracing::debug!("workspace saved to storage");
        Ok(())
    }
}

/// In-memory store for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryTabStore {
    saved: Mutex<Option<PersistedWorkspace>>,
}

impl MemoryTabStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workspace(workspace: PersistedWorkspace) -> Self {
        Self {
            saved: Mutex::new(Some(workspace)),
        }
    }

    pub fn snapshot(&self) -> Option<PersistedWorkspace> {
        self.saved.lock().clone()
    }
}

#[async_trait]
impl TabStore for MemoryTabStore {
    async fn load(&self) -> Result<PersistedWorkspace> {
        Ok(self.saved.lock().clone().unwrap_or_default())
    }

    async fn save(&self, workspace: &PersistedWorkspace) -> Result<()> {
        *self.saved.lock() = Some(workspace.clone());
        Ok(())
    }
}

/// Write `workspace`, retrying up to `attempts` times in total with backoff
/// between attempts. Returns the last error when every attempt failed.
pub async fn save_with_retry(
    store: &dyn TabStore,
    workspace: &PersistedWorkspace,
    attempts: u32,
    backoff: &BackoffStrategy,
) -> Result<()> {
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        match store.save(workspace).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt + 1 < attempts => {
                let delay = backoff.calculate_delay(attempt);
                tracing::warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %e, "workspace save failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(attempts, error = %e, "workspace save failed");
                return Err(PgDeskError::Persistence(e.to_string()));
            }
        }
    }
}
