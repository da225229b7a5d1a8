//! Workspace tunables

use anyhow::Context;
use pgdesk_connection::BackoffStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Rows fetched per table page
    pub page_size: usize,

    /// Longest error text shown in the status bar
    pub status_message_max_chars: usize,

    /// Total attempts for one workspace save before the failure is surfaced
    pub persistence_attempts: u32,

    pub persistence_backoff_initial_ms: u64,

    pub persistence_backoff_max_ms: u64,

    /// Period of the per-tab elapsed-time ticker
    pub ticker_interval_ms: u64,

    /// How long a notification such as "3 rows affected" stays visible
    pub notification_ttl_ms: u64,

    /// Query history capacity
    pub history_size: usize,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            page_size: 500,
            status_message_max_chars: 200,
            persistence_attempts: 2,
            persistence_backoff_initial_ms: 200,
            persistence_backoff_max_ms: 2_000,
            ticker_interval_ms: 100,
            notification_ttl_ms: 3_000,
            history_size: 500,
        }
    }
}

impl WorkspaceConfig {
    /// Read settings from `path`, falling back to defaults when the file is missing
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = ?path, "settings file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {:?}", path))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings: {:?}", path))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write settings: {:?}", path))?;
        Ok(())
    }

    pub fn persistence_backoff(&self) -> BackoffStrategy {
        BackoffStrategy::new(self.persistence_backoff_initial_ms, self.persistence_backoff_max_ms)
    }

    pub fn ticker_interval(&self) -> Duration {
        Duration::from_millis(self.ticker_interval_ms)
    }

    pub fn notification_ttl(&self) -> Duration {
        Duration::from_millis(self.notification_ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkspaceConfig::load_or_default(&dir.path().join("settings.json")).unwrap();
        assert_eq!(config, WorkspaceConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "page_size": 100 }"#).unwrap();

        let config = WorkspaceConfig::load_or_default(&path).unwrap();
        assert_eq!(config.page_size, 100);
        assert_eq!(config.persistence_attempts, 2);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let config = WorkspaceConfig {
            notification_ttl_ms: 1_000,
            ..WorkspaceConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(WorkspaceConfig::load_or_default(&path).unwrap(), config);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(WorkspaceConfig::load_or_default(&path).is_err());
    }
}
