//! Saved connection profile

use pgdesk_core::{ConnectionConfig, SslMode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A saved PostgreSQL connection profile.
///
/// The `id` is assigned once when the profile is first saved and survives every
/// later edit. Liveness checks compare profiles by `id` only; two profiles with
/// identical host/database names are still different connections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionIdentity {
    /// Unique identifier
    pub id: Uuid,

    /// Display name
    pub name: String,

    pub host: String,

    pub port: u16,

    pub username: String,

    /// Default database to open on connect
    pub database: String,

    #[serde(default)]
    pub ssl_mode: SslMode,

    /// Creation timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// Last modified timestamp
    pub modified_at: chrono::DateTime<chrono::Utc>,

    /// Last connected timestamp
    #[serde(default)]
    pub last_connected: Option<chrono::DateTime<chrono::Utc>>,
}

impl ConnectionIdentity {
    /// Create a new profile with a fresh id
    pub fn new(name: impl Into<String>, host: impl Into<String>, database: impl Into<String>) -> Self {
        let name = name.into();
        tracing::debug!(name = %name, "creating new connection profile");
        let now = chrono::Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            host: host.into(),
            port: 5432,
            username: "postgres".to_string(),
            database: database.into(),
            ssl_mode: SslMode::default(),
            created_at: now,
            modified_at: now,
            last_connected: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_ssl_mode(mut self, ssl_mode: SslMode) -> Self {
        self.ssl_mode = ssl_mode;
        self
    }

    /// Apply an edit from the profile editor, keeping the id
    pub fn apply_edit(&mut self, edited: ConnectionIdentity) {
        let id = self.id;
        let created_at = self.created_at;
        *self = edited;
        self.id = id;
        self.created_at = created_at;
        self.modified_at = chrono::Utc::now();
    }

    /// Build connect parameters for `database`, which may differ from the default
    pub fn connection_config(&self, database: &str, password: Option<String>) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password,
            database: database.to_string(),
            ssl_mode: self.ssl_mode,
        }
    }
}
