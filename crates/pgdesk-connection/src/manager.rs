//! Saved connection profiles

use parking_lot::RwLock;
use pgdesk_core::{KeychainService, PgDeskError, Result};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::ConnectionIdentity;

/// Manages saved connection profiles and their credentials
pub struct ConnectionManager {
    /// Saved connection profiles, in display order
    saved: RwLock<Vec<ConnectionIdentity>>,

    /// Credential store for profile passwords
    keychain: Arc<dyn KeychainService>,

    /// Path to save profiles to
    storage_path: Option<PathBuf>,
}

impl ConnectionManager {
    pub fn new(keychain: Arc<dyn KeychainService>) -> Self {
        Self {
            saved: RwLock::new(Vec::new()),
            keychain,
            storage_path: None,
        }
    }

    pub fn with_storage_path(keychain: Arc<dyn KeychainService>, path: PathBuf) -> Self {
        Self {
            saved: RwLock::new(Vec::new()),
            keychain,
            storage_path: Some(path),
        }
    }

    pub fn keychain(&self) -> Arc<dyn KeychainService> {
        self.keychain.clone()
    }

    /// Get all saved profiles
    pub fn saved_connections(&self) -> Vec<ConnectionIdentity> {
        self.saved.read().clone()
    }

    /// Get a saved profile by id
    pub fn get_saved(&self, id: Uuid) -> Option<ConnectionIdentity> {
        self.saved.read().iter().find(|c| c.id == id).cloned()
    }

    /// Save a new profile, storing its password in the keychain
    #[tracing::instrument(skip(self, profile, password), fields(connection_id = %profile.id, connection_name = %profile.name))]
    pub async fn add_saved(&self, profile: ConnectionIdentity, password: Option<&str>) -> Result<()> {
        if let Some(password) = password {
            self.keychain.save_password(profile.id, password).await?;
        }
        self.saved.write().push(profile);
        tracing::info!("connection profile saved");
        Ok(())
    }

    /// Apply an edited profile to the saved profile with the same id
    pub fn update_saved(&self, edited: ConnectionIdentity) -> Result<()> {
        let mut saved = self.saved.write();
        let existing = saved
            .iter_mut()
            .find(|c| c.id == edited.id)
            .ok_or_else(|| PgDeskError::NotFound(format!("connection {}", edited.id)))?;
        existing.apply_edit(edited);
        Ok(())
    }

    /// Record a successful connect
    pub fn mark_connected(&self, id: Uuid) {
        if let Some(profile) = self.saved.write().iter_mut().find(|c| c.id == id) {
            profile.last_connected = Some(chrono::Utc::now());
        }
    }

    /// Remove a profile and its stored password
    #[tracing::instrument(skip(self), fields(connection_id = %id))]
    pub async fn remove_saved(&self, id: Uuid) -> Result<()> {
        self.saved.write().retain(|c| c.id != id);
        self.keychain.delete_password(id).await
    }

    /// Read the password for a profile
    pub async fn password(&self, id: Uuid) -> Result<Option<String>> {
        self.keychain.get_password(id).await
    }

    /// Load profiles from persistent storage
    #[tracing::instrument(skip(self))]
    pub async fn load_from_storage(&self) -> Result<()> {
        let Some(path) = self.storage_path.as_ref() else {
            tracing::debug!("no storage path configured");
            return Ok(());
        };
        if !path.exists() {
            tracing::debug!(path = ?path, "connections file doesn't exist yet");
            return Ok(());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let connections: Vec<ConnectionIdentity> = serde_json::from_str(&content)?;

        tracing::info!(count = connections.len(), "connections loaded from storage");
        *self.saved.write() = connections;
        Ok(())
    }

    /// Save profiles to persistent storage
    #[tracing::instrument(skip(self))]
    pub async fn save_to_storage(&self) -> Result<()> {
        let Some(path) = self.storage_path.as_ref() else {
            tracing::debug!("no storage path configured");
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let connections = self.saved.read().clone();
        let content = serde_json::to_string_pretty(&connections)?;
        tokio::fs::write(path, content).await?;

        tracing::info!(count = connections.len(), path = ?path, "connections saved to storage");
        Ok(())
    }
}
