//! Credential storage backed by the system keychain
//!
//! All passwords live in a SINGLE keychain entry holding a JSON map, so the
//! user is prompted for keychain access once rather than once per connection.

use async_trait::async_trait;
use parking_lot::RwLock;
use pgdesk_core::{KeychainService, PgDeskError, Result};
use std::collections::HashMap;
use uuid::Uuid;

const SERVICE_NAME: &str = "dev.pgdesk.connections";

const ACCOUNT_NAME: &str = "credentials";

/// Keychain-backed credential store.
///
/// Credentials are loaded lazily on first access and cached in memory.
pub struct SecureStorage {
    /// Map of "password:<uuid>" -> secret, `None` until first access
    cache: RwLock<Option<HashMap<String, String>>>,
}

impl SecureStorage {
    pub fn new() -> Self {
        tracing::debug!("secure storage initialized (credentials loaded on demand)");
        Self {
            cache: RwLock::new(None),
        }
    }

    fn password_key(connection_id: Uuid) -> String {
        format!("password:{}", connection_id)
    }

    fn entry() -> Result<keyring::Entry> {
        keyring::Entry::new(SERVICE_NAME, ACCOUNT_NAME)
            .map_err(|e| PgDeskError::Security(format!("Failed to create keyring entry: {}", e)))
    }

    fn load_from_keychain() -> Result<HashMap<String, String>> {
        match Self::entry()?.get_password() {
            Ok(json_str) => {
                let credentials: HashMap<String, String> = serde_json::from_str(&json_str)
                    .unwrap_or_else(|e| {
                        tracing::warn!("Failed to parse credentials JSON, starting fresh: {}", e);
                        HashMap::new()
                    });
                tracing::debug!(count = credentials.len(), "loaded credentials from keychain");
                Ok(credentials)
            }
            Err(keyring::Error::NoEntry) => Ok(HashMap::new()),
            Err(e) => Err(PgDeskError::Security(format!(
                "Failed to read keychain: {}",
                e
            ))),
        }
    }

    fn save_to_keychain(credentials: &HashMap<String, String>) -> Result<()> {
        let entry = Self::entry()?;

        if credentials.is_empty() {
            match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(e) => tracing::warn!("Failed to delete keychain entry: {}", e),
            }
            return Ok(());
        }

        let json_str = serde_json::to_string(credentials)?;
        entry.set_password(&json_str).map_err(|e| {
            PgDeskError::Security(format!("Failed to store credentials in keychain: {}", e))
        })?;
        tracing::debug!(count = credentials.len(), "saved credentials to keychain");
        Ok(())
    }

    fn with_credentials<T>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> Result<T>) -> Result<T> {
        let mut cache = self.cache.write();
        if cache.is_none() {
            *cache = Some(Self::load_from_keychain()?);
        }
        match cache.as_mut() {
            Some(credentials) => f(credentials),
            None => Err(PgDeskError::Security("credential cache unavailable".into())),
        }
    }
}

impl Default for SecureStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeychainService for SecureStorage {
    async fn get_password(&self, connection_id: Uuid) -> Result<Option<String>> {
        let key = Self::password_key(connection_id);
        self.with_credentials(|credentials| Ok(credentials.get(&key).cloned()))
    }

    async fn save_password(&self, connection_id: Uuid, password: &str) -> Result<()> {
        let key = Self::password_key(connection_id);
        self.with_credentials(|credentials| {
            credentials.insert(key, password.to_string());
            Self::save_to_keychain(credentials)
        })
    }

    async fn delete_password(&self, connection_id: Uuid) -> Result<()> {
        let key = Self::password_key(connection_id);
        self.with_credentials(|credentials| {
            if credentials.remove(&key).is_some() {
                Self::save_to_keychain(credentials)?;
            }
            Ok(())
        })
    }
}

/// In-memory credential store for tests and keychain-less environments
#[derive(Default)]
pub struct MemoryKeychain {
    passwords: RwLock<HashMap<Uuid, String>>,
}

impl MemoryKeychain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.passwords.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.passwords.read().is_empty()
    }
}

#[async_trait]
impl KeychainService for MemoryKeychain {
    async fn get_password(&self, connection_id: Uuid) -> Result<Option<String>> {
        Ok(self.passwords.read().get(&connection_id).cloned())
    }

    async fn save_password(&self, connection_id: Uuid, password: &str) -> Result<()> {
        self.passwords
            .write()
            .insert(connection_id, password.to_string());
        Ok(())
    }

    async fn delete_password(&self, connection_id: Uuid) -> Result<()> {
        self.passwords.write().remove(&connection_id);
        Ok(())
    }
}
