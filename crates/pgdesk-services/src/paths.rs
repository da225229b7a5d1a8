//! On-disk locations

use anyhow::{Context, Result};
use std::path::PathBuf;

pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .context("Could not determine config directory")
        .map(|p| p.join("pgdesk"))
}

pub fn data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .context("Could not determine data directory")
        .map(|p| p.join("pgdesk"))
}

pub fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pgdesk")
        .join("logs")
}

pub fn config_file() -> Result<PathBuf> {
    config_dir().map(|p| p.join("settings.json"))
}

pub fn connections_file() -> Result<PathBuf> {
    data_dir().map(|p| p.join("connections.json"))
}

pub fn tabs_file() -> Result<PathBuf> {
    data_dir().map(|p| p.join("tabs.json"))
}

pub fn ensure_directories() -> Result<()> {
    for dir in [config_dir()?, data_dir()?] {
        if !dir.exists() {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {:?}", dir))?;
        }
    }
    Ok(())
}
