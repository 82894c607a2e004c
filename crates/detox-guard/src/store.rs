//! Persisted session settings

use crate::error::{DetoxError, Result};
use crate::types::{ScanStats, ServerMode};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::RwLock;

/// State that survives restarts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Global interception switch
    pub enabled: bool,
    /// Last selected server mode
    pub server_mode: Option<ServerMode>,
    /// URL for the `custom` mode
    pub custom_server_url: Option<String>,
    /// Scan counters
    pub stats: ScanStats,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            server_mode: None,
            custom_server_url: None,
            stats: ScanStats::default(),
        }
    }
}

/// Storage backend for [`Settings`]
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load settings, falling back to defaults when nothing is stored
    async fn load(&self) -> Result<Settings>;

    /// Persist settings
    async fn save(&self, settings: &Settings) -> Result<()>;
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Settings>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load(&self) -> Result<Settings> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, settings: &Settings) -> Result<()> {
        *self.inner.write().await = settings.clone();
        Ok(())
    }
}

/// JSON file store
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/detox/settings.json`
    pub fn default_location() -> Result<Self> {
        dirs::data_dir()
            .map(|dir| Self::new(dir.join("detox").join("settings.json")))
            .ok_or_else(|| DetoxError::StoreError("Could not find data directory".into()))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl SettingsStore for FileStore {
    async fn load(&self) -> Result<Settings> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(settings)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
