//! Server profile selection
//!
//! Exactly one [`ServerProfile`] is active. Switching replaces it wholesale;
//! requests already in flight keep the snapshot they started with.

use crate::config::ServersConfig;
use crate::error::{DetoxError, Result};
use crate::store::Settings;
use crate::types::{ServerMode, ServerProfile};
use tokio::sync::RwLock;
use tracing::info;

/// Holds the known servers and the active profile
pub struct ProfileRegistry {
    servers: ServersConfig,
    active: RwLock<ServerProfile>,
}

impl ProfileRegistry {
    /// Start on the configured default mode
    pub fn new(servers: ServersConfig) -> Self {
        let mode = match servers.default_mode {
            // a custom default has no URL to go with it
            ServerMode::Custom => ServerMode::Local,
            mode => mode,
        };
        let url = servers.url_for(mode).unwrap_or(&servers.local).to_string();
        Self {
            active: RwLock::new(ServerProfile::new(mode, url)),
            servers,
        }
    }

    /// Snapshot of the active profile
    pub async fn active(&self) -> ServerProfile {
        self.active.read().await.clone()
    }

    /// Switch to a built-in mode
    pub async fn set_mode(&self, mode: ServerMode) -> Result<ServerProfile> {
        let url = self
            .servers
            .url_for(mode)
            .ok_or_else(|| DetoxError::InvalidMode(mode.to_string()))?;
        let profile = ServerProfile::new(mode, url);
        *self.active.write().await = profile.clone();
        info!(mode = %mode, url = %profile.base_url, "Switched server mode");
        Ok(profile)
    }

    /// Switch to a user-supplied server
    pub async fn set_custom(&self, url: &str) -> Result<ServerProfile> {
        let parsed = url::Url::parse(url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DetoxError::InvalidUrl(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }
        let profile = ServerProfile::new(ServerMode::Custom, url.trim_end_matches('/'));
        *self.active.write().await = profile.clone();
        info!(url = %profile.base_url, "Switched to custom server");
        Ok(profile)
    }

    /// Re-apply the mode saved in a previous session
    pub async fn restore(&self, settings: &Settings) -> ServerProfile {
        let restored = match (settings.server_mode, settings.custom_server_url.as_deref()) {
            (Some(ServerMode::Custom), Some(url)) => self.set_custom(url).await.ok(),
            (Some(mode), _) => self.set_mode(mode).await.ok(),
            (None, _) => None,
        };
        match restored {
            Some(profile) => profile,
            None => self.active().await,
        }
    }

    /// Configured servers
    pub fn servers(&self) -> &ServersConfig {
        &self.servers
    }
}
