//! Configuration for Detox

use crate::error::{DetoxError, Result};
use crate::types::ServerMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name used under the per-user config directory
pub const CONFIG_FILE_NAME: &str = "detox.toml";

/// Main configuration for Detox
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DetoxConfig {
    /// Redaction geometry and re-encoding
    pub redaction: RedactionConfig,
    /// Analysis client transport
    pub client: ClientConfig,
    /// Upload interceptor timings
    pub interceptor: InterceptorConfig,
    /// Known analysis servers
    pub servers: ServersConfig,
    /// Scan audit logging
    pub audit: AuditConfig,
}

impl DetoxConfig {
    /// Default location: `<config dir>/detox/detox.toml`
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("detox").join(CONFIG_FILE_NAME))
            .ok_or_else(|| DetoxError::ConfigError("Could not find config directory".into()))
    }

    /// Load config from the default location, writing defaults if it is missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load config from `path`, writing defaults if the file does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)?;
            let config: Self = toml::from_str(&contents)?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Override the hosted server URL
    pub fn with_hosted_url(mut self, url: impl Into<String>) -> Self {
        self.servers.hosted = url.into();
        self
    }

    /// Override the local server URL
    pub fn with_local_url(mut self, url: impl Into<String>) -> Self {
        self.servers.local = url.into();
        self
    }

    /// Override the analysis timeout on the service side
    pub fn with_client_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.client.timeout_ms = timeout_ms;
        self
    }

    /// Override the analysis timeout on the page side
    pub fn with_response_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.interceptor.response_timeout_ms = timeout_ms;
        self
    }
}

/// Redaction geometry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionConfig {
    /// Fixed padding in pixels added on every side
    pub padding: f64,
    /// Proportional margin added on every side (fraction of box size)
    pub extra_margin: f64,
    /// Fill color (RGB)
    pub color: [u8; 3],
    /// Boxes wider than this fraction of the canvas are skipped
    pub max_width_ratio: f64,
    /// Boxes taller than this fraction of the canvas are skipped
    pub max_height_ratio: f64,
    /// JPEG quality used when re-encoding (1-100)
    pub jpeg_quality: u8,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            padding: 15.0,
            extra_margin: 0.15,
            color: [0, 0, 0],
            max_width_ratio: 0.8,
            max_height_ratio: 0.6,
            jpeg_quality: 95,
        }
    }
}

/// Analysis client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Analyze timeout in milliseconds
    pub timeout_ms: u64,
    /// Health check timeout in milliseconds
    pub health_timeout_ms: u64,
    /// User agent for backend requests
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            health_timeout_ms: 5_000,
            user_agent: format!("Detox/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Upload interceptor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    /// How long the page side waits for an analysis reply
    pub response_timeout_ms: u64,
    /// Delay between rewriting the file list and redispatching the change event
    pub handoff_delay_ms: u64,
    /// Time after redispatch during which change events are treated as our own
    pub handoff_grace_ms: u64,
    /// Lifetime of a toast notification
    pub notification_ms: u64,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 180_000,
            handoff_delay_ms: 50,
            handoff_grace_ms: 200,
            notification_ms: 3_200,
        }
    }
}

/// Known analysis servers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServersConfig {
    /// Server running on the user's machine
    pub local: String,
    /// Shared hosted server
    pub hosted: String,
    /// Mode used on first install
    pub default_mode: ServerMode,
}

impl Default for ServersConfig {
    fn default() -> Self {
        Self {
            local: "http://localhost:8000".to_string(),
            hosted: "https://detoxbackend-production.up.railway.app".to_string(),
            default_mode: ServerMode::Local,
        }
    }
}

impl ServersConfig {
    /// Base URL of a built-in mode; `None` for `custom`
    pub fn url_for(&self, mode: ServerMode) -> Option<&str> {
        match mode {
            ServerMode::Local => Some(&self.local),
            ServerMode::Hosted => Some(&self.hosted),
            ServerMode::Custom => None,
        }
    }
}

/// Audit logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Enable audit logging
    pub enabled: bool,
    /// Append JSON lines to this file
    pub log_file: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DetoxConfig::default();
        assert_eq!(config.redaction.padding, 15.0);
        assert_eq!(config.redaction.extra_margin, 0.15);
        assert_eq!(config.client.timeout_ms, 120_000);
        assert_eq!(config.client.health_timeout_ms, 5_000);
        assert_eq!(config.interceptor.response_timeout_ms, 180_000);
        assert_eq!(config.servers.default_mode, ServerMode::Local);
    }

    #[test]
    fn test_load_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let config = DetoxConfig::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.servers.local, "http://localhost:8000");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[redaction]\npadding = 4.0\n").unwrap();

        let config = DetoxConfig::load_from(&path).unwrap();
        assert_eq!(config.redaction.padding, 4.0);
        assert_eq!(config.redaction.max_width_ratio, 0.8);
        assert_eq!(config.interceptor.handoff_delay_ms, 50);
    }

    #[test]
    fn test_url_for() {
        let servers = ServersConfig::default();
        assert_eq!(servers.url_for(ServerMode::Local), Some("http://localhost:8000"));
        assert!(servers.url_for(ServerMode::Custom).is_none());
    }
}
