//! Background service: answers page and popup messages

use crate::client::AnalysisClient;
use crate::config::DetoxConfig;
use crate::error::Result;
use crate::profile::ProfileRegistry;
use crate::protocol::{Request, Response};
use crate::store::{MemoryStore, Settings, SettingsStore};
use crate::types::{ServerMode, ServerProfile};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

/// Capacity of the toggle broadcast; receivers only care about the latest value
const TOGGLE_CHANNEL_CAPACITY: usize = 16;

/// Owns the analysis client, the server profiles and the settings store
pub struct DetoxService {
    config: DetoxConfig,
    client: AnalysisClient,
    profiles: Arc<ProfileRegistry>,
    store: Arc<dyn SettingsStore>,
    // serializes read-modify-write cycles on the store
    settings_lock: Mutex<()>,
    toggles: broadcast::Sender<bool>,
}

impl DetoxService {
    /// Create a service over the given store
    pub fn new(config: DetoxConfig, store: Arc<dyn SettingsStore>) -> Self {
        let profiles = Arc::new(ProfileRegistry::new(config.servers.clone()));
        let (toggles, _) = broadcast::channel(TOGGLE_CHANNEL_CAPACITY);
        Self {
            client: AnalysisClient::new(config.client.clone(), profiles.clone()),
            profiles,
            store,
            settings_lock: Mutex::new(()),
            toggles,
            config,
        }
    }

    /// Create a builder for the service
    pub fn builder() -> DetoxServiceBuilder {
        DetoxServiceBuilder::new()
    }

    /// Restore the server profile saved by a previous session
    pub async fn start(&self) -> Result<ServerProfile> {
        let settings = self.store.load().await?;
        let profile = self.profiles.restore(&settings).await;
        info!(mode = %profile.mode, url = %profile.base_url, "Using analysis server");
        Ok(profile)
    }

    /// Write first-run defaults
    pub async fn install(&self) -> Result<()> {
        let _guard = self.settings_lock.lock().await;
        let settings = Settings {
            enabled: true,
            server_mode: Some(self.config.servers.default_mode),
            custom_server_url: None,
            stats: Default::default(),
        };
        self.store.save(&settings).await?;
        info!("Installed default settings");
        Ok(())
    }

    /// Receive every `DETOX_TOGGLE` value
    pub fn subscribe_toggles(&self) -> broadcast::Receiver<bool> {
        self.toggles.subscribe()
    }

    pub fn client(&self) -> &AnalysisClient {
        &self.client
    }

    pub fn profiles(&self) -> &Arc<ProfileRegistry> {
        &self.profiles
    }

    pub fn config(&self) -> &DetoxConfig {
        &self.config
    }

    /// Answer one message
    pub async fn handle(&self, request: Request) -> Response {
        debug!(message = request.name(), "Handling message");

        match request {
            Request::AnalyzeImage { image } => Response::Analysis(self.client.analyze(&image).await),

            Request::CheckApi => {
                let profile = self.profiles.active().await;
                let available = self.client.health(&profile).await;
                Response::ApiStatus {
                    available,
                    mode: profile.mode,
                    url: profile.base_url,
                }
            }

            Request::GetStatus => {
                let settings = self.load_settings().await;
                let profile = self.profiles.active().await;
                let api_available = self.client.health(&profile).await;
                Response::Status {
                    enabled: settings.enabled,
                    stats: settings.stats,
                    api_available,
                    server_mode: profile.mode,
                    server_url: profile.base_url,
                }
            }

            Request::SetServerMode { mode } => match self.set_server_mode(&mode).await {
                Ok(profile) => Response::ModeChanged {
                    success: true,
                    mode: profile.mode,
                    url: profile.base_url,
                },
                Err(e) => {
                    warn!(mode = %mode, error = %e, "Rejected server mode");
                    Response::failure("Invalid mode")
                }
            },

            Request::SetCustomServer { url } => match self.set_custom_server(&url).await {
                Ok(_) => Response::ack(),
                Err(e) => {
                    warn!(url = %url, error = %e, "Rejected custom server");
                    Response::failure(e.to_string())
                }
            },

            Request::GetPrivacyPolicy => Response::PrivacyPolicy(self.client.privacy_policy().await),

            Request::ScanComplete { found_sensitive } => {
                if let Err(e) = self
                    .update_settings(|s| s.stats.record(found_sensitive))
                    .await
                {
                    warn!(error = %e, "Could not update scan stats");
                }
                Response::ack()
            }

            Request::Toggle { enabled } => {
                if let Err(e) = self.update_settings(|s| s.enabled = enabled).await {
                    warn!(error = %e, "Could not persist enabled flag");
                }
                // no subscribers is fine
                let _ = self.toggles.send(enabled);
                info!(enabled, "Interception toggled");
                Response::Empty
            }
        }
    }

    /// Switch the active server. Only parsing and selection can fail; a
    /// switch that could not be saved stays active for this session.
    async fn set_server_mode(&self, mode: &str) -> Result<ServerProfile> {
        let mode: ServerMode = mode.parse()?;
        let profile = self.profiles.set_mode(mode).await?;
        if let Err(e) = self.update_settings(|s| s.server_mode = Some(mode)).await {
            warn!(mode = %mode, error = %e, "Server mode switched but not saved");
        }
        Ok(profile)
    }

    async fn set_custom_server(&self, url: &str) -> Result<ServerProfile> {
        let profile = self.profiles.set_custom(url).await?;
        let saved_url = profile.base_url.clone();
        let saved = self
            .update_settings(move |s| {
                s.server_mode = Some(ServerMode::Custom);
                s.custom_server_url = Some(saved_url);
            })
            .await;
        if let Err(e) = saved {
            warn!(url = %profile.base_url, error = %e, "Custom server set but not saved");
        }
        Ok(profile)
    }

    async fn load_settings(&self) -> Settings {
        match self.store.load().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Could not load settings, using defaults");
                Settings::default()
            }
        }
    }

    async fn update_settings<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Settings),
    {
        let _guard = self.settings_lock.lock().await;
        let mut settings = self.store.load().await?;
        f(&mut settings);
        self.store.save(&settings).await
    }
}

/// Builder for [`DetoxService`]
pub struct DetoxServiceBuilder {
    config: DetoxConfig,
    store: Option<Arc<dyn SettingsStore>>,
}

impl DetoxServiceBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: DetoxConfig::default(),
            store: None,
        }
    }

    /// Use a full configuration
    pub fn with_config(mut self, config: DetoxConfig) -> Self {
        self.config = config;
        self
    }

    /// Persist settings in `store`
    pub fn with_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the local server URL
    pub fn with_local_url(mut self, url: impl Into<String>) -> Self {
        self.config.servers.local = url.into();
        self
    }

    /// Override the hosted server URL
    pub fn with_hosted_url(mut self, url: impl Into<String>) -> Self {
        self.config.servers.hosted = url.into();
        self
    }

    /// Build the service; settings live in memory unless a store was given
    pub fn build(self) -> DetoxService {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn SettingsStore>);
        DetoxService::new(self.config, store)
    }
}

impl Default for DetoxServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DetoxError;
    use crate::types::ScanStats;

    fn service() -> DetoxService {
        DetoxService::builder()
            .with_local_url("http://127.0.0.1:1")
            .with_hosted_url("http://127.0.0.1:1")
            .build()
    }

    #[tokio::test]
    async fn test_scan_complete_updates_stats() {
        let service = service();
        service
            .handle(Request::ScanComplete {
                found_sensitive: false,
            })
            .await;
        let reply = service
            .handle(Request::ScanComplete {
                found_sensitive: true,
            })
            .await;
        assert_eq!(reply, Response::ack());

        let status = service.handle(Request::GetStatus).await;
        match status {
            Response::Status {
                stats,
                api_available,
                enabled,
                ..
            } => {
                assert_eq!(
                    stats,
                    ScanStats {
                        scanned: 2,
                        protected: 1
                    }
                );
                assert!(!api_available);
                assert!(enabled);
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_set_server_mode() {
        let service = service();

        let reply = service
            .handle(Request::SetServerMode {
                mode: "hosted".into(),
            })
            .await;
        assert_eq!(
            reply,
            Response::ModeChanged {
                success: true,
                mode: ServerMode::Hosted,
                url: "http://127.0.0.1:1".into()
            }
        );

        let reply = service
            .handle(Request::SetServerMode {
                mode: "satellite".into(),
            })
            .await;
        assert_eq!(reply, Response::failure("Invalid mode"));
        assert_eq!(service.profiles().active().await.mode, ServerMode::Hosted);
    }

    #[tokio::test]
    async fn test_custom_server_persists_and_restores() {
        let store: Arc<dyn SettingsStore> = Arc::new(MemoryStore::new());
        let service = DetoxService::builder().with_store(store.clone()).build();

        let reply = service
            .handle(Request::SetCustomServer {
                url: "http://192.168.1.20:8000".into(),
            })
            .await;
        assert_eq!(reply, Response::ack());

        // a fresh service over the same store picks the custom server back up
        let restarted = DetoxService::builder().with_store(store).build();
        let profile = restarted.start().await.unwrap();
        assert_eq!(profile.mode, ServerMode::Custom);
        assert_eq!(profile.base_url, "http://192.168.1.20:8000");
    }

    /// Loads fine, refuses every write
    struct ReadOnlyStore;

    #[async_trait::async_trait]
    impl SettingsStore for ReadOnlyStore {
        async fn load(&self) -> Result<Settings> {
            Ok(Settings::default())
        }

        async fn save(&self, _settings: &Settings) -> Result<()> {
            Err(DetoxError::StoreError("read-only".into()))
        }
    }

    #[tokio::test]
    async fn test_unsaved_switch_still_reports_active_server() {
        let service = DetoxService::builder()
            .with_hosted_url("http://127.0.0.1:1")
            .with_store(Arc::new(ReadOnlyStore))
            .build();

        let reply = service
            .handle(Request::SetServerMode {
                mode: "hosted".into(),
            })
            .await;
        assert_eq!(
            reply,
            Response::ModeChanged {
                success: true,
                mode: ServerMode::Hosted,
                url: "http://127.0.0.1:1".into()
            }
        );
        assert_eq!(service.profiles().active().await.mode, ServerMode::Hosted);

        let reply = service
            .handle(Request::SetCustomServer {
                url: "http://10.0.0.5:8000".into(),
            })
            .await;
        assert_eq!(reply, Response::ack());
        let active = service.profiles().active().await;
        assert_eq!(active.mode, ServerMode::Custom);
        assert_eq!(active.base_url, "http://10.0.0.5:8000");
    }

    #[tokio::test]
    async fn test_toggle_broadcasts() {
        let service = service();
        let mut toggles = service.subscribe_toggles();

        let reply = service.handle(Request::Toggle { enabled: false }).await;
        assert_eq!(reply, Response::Empty);
        assert_eq!(toggles.recv().await.unwrap(), false);

        match service.handle(Request::GetStatus).await {
            Response::Status { enabled, .. } => assert!(!enabled),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_install_defaults() {
        let store: Arc<dyn SettingsStore> = Arc::new(MemoryStore::new());
        let service = DetoxService::builder().with_store(store.clone()).build();
        service.handle(Request::ScanComplete { found_sensitive: true }).await;

        service.install().await.unwrap();
        let settings = store.load().await.unwrap();
        assert_eq!(settings.stats, ScanStats::default());
        assert_eq!(settings.server_mode, Some(ServerMode::Local));
    }

    #[tokio::test]
    async fn test_analyze_unreachable_local() {
        let service = service();
        let reply = service
            .handle(Request::AnalyzeImage {
                image: "data:image/png;base64,AA".into(),
            })
            .await;
        let result = reply.into_analysis().unwrap();
        assert!(!result.success);
    }
}
