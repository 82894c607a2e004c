//! Page-side bootstrap

use crate::channel::MessageChannel;
use crate::error::Result;
use crate::interceptor::EnabledFlag;
use crate::notify::Notifier;
use crate::pipeline::Pipeline;
use crate::watcher::InputWatcher;
use detox_guard::{DetoxConfig, Request, Response};
use std::sync::Arc;
use tracing::{info, warn};

/// Page-side state: the enable switch and the input watcher
pub struct Agent {
    enabled: EnabledFlag,
    watcher: Arc<InputWatcher>,
}

impl Agent {
    /// Read the service status and set up the watcher.
    ///
    /// Interception starts enabled when the service cannot be reached.
    pub async fn start(
        config: &DetoxConfig,
        channel: Arc<dyn MessageChannel>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let enabled = EnabledFlag::new(true);

        match fetch_status(channel.as_ref()).await {
            Ok(Some((service_enabled, api_available))) => {
                enabled.set(service_enabled);
                if api_available {
                    info!("API connected");
                } else {
                    warn!("API not available - start the backend server");
                }
            }
            Ok(None) => warn!("Unexpected reply to status request"),
            Err(e) => warn!(error = %e, "Could not read service status"),
        }

        let pipeline = Arc::new(Pipeline::new(config, channel, notifier.clone()));
        let watcher = Arc::new(InputWatcher::new(
            config.interceptor.clone(),
            enabled.clone(),
            pipeline,
            notifier,
        ));

        info!(enabled = enabled.get(), "Detox initialized");
        Self { enabled, watcher }
    }

    /// Apply a broadcast message. Returns `true` if it was for us.
    pub fn apply(&self, message: &Request) -> bool {
        match message {
            Request::Toggle { enabled } => {
                self.enabled.set(*enabled);
                info!(enabled = *enabled, "Detox toggled");
                true
            }
            _ => false,
        }
    }

    pub fn enabled(&self) -> &EnabledFlag {
        &self.enabled
    }

    pub fn watcher(&self) -> &Arc<InputWatcher> {
        &self.watcher
    }
}

async fn fetch_status(channel: &dyn MessageChannel) -> Result<Option<(bool, bool)>> {
    match channel.send(Request::GetStatus).await? {
        Response::Status {
            enabled,
            api_available,
            ..
        } => Ok(Some((enabled, api_available))),
        _ => Ok(None),
    }
}
