//! Status and notification surface

use std::fmt;
use tracing::{debug, error, info};

/// Toast flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Success,
    Error,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotificationKind::Info => "info",
            NotificationKind::Success => "success",
            NotificationKind::Error => "error",
        })
    }
}

/// Ephemeral UI feedback driven by the interceptor
pub trait Notifier: Send + Sync {
    /// Block the page while files are being processed
    fn show_overlay(&self);

    fn hide_overlay(&self);

    /// Replace the overlay's status line
    fn update_status(&self, text: &str);

    /// Short-lived toast
    fn notify(&self, message: &str, kind: NotificationKind);
}

/// Renders every UI event as a `tracing` event
#[derive(Debug, Clone)]
pub struct TracingNotifier {
    notification_ms: u64,
}

impl TracingNotifier {
    pub fn new(notification_ms: u64) -> Self {
        Self { notification_ms }
    }
}

impl Default for TracingNotifier {
    fn default() -> Self {
        Self::new(3_200)
    }
}

impl Notifier for TracingNotifier {
    fn show_overlay(&self) {
        debug!("Overlay shown");
    }

    fn hide_overlay(&self) {
        debug!("Overlay hidden");
    }

    fn update_status(&self, text: &str) {
        info!(status = %text, "Detox");
    }

    fn notify(&self, message: &str, kind: NotificationKind) {
        match kind {
            NotificationKind::Error => {
                error!(kind = %kind, lifetime_ms = self.notification_ms, "{}", message)
            }
            _ => info!(kind = %kind, lifetime_ms = self.notification_ms, "{}", message),
        }
    }
}
