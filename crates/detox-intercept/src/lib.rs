//! # Detox Intercept
//!
//! Page side of Detox: suspends a native image upload, redacts the images
//! through `detox-guard` and hands the result back to the host page.
//!
//! - **Interceptor**: per-input `Idle → Capturing → HandingOff` state machine
//! - **Watcher**: attaches exactly once to every file input that appears
//! - **Pipeline**: strictly ordered per-file analysis, fill and re-encode
//! - **Channel**: request/response to the service with a timeout wrapper
//!
//! ## Example
//!
//! ```rust,no_run
//! use detox_intercept::{Agent, MemoryInput, InputId, ServiceChannel, TracingNotifier, UploadedFile};
//! use detox_guard::{DetoxConfig, DetoxService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = DetoxConfig::default();
//!     let service = Arc::new(DetoxService::builder().with_config(config.clone()).build());
//!     let channel = Arc::new(ServiceChannel::spawn(service));
//!     let agent = Agent::start(&config, channel, Arc::new(TracingNotifier::default())).await;
//!
//!     let input = Arc::new(MemoryInput::new(InputId(1)));
//!     agent.watcher().observe(input.clone());
//!
//!     input.user_select(vec![UploadedFile::new("id.png", "image/png", std::fs::read("id.png").unwrap())]);
//!     if let Some(interceptor) = agent.watcher().get(InputId(1)) {
//!         interceptor.wait_idle().await;
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐ change ┌─────────────┐ files ┌──────────┐ ANALYZE_IMAGE ┌──────────────┐
//! │ File input │ ─────► │ Interceptor │ ────► │ Pipeline │ ────────────► │ DetoxService │
//! │            │ ◄───── │ (handoff)   │ ◄──── │ + Raster │ ◄──────────── │ (detox-guard)│
//! └────────────┘ synth. └─────────────┘       └──────────┘  detections   └──────────────┘
//! ```

pub mod agent;
pub mod channel;
pub mod dom;
pub mod error;
pub mod interceptor;
pub mod notify;
pub mod pipeline;
pub mod raster;
pub mod watcher;

pub use agent::Agent;
pub use channel::{request_analysis, MessageChannel, ServiceChannel};
pub use dom::{ChangeEvent, FileInput, InputId, MemoryInput, ProcessedFile, UploadedFile};
pub use error::{InterceptError, Result};
pub use interceptor::{Disposition, EnabledFlag, Interceptor, Phase};
pub use notify::{NotificationKind, Notifier, TracingNotifier};
pub use pipeline::{FileProcessor, Pipeline};
pub use raster::RasterImage;
pub use watcher::{DomMutation, InputWatcher};
