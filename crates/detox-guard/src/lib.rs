//! # Detox Guard
//!
//! Service side of Detox: decides *what* to black out in an outgoing image.
//!
//! Detox sits between a social-media page and its upload endpoint. Before the
//! browser transmits a picked image, the page side ships it to this crate's
//! [`DetoxService`], which asks a remote detection backend for sensitive
//! regions (addresses, phone numbers, faces of documents, ...). The page side
//! then turns those detections into opaque rectangles with
//! [`geometry::compute_redactions`].
//!
//! - **Analysis Client**: bounded-latency calls to a pluggable backend
//! - **Server Profiles**: `local` / `hosted` / `custom`, switchable at runtime
//! - **Redaction Geometry**: detector boxes to bounds-safe fill rectangles
//! - **Message Protocol**: the request/response pairs the page and popup use
//! - **Audit**: per-upload outcome log without image content
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use detox_guard::{DetoxService, Request, Response};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = DetoxService::builder().build();
//!     service.start().await?;
//!
//!     let reply = service
//!         .handle(Request::AnalyzeImage {
//!             image: "data:image/png;base64,iVBORw0KGgo=".to_string(),
//!         })
//!         .await;
//!
//!     if let Response::Analysis(result) = reply {
//!         println!("{} detection(s)", result.detections.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  Request   ┌───────────────┐  POST /analyze  ┌──────────┐
//! │ Page side    │ ─────────► │ DetoxService  │ ──────────────► │ Backend  │
//! │ (intercept)  │ ◄───────── │  ┌─────────┐  │ ◄────────────── │ (OCR)    │
//! └──────────────┘  Response  │  │ Client  │  │                 └──────────┘
//!                             │  │ Profiles│  │
//!                             │  │ Store   │  │
//!                             │  │ Audit   │  │
//!                             │  └─────────┘  │
//!                             └───────────────┘
//! ```

pub mod audit;
pub mod client;
pub mod config;
pub mod error;
pub mod geometry;
pub mod profile;
pub mod protocol;
pub mod service;
pub mod store;
pub mod types;

pub use client::AnalysisClient;
pub use config::DetoxConfig;
pub use error::{DetoxError, Result};
pub use geometry::{compute_redactions, Rect, RedactionParams};
pub use protocol::{Request, Response};
pub use service::DetoxService;
pub use types::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::DetoxConfig;
    pub use crate::error::{DetoxError, Result};
    pub use crate::geometry::{compute_redactions, Rect, RedactionParams};
    pub use crate::protocol::{Request, Response};
    pub use crate::service::DetoxService;
    pub use crate::types::*;
}
