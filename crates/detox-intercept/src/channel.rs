//! Request/response channel between the page side and the service
//!
//! Every request gets its own `oneshot` reply slot. The service answers each
//! request on a separate task, so a slow analysis never holds up a status
//! query. The page side bounds the wait with [`request_analysis`]; when the
//! deadline passes the reply slot is dropped and a late answer is discarded.

use crate::error::{InterceptError, Result};
use async_trait::async_trait;
use detox_guard::{AnalysisResult, DetoxService, Request, Response};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Error text when the service answers an analysis request with something else
pub const NO_RESPONSE: &str = "No response";

const COMMAND_BUFFER: usize = 64;

/// Sends one request and waits for its reply
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response>;
}

/// Command queued for the service loop
#[derive(Debug)]
struct ServiceCommand {
    request: Request,
    respond_to: oneshot::Sender<Response>,
}

/// In-process channel to a [`DetoxService`]
#[derive(Clone)]
pub struct ServiceChannel {
    tx: mpsc::Sender<ServiceCommand>,
}

impl ServiceChannel {
    /// Start the service loop on the current runtime
    pub fn spawn(service: Arc<DetoxService>) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(serve(service, rx));
        Self { tx }
    }
}

async fn serve(service: Arc<DetoxService>, mut rx: mpsc::Receiver<ServiceCommand>) {
    while let Some(command) = rx.recv().await {
        let service = service.clone();
        tokio::spawn(async move {
            let name = command.request.name();
            let reply = service.handle(command.request).await;
            if command.respond_to.send(reply).is_err() {
                debug!(message = name, "Requester stopped waiting, reply dropped");
            }
        });
    }
    debug!("Service channel closed");
}

#[async_trait]
impl MessageChannel for ServiceChannel {
    async fn send(&self, request: Request) -> Result<Response> {
        let (respond_to, reply) = oneshot::channel();
        self.tx
            .send(ServiceCommand {
                request,
                respond_to,
            })
            .await
            .map_err(|_| InterceptError::ChannelClosed("service is not running".into()))?;

        reply
            .await
            .map_err(|_| InterceptError::ChannelClosed("service dropped the request".into()))
    }
}

/// Ask the service to analyze one image, giving up after `timeout`.
///
/// Never fails: a missed deadline yields `"Timeout"`, a broken channel its
/// error text and an unexpected reply [`NO_RESPONSE`].
pub async fn request_analysis(
    channel: &dyn MessageChannel,
    image_data_url: String,
    timeout: Duration,
) -> AnalysisResult {
    let request = Request::AnalyzeImage {
        image: image_data_url,
    };

    match tokio::time::timeout(timeout, channel.send(request)).await {
        Ok(Ok(Response::Analysis(result))) => result,
        Ok(Ok(other)) => {
            warn!(reply = ?other, "Unexpected reply to analysis request");
            AnalysisResult::failure(NO_RESPONSE)
        }
        Ok(Err(e)) => AnalysisResult::failure(e.to_string()),
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "Analysis reply timed out");
            AnalysisResult::timeout()
        }
    }
}

/// Send without waiting for the reply
pub fn send_detached(channel: Arc<dyn MessageChannel>, request: Request) {
    tokio::spawn(async move {
        let name = request.name();
        if let Err(e) = channel.send(request).await {
            debug!(message = name, error = %e, "Fire-and-forget message failed");
        }
    });
}
