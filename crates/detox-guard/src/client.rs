//! Analysis client for the remote detection backend

use crate::config::ClientConfig;
use crate::error::{DetoxError, Result};
use crate::profile::ProfileRegistry;
use crate::types::{AnalysisResult, PrivacyPolicy, ServerMode, ServerProfile, HOSTED_UNAVAILABLE};
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Request body for `POST /analyze`
#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    image: &'a str,
}

/// Talks to whichever server profile is active
pub struct AnalysisClient {
    config: ClientConfig,
    profiles: Arc<ProfileRegistry>,
    client: reqwest::Client,
}

impl AnalysisClient {
    /// Create a new analysis client
    pub fn new(config: ClientConfig, profiles: Arc<ProfileRegistry>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(&config.user_agent)
                .build()
                .unwrap_or_default(),
            config,
            profiles,
        }
    }

    /// Shared profile registry
    pub fn profiles(&self) -> &Arc<ProfileRegistry> {
        &self.profiles
    }

    /// Analyze one data-URL encoded image.
    ///
    /// Never fails: every problem is folded into an unsuccessful
    /// [`AnalysisResult`]. A 429 answer is reported as rate limiting, a missed
    /// deadline as `"Timeout"`, and any other failure against the hosted
    /// server as a hint to switch to local mode.
    pub async fn analyze(&self, image_data_url: &str) -> AnalysisResult {
        let profile = self.profiles.active().await;
        let start = Instant::now();
        let timeout = Duration::from_millis(self.config.timeout_ms);

        debug!(mode = %profile.mode, "Sending image for analysis");

        let outcome = tokio::time::timeout(timeout, self.post_analyze(&profile, image_data_url))
            .await
            .unwrap_or(Err(DetoxError::Timeout(self.config.timeout_ms)));

        match outcome {
            Ok(result) => {
                info!(
                    mode = %profile.mode,
                    detections = result.detections.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Analysis complete"
                );
                result
            }
            Err(DetoxError::RateLimited(_)) => AnalysisResult::rate_limited(),
            Err(DetoxError::Timeout(_)) => {
                error!(mode = %profile.mode, timeout_ms = self.config.timeout_ms, "Analysis timed out");
                AnalysisResult::timeout()
            }
            Err(e) => {
                error!(mode = %profile.mode, error = %e, "Analysis request failed");
                if profile.mode == ServerMode::Hosted {
                    AnalysisResult::failure(HOSTED_UNAVAILABLE)
                } else {
                    AnalysisResult::failure(e.to_string())
                }
            }
        }
    }

    async fn post_analyze(&self, profile: &ServerProfile, image: &str) -> Result<AnalysisResult> {
        let response = self
            .client
            .post(profile.endpoint("analyze"))
            .json(&AnalyzeRequest { image })
            .send()
            .await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(DetoxError::RateLimited(profile.base_url.clone()));
        }

        if !response.status().is_success() {
            return Err(DetoxError::Http {
                status: response.status().as_u16(),
            });
        }

        let result: AnalysisResult = response
            .json()
            .await
            .map_err(|e| DetoxError::Network(format!("Failed to parse response: {}", e)))?;

        Ok(result)
    }

    /// Whether `profile` answers `GET /health` in time
    pub async fn health(&self, profile: &ServerProfile) -> bool {
        let request = self
            .client
            .get(profile.endpoint("health"))
            .timeout(Duration::from_millis(self.config.health_timeout_ms))
            .send();

        match request.await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(url = %profile.base_url, error = %e, "Health check failed");
                false
            }
        }
    }

    /// Health of the active profile
    pub async fn health_active(&self) -> bool {
        let profile = self.profiles.active().await;
        self.health(&profile).await
    }

    /// Fetch the active server's privacy policy
    pub async fn privacy_policy(&self) -> Option<PrivacyPolicy> {
        let profile = self.profiles.active().await;
        let response = self
            .client
            .get(profile.endpoint("privacy"))
            .timeout(Duration::from_millis(self.config.timeout_ms))
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            return None;
        }

        response.json().await.ok()
    }
}
