//! Messages exchanged between the page-side interceptor and the background service

use crate::types::{AnalysisResult, PrivacyPolicy, ScanStats, ServerMode};
use serde::{Deserialize, Serialize};

/// Requests understood by [`crate::service::DetoxService`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Analyze one data-URL encoded image
    #[serde(rename = "ANALYZE_IMAGE")]
    AnalyzeImage { image: String },

    /// Health of the active server
    #[serde(rename = "CHECK_API")]
    CheckApi,

    /// Everything the popup shows
    #[serde(rename = "GET_STATUS")]
    GetStatus,

    /// Switch to a built-in server mode
    #[serde(rename = "SET_SERVER_MODE")]
    SetServerMode { mode: String },

    /// Switch to a user-supplied server
    #[serde(rename = "SET_CUSTOM_SERVER")]
    SetCustomServer { url: String },

    /// Privacy policy of the active server
    #[serde(rename = "GET_PRIVACY_POLICY")]
    GetPrivacyPolicy,

    /// One image finished scanning
    #[serde(rename = "DETOX_SCAN_COMPLETE")]
    ScanComplete {
        #[serde(rename = "foundSensitive")]
        found_sensitive: bool,
    },

    /// Global enable switch changed
    #[serde(rename = "DETOX_TOGGLE")]
    Toggle { enabled: bool },
}

impl Request {
    /// Wire name of the message
    pub fn name(&self) -> &'static str {
        match self {
            Request::AnalyzeImage { .. } => "ANALYZE_IMAGE",
            Request::CheckApi => "CHECK_API",
            Request::GetStatus => "GET_STATUS",
            Request::SetServerMode { .. } => "SET_SERVER_MODE",
            Request::SetCustomServer { .. } => "SET_CUSTOM_SERVER",
            Request::GetPrivacyPolicy => "GET_PRIVACY_POLICY",
            Request::ScanComplete { .. } => "DETOX_SCAN_COMPLETE",
            Request::Toggle { .. } => "DETOX_TOGGLE",
        }
    }
}

/// Replies, shaped as the JSON payloads the popup and content script expect
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    /// Reply to `ANALYZE_IMAGE`
    Analysis(AnalysisResult),

    /// Reply to `CHECK_API`
    ApiStatus {
        available: bool,
        mode: ServerMode,
        url: String,
    },

    /// Reply to `GET_STATUS`
    #[serde(rename_all = "camelCase")]
    Status {
        enabled: bool,
        stats: ScanStats,
        api_available: bool,
        server_mode: ServerMode,
        server_url: String,
    },

    /// Successful mode switch
    ModeChanged {
        success: bool,
        mode: ServerMode,
        url: String,
    },

    /// Rejected request
    Failure { success: bool, error: String },

    /// Plain acknowledgement
    Ack { success: bool },

    /// Reply to `GET_PRIVACY_POLICY`
    PrivacyPolicy(Option<PrivacyPolicy>),

    /// No payload (broadcasts)
    Empty,
}

impl Response {
    pub fn ack() -> Self {
        Response::Ack { success: true }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Response::Failure {
            success: false,
            error: error.into(),
        }
    }

    /// The analysis payload, if this is an analysis reply
    pub fn into_analysis(self) -> Option<AnalysisResult> {
        match self {
            Response::Analysis(result) => Some(result),
            _ => None,
        }
    }
}
