//! Core types for Detox Guard

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error text when the hosted backend fails for any reason other than 429
pub const HOSTED_UNAVAILABLE: &str = "Hosted API unavailable. Try switching to local mode.";

/// Error text for a 429 answer
pub const RATE_LIMITED: &str = "Rate limit exceeded. Please wait a moment.";

/// Error text for an analysis that outlived its deadline
pub const TIMEOUT: &str = "Timeout";

/// One sensitive-content finding returned by the analysis backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Finding category as reported by the backend
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Recognised text, if any
    #[serde(default)]
    pub text: String,
    /// Region in the coordinate space of the analyzed copy
    #[serde(default, deserialize_with = "lenient_bbox")]
    pub bbox: Option<BoundingBox>,
}

impl Detection {
    /// Create a detection with a well-formed box
    pub fn new(kind: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            kind: kind.into(),
            text: String::new(),
            bbox: Some(BoundingBox::new(x, y, width, height)),
        }
    }
}

/// Bounding box as sent on the wire. Fields that are missing or not numbers
/// deserialize to `None` so the geometry engine can skip the detection.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(default, deserialize_with = "lenient_number")]
    pub x: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub y: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub width: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub height: Option<f64>,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            width: Some(width),
            height: Some(height),
        }
    }
}

fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_f64()))
}

fn lenient_bbox<'de, D>(deserializer: D) -> std::result::Result<Option<BoundingBox>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .filter(|v| v.is_object())
        .and_then(|v| serde_json::from_value(v).ok()))
}

fn lenient_scale<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_number(deserializer)?.unwrap_or(1.0))
}

fn default_scale() -> f64 {
    1.0
}

/// Outcome of one analysis request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub detections: Vec<Detection>,
    /// `original = detected * scale`
    #[serde(default = "default_scale", deserialize_with = "lenient_scale")]
    pub scale: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    /// Successful analysis
    pub fn ok(detections: Vec<Detection>, scale: f64) -> Self {
        Self {
            success: true,
            detections,
            scale,
            error: None,
        }
    }

    /// Failed analysis with an explanatory message
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            detections: vec![],
            scale: 1.0,
            error: Some(error.into()),
        }
    }

    /// The caller stopped waiting
    pub fn timeout() -> Self {
        Self::failure(TIMEOUT)
    }

    /// The backend answered 429
    pub fn rate_limited() -> Self {
        Self::failure(RATE_LIMITED)
    }

    /// Scale factor safe to multiply with; falls back to 1.0
    pub fn effective_scale(&self) -> f64 {
        crate::geometry::usable_scale(self.scale)
    }

    /// Whether this result carries anything to redact
    pub fn has_detections(&self) -> bool {
        self.success && !self.detections.is_empty()
    }
}

/// Named backend endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    /// Backend on the user's machine
    Local,
    /// Shared hosted backend
    Hosted,
    /// User-supplied URL
    Custom,
}

impl ServerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerMode::Local => "local",
            ServerMode::Hosted => "hosted",
            ServerMode::Custom => "custom",
        }
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerMode {
    type Err = crate::error::DetoxError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(ServerMode::Local),
            "hosted" => Ok(ServerMode::Hosted),
            "custom" => Ok(ServerMode::Custom),
            other => Err(crate::error::DetoxError::InvalidMode(other.to_string())),
        }
    }
}

/// Active server: a mode plus its base URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProfile {
    pub mode: ServerMode,
    pub base_url: String,
}

impl ServerProfile {
    pub fn new(mode: ServerMode, base_url: impl Into<String>) -> Self {
        Self {
            mode,
            base_url: base_url.into(),
        }
    }

    /// Join an API path onto the base URL
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Scan counters shown in the popup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Images analyzed
    pub scanned: u64,
    /// Images with at least one redaction
    pub protected: u64,
}

impl ScanStats {
    pub fn record(&mut self, found_sensitive: bool) {
        self.scanned += 1;
        if found_sensitive {
            self.protected += 1;
        }
    }
}

/// Backend privacy policy document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrivacyPolicy {
    #[serde(default)]
    pub data_collection: DataCollection,
    #[serde(default)]
    pub data_retention: String,
    #[serde(default)]
    pub encryption: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataCollection {
    #[serde(default)]
    pub images: String,
    #[serde(default)]
    pub ocr_results: String,
}

/// Per-file request context for audit logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanContext {
    /// Unique request ID
    pub request_id: Uuid,
    /// File name as seen on the input
    pub file_name: String,
    /// Declared media type
    pub media_type: String,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl ScanContext {
    pub fn new(file_name: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            file_name: file_name.into(),
            media_type: media_type.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Request context
    pub context: ScanContext,
    /// Hash of the original bytes
    pub content_hash: String,
    /// What happened to the file
    pub outcome: AuditOutcome,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

/// Result for audit logging (simplified)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AuditOutcome {
    /// Nothing found, original forwarded
    Clean,
    /// Regions were filled
    Redacted { count: usize },
    /// Analysis or decoding failed, original forwarded
    PassedThrough { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_response() {
        let json = r#"{
            "success": true,
            "detections": [
                {"type": "email", "text": "a@b.co", "bbox": {"x": 10, "y": 20, "width": 30, "height": 8}}
            ],
            "scale": 2.5
        }"#;
        let result: AnalysisResult = serde_json::from_str(json).unwrap();
        assert!(result.success);
        assert_eq!(result.scale, 2.5);
        assert_eq!(result.detections[0].kind, "email");
        assert_eq!(
            result.detections[0].bbox,
            Some(BoundingBox::new(10.0, 20.0, 30.0, 8.0))
        );
    }

    #[test]
    fn test_malformed_bbox_is_lenient() {
        let json = r#"{
            "success": true,
            "detections": [
                {"type": "phone", "text": "x", "bbox": {"x": "12", "y": 4, "width": 3, "height": 3}},
                {"type": "phone", "text": "y", "bbox": "nope"},
                {"type": "phone", "text": "z"}
            ]
        }"#;
        let result: AnalysisResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.detections.len(), 3);
        assert_eq!(result.detections[0].bbox.unwrap().x, None);
        assert_eq!(result.detections[1].bbox, None);
        assert_eq!(result.detections[2].bbox, None);
        assert_eq!(result.scale, 1.0);
    }

    #[test]
    fn test_effective_scale() {
        let mut result = AnalysisResult::ok(vec![], 0.0);
        assert_eq!(result.effective_scale(), 1.0);
        result.scale = f64::NAN;
        assert_eq!(result.effective_scale(), 1.0);
        result.scale = 0.5;
        assert_eq!(result.effective_scale(), 0.5);
    }

    #[test]
    fn test_null_scale() {
        let result: AnalysisResult =
            serde_json::from_str(r#"{"success": true, "detections": [], "scale": null}"#).unwrap();
        assert_eq!(result.scale, 1.0);
    }

    #[test]
    fn test_failure_serializes_error() {
        let value = serde_json::to_value(AnalysisResult::timeout()).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Timeout");
        assert_eq!(value["detections"], serde_json::json!([]));
    }

    #[test]
    fn test_server_mode_parse() {
        assert_eq!("Hosted".parse::<ServerMode>().unwrap(), ServerMode::Hosted);
        assert!("remote".parse::<ServerMode>().is_err());
        assert_eq!(serde_json::to_string(&ServerMode::Local).unwrap(), "\"local\"");
    }

    #[test]
    fn test_endpoint_join() {
        let profile = ServerProfile::new(ServerMode::Local, "http://localhost:8000/");
        assert_eq!(profile.endpoint("/analyze"), "http://localhost:8000/analyze");
    }

    #[test]
    fn test_stats_record() {
        let mut stats = ScanStats::default();
        stats.record(false);
        stats.record(true);
        assert_eq!(stats, ScanStats { scanned: 2, protected: 1 });
    }
}
