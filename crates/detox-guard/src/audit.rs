//! Audit logging for processed uploads

use crate::config::AuditConfig;
use crate::types::{AuditEntry, AuditOutcome, ScanContext};

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Write;

use tracing::{info, warn};

/// Audit logger
pub struct AuditLogger {
    config: AuditConfig,
}

impl AuditLogger {
    /// Create a new audit logger
    pub fn new(config: AuditConfig) -> Self {
        Self { config }
    }

    /// Record what happened to one file. Only a hash of the bytes is kept.
    pub fn log(
        &self,
        context: &ScanContext,
        content: &[u8],
        outcome: AuditOutcome,
        duration_ms: u64,
    ) -> Option<AuditEntry> {
        if !self.config.enabled {
            return None;
        }

        let entry = AuditEntry {
            context: context.clone(),
            content_hash: hash_content(content),
            outcome,
            processing_time_ms: duration_ms,
        };

        self.emit(&entry);
        Some(entry)
    }

    fn emit(&self, entry: &AuditEntry) {
        match &entry.outcome {
            AuditOutcome::PassedThrough { reason } => warn!(
                request_id = %entry.context.request_id,
                file = %entry.context.file_name,
                content_hash = %entry.content_hash,
                reason = %reason,
                processing_time_ms = entry.processing_time_ms,
                "Upload passed through unredacted"
            ),
            outcome => info!(
                request_id = %entry.context.request_id,
                file = %entry.context.file_name,
                media_type = %entry.context.media_type,
                content_hash = %entry.content_hash,
                outcome = ?outcome,
                processing_time_ms = entry.processing_time_ms,
                "Upload scanned"
            ),
        }

        if let Some(ref path) = self.config.log_file {
            if let Ok(json) = serde_json::to_string(entry) {
                let written = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .and_then(|mut f| writeln!(f, "{json}"));
                if let Err(e) = written {
                    warn!(path = %path, error = %e, "Could not append audit entry");
                }
            }
        }
    }
}

/// Hash content for audit (privacy-preserving)
fn hash_content(content: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}
