//! Per-file processing: analyze, redact, re-encode

use crate::channel::{request_analysis, send_detached, MessageChannel};
use crate::dom::{ProcessedFile, UploadedFile};
use crate::error::Result;
use crate::notify::{NotificationKind, Notifier};
use crate::raster::RasterImage;
use async_trait::async_trait;
use detox_guard::audit::AuditLogger;
use detox_guard::config::RedactionConfig;
use detox_guard::{
    compute_redactions, AuditOutcome, DetoxConfig, RedactionParams, Request, ScanContext,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Turns a captured file list into the list handed back to the page
#[async_trait]
pub trait FileProcessor: Send + Sync {
    /// One output per input, same order
    async fn process_all(&self, files: &[UploadedFile]) -> Result<Vec<ProcessedFile>>;
}

/// What happened to one image
#[derive(Debug)]
enum ImageOutcome {
    /// Backend could not be reached or refused
    Unavailable { reason: String },
    /// Analyzed, nothing to fill
    Clean,
    Redacted { file: UploadedFile, count: usize },
}

/// The standard processor: backend analysis plus raster redaction
pub struct Pipeline {
    channel: Arc<dyn MessageChannel>,
    notifier: Arc<dyn Notifier>,
    audit: AuditLogger,
    redaction: RedactionConfig,
    params: RedactionParams,
    response_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        config: &DetoxConfig,
        channel: Arc<dyn MessageChannel>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            channel,
            notifier,
            audit: AuditLogger::new(config.audit.clone()),
            params: RedactionParams::from(&config.redaction),
            redaction: config.redaction.clone(),
            response_timeout: Duration::from_millis(config.interceptor.response_timeout_ms),
        }
    }

    /// Process one image. Only decode and encode failures are errors.
    async fn process_image(&self, file: &UploadedFile) -> Result<ImageOutcome> {
        self.notifier.update_status("Preparing image...");
        let data_url = file.to_data_url();
        let mut raster = RasterImage::decode(&file.bytes)?;

        self.notifier.update_status("Analyzing...");
        let result =
            request_analysis(self.channel.as_ref(), data_url, self.response_timeout).await;

        if !result.success {
            self.notifier.update_status("API unavailable");
            let reason = result
                .error
                .unwrap_or_else(|| "Analysis failed".to_string());
            return Ok(ImageOutcome::Unavailable { reason });
        }

        if result.detections.is_empty() {
            self.notifier.update_status("No sensitive info found");
            return Ok(ImageOutcome::Clean);
        }

        debug!(file = %file.name, detections = result.detections.len(), "Sensitive items found");
        self.notifier.update_status(&format!(
            "Redacting {} item(s)...",
            result.detections.len()
        ));

        let rects = compute_redactions(
            &result.detections,
            result.effective_scale(),
            raster.width(),
            raster.height(),
            &self.params,
        );
        if rects.is_empty() {
            debug!(file = %file.name, "Every detection was rejected, nothing to fill");
            self.notifier.update_status("Done - 0 item(s) redacted");
            return Ok(ImageOutcome::Clean);
        }

        let count = raster.fill(&rects, self.redaction.color);
        let (bytes, media_type) = raster.encode(&file.media_type, self.redaction.jpeg_quality)?;
        self.notifier
            .update_status(&format!("Done - {} item(s) redacted", count));

        Ok(ImageOutcome::Redacted {
            file: UploadedFile::new(file.name.clone(), media_type, bytes),
            count,
        })
    }

    fn report(&self, found_sensitive: bool) {
        send_detached(
            self.channel.clone(),
            Request::ScanComplete { found_sensitive },
        );
    }
}

#[async_trait]
impl FileProcessor for Pipeline {
    async fn process_all(&self, files: &[UploadedFile]) -> Result<Vec<ProcessedFile>> {
        let mut processed = Vec::with_capacity(files.len());

        for file in files {
            if !file.is_image() {
                debug!(file = %file.name, media_type = %file.media_type, "Passing non-image through");
                processed.push(ProcessedFile::Original(file.clone()));
                continue;
            }

            self.notifier.update_status("Scanning image...");
            let context = ScanContext::new(file.name.clone(), file.media_type.clone());
            let start = Instant::now();

            let (result, outcome) = match self.process_image(file).await {
                Ok(ImageOutcome::Redacted { file: redacted, count }) => {
                    self.report(true);
                    self.notifier.notify(
                        &format!("Redacted {} sensitive item(s)", count),
                        NotificationKind::Success,
                    );
                    (
                        ProcessedFile::Redacted {
                            file: redacted,
                            redactions: count,
                        },
                        AuditOutcome::Redacted { count },
                    )
                }
                Ok(ImageOutcome::Clean) => {
                    self.report(false);
                    self.notifier
                        .notify("No sensitive info found", NotificationKind::Info);
                    (ProcessedFile::Original(file.clone()), AuditOutcome::Clean)
                }
                Ok(ImageOutcome::Unavailable { reason }) => {
                    self.report(false);
                    warn!(file = %file.name, error = %reason, "Analysis unavailable, forwarding original");
                    self.notifier.notify(&reason, NotificationKind::Error);
                    (
                        ProcessedFile::Original(file.clone()),
                        AuditOutcome::PassedThrough { reason },
                    )
                }
                Err(e) => {
                    warn!(file = %file.name, error = %e, "Processing failed, forwarding original");
                    self.notifier.notify(
                        &format!("Processing failed: {}", e),
                        NotificationKind::Error,
                    );
                    (
                        ProcessedFile::Original(file.clone()),
                        AuditOutcome::PassedThrough {
                            reason: e.to_string(),
                        },
                    )
                }
            };

            self.audit.log(
                &context,
                &file.bytes,
                outcome,
                start.elapsed().as_millis() as u64,
            );
            processed.push(result);
        }

        info!(
            files = files.len(),
            redacted = processed.iter().filter(|p| p.redactions() > 0).count(),
            "Upload processed"
        );
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use detox_guard::{AnalysisResult, Detection, Response, HOSTED_UNAVAILABLE};
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Answers analysis with a fixed result and records every request
    struct ScriptedChannel {
        result: AnalysisResult,
        seen: Mutex<Vec<Request>>,
    }

    impl ScriptedChannel {
        fn new(result: AnalysisResult) -> Arc<Self> {
            Arc::new(Self {
                result,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<Request> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageChannel for ScriptedChannel {
        async fn send(&self, request: Request) -> Result<Response> {
            self.seen.lock().unwrap().push(request.clone());
            match request {
                Request::AnalyzeImage { .. } => Ok(Response::Analysis(self.result.clone())),
                _ => Ok(Response::ack()),
            }
        }
    }

    /// Toasts in `.0`, status lines in `.1`
    #[derive(Default)]
    struct Toasts(Mutex<Vec<(String, NotificationKind)>>, Mutex<Vec<String>>);

    impl Notifier for Toasts {
        fn show_overlay(&self) {}
        fn hide_overlay(&self) {}
        fn update_status(&self, text: &str) {
            self.1.lock().unwrap().push(text.to_string());
        }
        fn notify(&self, message: &str, kind: NotificationKind) {
            self.0.lock().unwrap().push((message.to_string(), kind));
        }
    }

    fn png(width: u32, height: u32) -> UploadedFile {
        let img: RgbImage = ImageBuffer::from_pixel(width, height, Rgb([250, 250, 250]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        UploadedFile::new("shot.png", "image/png", buffer.into_inner())
    }

    fn pipeline(channel: Arc<ScriptedChannel>, toasts: Arc<Toasts>) -> Pipeline {
        let mut config = DetoxConfig::default();
        config.audit.enabled = false;
        Pipeline::new(&config, channel, toasts)
    }

    #[tokio::test]
    async fn test_redacts_detected_region() {
        let channel = ScriptedChannel::new(AnalysisResult::ok(
            vec![Detection::new("email", 100.0, 100.0, 50.0, 20.0)],
            1.0,
        ));
        let toasts = Arc::new(Toasts::default());
        let pipeline = pipeline(channel.clone(), toasts.clone());

        let out = pipeline.process_all(&[png(800, 600)]).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].redactions(), 1);
        assert_eq!(out[0].file().name, "shot.png");
        assert_eq!(out[0].file().media_type, "image/png");

        let raster = RasterImage::decode(&out[0].file().bytes).unwrap();
        assert_eq!(raster.pixel(100, 100), Some([0, 0, 0, 255]));
        assert_eq!(raster.pixel(10, 10), Some([250, 250, 250, 255]));

        assert_eq!(
            toasts.0.lock().unwrap()[0],
            ("Redacted 1 sensitive item(s)".to_string(), NotificationKind::Success)
        );
    }

    #[tokio::test]
    async fn test_all_detections_rejected() {
        // 700 wide plus margins is beyond 80% of an 800 px canvas
        let channel = ScriptedChannel::new(AnalysisResult::ok(
            vec![Detection::new("banner", 0.0, 0.0, 700.0, 20.0)],
            1.0,
        ));
        let toasts = Arc::new(Toasts::default());
        let pipeline = pipeline(channel, toasts.clone());

        let file = png(800, 600);
        let out = pipeline.process_all(&[file.clone()]).await.unwrap();
        assert_eq!(out, vec![ProcessedFile::Original(file)]);

        let statuses = toasts.1.lock().unwrap().clone();
        assert_eq!(
            &statuses[statuses.len() - 2..],
            &["Redacting 1 item(s)...", "Done - 0 item(s) redacted"]
        );
        assert!(!statuses.iter().any(|s| s == "No sensitive info found"));
        assert_eq!(
            toasts.0.lock().unwrap()[0],
            ("No sensitive info found".to_string(), NotificationKind::Info)
        );
    }

    #[tokio::test]
    async fn test_unavailable_backend_forwards_original() {
        let channel = ScriptedChannel::new(AnalysisResult::failure(HOSTED_UNAVAILABLE));
        let toasts = Arc::new(Toasts::default());
        let pipeline = pipeline(channel, toasts.clone());

        let file = png(50, 50);
        let out = pipeline.process_all(&[file.clone()]).await.unwrap();
        assert_eq!(out, vec![ProcessedFile::Original(file)]);
        assert_eq!(toasts.0.lock().unwrap()[0].1, NotificationKind::Error);
    }

    #[tokio::test]
    async fn test_undecodable_image_falls_back() {
        let channel = ScriptedChannel::new(AnalysisResult::ok(vec![], 1.0));
        let toasts = Arc::new(Toasts::default());
        let pipeline = pipeline(channel.clone(), toasts.clone());

        let broken = UploadedFile::new("x.png", "image/png", &b"garbage"[..]);
        let out = pipeline.process_all(&[broken.clone()]).await.unwrap();

        assert_eq!(out, vec![ProcessedFile::Original(broken)]);
        assert!(toasts.0.lock().unwrap()[0].0.starts_with("Processing failed: "));
        // never reached the backend
        assert!(channel.seen().is_empty());
    }

    #[tokio::test]
    async fn test_order_and_non_images_preserved() {
        let channel = ScriptedChannel::new(AnalysisResult::ok(vec![], 1.0));
        let pipeline = pipeline(channel.clone(), Arc::new(Toasts::default()));

        let doc = UploadedFile::new("notes.pdf", "application/pdf", &b"%PDF"[..]);
        let files = vec![png(10, 10), doc.clone(), png(12, 12)];
        let out = pipeline.process_all(&files).await.unwrap();

        assert_eq!(out.len(), 3);
        assert_eq!(out[1], ProcessedFile::Original(doc));
        assert_eq!(out[2].file(), &files[2]);

        let analyses = channel
            .seen()
            .iter()
            .filter(|r| matches!(r, Request::AnalyzeImage { .. }))
            .count();
        assert_eq!(analyses, 2);
    }

    #[tokio::test]
    async fn test_audit_file_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mut config = DetoxConfig::default();
        config.audit.log_file = Some(path.to_string_lossy().into_owned());

        let channel = ScriptedChannel::new(AnalysisResult::ok(vec![], 1.0));
        let pipeline = Pipeline::new(&config, channel, Arc::new(Toasts::default()));
        pipeline.process_all(&[png(10, 10)]).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 1);
        assert!(written.contains("shot.png"));
    }
}
