//! Upload interceptor: one state machine per file input
//!
//! ```text
//!          user change            files processed            grace elapsed
//!   Idle ───────────────► Capturing ───────────────► HandingOff ─────────────► Idle
//!                          │  ▲                         │
//!                          └──┘ further changes          └─ own synthetic change
//!                             suppressed                    passes through
//! ```
//!
//! The Idle→Capturing step happens synchronously inside the change listener:
//! the event is suppressed and the input's file list emptied before any
//! asynchronous work starts, so the host page never sees the original files.
//! Every run ends in a handoff. If processing fails the original files are
//! handed back.

use crate::dom::{ChangeEvent, FileInput, InputId, ProcessedFile, UploadedFile};
use crate::error::{InterceptError, Result};
use crate::notify::{NotificationKind, Notifier};
use crate::pipeline::FileProcessor;
use detox_guard::config::InterceptorConfig;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Interceptor state for one input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Idle = 0,
    Capturing = 1,
    HandingOff = 2,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Phase::Capturing,
            2 => Phase::HandingOff,
            _ => Phase::Idle,
        }
    }
}

/// What the listener did with a change event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Left alone for the host page
    PassThrough,
    /// Cancelled without starting a run
    Suppressed,
    /// Cancelled and a processing run started
    Captured,
}

/// Process-wide enable switch
#[derive(Debug, Clone)]
pub struct EnabledFlag(Arc<AtomicBool>);

impl EnabledFlag {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }

    /// Track toggle broadcasts until the sender goes away
    pub fn follow(&self, mut toggles: broadcast::Receiver<bool>) -> JoinHandle<()> {
        let flag = self.clone();
        tokio::spawn(async move {
            loop {
                match toggles.recv().await {
                    Ok(enabled) => {
                        flag.set(enabled);
                        info!(enabled, "Detox toggled");
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Missed toggle broadcasts");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for EnabledFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Suspends an input's native upload, processes the files and hands them back
pub struct Interceptor {
    input: Arc<dyn FileInput>,
    phase: AtomicU8,
    enabled: EnabledFlag,
    processor: Arc<dyn FileProcessor>,
    notifier: Arc<dyn Notifier>,
    handoff_delay: Duration,
    handoff_grace: Duration,
    runs: AtomicUsize,
    current_run: Mutex<Option<JoinHandle<()>>>,
}

impl Interceptor {
    pub fn new(
        input: Arc<dyn FileInput>,
        enabled: EnabledFlag,
        processor: Arc<dyn FileProcessor>,
        notifier: Arc<dyn Notifier>,
        config: &InterceptorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            input,
            phase: AtomicU8::new(Phase::Idle as u8),
            enabled,
            processor,
            notifier,
            handoff_delay: Duration::from_millis(config.handoff_delay_ms),
            handoff_grace: Duration::from_millis(config.handoff_grace_ms),
            runs: AtomicUsize::new(0),
            current_run: Mutex::new(None),
        })
    }

    pub fn id(&self) -> InputId {
        self.input.id()
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Number of processing runs started so far
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// React to a change event on the input
    pub fn handle_change(self: &Arc<Self>, event: &ChangeEvent) -> Disposition {
        match self.phase() {
            Phase::HandingOff => {
                trace!(input = %self.id(), "Own handoff event");
                return Disposition::PassThrough;
            }
            _ if !self.enabled.get() => return Disposition::PassThrough,
            Phase::Capturing => {
                event.suppress();
                debug!(input = %self.id(), "Upload already in progress, change suppressed");
                return Disposition::Suppressed;
            }
            Phase::Idle => {}
        }

        let files = self.input.files();
        if files.is_empty() {
            return Disposition::PassThrough;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(input = %self.id(), "No async runtime, upload not intercepted");
                return Disposition::PassThrough;
            }
        };

        if self
            .phase
            .compare_exchange(
                Phase::Idle as u8,
                Phase::Capturing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            event.suppress();
            return Disposition::Suppressed;
        }

        event.suppress();
        self.input.set_files(Vec::new());
        self.runs.fetch_add(1, Ordering::SeqCst);
        info!(input = %self.id(), files = files.len(), "Intercepted upload, processing");

        let run = runtime.spawn(self.clone().run(files));
        *self
            .current_run
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(run);

        Disposition::Captured
    }

    /// Wait for the latest run, if any, to reach Idle
    pub async fn wait_idle(&self) {
        let run = self
            .current_run
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(run) = run {
            if let Err(e) = run.await {
                error!(input = %self.id(), error = %e, "Interceptor run failed");
            }
        }
    }

    async fn run(self: Arc<Self>, originals: Vec<UploadedFile>) {
        let id = self.id();
        self.notifier.show_overlay();

        let handoff = match self.process(&originals).await {
            Ok(processed) => processed.into_iter().map(ProcessedFile::into_file).collect(),
            Err(e) => {
                error!(input = %id, error = %e, "Processing error, handing off original files");
                self.notifier
                    .notify(&format!("Processing failed: {}", e), NotificationKind::Error);
                originals
            }
        };

        self.phase.store(Phase::HandingOff as u8, Ordering::SeqCst);

        if self.input.is_connected() {
            info!(input = %id, files = handoff.len(), "Handing off file(s)");
            self.input.set_files(handoff);
            tokio::time::sleep(self.handoff_delay).await;
            self.input.dispatch_change(&ChangeEvent::synthetic());
        } else {
            warn!(input = %id, "Input left the page before handoff");
        }

        self.notifier.hide_overlay();
        tokio::time::sleep(self.handoff_grace).await;
        self.phase.store(Phase::Idle as u8, Ordering::SeqCst);
    }

    /// Run the processor on its own task so a panic still ends in a handoff
    async fn process(&self, files: &[UploadedFile]) -> Result<Vec<ProcessedFile>> {
        let processor = self.processor.clone();
        let owned = files.to_vec();
        let processed = tokio::spawn(async move { processor.process_all(&owned).await })
            .await
            .map_err(|e| InterceptError::Aborted(e.to_string()))??;

        if processed.len() != files.len() {
            return Err(InterceptError::FileCountMismatch {
                expected: files.len(),
                actual: processed.len(),
            });
        }
        Ok(processed)
    }
}
