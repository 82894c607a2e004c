//! Page model: file inputs, picked files and change events
//!
//! [`FileInput`] is the seam to whatever hosts the upload form. Capture
//! listeners run before the host page's own listeners and may stop the event
//! from reaching them. [`MemoryInput`] is a self-contained implementation used
//! by the `detox-scan` binary and by tests.

use base64::Engine as _;
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Stable identity of a file input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputId(pub u64);

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "input#{}", self.0)
    }
}

/// A file the user picked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub media_type: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Whether the declared media type is an image type
    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    /// `data:<type>;base64,<payload>`
    pub fn to_data_url(&self) -> String {
        let media_type = if self.media_type.is_empty() {
            "application/octet-stream"
        } else {
            &self.media_type
        };
        format!(
            "data:{};base64,{}",
            media_type,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

/// What goes back to the page in place of an [`UploadedFile`]
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessedFile {
    /// Forwarded untouched
    Original(UploadedFile),
    /// Re-encoded with `redactions` regions filled
    Redacted {
        file: UploadedFile,
        redactions: usize,
    },
}

impl ProcessedFile {
    pub fn file(&self) -> &UploadedFile {
        match self {
            ProcessedFile::Original(file) => file,
            ProcessedFile::Redacted { file, .. } => file,
        }
    }

    pub fn into_file(self) -> UploadedFile {
        match self {
            ProcessedFile::Original(file) => file,
            ProcessedFile::Redacted { file, .. } => file,
        }
    }

    pub fn redactions(&self) -> usize {
        match self {
            ProcessedFile::Original(_) => 0,
            ProcessedFile::Redacted { redactions, .. } => *redactions,
        }
    }
}

/// A "files changed" event
#[derive(Debug, Default)]
pub struct ChangeEvent {
    /// Raised by a user action rather than by script
    pub trusted: bool,
    default_prevented: AtomicBool,
    propagation_stopped: AtomicBool,
}

impl ChangeEvent {
    /// Event from a file-picker commit
    pub fn user() -> Self {
        Self {
            trusted: true,
            ..Default::default()
        }
    }

    /// Event synthesized by script
    pub fn synthetic() -> Self {
        Self::default()
    }

    /// Cancel default handling and stop propagation
    pub fn suppress(&self) {
        self.default_prevented.store(true, Ordering::SeqCst);
        self.propagation_stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented.load(Ordering::SeqCst)
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped.load(Ordering::SeqCst)
    }
}

/// Callback invoked for every change event on an input
pub type ChangeListener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// A file-upload input element
pub trait FileInput: Send + Sync {
    fn id(&self) -> InputId;

    /// Current file list
    fn files(&self) -> Vec<UploadedFile>;

    /// Replace the file list
    fn set_files(&self, files: Vec<UploadedFile>);

    /// Fire `event` at the input. Listeners run synchronously, capture
    /// listeners first.
    fn dispatch_change(&self, event: &ChangeEvent);

    /// Register a listener that runs ahead of the page's own listeners
    fn add_capture_listener(&self, listener: ChangeListener);

    /// Set the attached marker. Returns `false` if it was already set.
    fn mark_attached(&self) -> bool;

    /// Whether the input is still part of the page
    fn is_connected(&self) -> bool;
}

/// In-memory [`FileInput`] with host-page listeners of its own
pub struct MemoryInput {
    id: InputId,
    files: Mutex<Vec<UploadedFile>>,
    capture_listeners: Mutex<Vec<ChangeListener>>,
    page_listeners: Mutex<Vec<ChangeListener>>,
    attached: AtomicBool,
    connected: AtomicBool,
}

impl MemoryInput {
    pub fn new(id: InputId) -> Self {
        Self {
            id,
            files: Mutex::new(Vec::new()),
            capture_listeners: Mutex::new(Vec::new()),
            page_listeners: Mutex::new(Vec::new()),
            attached: AtomicBool::new(false),
            connected: AtomicBool::new(true),
        }
    }

    /// Register a host-page listener; it only sees events nobody stopped
    pub fn add_page_listener(&self, listener: ChangeListener) {
        lock(&self.page_listeners).push(listener);
    }

    /// Simulate the user committing `files` in the picker
    pub fn user_select(&self, files: Vec<UploadedFile>) -> ChangeEvent {
        self.set_files(files);
        let event = ChangeEvent::user();
        self.dispatch_change(&event);
        event
    }

    /// Take the input out of the page
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl FileInput for MemoryInput {
    fn id(&self) -> InputId {
        self.id
    }

    fn files(&self) -> Vec<UploadedFile> {
        lock(&self.files).clone()
    }

    fn set_files(&self, files: Vec<UploadedFile>) {
        *lock(&self.files) = files;
    }

    fn dispatch_change(&self, event: &ChangeEvent) {
        // snapshot so listeners may re-enter the input
        let capture = lock(&self.capture_listeners).clone();
        for listener in capture {
            listener(event);
            if event.is_propagation_stopped() {
                return;
            }
        }

        let page = lock(&self.page_listeners).clone();
        for listener in page {
            listener(event);
        }
    }

    fn add_capture_listener(&self, listener: ChangeListener) {
        lock(&self.capture_listeners).push(listener);
    }

    fn mark_attached(&self) -> bool {
        !self.attached.swap(true, Ordering::SeqCst)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
