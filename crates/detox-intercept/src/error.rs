//! Error types for the page side

use thiserror::Error;

/// Result type for interception operations
pub type Result<T> = std::result::Result<T, InterceptError>;

/// Errors raised while processing an intercepted upload
#[derive(Error, Debug)]
pub enum InterceptError {
    /// Picked file is not a decodable image
    #[error("Failed to load image: {0}")]
    Decode(String),

    /// Redacted raster could not be written back
    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// Message channel to the service is gone
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Processing task died before finishing
    #[error("Processing aborted: {0}")]
    Aborted(String),

    /// Processing returned a different number of files than it was given
    #[error("Expected {expected} processed file(s), got {actual}")]
    FileCountMismatch { expected: usize, actual: usize },
}
