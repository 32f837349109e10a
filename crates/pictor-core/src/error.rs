//! Error types module
//!
//! Every way a pipeline run can end other than success is a `PipelineError`.
//! Errors fall in two families:
//!
//! - **Rejections**: the input itself is unacceptable (wrong format, too large,
//!   malicious). Retrying the same bytes will never succeed.
//! - **Failures**: the system could not finish processing an input that may be
//!   fine (codec failure, timeout, scanner outage, no capacity).
//!
//! Client-facing text comes from [`ErrorMetadata::client_message`], which never
//! carries internal detail such as malware signature names or codec messages.

use crate::constants::BYTES_PER_MB;

/// Client message shared by every failure that is not the input's fault
pub const PROCESSING_FAILED_MESSAGE: &str = "Image processing failed";

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected rejections of bad input
    Debug,
    /// Warning level - for security events and transient capacity issues
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error reporting - defines how an error should be presented to the
/// uploader and to the operator
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "FILE_TOO_LARGE")
    fn error_code(&self) -> &'static str;

    /// Whether the input was at fault (as opposed to the system)
    fn is_rejection(&self) -> bool;

    /// Whether this error is recoverable (the caller may retry the same upload)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the uploader
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (differs from the internal error message)
    fn client_message(&self) -> String;

    /// Whether the internal message must stay out of client responses
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("Unsupported or unrecognized file format")]
    UnsupportedFormat,

    #[error("File too large: {size} bytes exceeds limit of {max} bytes")]
    FileTooLarge { size: usize, max: usize },

    #[error("Image dimensions {width}x{height} exceed limit of {max} pixels per side")]
    DimensionExceeded { width: u32, height: u32, max: u32 },

    #[error("Suspected decompression bomb: {pixels} pixels exceeds limit of {max}")]
    PixelBombSuspected { pixels: u64, max: u64 },

    /// `signature` is only ever written to the audit log
    #[error("Malware detected")]
    RejectedMalware { signature: String },

    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    #[error("Encode failed: {0}")]
    EncodeFailed(String),

    #[error("Stage '{stage}' timed out after {timeout_ms} ms")]
    Timeout { stage: &'static str, timeout_ms: u64 },

    #[error("Malware scanner unavailable: {0}")]
    ScannerUnavailable(String),

    #[error("No processing slot became available within {waited_ms} ms")]
    GovernorExhausted { waited_ms: u64 },

    #[error("Processing cancelled")]
    Cancelled,

    #[error("Processing engine is shutting down")]
    ShuttingDown,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Static metadata for each variant: (error_code, rejection, recoverable, suggested_action, sensitive, log_level).
/// client_message stays per-variant for dynamic content.
fn pipeline_error_static_metadata(
    err: &PipelineError,
) -> (
    &'static str,
    bool,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        PipelineError::UnsupportedFormat => (
            "UNSUPPORTED_FORMAT",
            true,
            false,
            Some("Upload a JPEG, PNG, GIF or WebP image"),
            false,
            LogLevel::Debug,
        ),
        PipelineError::FileTooLarge { .. } => (
            "FILE_TOO_LARGE",
            true,
            false,
            Some("Reduce the file size and upload again"),
            false,
            LogLevel::Debug,
        ),
        PipelineError::DimensionExceeded { .. } => (
            "DIMENSION_EXCEEDED",
            true,
            false,
            Some("Downscale the image and upload again"),
            false,
            LogLevel::Debug,
        ),
        PipelineError::PixelBombSuspected { .. } => (
            "PIXEL_BOMB_SUSPECTED",
            true,
            false,
            Some("Downscale the image and upload again"),
            false,
            LogLevel::Warn,
        ),
        PipelineError::RejectedMalware { .. } => (
            "MALWARE_DETECTED",
            true,
            false,
            None,
            true,
            LogLevel::Warn,
        ),
        PipelineError::DecodeFailed(_) => (
            "DECODE_FAILED",
            false,
            false,
            Some("Check that the file is a valid, uncorrupted image"),
            true,
            LogLevel::Warn,
        ),
        PipelineError::EncodeFailed(_) => (
            "ENCODE_FAILED",
            false,
            false,
            Some("Contact support if this error persists"),
            true,
            LogLevel::Error,
        ),
        PipelineError::Timeout { .. } => (
            "PROCESSING_TIMEOUT",
            false,
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Warn,
        ),
        PipelineError::ScannerUnavailable(_) => (
            "SCANNER_UNAVAILABLE",
            false,
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        PipelineError::GovernorExhausted { .. } => (
            "CAPACITY_EXHAUSTED",
            false,
            true,
            Some("Retry after a short delay"),
            false,
            LogLevel::Warn,
        ),
        PipelineError::Cancelled => (
            "CANCELLED",
            false,
            false,
            None,
            false,
            LogLevel::Debug,
        ),
        PipelineError::ShuttingDown => (
            "SHUTTING_DOWN",
            false,
            true,
            Some("Retry after a short delay"),
            false,
            LogLevel::Warn,
        ),
        PipelineError::Internal(_) => (
            "INTERNAL_ERROR",
            false,
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

fn describe_size(bytes: usize) -> String {
    if bytes >= BYTES_PER_MB && bytes % BYTES_PER_MB == 0 {
        format!("{} MiB", bytes / BYTES_PER_MB)
    } else {
        format!("{} bytes", bytes)
    }
}

impl ErrorMetadata for PipelineError {
    fn error_code(&self) -> &'static str {
        pipeline_error_static_metadata(self).0
    }

    fn is_rejection(&self) -> bool {
        pipeline_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        pipeline_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        pipeline_error_static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            PipelineError::UnsupportedFormat => {
                "File is not a supported image format (JPEG, PNG, GIF or WebP)".to_string()
            }
            PipelineError::FileTooLarge { max, .. } => format!(
                "File exceeds the maximum upload size of {}",
                describe_size(*max)
            ),
            PipelineError::DimensionExceeded { max, .. } => format!(
                "Image width and height must not exceed {} pixels",
                max
            ),
            PipelineError::PixelBombSuspected { .. } => {
                "Image resolution is too large to process".to_string()
            }
            PipelineError::RejectedMalware { .. } => {
                "File was rejected by the security scan".to_string()
            }
            PipelineError::DecodeFailed(_)
            | PipelineError::EncodeFailed(_)
            | PipelineError::Timeout { .. }
            | PipelineError::ScannerUnavailable(_)
            | PipelineError::GovernorExhausted { .. }
            | PipelineError::Cancelled
            | PipelineError::ShuttingDown
            | PipelineError::Internal(_) => PROCESSING_FAILED_MESSAGE.to_string(),
        }
    }

    fn is_sensitive(&self) -> bool {
        pipeline_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        pipeline_error_static_metadata(self).5
    }
}
