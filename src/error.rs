//! Error types for the acquisition-and-detection pipeline.
//!
//! `CaptureError` consolidates the error kinds named in the error handling
//! design: device-open failures (fatal at startup), per-frame decode
//! failures (logged and skipped), and driver read failures (fatal to the
//! running pipeline). Using `thiserror`, each variant carries just enough
//! context to log or report without the caller having to downcast.

use thiserror::Error;

/// Convenience alias for results using the pipeline's error type.
pub type CaptureResult<T> = std::result::Result<T, CaptureError>;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("device busy: {0}")]
    DeviceBusy(String),

    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to memory-map capture buffers: {0}")]
    MapFailed(String),

    #[error("failed to start streaming: {0}")]
    StreamStartFailed(String),

    #[error("failed to decode frame: {0}")]
    DecodeFailed(String),

    #[error("driver read failure: {0}")]
    DriverReadFailure(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
