//! Capture error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Capture initialization failed: {0}")]
    InitFailed(String),

    #[error("Desktop duplication unavailable: {0}")]
    DuplicationUnavailable(String),

    #[error("Staging surface creation failed for {width}x{height}: {reason}")]
    StagingFailed {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("Frame acquisition failed: {0}")]
    AcquireFailed(String),

    #[error("Capture device is not initialized")]
    NotInitialized,
}

pub type CaptureResult<T> = Result<T, CaptureError>;
