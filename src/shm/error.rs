//! Shared-memory transport error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShmError {
    #[error("Invalid segment name: {0:?}")]
    InvalidName(String),

    #[error("Refusing to map an empty segment")]
    EmptySegment,

    #[error("{op} failed: {source}")]
    Os {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[cfg(windows)]
    #[error("{op} failed: {source}")]
    Windows {
        op: &'static str,
        #[source]
        source: windows::core::Error,
    },

    #[error("Segment of {bytes} bytes cannot hold the {header}-byte frame header")]
    BelowHeader { bytes: usize, header: usize },

    #[error("Mapped segment is {actual} bytes, {requested} requested")]
    Undersized { requested: usize, actual: usize },

    #[error("Segment holds foreign data (magic {magic:#010x})")]
    ForeignSegment { magic: u32 },

    #[error("Source rows too short: {available} bytes for {height} rows of pitch {row_pitch}")]
    SourceTooShort {
        available: usize,
        row_pitch: usize,
        height: u32,
    },

    #[error("Frame of {width}x{height} does not fit the header fields")]
    FrameTooLarge { width: u32, height: u32 },
}

impl ShmError {
    /// Wrap the calling thread's last OS error
    #[cfg_attr(windows, allow(dead_code))]
    pub(crate) fn last_os(op: &'static str) -> Self {
        ShmError::Os {
            op,
            source: std::io::Error::last_os_error(),
        }
    }
}

pub type ShmResult<T> = Result<T, ShmError>;
