//! SETJA Capture - Region Capture to Shared Memory
//!
//! Captures a hot-reloadable rectangle of the desktop and publishes each
//! frame into a named shared-memory segment guarded by a seqlock, for an
//! out-of-process consumer (OCR, automation) to read.

pub mod app;
pub mod capture;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod platform;
pub mod region;
pub mod shm;
mod utils;

// Re-export commonly used types
pub use app::{CaptureContext, DesktopSize, Region, SharedRegionState};
pub use capture::{CaptureBackend, CaptureEngine, CaptureError, CaptureExit, CaptureStats};
pub use config::Settings;
pub use region::{parse_descriptor, write_descriptor, RegionError, RegionWatcher};
pub use shm::{Frame, FrameChannel, FrameHeader, FrameReader, ReadOutcome, ShmError};
