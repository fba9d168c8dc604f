// capture/mod.rs - Screen Capture Module
//
// The engine loop only talks to a `CaptureBackend`. Each platform provides
// one concrete backend in its own submodule:
// - Windows: DXGI desktop duplication on a hardware D3D11 device
// - elsewhere: a software backend that renders a synthetic desktop

mod engine;
mod error;
mod pacing;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(not(target_os = "windows"))]
pub mod synthetic;

pub use engine::*;
pub use error::*;
pub use pacing::*;

use std::time::Duration;

use crate::app::{DesktopSize, Region};
use crate::config::Settings;
use crate::shm::PixelRows;

/// What happened during one frame acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Nothing new on screen within the timeout
    Timeout,
    /// A frame was cropped, mapped, and handed to the callback
    Delivered,
    /// A frame was acquired but could not be handed over (no matching staging surface)
    Dropped,
    /// The device or duplication interface is gone; reinitialize before the next call
    DeviceLost,
}

/// Platform capture capability used by [`CaptureEngine`].
///
/// Backends own their GPU (or software) resources. They are created and
/// used on the capture thread only.
pub trait CaptureBackend {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Acquire the device and duplication interface; returns the desktop size
    fn init(&mut self) -> CaptureResult<DesktopSize>;

    /// Release everything `init` acquired, including any staging surface
    fn shutdown(&mut self);

    /// Replace the staging surface with one of exactly `width` x `height`
    fn recreate_staging(&mut self, width: u32, height: u32) -> CaptureResult<()>;

    /// Drop the staging surface, if any
    fn release_staging(&mut self);

    /// Wait up to `timeout` for the next desktop frame.
    ///
    /// On success, copies only `crop` into the staging surface, maps it, and
    /// calls `on_frame` with the mapped rows before unmapping. The acquired
    /// frame is released before returning, whatever `on_frame` did.
    fn acquire_next_frame(
        &mut self,
        timeout: Duration,
        crop: &Region,
        on_frame: &mut dyn FnMut(PixelRows<'_>),
    ) -> CaptureResult<AcquireOutcome>;
}

/// Create the platform's capture backend
pub fn create_backend(settings: &Settings) -> Box<dyn CaptureBackend> {
    #[cfg(target_os = "windows")]
    {
        let _ = settings;
        Box::new(windows::DxgiBackend::new())
    }

    #[cfg(not(target_os = "windows"))]
    {
        Box::new(synthetic::SyntheticBackend::new(settings.synthetic_desktop))
    }
}
