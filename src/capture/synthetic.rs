// capture/synthetic.rs - Software Capture Backend
//
// Stands in for desktop duplication on platforms without it. Renders a
// gradient "desktop" that changes every frame at a simulated 60 Hz refresh,
// and hands crops over with a GPU-like padded row pitch.
//
// Pixel (x, y) of frame n is B = x, G = y, R = n, A = 255 (each mod 256).

use std::time::{Duration, Instant};

use log::debug;

use super::{AcquireOutcome, CaptureBackend, CaptureError, CaptureResult};
use crate::app::{DesktopSize, Region};
use crate::constants::shm::BYTES_PER_PIXEL;
use crate::constants::synthetic::ROW_ALIGN;
use crate::shm::PixelRows;

const REFRESH_INTERVAL: Duration = Duration::from_nanos(16_666_667);

struct Staging {
    data: Vec<u8>,
    row_pitch: usize,
    width: u32,
    height: u32,
}

/// Software desktop of a fixed size
pub struct SyntheticBackend {
    desktop: DesktopSize,
    ready: bool,
    next_frame_at: Instant,
    frame_no: u32,
    staging: Option<Staging>,
}

impl SyntheticBackend {
    pub fn new(desktop: DesktopSize) -> Self {
        Self {
            desktop,
            ready: false,
            next_frame_at: Instant::now(),
            frame_no: 0,
            staging: None,
        }
    }

    fn render(staging: &mut Staging, crop: &Region, frame_no: u32) {
        let red = frame_no as u8;
        for row in 0..staging.height as usize {
            let y = crop.top as usize + row;
            let line = &mut staging.data[row * staging.row_pitch..];
            for col in 0..staging.width as usize {
                let x = crop.left as usize + col;
                let px = &mut line[col * BYTES_PER_PIXEL..(col + 1) * BYTES_PER_PIXEL];
                px.copy_from_slice(&[x as u8, y as u8, red, 0xFF]);
            }
        }
    }
}

fn aligned_pitch(width: u32) -> usize {
    let bytes = width as usize * BYTES_PER_PIXEL;
    bytes.div_ceil(ROW_ALIGN) * ROW_ALIGN
}

impl CaptureBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn init(&mut self) -> CaptureResult<DesktopSize> {
        if self.desktop.width == 0 || self.desktop.height == 0 {
            return Err(CaptureError::InitFailed(format!(
                "synthetic desktop {}x{} has no area",
                self.desktop.width, self.desktop.height
            )));
        }
        self.ready = true;
        self.next_frame_at = Instant::now();
        Ok(self.desktop)
    }

    fn shutdown(&mut self) {
        self.ready = false;
        self.staging = None;
    }

    fn recreate_staging(&mut self, width: u32, height: u32) -> CaptureResult<()> {
        self.staging = None;
        if !self.ready {
            return Err(CaptureError::NotInitialized);
        }
        if width == 0 || height == 0 {
            return Err(CaptureError::StagingFailed { width, height, reason: "empty surface".into() });
        }

        let row_pitch = aligned_pitch(width);
        self.staging = Some(Staging {
            data: vec![0; row_pitch * height as usize],
            row_pitch,
            width,
            height,
        });
        debug!("Synthetic staging {}x{} (pitch {})", width, height, row_pitch);
        Ok(())
    }

    fn release_staging(&mut self) {
        self.staging = None;
    }

    fn acquire_next_frame(
        &mut self,
        timeout: Duration,
        crop: &Region,
        on_frame: &mut dyn FnMut(PixelRows<'_>),
    ) -> CaptureResult<AcquireOutcome> {
        if !self.ready {
            return Err(CaptureError::NotInitialized);
        }

        let now = Instant::now();
        if self.next_frame_at > now + timeout {
            std::thread::sleep(timeout);
            return Ok(AcquireOutcome::Timeout);
        }
        if self.next_frame_at > now {
            std::thread::sleep(self.next_frame_at - now);
        }
        // Like a display, skip refreshes that nobody acquired
        self.next_frame_at = Instant::now().max(self.next_frame_at) + REFRESH_INTERVAL;
        self.frame_no = self.frame_no.wrapping_add(1);

        let staging = match self.staging.as_mut() {
            Some(staging) if staging.width == crop.width() as u32 && staging.height == crop.height() as u32 => {
                staging
            }
            _ => return Ok(AcquireOutcome::Dropped),
        };

        Self::render(staging, crop, self.frame_no);
        on_frame(PixelRows {
            data: &staging.data,
            row_pitch: staging.row_pitch,
            width: staging.width,
            height: staging.height,
        });
        Ok(AcquireOutcome::Delivered)
    }
}
