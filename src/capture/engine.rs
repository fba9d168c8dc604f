// capture/engine.rs - Capture Engine
//
// Runs on the dedicated capture thread. Each iteration:
// 1. snapshot region + update counter, clamp to the desktop
// 2. recreate the staging surface if the crop size or counter changed
// 3. acquire the next frame (bounded wait) and publish the crop
// 4. pace to the target frame rate
//
// Device loss gets exactly one in-place reinitialization attempt.

use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use super::{AcquireOutcome, CaptureBackend, CaptureError, FramePacer};
use crate::app::{CaptureContext, DesktopSize, Region};
use crate::constants::{capture::MIN_ACQUIRE_TIMEOUT_MS, exit_code};
use crate::shm::FrameChannel;

/// Why the capture thread stopped
#[derive(Debug)]
pub enum CaptureExit {
    /// The stop flag was observed
    Stopped,
    /// The device could not be created; nothing was captured
    InitFailed(CaptureError),
    /// The device was lost and the single reinitialization attempt failed
    ReinitFailed(CaptureError),
}

impl CaptureExit {
    /// Process exit status for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            CaptureExit::Stopped => exit_code::CLEAN,
            CaptureExit::InitFailed(_) => exit_code::INIT_FAILED,
            CaptureExit::ReinitFailed(_) => exit_code::REINIT_FAILED,
        }
    }
}

/// Counters for one capture-thread lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Frames written to the channel
    pub frames_published: u64,
    /// Acquisitions that saw no new frame
    pub timeouts: u64,
    /// Successful reinitializations after device loss
    pub device_resets: u64,
    /// Staging surfaces created
    pub staging_rebuilds: u64,
    /// Frames the channel could not take
    pub publish_failures: u64,
    /// Acquisitions that failed for other reasons
    pub acquire_errors: u64,
}

impl std::fmt::Display for CaptureStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames published, {} timeouts, {} device resets, {} staging rebuilds, \
             {} publish failures, {} acquire errors",
            self.frames_published,
            self.timeouts,
            self.device_resets,
            self.staging_rebuilds,
            self.publish_failures,
            self.acquire_errors
        )
    }
}

/// Size and counter the current staging surface was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StagingKey {
    width: u32,
    height: u32,
    updates: u64,
}

/// Capture loop bound to one backend and one frame channel
pub struct CaptureEngine {
    backend: Box<dyn CaptureBackend>,
    channel: FrameChannel,
    target_fps: f64,
    stats: CaptureStats,
    announced: bool,
    /// Last staging request that failed, so a persistent failure warns once
    failed_staging: Option<StagingKey>,
}

impl CaptureEngine {
    pub fn new(backend: Box<dyn CaptureBackend>, channel: FrameChannel, target_fps: f64) -> Self {
        Self {
            backend,
            channel,
            target_fps,
            stats: CaptureStats::default(),
            announced: false,
            failed_staging: None,
        }
    }

    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    pub fn channel(&self) -> &FrameChannel {
        &self.channel
    }

    /// Per-frame acquire timeout: `max(1 ms, 1000 / fps)`
    pub fn acquire_timeout(&self) -> Duration {
        acquire_timeout(self.target_fps)
    }

    /// Run until the stop flag is set or the device cannot be (re)created.
    ///
    /// Backend resources are released before returning in every case.
    pub fn run(&mut self, ctx: &CaptureContext) -> CaptureExit {
        let mut desktop = match self.backend.init() {
            Ok(desktop) => desktop,
            Err(e) => {
                error!("Capture backend {} failed to initialize: {}", self.backend.name(), e);
                self.backend.shutdown();
                return CaptureExit::InitFailed(e);
            }
        };
        info!(
            "Capture backend {} ready: desktop {}x{}, target {:.1} fps",
            self.backend.name(),
            desktop.width,
            desktop.height,
            self.target_fps
        );
        if let Some(updates) = ctx.region.write_if_unset(Region::full(desktop)) {
            debug!("No region selected yet, capturing the whole desktop (update {})", updates);
        }

        let timeout = self.acquire_timeout();
        let mut pacer = FramePacer::new(self.target_fps, Instant::now());
        let mut staging: Option<StagingKey> = None;

        let exit = loop {
            if ctx.should_stop() {
                break CaptureExit::Stopped;
            }

            let snapshot = ctx.region.read();
            let crop = snapshot.region.clamp_to(desktop);
            let key = StagingKey {
                width: crop.width() as u32,
                height: crop.height() as u32,
                updates: snapshot.updates,
            };

            if staging != Some(key) {
                staging = self.rebuild_staging(key);
            }

            match self.acquire_and_publish(timeout, &crop) {
                Ok(AcquireOutcome::Timeout) => self.stats.timeouts += 1,
                Ok(AcquireOutcome::Delivered) | Ok(AcquireOutcome::Dropped) => {}
                Ok(AcquireOutcome::DeviceLost) => {
                    staging = None;
                    match self.reinitialize() {
                        Ok(size) => desktop = size,
                        Err(e) => break CaptureExit::ReinitFailed(e),
                    }
                }
                Err(e) => {
                    self.stats.acquire_errors += 1;
                    debug!("Frame acquisition failed: {}", e);
                }
            }

            pacer.wait();
        };

        self.backend.release_staging();
        self.backend.shutdown();

        info!(
            "Capture thread exiting ({:?}), channel {}: {}",
            exit,
            self.channel.name(),
            self.stats
        );
        exit
    }

    fn rebuild_staging(&mut self, key: StagingKey) -> Option<StagingKey> {
        self.backend.release_staging();
        match self.backend.recreate_staging(key.width, key.height) {
            Ok(()) => {
                self.stats.staging_rebuilds += 1;
                debug!(
                    "Staging surface {}x{} for region update {}",
                    key.width, key.height, key.updates
                );
                self.failed_staging = None;
                Some(key)
            }
            Err(e) => {
                if self.failed_staging != Some(key) {
                    warn!("{}", e);
                    self.failed_staging = Some(key);
                } else {
                    debug!("{}", e);
                }
                None
            }
        }
    }

    fn acquire_and_publish(&mut self, timeout: Duration, crop: &Region) -> Result<AcquireOutcome, CaptureError> {
        let origin = (crop.left, crop.top);
        let channel = &mut self.channel;
        let stats = &mut self.stats;
        let announced = &mut self.announced;

        self.backend.acquire_next_frame(timeout, crop, &mut |rows| {
            match channel.publish(&rows, origin) {
                Ok(_) => {
                    stats.frames_published += 1;
                    if !*announced {
                        *announced = true;
                        info!("Screen capture running: publishing {}x{} frames", rows.width, rows.height);
                    }
                }
                Err(e) => {
                    stats.publish_failures += 1;
                    debug!("Frame not published: {}", e);
                }
            }
        })
    }

    /// Tear down and recreate the device once
    fn reinitialize(&mut self) -> Result<DesktopSize, CaptureError> {
        warn!("Capture device lost, reinitializing {}", self.backend.name());
        self.backend.release_staging();
        self.backend.shutdown();

        match self.backend.init() {
            Ok(desktop) => {
                self.stats.device_resets += 1;
                info!("Capture device restored: desktop {}x{}", desktop.width, desktop.height);
                Ok(desktop)
            }
            Err(e) => {
                error!("Capture device reinitialization failed: {}", e);
                Err(e)
            }
        }
    }
}

/// `max(1 ms, 1000 / fps)`, truncated to whole milliseconds
pub fn acquire_timeout(target_fps: f64) -> Duration {
    let ms = if target_fps.is_finite() && target_fps > 0.0 {
        (1000.0 / target_fps).max(MIN_ACQUIRE_TIMEOUT_MS as f64) as u64
    } else {
        MIN_ACQUIRE_TIMEOUT_MS as u64
    };
    Duration::from_millis(ms)
}
