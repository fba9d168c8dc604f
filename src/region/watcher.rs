// region/watcher.rs - Region Watcher
//
// Polls the descriptor's modification time. The file is only parsed when
// the timestamp changes, and the timestamp is recorded even when parsing
// fails so a persistently malformed file is not re-read every tick.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::{debug, info, warn};

use super::{read_descriptor, RegionError};
use crate::app::{CaptureContext, Region, SharedRegionState};
use crate::platform;

/// Result of one poll
#[derive(Debug)]
pub enum PollOutcome {
    /// Timestamp unchanged since the last poll
    Unchanged,
    /// No descriptor file (or no readable timestamp)
    Missing,
    /// A new region was written to the shared state
    Updated { region: Region, updates: u64 },
    /// The file changed but could not be used; the previous region stays
    Rejected(RegionError),
}

/// Why the watcher loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    /// The stop flag was set elsewhere
    Stopped,
    /// Escape was pressed
    EscapePressed,
    /// The liveness check failed (the capture thread ended)
    CaptureEnded,
}

pub struct RegionWatcher {
    path: PathBuf,
    poll_interval: Duration,
    target_fps: f64,
    escape_to_exit: bool,
    last_mtime: Option<SystemTime>,
}

impl RegionWatcher {
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration, target_fps: f64) -> Self {
        Self {
            path: path.into(),
            poll_interval,
            target_fps,
            escape_to_exit: true,
            last_mtime: None,
        }
    }

    /// Whether an Escape press stops the process
    pub fn with_escape_to_exit(mut self, enabled: bool) -> Self {
        self.escape_to_exit = enabled;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Check the descriptor once and apply a changed region
    pub fn poll(&mut self, state: &SharedRegionState) -> PollOutcome {
        let mtime = match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(_) => return PollOutcome::Missing,
        };
        if self.last_mtime == Some(mtime) {
            return PollOutcome::Unchanged;
        }
        self.last_mtime = Some(mtime);

        match read_descriptor(&self.path) {
            Ok(region) => {
                let updates = state.write(region);
                info!(
                    "Capture region {} (update #{}, {:.1} fps) from {}",
                    region,
                    updates,
                    self.target_fps,
                    self.path.display()
                );
                PollOutcome::Updated { region, updates }
            }
            Err(e) => {
                warn!("Keeping previous capture region: {}", e);
                PollOutcome::Rejected(e)
            }
        }
    }

    /// Poll until stopped.
    ///
    /// Each interval checks, in order: the stop flag, the Escape key, and
    /// `keep_running`. Escape sets the stop flag before returning.
    pub fn run(&mut self, ctx: &CaptureContext, mut keep_running: impl FnMut() -> bool) -> WatchExit {
        debug!(
            "Watching {} every {} ms",
            self.path.display(),
            self.poll_interval.as_millis()
        );

        loop {
            std::thread::sleep(self.poll_interval);

            if ctx.should_stop() {
                return WatchExit::Stopped;
            }
            if self.escape_to_exit && platform::escape_pressed() {
                info!("Escape pressed, stopping capture");
                ctx.request_stop();
                return WatchExit::EscapePressed;
            }
            if !keep_running() {
                return WatchExit::CaptureEnded;
            }

            self.poll(&ctx.region);
        }
    }
}
