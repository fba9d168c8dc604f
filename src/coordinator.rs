// coordinator.rs - Process Coordinator
//
// Wires the shared region state, the capture thread, and the region
// watcher together. The watcher runs on the calling thread; capture runs on
// a dedicated thread that owns the backend and the frame channel.

use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};

use crate::app::CaptureContext;
use crate::capture::{create_backend, CaptureEngine, CaptureExit};
use crate::config::Settings;
use crate::platform;
use crate::region::{RegionWatcher, WatchExit};
use crate::shm::FrameChannel;

/// Run until shutdown; returns the process exit code.
///
/// The code is 0 after a requested stop, or the capture thread's failure
/// code when it ended on its own.
pub fn run(settings: &Settings) -> Result<i32> {
    let ctx = Arc::new(CaptureContext::new());
    platform::install_shutdown_handler(ctx.stop_flag()).context("Failed to install shutdown handler")?;
    run_with_context(settings, ctx)
}

/// Same as [`run`] with a caller-provided context and no signal handler
pub fn run_with_context(settings: &Settings, ctx: Arc<CaptureContext>) -> Result<i32> {
    let mut watcher = RegionWatcher::new(settings.region_path(), settings.poll_interval(), settings.target_fps)
        .with_escape_to_exit(settings.escape_to_exit);
    // Pick up a region selected before startup
    watcher.poll(&ctx.region);

    info!(
        "Publishing to {} at {:.1} fps, region file {} polled every {} ms",
        settings.shm_name,
        settings.target_fps,
        watcher.path().display(),
        watcher.poll_interval().as_millis()
    );

    let capture_ctx = Arc::clone(&ctx);
    let capture_settings = settings.clone();
    let handle = thread::Builder::new()
        .name("capture".into())
        .spawn(move || {
            let backend = create_backend(&capture_settings);
            let channel = FrameChannel::new(capture_settings.shm_name.clone());
            let mut engine = CaptureEngine::new(backend, channel, capture_settings.target_fps);
            engine.run(&capture_ctx)
        })
        .context("Failed to spawn capture thread")?;

    let watch_exit = watcher.run(&ctx, || !handle.is_finished());
    if watch_exit == WatchExit::CaptureEnded {
        warn!("Capture thread ended on its own");
    }

    ctx.request_stop();
    let exit = handle.join().map_err(|_| anyhow!("Capture thread panicked"))?;

    match &exit {
        CaptureExit::Stopped => info!("Capture stopped"),
        CaptureExit::InitFailed(e) => error!("Capture could not start: {}", e),
        CaptureExit::ReinitFailed(e) => error!("Capture device lost for good: {}", e),
    }
    Ok(exit.exit_code())
}
