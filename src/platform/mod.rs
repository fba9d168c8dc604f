// platform/mod.rs - Platform Abstraction Layer
//
// Process-level OS hooks: termination signals and the Escape key. Everything
// else platform-specific lives behind the capture backend and shared-memory
// segment modules.

#[cfg(target_os = "windows")]
mod windows;

#[cfg(unix)]
mod unix;

use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::Arc;

/// Flag the signal handler sets; replaced on every install
static STOP_TARGET: AtomicPtr<AtomicBool> = AtomicPtr::new(std::ptr::null_mut());

/// Route console interrupt/close events (Windows) or SIGINT/SIGTERM/SIGHUP
/// (Unix) to `stop`.
///
/// The OS handler is registered once per process; later calls only retarget
/// it to the new flag.
pub fn install_shutdown_handler(stop: Arc<AtomicBool>) -> anyhow::Result<()> {
    // The previous flag is leaked: a handler may still be reading it
    STOP_TARGET.store(Arc::into_raw(stop) as *mut AtomicBool, Ordering::Release);

    #[cfg(target_os = "windows")]
    {
        windows::register_ctrl_handler()
    }

    #[cfg(unix)]
    {
        unix::register_signal_handlers()
    }

    #[cfg(not(any(target_os = "windows", unix)))]
    {
        Ok(())
    }
}

/// Called from the OS handler; only touches the atomic flag
#[cfg_attr(not(any(target_os = "windows", unix)), allow(dead_code))]
fn signal_stop() -> bool {
    let target = STOP_TARGET.load(Ordering::Acquire);
    if target.is_null() {
        return false;
    }
    // SAFETY: pointers stored in STOP_TARGET come from Arc::into_raw and are never freed
    unsafe { (*target).store(true, Ordering::SeqCst) };
    true
}

/// Whether Escape is currently held down
pub fn escape_pressed() -> bool {
    #[cfg(target_os = "windows")]
    {
        windows::escape_pressed()
    }

    #[cfg(not(target_os = "windows"))]
    {
        false
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn escape_is_never_pressed_off_windows() {
        assert!(!escape_pressed());
    }

    // The only test that installs the process-wide handler
    #[test]
    fn sigterm_sets_the_stop_flag() {
        let stop = Arc::new(AtomicBool::new(false));
        install_shutdown_handler(Arc::clone(&stop)).unwrap();

        assert_eq!(unsafe { libc::raise(libc::SIGTERM) }, 0);
        assert!(stop.load(Ordering::SeqCst));
    }
}
