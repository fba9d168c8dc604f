// platform/unix.rs - POSIX signal handling

use std::sync::Once;

static REGISTER: Once = Once::new();

extern "C" fn on_signal(_signum: libc::c_int) {
    super::signal_stop();
}

/// Install the SIGINT/SIGTERM/SIGHUP handler once per process
pub(super) fn register_signal_handlers() -> anyhow::Result<()> {
    let mut result = Ok(());
    REGISTER.call_once(|| {
        for signum in [libc::SIGINT, libc::SIGTERM, libc::SIGHUP] {
            let previous = unsafe { libc::signal(signum, on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t) };
            if previous == libc::SIG_ERR {
                result = Err(anyhow::anyhow!(
                    "signal({}) failed: {}",
                    signum,
                    std::io::Error::last_os_error()
                ));
                return;
            }
        }
    });
    result
}
