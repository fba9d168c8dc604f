// platform/windows.rs - Windows-specific Platform Implementation
//
// Console control events and keyboard polling through the Win32 API.

use std::sync::Once;

use anyhow::Context;
use windows::core::BOOL;
use windows::Win32::System::Console::{
    SetConsoleCtrlHandler, CTRL_BREAK_EVENT, CTRL_CLOSE_EVENT, CTRL_C_EVENT,
};
use windows::Win32::UI::Input::KeyboardAndMouse::{GetAsyncKeyState, VK_ESCAPE};

static REGISTER: Once = Once::new();

unsafe extern "system" fn console_ctrl_handler(ctrl_type: u32) -> BOOL {
    if ctrl_type == CTRL_C_EVENT || ctrl_type == CTRL_BREAK_EVENT || ctrl_type == CTRL_CLOSE_EVENT {
        super::signal_stop().into()
    } else {
        false.into()
    }
}

/// Register the console control handler once per process
pub(super) fn register_ctrl_handler() -> anyhow::Result<()> {
    let mut result = Ok(());
    REGISTER.call_once(|| {
        result = unsafe { SetConsoleCtrlHandler(Some(console_ctrl_handler), true) }
            .context("SetConsoleCtrlHandler failed");
    });
    result
}

/// High bit of GetAsyncKeyState: key is down now
pub(super) fn escape_pressed() -> bool {
    let state = unsafe { GetAsyncKeyState(VK_ESCAPE.0 as i32) };
    (state as u16 & 0x8000) != 0
}

