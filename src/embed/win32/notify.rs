// SPDX-License-Identifier: MIT

//! Cross-process notification without waiting on the receiver.

use tracing::{debug, warn};
use windows::Win32::{
    Foundation::{HWND, LPARAM, LRESULT, WPARAM},
    UI::WindowsAndMessaging::{FindWindowW, PostMessageW, SendMessageCallbackW},
};
use windows::core::{HSTRING, PCWSTR};

use super::{hwnd, surface_of};
use crate::embed::{
    protocol::{AsyncNotifier, ControlMessage, HANDSHAKE_REPLY},
    surface::SurfaceHandle,
};
use crate::runtime::error::OsCode;

/// Sends with `SendMessageCallbackW`, which queues the message and returns
/// at once.  The receiver's result is posted back to `reply_to` as
/// `HANDSHAKE_REPLY` once the sender's thread next pumps messages.
#[derive(Debug, Clone, Copy)]
pub struct SendMessageNotifier {
    reply_to: SurfaceHandle,
}

impl SendMessageNotifier {
    pub fn new(reply_to: SurfaceHandle) -> Self {
        Self { reply_to }
    }
}

unsafe extern "system" fn on_send_complete(_receiver: HWND, msg: u32, dwdata: usize, result: LRESULT) {
    let Some(reply_to) = SurfaceHandle::from_raw(dwdata as isize) else {
        return;
    };
    debug!(msg, result = result.0, "control message handled by the coordinator");
    if let Err(e) = unsafe { PostMessageW(Some(hwnd(reply_to)), HANDSHAKE_REPLY, WPARAM(result.0 as usize), LPARAM(0)) } {
        warn!(code = %OsCode::from(e), "posting the handshake reply failed");
    }
}

impl AsyncNotifier for SendMessageNotifier {
    fn notify(&mut self, target: SurfaceHandle, message: ControlMessage) -> Result<(), OsCode> {
        let (wparam, lparam) = message.params();
        unsafe {
            SendMessageCallbackW(
                hwnd(target),
                message.kind(),
                WPARAM(wparam),
                LPARAM(lparam),
                Some(on_send_complete),
                self.reply_to.raw() as usize,
            )
        }?;
        Ok(())
    }
}

/// Top-level window registered under `class`, if one exists.
pub fn find_window_by_class(class: &str) -> Option<SurfaceHandle> {
    match unsafe { FindWindowW(&HSTRING::from(class), PCWSTR::null()) } {
        Ok(found) => surface_of(found),
        Err(e) => {
            debug!(class, code = %OsCode::from(e), "FindWindowW found nothing");
            None
        }
    }
}
