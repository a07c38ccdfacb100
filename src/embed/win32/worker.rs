// SPDX-License-Identifier: MIT

//! The worker's window, and the worker role from startup to exit.

use std::cell::RefCell;

use tracing::{debug, info, warn};
use windows::Win32::{
    Foundation::{HWND, LPARAM, LRESULT, WPARAM},
    UI::WindowsAndMessaging::*,
};

use super::{
    apply, attach_context, context, create_window, detach_context, find_window_by_class, message_loop, paint_label,
    register_class, surface_of, Background, SendMessageNotifier, WindowSpec,
};
use crate::embed::{
    protocol::HANDSHAKE_REPLY,
    worker::{dispatch, WorkerContext, WorkerEvent},
};
use crate::runtime::{
    config::FollowerConfig,
    error::{FollowerError, HandshakeError, OsCode},
};

const LABEL: &str = "Follower Window\nI follow the main window!";

fn translate(msg: u32, wparam: WPARAM) -> Option<WorkerEvent> {
    match msg {
        HANDSHAKE_REPLY => Some(WorkerEvent::HandshakeReply(wparam.0 as isize)),
        WM_CLOSE => Some(WorkerEvent::CloseRequested),
        WM_DESTROY => Some(WorkerEvent::Destroyed),
        _ => None,
    }
}

fn fallback(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if msg == WM_DESTROY {
        unsafe { PostQuitMessage(0) };
        return LRESULT(0);
    }
    unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
}

unsafe extern "system" fn worker_wndproc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if msg == WM_PAINT {
        paint_label(hwnd, LABEL);
        return LRESULT(0);
    }
    let Some(event) = translate(msg, wparam) else {
        return fallback(hwnd, msg, wparam, lparam);
    };
    let Some(cell) = (unsafe { context::<WorkerContext>(hwnd) }) else {
        return fallback(hwnd, msg, wparam, lparam);
    };
    let result = match cell.try_borrow_mut() {
        Ok(mut ctx) => dispatch(&mut ctx, event),
        Err(_) => return fallback(hwnd, msg, wparam, lparam),
    };
    apply(hwnd, msg, wparam, lparam, result)
}

/// Run the worker role.  Returns the message loop's exit code, or the
/// startup failure for the operator.
pub fn run_worker(config: &FollowerConfig) -> Result<i32, FollowerError> {
    info!("worker process starting");
    register_class(&config.worker_class, worker_wndproc, Background::ButtonFace)?;
    let (width, height) = config.worker_size();
    // Hidden and unparented; the coordinator shows it once it is a child.
    let hwnd = create_window(&WindowSpec {
        class: &config.worker_class,
        title: &config.worker_title,
        style: WS_POPUP | WS_CLIPSIBLINGS | WS_CLIPCHILDREN,
        x: 0,
        y: 0,
        width,
        height,
    })?;
    let surface = surface_of(hwnd).ok_or_else(|| FollowerError::WindowCreation {
        class: config.worker_class.clone(),
        code: OsCode::last(),
    })?;

    let ctx = RefCell::new(WorkerContext::new(surface));
    attach_context(hwnd, &ctx);

    let mut notifier = SendMessageNotifier::new(surface);
    let announced = ctx.borrow_mut().announce(&config.coordinator_class, &find_window_by_class, &mut notifier);
    match announced {
        Ok(coordinator) => debug!(?coordinator, "waiting for the coordinator's answer"),
        Err(e @ HandshakeError::CoordinatorNotFound { .. }) => {
            detach_context(hwnd);
            let _ = unsafe { DestroyWindow(hwnd) };
            return Err(e.into());
        }
        // The send failed; the surface stays up, detached.
        Err(e) => warn!(error = %e, "follower window was not announced"),
    }

    // Keep pumping: the coordinator's reparent and resize calls are
    // serviced by this loop.
    let exit_code = message_loop();
    if unsafe { IsWindow(Some(hwnd)) }.as_bool() {
        detach_context(hwnd);
    }
    info!(exit_code, state = ?ctx.borrow().state(), "worker process exiting");
    Ok(exit_code)
}
