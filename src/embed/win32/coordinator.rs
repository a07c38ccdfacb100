// SPDX-License-Identifier: MIT

//! The coordinator's window, and the coordinator role from startup to exit.

use std::cell::RefCell;

use tracing::{debug, error, info, warn};
use windows::Win32::{
    Foundation::{HWND, LPARAM, LRESULT, WPARAM},
    Graphics::Gdi::UpdateWindow,
    UI::WindowsAndMessaging::*,
};

use super::{
    apply, attach_context, context, create_window, detach_context, message_loop, paint_label, register_class,
    surface_of, Background, HwndSurfaces, WindowSpec,
};
use crate::embed::{
    coordinator::{dispatch, CoordinatorContext, CoordinatorEvent},
    protocol::{ControlMessage, REGISTER_FOLLOWER},
};
use crate::runtime::{
    config::FollowerConfig,
    error::{FollowerError, OsCode},
    launcher::WorkerCommand,
    lifecycle::{LifecycleController, WorkerProcess},
    mode::InvocationMode,
    session::WorkerSession,
    spawn_windows::{AppContainerStore, Win32Spawner, WorkerHandle},
};

type Context = CoordinatorContext<HwndSurfaces, WorkerHandle>;

const LABEL: &str = "Main Window\nMove or resize me!";

fn translate(msg: u32, wparam: WPARAM, lparam: LPARAM) -> Option<CoordinatorEvent> {
    if let Some(control) = ControlMessage::decode(msg, wparam.0, lparam.0) {
        return Some(CoordinatorEvent::Control(control));
    }
    match msg {
        WM_SIZE => Some(CoordinatorEvent::Resized { minimized: wparam.0 as u32 == SIZE_MINIMIZED }),
        WM_MOVE => Some(CoordinatorEvent::Moved),
        WM_WINDOWPOSCHANGED => {
            let pos = unsafe { (lparam.0 as *const WINDOWPOS).as_ref() }?;
            Some(CoordinatorEvent::PositionChanged { size_changed: (pos.flags & SWP_NOSIZE).0 == 0 })
        }
        WM_PAINT => Some(CoordinatorEvent::Painted),
        WM_PARENTNOTIFY if (wparam.0 & 0xFFFF) as u32 == WM_DESTROY => {
            surface_of(HWND(lparam.0 as *mut _)).map(CoordinatorEvent::ChildDestroyed)
        }
        WM_DESTROY => Some(CoordinatorEvent::Destroyed),
        _ => None,
    }
}

/// Default processing, for messages the role doesn't see.
fn fallback(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if msg == WM_DESTROY {
        // The loop still has to end.
        unsafe { PostQuitMessage(0) };
        return LRESULT(0);
    }
    unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
}

unsafe extern "system" fn coordinator_wndproc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if msg == WM_PAINT {
        paint_label(hwnd, LABEL);
    }
    let Some(event) = translate(msg, wparam, lparam) else {
        return fallback(hwnd, msg, wparam, lparam);
    };
    let Some(cell) = (unsafe { context::<Context>(hwnd) }) else {
        return fallback(hwnd, msg, wparam, lparam);
    };
    let result = match cell.try_borrow_mut() {
        Ok(mut ctx) => dispatch(&mut ctx, event),
        Err(_) => {
            debug!(msg, "coordinator busy, default processing");
            return fallback(hwnd, msg, wparam, lparam);
        }
    };
    apply(hwnd, msg, wparam, lparam, result)
}

/// Run the coordinator role.  Returns the message loop's exit code, or the
/// startup failure for the operator.
pub fn run_coordinator(config: &FollowerConfig, mode: &InvocationMode) -> Result<i32, FollowerError> {
    register_class(&config.coordinator_class, coordinator_wndproc, Background::Window)?;
    let hwnd = create_window(&WindowSpec {
        class: &config.coordinator_class,
        title: &config.coordinator_title,
        style: WS_OVERLAPPEDWINDOW | WS_CLIPCHILDREN,
        x: CW_USEDEFAULT,
        y: CW_USEDEFAULT,
        width: config.window_width,
        height: config.window_height,
    })?;
    let window = surface_of(hwnd).ok_or_else(|| FollowerError::WindowCreation {
        class: config.coordinator_class.clone(),
        code: OsCode::last(),
    })?;

    let lifecycle = LifecycleController::new(config.graceful_timeout, config.reap_timeout);
    let ctx = RefCell::new(Context::new(window, HwndSurfaces, config.inset, lifecycle));
    attach_context(hwnd, &ctx);

    // The worker may run at a lower integrity level or in a container, and
    // UIPI drops its messages unless they are allowed explicitly.
    match unsafe { ChangeWindowMessageFilterEx(hwnd, REGISTER_FOLLOWER, MSGFLT_ALLOW, None) } {
        Ok(()) => debug!("message filter allows REGISTER_FOLLOWER"),
        Err(e) => warn!(code = %OsCode::from(e), "ChangeWindowMessageFilterEx failed"),
    }

    unsafe {
        let _ = ShowWindow(hwnd, SW_SHOW);
        let _ = UpdateWindow(hwnd);
    }

    let mut session = WorkerSession::new(config.identity_profile(), mode.sandbox.then_some(AppContainerStore));
    let started = WorkerCommand::for_current_exe(mode.verbose)
        .and_then(|command| session.start(&mut Win32Spawner, &command));
    let process = match started {
        Ok(p) => p,
        Err(e) => {
            detach_context(hwnd);
            let _ = unsafe { DestroyWindow(hwnd) };
            return Err(e);
        }
    };
    info!(pid = process.id(), "worker started");
    ctx.borrow_mut().attach_worker(process);

    let exit_code = message_loop();

    // Normally done on WM_DESTROY; covers a loop that ended some other way.
    let report = ctx.borrow_mut().shutdown();
    debug!(?report, "worker teardown");
    if unsafe { IsWindow(Some(hwnd)) }.as_bool() {
        detach_context(hwnd);
    }
    drop(ctx);

    session.finish(report);
    if exit_code != 0 {
        error!(exit_code, "coordinator message loop ended abnormally");
    }
    Ok(exit_code)
}
