// SPDX-License-Identifier: MIT

//! Win32 side of the embedding: window classes, window procedures, and the
//! real [`SurfaceOps`](super::surface::SurfaceOps) and
//! [`AsyncNotifier`](super::protocol::AsyncNotifier).
//!
//! Each role keeps its context in a `RefCell` owned by the role's entry
//! function.  A pointer to it is stored in the window's `GWLP_USERDATA`;
//! window procedures borrow it, and a message that arrives while the
//! context is already borrowed (sent back into the window from inside a
//! handler) gets default processing.

mod coordinator;
mod notify;
mod surface;
mod worker;

pub use coordinator::run_coordinator;
pub use notify::{find_window_by_class, SendMessageNotifier};
pub use surface::HwndSurfaces;
pub use worker::run_worker;

use std::cell::RefCell;
use std::ffi::c_void;

use tracing::{debug, error};
use windows::Win32::{
    Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, RECT, WPARAM},
    Graphics::Gdi::{
        BeginPaint, DrawTextW, EndPaint, SetBkMode, COLOR_BTNFACE, COLOR_WINDOW, DT_CENTER, DT_VCENTER,
        DT_WORDBREAK, HBRUSH, PAINTSTRUCT, TRANSPARENT,
    },
    System::LibraryLoader::GetModuleHandleW,
    UI::WindowsAndMessaging::*,
};
use windows::core::{HSTRING, PCWSTR};

use super::{surface::SurfaceHandle, Dispatch};
use crate::runtime::{conv::str_c_w, error::{FollowerError, OsCode}};

pub(crate) fn hwnd(surface: SurfaceHandle) -> HWND {
    HWND(surface.raw() as *mut c_void)
}

pub(crate) fn surface_of(hwnd: HWND) -> Option<SurfaceHandle> {
    SurfaceHandle::from_raw(hwnd.0 as isize)
}

fn instance() -> Result<HINSTANCE, OsCode> {
    Ok(unsafe { GetModuleHandleW(None) }?.into())
}

/// Background brush of a window class.
#[derive(Debug, Clone, Copy)]
enum Background {
    Window,
    ButtonFace,
}

fn register_class(
    class: &str,
    wndproc: unsafe extern "system" fn(HWND, u32, WPARAM, LPARAM) -> LRESULT,
    background: Background,
) -> Result<(), FollowerError> {
    let registration_err = |code| FollowerError::ClassRegistration { class: class.to_string(), code };
    let class_name = HSTRING::from(class);
    let h_instance = instance().map_err(registration_err)?;
    let color = match background {
        Background::Window => COLOR_WINDOW,
        Background::ButtonFace => COLOR_BTNFACE,
    };
    let wc = WNDCLASSEXW {
        cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
        style: CS_HREDRAW | CS_VREDRAW,
        lpfnWndProc: Some(wndproc),
        hInstance: h_instance,
        hCursor: unsafe { LoadCursorW(None, IDC_ARROW) }.map_err(|e| registration_err(e.into()))?,
        hbrBackground: HBRUSH((color.0 + 1) as usize as *mut c_void),
        lpszClassName: PCWSTR(class_name.as_ptr()),
        ..Default::default()
    };
    if unsafe { RegisterClassExW(&wc) } == 0 {
        let code = OsCode::last();
        error!(class, %code, "RegisterClassExW failed");
        return Err(registration_err(code));
    }
    debug!(class, "window class registered");
    Ok(())
}

struct WindowSpec<'a> {
    class: &'a str,
    title: &'a str,
    style: WINDOW_STYLE,
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

fn create_window(spec: &WindowSpec<'_>) -> Result<HWND, FollowerError> {
    let creation_err = |code| FollowerError::WindowCreation { class: spec.class.to_string(), code };
    let h_instance = instance().map_err(creation_err)?;
    let hwnd = unsafe {
        CreateWindowExW(
            WINDOW_EX_STYLE(0),
            &HSTRING::from(spec.class),
            &HSTRING::from(spec.title),
            spec.style,
            spec.x,
            spec.y,
            spec.width,
            spec.height,
            None,             // no parent: both windows start top-level
            None,             // no menu
            Some(h_instance),
            None,             // context is attached after creation
        )
    }
    .map_err(|e| {
        let code = OsCode::from(e);
        error!(class = spec.class, %code, "CreateWindowExW failed");
        creation_err(code)
    })?;
    debug!(class = spec.class, hwnd = ?surface_of(hwnd), "window created");
    Ok(hwnd)
}

/// Store `ctx` in the window.  The cell must outlive the window, or be
/// detached first.
fn attach_context<T>(hwnd: HWND, ctx: &RefCell<T>) {
    unsafe { SetWindowLongPtrW(hwnd, GWLP_USERDATA, ctx as *const RefCell<T> as isize) };
}

fn detach_context(hwnd: HWND) {
    unsafe { SetWindowLongPtrW(hwnd, GWLP_USERDATA, 0) };
}

/// The context stored by [`attach_context`], if any.
///
/// # Safety
/// The window must only ever have had a `RefCell<T>` attached.
unsafe fn context<'a, T>(hwnd: HWND) -> Option<&'a RefCell<T>> {
    let ptr = unsafe { GetWindowLongPtrW(hwnd, GWLP_USERDATA) } as *const RefCell<T>;
    unsafe { ptr.as_ref() }
}

/// Turn a role's answer into the window procedure's result.
fn apply(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM, dispatch: Dispatch) -> LRESULT {
    match dispatch {
        Dispatch::Handled(result) => LRESULT(result),
        Dispatch::PassThrough => unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
        Dispatch::Destroy => {
            if let Err(e) = unsafe { DestroyWindow(hwnd) } {
                error!(code = %OsCode::from(e), "DestroyWindow failed");
            }
            LRESULT(0)
        }
        Dispatch::Quit(code) => {
            unsafe { PostQuitMessage(code) };
            LRESULT(0)
        }
    }
}

/// Paint the window's label.  The background comes from the class brush.
fn paint_label(hwnd: HWND, text: &str) {
    let mut ps = PAINTSTRUCT::default();
    let hdc = unsafe { BeginPaint(hwnd, &mut ps) };
    let mut rect = RECT::default();
    if unsafe { GetClientRect(hwnd, &mut rect) }.is_ok() {
        let mut text = str_c_w(text);
        text.pop();
        unsafe {
            SetBkMode(hdc, TRANSPARENT);
            DrawTextW(hdc, &mut text, &mut rect, DT_CENTER | DT_VCENTER | DT_WORDBREAK);
        }
    }
    let _ = unsafe { EndPaint(hwnd, &ps) };
}

/// Pump messages until `WM_QUIT`; returns its exit code.
fn message_loop() -> i32 {
    let mut msg = MSG::default();
    loop {
        let ret = unsafe { GetMessageW(&mut msg, None, 0, 0) };
        match ret.0 {
            0 => return msg.wParam.0 as i32,
            -1 => {
                error!(code = %OsCode::last(), "GetMessageW failed");
                return 1;
            }
            _ => unsafe {
                let _ = TranslateMessage(&msg);
                let _ = DispatchMessageW(&msg);
            },
        }
    }
}

/// Show a startup failure to the operator.
pub fn report_startup_failure(err: &FollowerError) {
    error!(error = %err, code = ?err.os_code(), "startup failed");
    let text = HSTRING::from(err.to_string());
    unsafe { MessageBoxW(None, &text, windows::core::w!("Error"), MB_OK | MB_ICONERROR) };
}
