// SPDX-License-Identifier: MIT

//! [`SurfaceOps`] over real window handles.
//!
//! None of these wait on the window's owner: cross-process style, parent
//! and position changes are serviced by the owner's message loop, which
//! keeps pumping while the handshake is in flight.

use windows::Win32::{
    Foundation::{GetLastError, SetLastError, LPARAM, RECT, WIN32_ERROR, WPARAM},
    Graphics::Gdi::{InvalidateRect, UpdateWindow},
    UI::WindowsAndMessaging::{
        GetAncestor, GetClientRect, GetWindowLongPtrW, GetWindowThreadProcessId, PeekMessageW, PostMessageW,
        SetParent, SetWindowLongPtrW, SetWindowPos, ShowWindow, GA_PARENT, GWL_EXSTYLE, GWL_STYLE, HWND_TOP, MSG,
        PM_NOREMOVE, PM_QS_SENDMESSAGE, SET_WINDOW_POS_FLAGS, SWP_FRAMECHANGED, SWP_NOACTIVATE, SWP_NOMOVE,
        SWP_NOSIZE, SWP_SHOWWINDOW, SW_HIDE, WINDOW_LONG_PTR_INDEX, WM_CLOSE,
    },
};

use super::{hwnd, surface_of};
use crate::embed::surface::{Rect, SurfaceHandle, SurfaceOps, WindowStyle};
use crate::runtime::error::OsCode;

#[derive(Debug, Default, Clone, Copy)]
pub struct HwndSurfaces;

/// Window longs return 0 both for a 0 value and on failure; the last error
/// tells them apart.
fn last_error_since_reset() -> Option<OsCode> {
    let err = unsafe { GetLastError() };
    if err.0 == 0 { None } else { Some(OsCode(err.0 as i32)) }
}

fn read_long(surface: SurfaceHandle, index: WINDOW_LONG_PTR_INDEX) -> Result<u32, OsCode> {
    unsafe { SetLastError(WIN32_ERROR(0)) };
    let value = unsafe { GetWindowLongPtrW(hwnd(surface), index) };
    match (value, last_error_since_reset()) {
        (0, Some(code)) => Err(code),
        (v, _) => Ok(v as u32),
    }
}

fn write_long(surface: SurfaceHandle, index: WINDOW_LONG_PTR_INDEX, value: u32) -> Result<(), OsCode> {
    unsafe { SetLastError(WIN32_ERROR(0)) };
    let prior = unsafe { SetWindowLongPtrW(hwnd(surface), index, value as isize) };
    match (prior, last_error_since_reset()) {
        (0, Some(code)) => Err(code),
        _ => Ok(()),
    }
}

fn set_pos(surface: SurfaceHandle, rect: Rect, flags: SET_WINDOW_POS_FLAGS) -> Result<(), OsCode> {
    unsafe { SetWindowPos(hwnd(surface), Some(HWND_TOP), rect.x, rect.y, rect.width, rect.height, flags) }?;
    Ok(())
}

impl SurfaceOps for HwndSurfaces {
    fn style(&self, surface: SurfaceHandle) -> Result<WindowStyle, OsCode> {
        Ok(WindowStyle { style: read_long(surface, GWL_STYLE)?, ex_style: read_long(surface, GWL_EXSTYLE)? })
    }

    fn set_style(&mut self, surface: SurfaceHandle, style: WindowStyle) -> Result<(), OsCode> {
        write_long(surface, GWL_STYLE, style.style)?;
        write_long(surface, GWL_EXSTYLE, style.ex_style)
    }

    fn reparent(&mut self, child: SurfaceHandle, parent: SurfaceHandle) -> Result<Option<SurfaceHandle>, OsCode> {
        unsafe { SetLastError(WIN32_ERROR(0)) };
        match unsafe { SetParent(hwnd(child), Some(hwnd(parent))) } {
            Ok(prior) => Ok(surface_of(prior)),
            // A null prior owner with no error recorded is a success.
            Err(e) if e.code().is_ok() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn parent_of(&self, surface: SurfaceHandle) -> Option<SurfaceHandle> {
        surface_of(unsafe { GetAncestor(hwnd(surface), GA_PARENT) })
    }

    fn detach(&mut self, surface: SurfaceHandle) -> Result<(), OsCode> {
        // Returns the previous visibility, not a status.
        let _ = unsafe { ShowWindow(hwnd(surface), SW_HIDE) };
        unsafe { SetLastError(WIN32_ERROR(0)) };
        match unsafe { SetParent(hwnd(surface), None) } {
            Ok(_) => Ok(()),
            Err(e) if e.code().is_ok() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn owner_process(&self, surface: SurfaceHandle) -> Result<u32, OsCode> {
        let mut pid = 0u32;
        if unsafe { GetWindowThreadProcessId(hwnd(surface), Some(&mut pid)) } == 0 {
            return Err(OsCode::last());
        }
        Ok(pid)
    }

    fn client_rect(&self, surface: SurfaceHandle) -> Result<Rect, OsCode> {
        let mut rect = RECT::default();
        unsafe { GetClientRect(hwnd(surface), &mut rect) }?;
        Ok(Rect::new(0, 0, rect.right - rect.left, rect.bottom - rect.top))
    }

    fn place(&mut self, surface: SurfaceHandle, rect: Rect, frame_changed: bool) -> Result<(), OsCode> {
        let mut flags = SWP_SHOWWINDOW | SWP_NOACTIVATE;
        if frame_changed {
            flags |= SWP_FRAMECHANGED;
        }
        set_pos(surface, rect, flags)
    }

    fn raise(&mut self, surface: SurfaceHandle) -> Result<(), OsCode> {
        set_pos(surface, Rect::default(), SWP_NOMOVE | SWP_NOSIZE | SWP_NOACTIVATE | SWP_SHOWWINDOW)
    }

    fn redraw(&mut self, surface: SurfaceHandle) -> Result<(), OsCode> {
        if !unsafe { InvalidateRect(Some(hwnd(surface)), None, true) }.as_bool() {
            return Err(OsCode::last());
        }
        if !unsafe { UpdateWindow(hwnd(surface)) }.as_bool() {
            return Err(OsCode::last());
        }
        Ok(())
    }

    fn request_close(&mut self, surface: SurfaceHandle) -> Result<(), OsCode> {
        unsafe { PostMessageW(Some(hwnd(surface)), WM_CLOSE, WPARAM(0), LPARAM(0)) }?;
        Ok(())
    }

    fn pump_sent_messages(&mut self) {
        // With PM_QS_SENDMESSAGE the peek dispatches pending sent messages
        // itself; nothing is removed from the posted queue.
        let mut msg = MSG::default();
        let _ = unsafe { PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE | PM_QS_SENDMESSAGE) };
    }
}
