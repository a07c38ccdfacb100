// SPDX-License-Identifier: MIT

//! Surfaces (windows) as the coordinator sees them.
//!
//! A surface handle is only meaningful to the OS, but window handles are
//! session-wide rather than per-process, so the integer value the worker
//! sends can be used directly by the coordinator.

use std::fmt;

use crate::runtime::error::OsCode;

/// Opaque window handle, as carried in a message parameter.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(isize);

impl SurfaceHandle {
    /// `None` for the null handle, which never names a surface.
    pub fn from_raw(raw: isize) -> Option<Self> {
        if raw == 0 { None } else { Some(Self(raw)) }
    }

    pub fn raw(self) -> isize {
        self.0
    }
}

impl fmt::Debug for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Rectangle in the parent's client coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }
}

/// Style bits, with the Win32 values.
pub mod style {
    pub const WS_POPUP: u32 = 0x8000_0000;
    pub const WS_CHILD: u32 = 0x4000_0000;
    pub const WS_VISIBLE: u32 = 0x1000_0000;
    pub const WS_CLIPSIBLINGS: u32 = 0x0400_0000;
    pub const WS_CLIPCHILDREN: u32 = 0x0200_0000;

    pub const WS_EX_TOPMOST: u32 = 0x0000_0008;
    pub const WS_EX_TOOLWINDOW: u32 = 0x0000_0080;
    pub const WS_EX_NOACTIVATE: u32 = 0x0800_0000;
}

/// The two style words of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowStyle {
    pub style: u32,
    pub ex_style: u32,
}

impl WindowStyle {
    /// The style a top-level surface needs once it lives inside another
    /// window: a visible, sibling-clipped child, without the top-level-only
    /// extended bits.  Other bits are left alone.
    pub fn as_embedded_child(self) -> Self {
        use style::*;
        Self {
            style: (self.style & !WS_POPUP) | WS_CHILD | WS_VISIBLE | WS_CLIPSIBLINGS,
            ex_style: self.ex_style & !(WS_EX_TOOLWINDOW | WS_EX_NOACTIVATE | WS_EX_TOPMOST),
        }
    }
}

/// Window operations the coordinator performs on its own window and on the
/// worker's surface.  None of these may wait on the worker.
pub trait SurfaceOps {
    fn style(&self, surface: SurfaceHandle) -> Result<WindowStyle, OsCode>;

    fn set_style(&mut self, surface: SurfaceHandle, style: WindowStyle) -> Result<(), OsCode>;

    /// Attach `child` under `parent`.  Returns the previous parent, which is
    /// `None` for a surface that had none.
    fn reparent(&mut self, child: SurfaceHandle, parent: SurfaceHandle) -> Result<Option<SurfaceHandle>, OsCode>;

    /// The surface's current parent, if any.
    fn parent_of(&self, surface: SurfaceHandle) -> Option<SurfaceHandle>;

    /// Hide `surface` and take it out from under its parent.
    fn detach(&mut self, surface: SurfaceHandle) -> Result<(), OsCode>;

    /// Id of the process that created `surface`.
    fn owner_process(&self, surface: SurfaceHandle) -> Result<u32, OsCode>;

    /// Client area size of `surface`, origin at zero.
    fn client_rect(&self, surface: SurfaceHandle) -> Result<Rect, OsCode>;

    /// Move and size `surface`, put it on top of its siblings and show it.
    /// `frame_changed` makes the OS re-read the surface's style bits.
    fn place(&mut self, surface: SurfaceHandle, rect: Rect, frame_changed: bool) -> Result<(), OsCode>;

    /// Put `surface` on top of its siblings and show it, keeping its rectangle.
    fn raise(&mut self, surface: SurfaceHandle) -> Result<(), OsCode>;

    /// Invalidate and repaint `surface`.
    fn redraw(&mut self, surface: SurfaceHandle) -> Result<(), OsCode>;

    /// Post a close request to `surface`.
    fn request_close(&mut self, surface: SurfaceHandle) -> Result<(), OsCode>;

    /// Handle messages other threads have sent to this one, leaving posted
    /// messages queued.  Called while this thread waits on the worker.
    fn pump_sent_messages(&mut self);
}


#[cfg(test)]
mod tests {
    use super::style::*;
    use super::*;

    #[test]
    fn null_handle_is_not_a_surface() {
        assert_eq!(SurfaceHandle::from_raw(0), None);
        assert_eq!(SurfaceHandle::from_raw(0x10).map(SurfaceHandle::raw), Some(0x10));
    }

    #[test]
    fn popup_becomes_visible_child() {
        let worker = WindowStyle { style: WS_POPUP | WS_CLIPSIBLINGS | WS_CLIPCHILDREN, ex_style: 0 };
        let child = worker.as_embedded_child();
        assert_eq!(child.style, WS_CHILD | WS_VISIBLE | WS_CLIPSIBLINGS | WS_CLIPCHILDREN);
        assert_eq!(child.ex_style, 0);
    }

    #[test]
    fn top_level_only_extended_bits_are_stripped() {
        const WS_EX_CLIENTEDGE: u32 = 0x200;
        let worker = WindowStyle {
            style: WS_POPUP,
            ex_style: WS_EX_TOOLWINDOW | WS_EX_NOACTIVATE | WS_EX_TOPMOST | WS_EX_CLIENTEDGE,
        };
        let child = worker.as_embedded_child();
        assert_eq!(child.ex_style, WS_EX_CLIENTEDGE);
        assert_eq!(child.style & WS_POPUP, 0);
    }

    #[test]
    fn rewriting_is_idempotent() {
        let once = WindowStyle { style: WS_POPUP | 0x00C0_0000, ex_style: WS_EX_TOPMOST }.as_embedded_child();
        assert_eq!(once.as_embedded_child(), once);
        // Unrelated bits (here WS_CAPTION) survive.
        assert_eq!(once.style & 0x00C0_0000, 0x00C0_0000);
    }
}
