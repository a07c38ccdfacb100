// SPDX-License-Identifier: MIT

//! Keeps the embedded surface filling the coordinator's client area.
//!
//! Every entry point recomputes from the current client rectangle, so
//! calling it any number of times leaves the same result.

use tracing::{debug, trace, warn};

use super::surface::{Rect, SurfaceHandle, SurfaceOps};
use crate::runtime::error::OsCode;

/// Client area minus `inset` on every side, never negative.
pub fn target_rect(client: Rect, inset: i32) -> Rect {
    Rect::new(
        inset,
        inset,
        (client.width - 2 * inset).max(0),
        (client.height - 2 * inset).max(0),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutSynchronizer {
    inset: i32,
}

impl LayoutSynchronizer {
    pub fn new(inset: i32) -> Self {
        Self { inset }
    }

    /// Fit `embedded` to the coordinator's client area, raise and repaint it.
    pub fn fit<O: SurfaceOps>(&self, ops: &mut O, coordinator: SurfaceHandle, embedded: SurfaceHandle) -> Result<Rect, OsCode> {
        let client = ops.client_rect(coordinator)?;
        let rect = target_rect(client, self.inset);
        ops.place(embedded, rect, false)?;
        ops.redraw(embedded)?;
        Ok(rect)
    }

    /// The coordinator was resized.  Minimized windows keep the old layout.
    pub fn on_resize<O: SurfaceOps>(
        &self,
        ops: &mut O,
        coordinator: SurfaceHandle,
        embedded: Option<SurfaceHandle>,
        minimized: bool,
    ) -> Option<Rect> {
        let embedded = embedded?;
        if minimized {
            trace!("coordinator minimized, layout unchanged");
            return None;
        }
        match self.fit(ops, coordinator, embedded) {
            Ok(rect) => {
                debug!(width = rect.width, height = rect.height, "follower window resized");
                Some(rect)
            }
            Err(code) => {
                warn!(%code, "resizing the follower window failed");
                None
            }
        }
    }

    /// The coordinator moved, or its z-order or size changed.  Re-raise the
    /// embedded surface without touching its rectangle.
    pub fn on_reposition<O: SurfaceOps>(&self, ops: &mut O, embedded: Option<SurfaceHandle>) -> bool {
        let Some(embedded) = embedded else {
            return false;
        };
        match ops.raise(embedded).and_then(|_| ops.redraw(embedded)) {
            Ok(()) => {
                trace!("refreshed follower window");
                true
            }
            Err(code) => {
                warn!(%code, "refreshing the follower window failed");
                false
            }
        }
    }

    /// The coordinator changed position.  Pure moves that keep the size
    /// are handled by the move notification instead.
    pub fn on_position_changed<O: SurfaceOps>(&self, ops: &mut O, embedded: Option<SurfaceHandle>, size_changed: bool) -> bool {
        if !size_changed {
            return false;
        }
        self.on_reposition(ops, embedded)
    }
}
