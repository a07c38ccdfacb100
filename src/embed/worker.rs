// SPDX-License-Identifier: MIT

//! Worker role state and message dispatch.
//!
//! The worker owns a single surface.  It announces it once, then only
//! services its message loop until asked to close.

use tracing::{debug, info};

use super::{
    protocol::{AsyncNotifier, CoordinatorLocator, HandshakeReply, WorkerHandshake, WorkerState},
    surface::SurfaceHandle,
    Dispatch,
};
use crate::runtime::error::HandshakeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEvent {
    /// The coordinator answered the announcement.  Holds its raw result.
    HandshakeReply(isize),
    /// The coordinator (or the user) asked the surface to close.
    CloseRequested,
    /// The surface is being destroyed.
    Destroyed,
}

#[derive(Debug)]
pub struct WorkerContext {
    handshake: WorkerHandshake,
}

impl WorkerContext {
    pub fn new(surface: SurfaceHandle) -> Self {
        Self { handshake: WorkerHandshake::new(surface) }
    }

    pub fn surface(&self) -> SurfaceHandle {
        self.handshake.surface()
    }

    pub fn state(&self) -> WorkerState {
        self.handshake.state()
    }

    /// Send the surface to the coordinator.  Returns without waiting for it.
    pub fn announce<L, N>(&mut self, class: &str, locator: &L, notifier: &mut N) -> Result<SurfaceHandle, HandshakeError>
    where
        L: CoordinatorLocator + ?Sized,
        N: AsyncNotifier + ?Sized,
    {
        self.handshake.announce(class, locator, notifier)
    }
}

pub fn dispatch(ctx: &mut WorkerContext, event: WorkerEvent) -> Dispatch {
    match event {
        WorkerEvent::HandshakeReply(result) => {
            ctx.handshake.on_reply(HandshakeReply::from_result(result));
            Dispatch::Handled(0)
        }
        WorkerEvent::CloseRequested => {
            info!(surface = ?ctx.surface(), "close requested, destroying the follower window");
            Dispatch::Destroy
        }
        WorkerEvent::Destroyed => {
            debug!("follower window destroyed");
            Dispatch::Quit(0)
        }
    }
}
