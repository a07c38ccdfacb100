// SPDX-License-Identifier: MIT

//! Coordinator role state and message dispatch.
//!
//! All coordinator state lives in one [`CoordinatorContext`], created when
//! the role starts and torn down when its window is destroyed.  The window
//! procedure translates OS messages into [`CoordinatorEvent`]s and hands
//! them to [`dispatch`]; each event kind has its own handler.

use tracing::{debug, info, warn};

use super::{
    layout::LayoutSynchronizer,
    protocol::{ControlMessage, CoordinatorHandshake, CoordinatorState, HandshakeReply},
    surface::{SurfaceHandle, SurfaceOps},
    Dispatch,
};
use crate::runtime::{
    error::{HandshakeError, OsCode},
    lifecycle::{CloseRequester, LifecycleController, LifecycleState, SentMessagePump, TeardownReport, WorkerProcess},
};

/// Messages the coordinator window reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    /// A decoded control message from the worker.
    Control(Result<ControlMessage, HandshakeError>),
    Resized { minimized: bool },
    Moved,
    PositionChanged { size_changed: bool },
    /// The coordinator finished painting its own client area.
    Painted,
    /// A child window of the coordinator was destroyed.
    ChildDestroyed(SurfaceHandle),
    /// The coordinator window is being destroyed.
    Destroyed,
}

pub struct CoordinatorContext<O: SurfaceOps, P: WorkerProcess> {
    window: SurfaceHandle,
    ops: O,
    handshake: CoordinatorHandshake,
    layout: LayoutSynchronizer,
    lifecycle: LifecycleController<P>,
    embedded: Option<SurfaceHandle>,
    teardown: Option<TeardownReport>,
}

impl<O: SurfaceOps, P: WorkerProcess> CoordinatorContext<O, P> {
    pub fn new(window: SurfaceHandle, ops: O, inset: i32, lifecycle: LifecycleController<P>) -> Self {
        Self {
            window,
            ops,
            handshake: CoordinatorHandshake::new(window, inset),
            layout: LayoutSynchronizer::new(inset),
            lifecycle,
            embedded: None,
            teardown: None,
        }
    }

    pub fn embedded(&self) -> Option<SurfaceHandle> {
        self.embedded
    }

    pub fn handshake_state(&self) -> CoordinatorState {
        self.handshake.state()
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Hand over the spawned worker.  From here on only surfaces owned by
    /// its process are embedded.
    pub fn attach_worker(&mut self, process: P) {
        self.handshake.expect_owner(process.id());
        self.lifecycle.attach(process);
    }

    pub fn ops(&self) -> &O {
        &self.ops
    }

    /// The result of the window teardown, once it happened.
    pub fn teardown_report(&self) -> Option<TeardownReport> {
        self.teardown
    }

    /// Shut the worker down.  Also run when the message loop ends without
    /// the window having been destroyed; a second call does nothing.
    pub fn shutdown(&mut self) -> TeardownReport {
        if let Some(report) = self.teardown {
            return report;
        }
        let mut closer = SurfaceCloser(&mut self.ops);
        let report = self.lifecycle.teardown(&mut self.embedded, &mut closer);
        self.handshake.reset();
        self.teardown = Some(report);
        report
    }
}

struct SurfaceCloser<'a, O>(&'a mut O);

impl<O: SurfaceOps> CloseRequester<SurfaceHandle> for SurfaceCloser<'_, O> {
    fn request_close(&mut self, surface: SurfaceHandle) -> Result<(), OsCode> {
        self.0.request_close(surface)
    }
}

impl<O: SurfaceOps> SentMessagePump for SurfaceCloser<'_, O> {
    fn pump_sent(&mut self) {
        self.0.pump_sent_messages();
    }
}

pub fn dispatch<O: SurfaceOps, P: WorkerProcess>(ctx: &mut CoordinatorContext<O, P>, event: CoordinatorEvent) -> Dispatch {
    match event {
        CoordinatorEvent::Control(msg) => on_control(ctx, msg),
        CoordinatorEvent::Resized { minimized } => on_resized(ctx, minimized),
        CoordinatorEvent::Moved => on_moved(ctx),
        CoordinatorEvent::PositionChanged { size_changed } => on_position_changed(ctx, size_changed),
        CoordinatorEvent::Painted => on_painted(ctx),
        CoordinatorEvent::ChildDestroyed(child) => on_child_destroyed(ctx, child),
        CoordinatorEvent::Destroyed => on_destroyed(ctx),
    }
}

fn on_control<O: SurfaceOps, P: WorkerProcess>(
    ctx: &mut CoordinatorContext<O, P>,
    msg: Result<ControlMessage, HandshakeError>,
) -> Dispatch {
    let reply = match msg {
        Ok(ControlMessage::RegisterFollower(surface)) => {
            match ctx.handshake.receive(&mut ctx.ops, surface, &mut ctx.embedded) {
                Ok(_) => HandshakeReply::Embedded,
                Err(_) => HandshakeReply::Rejected,
            }
        }
        Err(e) => {
            warn!(error = %e, "ignoring malformed control message");
            HandshakeReply::Rejected
        }
    };
    Dispatch::Handled(reply.to_result())
}

fn on_resized<O: SurfaceOps, P: WorkerProcess>(ctx: &mut CoordinatorContext<O, P>, minimized: bool) -> Dispatch {
    ctx.layout.on_resize(&mut ctx.ops, ctx.window, ctx.embedded, minimized);
    Dispatch::Handled(0)
}

fn on_moved<O: SurfaceOps, P: WorkerProcess>(ctx: &mut CoordinatorContext<O, P>) -> Dispatch {
    if ctx.layout.on_reposition(&mut ctx.ops, ctx.embedded) {
        debug!("coordinator moved, refreshed follower");
    }
    Dispatch::Handled(0)
}

fn on_position_changed<O: SurfaceOps, P: WorkerProcess>(ctx: &mut CoordinatorContext<O, P>, size_changed: bool) -> Dispatch {
    ctx.layout.on_position_changed(&mut ctx.ops, ctx.embedded, size_changed);
    // Default processing turns this into the resize and move notifications.
    Dispatch::PassThrough
}

fn on_painted<O: SurfaceOps, P: WorkerProcess>(ctx: &mut CoordinatorContext<O, P>) -> Dispatch {
    ctx.layout.on_reposition(&mut ctx.ops, ctx.embedded);
    Dispatch::Handled(0)
}

fn on_child_destroyed<O: SurfaceOps, P: WorkerProcess>(ctx: &mut CoordinatorContext<O, P>, child: SurfaceHandle) -> Dispatch {
    if ctx.embedded == Some(child) {
        info!(follower = ?child, "follower window destroyed");
        ctx.embedded = None;
        ctx.handshake.reset();
    }
    Dispatch::PassThrough
}

fn on_destroyed<O: SurfaceOps, P: WorkerProcess>(ctx: &mut CoordinatorContext<O, P>) -> Dispatch {
    info!("coordinator window destroyed, shutting down the worker");
    ctx.shutdown();
    Dispatch::Quit(0)
}
