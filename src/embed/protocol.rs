// SPDX-License-Identifier: MIT

//! The embedding handshake.
//!
//! The worker creates its surface hidden and unparented, finds the
//! coordinator's window by class name, and sends it one `REGISTER_FOLLOWER`
//! message carrying the surface handle.  The coordinator turns the surface
//! into a child window, reparents it and lays it out.
//!
//! The send must not block.  While the coordinator handles the message it
//! calls into the worker's surface (style, position, repaint), and those
//! calls are serviced by the worker's message loop.  A worker blocked in a
//! synchronous send would never pump them, and both processes would hang.
//! Only the asynchronous [`AsyncNotifier`] exists for that reason.
//!
//! The coordinator's answer comes back through the notifier's completion
//! callback as a `HANDSHAKE_REPLY` in the worker's own queue.

use tracing::{debug, info, warn};

use super::{
    layout::target_rect,
    surface::{style::WS_VISIBLE, Rect, SurfaceHandle, SurfaceOps, WindowStyle},
};
use crate::runtime::error::{HandshakeError, OsCode};

pub const WM_USER: u32 = 0x0400;
pub const WM_APP: u32 = 0x8000;

/// Worker to coordinator: "embed this surface".  `WPARAM` holds the handle.
pub const REGISTER_FOLLOWER: u32 = WM_USER + 1;

/// Posted by the worker to itself once the coordinator answered.
/// `WPARAM` holds the coordinator's result.
pub const HANDSHAKE_REPLY: u32 = WM_APP + 1;

/// Cross-process control messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    RegisterFollower(SurfaceHandle),
}

impl ControlMessage {
    pub fn kind(&self) -> u32 {
        match self {
            Self::RegisterFollower(_) => REGISTER_FOLLOWER,
        }
    }

    /// `(WPARAM, LPARAM)` for the message.
    pub fn params(&self) -> (usize, isize) {
        match self {
            Self::RegisterFollower(surface) => (surface.raw() as usize, 0),
        }
    }

    /// `None` if `kind` is not a control message.
    pub fn decode(kind: u32, wparam: usize, _lparam: isize) -> Option<Result<Self, HandshakeError>> {
        match kind {
            REGISTER_FOLLOWER => Some(
                SurfaceHandle::from_raw(wparam as isize)
                    .map(Self::RegisterFollower)
                    .ok_or(HandshakeError::NullSurface),
            ),
            _ => None,
        }
    }
}

/// The coordinator's answer, as the handler's result value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeReply {
    Embedded,
    Rejected,
}

impl HandshakeReply {
    pub fn to_result(self) -> isize {
        match self {
            Self::Embedded => 1,
            Self::Rejected => 0,
        }
    }

    pub fn from_result(result: isize) -> Self {
        if result == 1 { Self::Embedded } else { Self::Rejected }
    }
}

/// Fire-and-forget delivery of a control message to another process.
///
/// `notify` returns as soon as the message is queued, before the receiver
/// has run its handler.  Any reply arrives later through the sender's own
/// message loop.
pub trait AsyncNotifier {
    fn notify(&mut self, target: SurfaceHandle, message: ControlMessage) -> Result<(), OsCode>;
}

/// Finds the coordinator's window by its well-known class name.
pub trait CoordinatorLocator {
    fn locate(&self, class: &str) -> Option<SurfaceHandle>;
}

impl<F> CoordinatorLocator for F
where
    F: Fn(&str) -> Option<SurfaceHandle>,
{
    fn locate(&self, class: &str) -> Option<SurfaceHandle> {
        self(class)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Announced,
    Embedded,
    FailedAnnounce,
}

/// Sender half of the handshake.
#[derive(Debug)]
pub struct WorkerHandshake {
    surface: SurfaceHandle,
    state: WorkerState,
}

impl WorkerHandshake {
    pub fn new(surface: SurfaceHandle) -> Self {
        Self { surface, state: WorkerState::Created }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn surface(&self) -> SurfaceHandle {
        self.surface
    }

    /// Locate the coordinator and send it the surface handle.
    /// Returns once the message is queued.
    pub fn announce<L, N>(&mut self, class: &str, locator: &L, notifier: &mut N) -> Result<SurfaceHandle, HandshakeError>
    where
        L: CoordinatorLocator + ?Sized,
        N: AsyncNotifier + ?Sized,
    {
        if self.state != WorkerState::Created {
            warn!(state = ?self.state, "surface was already announced");
            return Err(HandshakeError::AlreadyEmbedded);
        }
        let Some(coordinator) = locator.locate(class) else {
            warn!(class, "failed to find the coordinator window");
            self.state = WorkerState::FailedAnnounce;
            return Err(HandshakeError::CoordinatorNotFound { class: class.to_string() });
        };
        debug!(?coordinator, "found coordinator window");

        info!(surface = ?self.surface, "sending REGISTER_FOLLOWER to the coordinator");
        match notifier.notify(coordinator, ControlMessage::RegisterFollower(self.surface)) {
            Ok(()) => {
                debug!("REGISTER_FOLLOWER queued");
                self.state = WorkerState::Announced;
                Ok(coordinator)
            }
            Err(code) => {
                warn!(%code, "sending REGISTER_FOLLOWER failed");
                self.state = WorkerState::FailedAnnounce;
                Err(HandshakeError::Announce(code))
            }
        }
    }

    /// Record the coordinator's answer.  A rejected surface stays announced
    /// and detached; nothing retries.
    pub fn on_reply(&mut self, reply: HandshakeReply) -> WorkerState {
        match (self.state, reply) {
            (WorkerState::Announced, HandshakeReply::Embedded) => {
                info!(surface = ?self.surface, "surface embedded by the coordinator");
                self.state = WorkerState::Embedded;
            }
            (WorkerState::Announced, HandshakeReply::Rejected) => {
                warn!(surface = ?self.surface, "coordinator rejected the surface; it stays detached");
            }
            (state, reply) => {
                debug!(?state, ?reply, "ignoring unexpected handshake reply");
            }
        }
        self.state
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    AwaitingFollower,
    Reparenting,
    Embedded,
    ReparentFailed,
}

/// Receiver half of the handshake.
#[derive(Debug)]
pub struct CoordinatorHandshake {
    window: SurfaceHandle,
    inset: i32,
    state: CoordinatorState,
    expected_owner: Option<u32>,
}

impl CoordinatorHandshake {
    pub fn new(window: SurfaceHandle, inset: i32) -> Self {
        Self { window, inset, state: CoordinatorState::AwaitingFollower, expected_owner: None }
    }

    /// Only accept surfaces owned by process `pid`.
    pub fn expect_owner(&mut self, pid: u32) {
        self.expected_owner = Some(pid);
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// The embedded surface went away; a new one may register.
    pub fn reset(&mut self) {
        self.state = CoordinatorState::AwaitingFollower;
    }

    /// Embed `surface` under the coordinator window.
    ///
    /// `embedded` is the coordinator's single embedded-surface reference.
    /// It is only written here, and only on success.  A failure leaves the
    /// surface detached and hidden, and is not retried.
    pub fn receive<O: SurfaceOps>(
        &mut self,
        ops: &mut O,
        surface: SurfaceHandle,
        embedded: &mut Option<SurfaceHandle>,
    ) -> Result<Rect, HandshakeError> {
        info!(follower = ?surface, "received REGISTER_FOLLOWER");
        if let Some(current) = *embedded {
            warn!(follower = ?surface, ?current, "a follower is already embedded, rejecting");
            return Err(HandshakeError::AlreadyEmbedded);
        }
        self.state = CoordinatorState::Reparenting;
        match self.embed(ops, surface) {
            Ok(rect) => {
                *embedded = Some(surface);
                self.state = CoordinatorState::Embedded;
                Ok(rect)
            }
            Err(e) => {
                warn!(follower = ?surface, error = %e, "handshake abandoned");
                self.state = CoordinatorState::ReparentFailed;
                Err(e)
            }
        }
    }

    fn embed<O: SurfaceOps>(&self, ops: &mut O, surface: SurfaceHandle) -> Result<Rect, HandshakeError> {
        if let Some(expected) = self.expected_owner {
            let owner = ops.owner_process(surface).map_err(HandshakeError::OwnerLookup)?;
            if owner != expected {
                return Err(HandshakeError::ForeignSurface { owner, expected });
            }
        }

        let original = ops.style(surface).map_err(HandshakeError::Style)?;
        let child = original.as_embedded_child();
        debug!(
            from_style = %format!("{:#010x}", original.style),
            to_style = %format!("{:#010x}", child.style),
            from_ex_style = %format!("{:#010x}", original.ex_style),
            to_ex_style = %format!("{:#010x}", child.ex_style),
            "rewriting follower style"
        );
        ops.set_style(surface, child).map_err(HandshakeError::Style)?;

        self.attach(ops, surface).inspect_err(|_| restore_detached(ops, surface, original))
    }

    /// Reparent the restyled surface, confirm it, and lay it out.
    fn attach<O: SurfaceOps>(&self, ops: &mut O, surface: SurfaceHandle) -> Result<Rect, HandshakeError> {
        let prior = ops.reparent(surface, self.window).map_err(HandshakeError::Reparent)?;
        match prior {
            Some(prior) => debug!(?prior, "follower detached from its previous parent"),
            None => debug!("follower had no previous parent"),
        }
        if ops.parent_of(surface) != Some(self.window) {
            return Err(HandshakeError::ReparentNotApplied);
        }
        info!("reparent successful");

        let client = ops.client_rect(self.window).map_err(HandshakeError::ClientArea)?;
        debug!(width = client.width, height = client.height, "coordinator client rect");
        let rect = target_rect(client, self.inset);
        ops.place(surface, rect, true).map_err(HandshakeError::Placement)?;
        ops.redraw(surface).map_err(HandshakeError::Placement)?;
        ops.raise(surface).map_err(HandshakeError::Placement)?;
        info!(x = rect.x, y = rect.y, width = rect.width, height = rect.height, "follower window positioned and shown");
        Ok(rect)
    }
}

/// Undo a partial embedding: hidden, unparented, and back to its own style.
fn restore_detached<O: SurfaceOps>(ops: &mut O, surface: SurfaceHandle, original: WindowStyle) {
    if let Err(code) = ops.detach(surface) {
        warn!(follower = ?surface, %code, "could not detach the follower window");
    }
    let hidden = WindowStyle { style: original.style & !WS_VISIBLE, ..original };
    if let Err(code) = ops.set_style(surface, hidden) {
        warn!(follower = ?surface, %code, "could not restore the follower style");
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            mpsc, Arc,
        },
        thread,
        time::{Duration, Instant},
    };

    use super::super::surface::fake::{h, Call, FakeSurfaces, WORKER_PID};
    use super::super::surface::{style::*, WindowStyle};
    use super::*;

    const COORDINATOR: isize = 0x100;
    const WORKER: isize = 0x200;

    fn worker_style() -> WindowStyle {
        WindowStyle { style: WS_POPUP | WS_CLIPSIBLINGS | WS_CLIPCHILDREN, ex_style: WS_EX_TOOLWINDOW }
    }

    fn surfaces() -> FakeSurfaces {
        let mut ops = FakeSurfaces::with_coordinator(h(COORDINATOR), Rect::new(0, 0, 300, 200));
        ops.add_worker(h(WORKER), worker_style());
        ops
    }

    #[test]
    fn control_message_round_trips_through_params() {
        let msg = ControlMessage::RegisterFollower(h(WORKER));
        let (wparam, lparam) = msg.params();
        assert_eq!(msg.kind(), REGISTER_FOLLOWER);
        assert_eq!(ControlMessage::decode(msg.kind(), wparam, lparam), Some(Ok(msg)));
        assert_eq!(ControlMessage::decode(REGISTER_FOLLOWER, 0, 0), Some(Err(HandshakeError::NullSurface)));
        assert_eq!(ControlMessage::decode(WM_USER + 7, 1, 0), None);
    }

    #[test]
    fn reply_encoding() {
        assert_eq!(HandshakeReply::from_result(HandshakeReply::Embedded.to_result()), HandshakeReply::Embedded);
        assert_eq!(HandshakeReply::from_result(0), HandshakeReply::Rejected);
        assert_eq!(HandshakeReply::from_result(-1), HandshakeReply::Rejected);
    }

    #[test]
    fn normal_embedding() {
        let mut ops = surfaces();
        let mut hs = CoordinatorHandshake::new(h(COORDINATOR), 3);
        let mut embedded = None;
        assert_eq!(hs.state(), CoordinatorState::AwaitingFollower);

        let rect = hs.receive(&mut ops, h(WORKER), &mut embedded).unwrap();

        assert_eq!(rect, Rect::new(3, 3, 294, 194));
        assert_eq!(embedded, Some(h(WORKER)));
        assert_eq!(hs.state(), CoordinatorState::Embedded);
        let w = &ops.windows[&h(WORKER)];
        assert_eq!(w.parent, Some(h(COORDINATOR)));
        assert_eq!(w.style.style, WS_CHILD | WS_VISIBLE | WS_CLIPSIBLINGS | WS_CLIPCHILDREN);
        assert_eq!(w.style.ex_style, 0);
        // Style is rewritten before the reparent, and the surface is raised last.
        assert!(matches!(ops.calls[0], Call::SetStyle(..)));
        assert_eq!(ops.calls[1], Call::Reparent(h(WORKER), h(COORDINATOR)));
        // Placed, then repainted at once, then raised.
        assert_eq!(
            &ops.calls[2..],
            &[Call::Place(h(WORKER), rect), Call::Redraw(h(WORKER)), Call::Raise(h(WORKER))],
        );
    }

    #[test]
    fn style_failure_abandons_the_handshake() {
        let mut ops = surfaces();
        ops.fail_set_style = Some(OsCode(5));
        let mut hs = CoordinatorHandshake::new(h(COORDINATOR), 3);
        let mut embedded = None;
        assert_eq!(hs.receive(&mut ops, h(WORKER), &mut embedded), Err(HandshakeError::Style(OsCode(5))));
        assert_eq!(embedded, None);
        assert_eq!(hs.state(), CoordinatorState::ReparentFailed);
        assert_eq!(ops.windows[&h(WORKER)].parent, None);
    }

    #[test]
    fn reparent_failure_leaves_the_surface_detached() {
        let mut ops = surfaces();
        ops.fail_reparent = Some(OsCode(5));
        let mut hs = CoordinatorHandshake::new(h(COORDINATOR), 3);
        let mut embedded = None;
        assert_eq!(hs.receive(&mut ops, h(WORKER), &mut embedded), Err(HandshakeError::Reparent(OsCode(5))));
        assert_eq!(embedded, None);
        assert_eq!(hs.state(), CoordinatorState::ReparentFailed);
        assert!(!ops.calls.iter().any(|c| matches!(c, Call::Place(..))));
        // The child style written before the reparent is rolled back.
        let w = &ops.windows[&h(WORKER)];
        assert_eq!(w.parent, None);
        assert_eq!(w.style, worker_style());
        assert_eq!(w.style.style & WS_VISIBLE, 0);
    }

    #[test]
    fn placement_failure_detaches_and_hides_the_surface() {
        let mut ops = surfaces();
        ops.fail_place = Some(OsCode(1400));
        let mut hs = CoordinatorHandshake::new(h(COORDINATOR), 3);
        let mut embedded = None;
        assert_eq!(hs.receive(&mut ops, h(WORKER), &mut embedded), Err(HandshakeError::Placement(OsCode(1400))));
        assert_eq!(embedded, None);
        assert!(ops.calls.contains(&Call::Detach(h(WORKER))));
        let w = &ops.windows[&h(WORKER)];
        assert_eq!(w.parent, None);
        assert_eq!(w.style, worker_style());
    }

    #[test]
    fn only_the_expected_owner_is_embedded() {
        let mut ops = surfaces();
        let mut hs = CoordinatorHandshake::new(h(COORDINATOR), 3);
        let mut embedded = None;
        hs.expect_owner(WORKER_PID + 1);
        assert_eq!(
            hs.receive(&mut ops, h(WORKER), &mut embedded),
            Err(HandshakeError::ForeignSurface { owner: WORKER_PID, expected: WORKER_PID + 1 }),
        );
        assert_eq!(embedded, None);
        assert!(ops.calls.is_empty(), "a foreign surface must not be touched");

        hs.expect_owner(WORKER_PID);
        assert!(hs.receive(&mut ops, h(WORKER), &mut embedded).is_ok());
        assert_eq!(embedded, Some(h(WORKER)));
    }

    #[test]
    fn reparent_is_confirmed_by_the_actual_parent() {
        let mut ops = surfaces();
        ops.ignore_reparent = true;
        let mut hs = CoordinatorHandshake::new(h(COORDINATOR), 3);
        let mut embedded = None;
        assert_eq!(hs.receive(&mut ops, h(WORKER), &mut embedded), Err(HandshakeError::ReparentNotApplied));
        assert_eq!(embedded, None);
        assert_eq!(ops.windows[&h(WORKER)].style, worker_style());
    }

    #[test]
    fn dead_surface_is_rejected() {
        let mut ops = surfaces();
        let mut hs = CoordinatorHandshake::new(h(COORDINATOR), 3);
        let mut embedded = None;
        let err = hs.receive(&mut ops, h(0x999), &mut embedded).unwrap_err();
        assert_eq!(err, HandshakeError::Style(OsCode(1400)));
    }

    #[test]
    fn second_follower_is_rejected() {
        let mut ops = surfaces();
        ops.add_worker(h(0x300), worker_style());
        let mut hs = CoordinatorHandshake::new(h(COORDINATOR), 3);
        let mut embedded = None;
        hs.receive(&mut ops, h(WORKER), &mut embedded).unwrap();
        assert_eq!(hs.receive(&mut ops, h(0x300), &mut embedded), Err(HandshakeError::AlreadyEmbedded));
        assert_eq!(embedded, Some(h(WORKER)));
        assert_eq!(ops.windows[&h(0x300)].parent, None);
    }

    struct RecordingNotifier {
        sent: Vec<(SurfaceHandle, ControlMessage)>,
        fail: Option<OsCode>,
    }

    impl AsyncNotifier for RecordingNotifier {
        fn notify(&mut self, target: SurfaceHandle, message: ControlMessage) -> Result<(), OsCode> {
            if let Some(code) = self.fail {
                return Err(code);
            }
            self.sent.push((target, message));
            Ok(())
        }
    }

    #[test]
    fn worker_announces_then_embeds() {
        let mut notifier = RecordingNotifier { sent: vec![], fail: None };
        let locator = |class: &str| (class == "Coordinator").then(|| h(COORDINATOR));
        let mut hs = WorkerHandshake::new(h(WORKER));
        assert_eq!(hs.state(), WorkerState::Created);

        assert_eq!(hs.announce("Coordinator", &locator, &mut notifier), Ok(h(COORDINATOR)));
        assert_eq!(hs.state(), WorkerState::Announced);
        assert_eq!(notifier.sent, vec![(h(COORDINATOR), ControlMessage::RegisterFollower(h(WORKER)))]);

        assert_eq!(hs.on_reply(HandshakeReply::Embedded), WorkerState::Embedded);
        // Announcing twice is refused.
        assert_eq!(hs.announce("Coordinator", &locator, &mut notifier), Err(HandshakeError::AlreadyEmbedded));
        assert_eq!(notifier.sent.len(), 1);
    }

    #[test]
    fn worker_without_coordinator_fails_announce() {
        let mut notifier = RecordingNotifier { sent: vec![], fail: None };
        let locator = |_: &str| -> Option<SurfaceHandle> { None };
        let mut hs = WorkerHandshake::new(h(WORKER));
        let err = hs.announce("Coordinator", &locator, &mut notifier).unwrap_err();
        assert_eq!(err, HandshakeError::CoordinatorNotFound { class: "Coordinator".to_string() });
        assert_eq!(hs.state(), WorkerState::FailedAnnounce);
        assert!(notifier.sent.is_empty());
    }

    #[test]
    fn worker_send_failure_fails_announce() {
        let mut notifier = RecordingNotifier { sent: vec![], fail: Some(OsCode(1400)) };
        let locator = |_: &str| Some(h(COORDINATOR));
        let mut hs = WorkerHandshake::new(h(WORKER));
        assert_eq!(hs.announce("C", &locator, &mut notifier), Err(HandshakeError::Announce(OsCode(1400))));
        assert_eq!(hs.state(), WorkerState::FailedAnnounce);
    }

    #[test]
    fn rejected_worker_stays_announced() {
        let mut notifier = RecordingNotifier { sent: vec![], fail: None };
        let locator = |_: &str| Some(h(COORDINATOR));
        let mut hs = WorkerHandshake::new(h(WORKER));
        hs.announce("C", &locator, &mut notifier).unwrap();
        assert_eq!(hs.on_reply(HandshakeReply::Rejected), WorkerState::Announced);
    }

    /// Messages arriving in the simulated worker's queue.
    enum WorkerMessage {
        /// The coordinator touching the worker's surface while it handles
        /// the handshake; it waits for the answer.
        QueryStyle(mpsc::Sender<WindowStyle>),
        Reply(HandshakeReply),
    }

    /// Queues the control message for a coordinator thread and returns.
    struct ChannelNotifier {
        to_coordinator: mpsc::Sender<ControlMessage>,
    }

    impl AsyncNotifier for ChannelNotifier {
        fn notify(&mut self, _target: SurfaceHandle, message: ControlMessage) -> Result<(), OsCode> {
            self.to_coordinator.send(message).map_err(|_| OsCode(1400))
        }
    }

    #[test]
    fn announce_returns_before_a_slow_coordinator_finishes() {
        let (to_coordinator, coordinator_inbox) = mpsc::channel::<ControlMessage>();
        let (to_worker, worker_inbox) = mpsc::channel::<WorkerMessage>();
        let handled = Arc::new(AtomicBool::new(false));

        let coordinator = {
            let handled = handled.clone();
            thread::spawn(move || {
                let ControlMessage::RegisterFollower(_) = coordinator_inbox.recv().unwrap();
                // Calls back into the worker, as the reparent and resize do.
                let (answer_tx, answer_rx) = mpsc::channel();
                to_worker.send(WorkerMessage::QueryStyle(answer_tx)).unwrap();
                let style = answer_rx.recv_timeout(Duration::from_secs(5)).expect("worker loop stalled");
                assert_eq!(style, worker_style());
                thread::sleep(Duration::from_millis(200));
                handled.store(true, Ordering::SeqCst);
                to_worker.send(WorkerMessage::Reply(HandshakeReply::Embedded)).unwrap();
            })
        };

        let mut notifier = ChannelNotifier { to_coordinator };
        let locator = |_: &str| Some(h(COORDINATOR));
        let mut hs = WorkerHandshake::new(h(WORKER));
        hs.announce("C", &locator, &mut notifier).unwrap();
        assert!(!handled.load(Ordering::SeqCst), "announce waited for the coordinator");

        // The worker's message loop.
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut serviced = 0;
        while hs.state() != WorkerState::Embedded {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match worker_inbox.recv_timeout(remaining).expect("handshake deadlocked") {
                WorkerMessage::QueryStyle(answer) => {
                    serviced += 1;
                    answer.send(worker_style()).unwrap();
                }
                WorkerMessage::Reply(reply) => {
                    hs.on_reply(reply);
                }
            }
        }
        coordinator.join().unwrap();
        assert_eq!(serviced, 1);
        assert!(handled.load(Ordering::SeqCst));
    }
}
