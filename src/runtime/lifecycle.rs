// SPDX-License-Identifier: MIT

//! Worker shutdown.
//!
//! Shutdown is a two phase affair.  The worker is first asked to close its
//! surface, which ends its message loop, and given a bounded time to exit.
//! If it is still alive after that it is terminated.  Either way the process
//! is waited on once more, its handle released, and the embedded surface
//! reference cleared.
//!
//! The graceful wait keeps servicing messages sent to the waiting thread.
//! The worker's surface is a child of the coordinator's window, so closing
//! it sends the coordinator a notification and blocks until that is
//! handled; a plain wait would hold both processes until the timeout.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::error::OsCode;

/// Exit code handed to a worker that had to be terminated.
pub const FORCED_EXIT_CODE: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited(u32),
    TimedOut,
}

/// Why [`WorkerProcess::wait_or_sent_message`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitWake {
    Exited(u32),
    /// Another thread sent this one a message; pump it and wait again.
    SentMessage,
    TimedOut,
}

/// An owned worker process.
///
/// Dropping the implementation releases the OS handle; it must not
/// terminate the process.
pub trait WorkerProcess {
    fn id(&self) -> u32;

    /// Wait up to `timeout` for the process to exit.  A zero timeout polls.
    fn wait(&mut self, timeout: Duration) -> Result<WaitOutcome, OsCode>;

    fn terminate(&mut self, exit_code: u32) -> Result<(), OsCode>;

    /// Like [`wait`](Self::wait), but also wakes when a message is sent to
    /// the calling thread.
    fn wait_or_sent_message(&mut self, timeout: Duration) -> Result<WaitWake, OsCode> {
        Ok(match self.wait(timeout)? {
            WaitOutcome::Exited(code) => WaitWake::Exited(code),
            WaitOutcome::TimedOut => WaitWake::TimedOut,
        })
    }
}

/// Something that can ask the worker to close its surface.
pub trait CloseRequester<S> {
    /// Post a close request.  Must not wait for it to be handled.
    fn request_close(&mut self, surface: S) -> Result<(), OsCode>;
}

/// Handles messages sent to the waiting thread.
pub trait SentMessagePump {
    fn pump_sent(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No worker was spawned.
    Idle,
    Running,
    ClosingGracefully,
    Exited,
    ForceKilled,
    Reaped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GracefulOutcome {
    Exited(u32),
    TimedOut,
}

/// What a teardown did, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownReport {
    pub close_requested: bool,
    pub terminated: bool,
    pub exit_code: Option<u32>,
}

/// Wait for the worker to leave on its own, pumping sent messages until
/// `timeout` has passed.
pub fn close_gracefully<P, M>(process: &mut P, timeout: Duration, pump: &mut M) -> GracefulOutcome
where
    P: WorkerProcess,
    M: SentMessagePump + ?Sized,
{
    let deadline = Instant::now() + timeout;
    let mut remaining = timeout;
    loop {
        match process.wait_or_sent_message(remaining) {
            Ok(WaitWake::Exited(code)) => return GracefulOutcome::Exited(code),
            Ok(WaitWake::SentMessage) => {
                pump.pump_sent();
                remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    info!(pid = process.id(), "graceful close deadline passed while pumping messages");
                    return GracefulOutcome::TimedOut;
                }
            }
            Ok(WaitWake::TimedOut) => {
                info!(pid = process.id(), timeout_ms = timeout.as_millis() as u64, "worker did not exit gracefully");
                return GracefulOutcome::TimedOut;
            }
            Err(code) => {
                // A wait that cannot be performed is treated like a timeout,
                // so the process still gets terminated.
                warn!(pid = process.id(), %code, "waiting for the worker failed");
                return GracefulOutcome::TimedOut;
            }
        }
    }
}

/// Terminate the worker.  Failures are logged only; a process that is
/// already gone also fails to terminate.
pub fn force_terminate<P: WorkerProcess>(process: &mut P) -> bool {
    match process.terminate(FORCED_EXIT_CODE) {
        Ok(()) => {
            info!(pid = process.id(), "worker process terminated");
            true
        }
        Err(code) => {
            warn!(pid = process.id(), %code, "terminating the worker failed");
            false
        }
    }
}

/// Owns the worker process from spawn to reap.
pub struct LifecycleController<P: WorkerProcess> {
    process: Option<P>,
    state: LifecycleState,
    graceful_timeout: Duration,
    reap_timeout: Duration,
}

impl<P: WorkerProcess> LifecycleController<P> {
    pub fn new(graceful_timeout: Duration, reap_timeout: Duration) -> Self {
        Self { process: None, state: LifecycleState::Idle, graceful_timeout, reap_timeout }
    }

    /// Take ownership of a freshly spawned worker.
    pub fn attach(&mut self, process: P) {
        debug!(pid = process.id(), "tracking worker process");
        self.process = Some(process);
        self.state = LifecycleState::Running;
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Shut the worker down and release it.
    ///
    /// `embedded` is the surface reference; it is cleared here.  Safe to
    /// call with no worker, with a worker that already exited, and more than
    /// once.
    pub fn teardown<S, C>(&mut self, embedded: &mut Option<S>, closer: &mut C) -> TeardownReport
    where
        S: Copy + std::fmt::Debug,
        C: CloseRequester<S> + SentMessagePump,
    {
        let mut report = TeardownReport { close_requested: false, terminated: false, exit_code: None };
        let Some(mut process) = self.process.take() else {
            // Nothing was ever spawned, or it was already reaped.
            *embedded = None;
            return report;
        };
        info!(pid = process.id(), "shutting down worker process");

        let mut outcome = match process.wait(Duration::ZERO) {
            Ok(WaitOutcome::Exited(code)) => {
                debug!(pid = process.id(), code, "worker already exited");
                GracefulOutcome::Exited(code)
            }
            _ => GracefulOutcome::TimedOut,
        };

        if outcome == GracefulOutcome::TimedOut {
            if let Some(surface) = *embedded {
                self.state = LifecycleState::ClosingGracefully;
                match closer.request_close(surface) {
                    Ok(()) => {
                        debug!(?surface, "posted close request to the worker surface");
                        report.close_requested = true;
                        outcome = close_gracefully(&mut process, self.graceful_timeout, closer);
                    }
                    Err(code) => warn!(?surface, %code, "could not post close request to the worker surface"),
                }
            } else {
                info!(pid = process.id(), "no embedded surface, terminating the worker directly");
            }
        }

        match outcome {
            GracefulOutcome::Exited(code) => {
                self.state = LifecycleState::Exited;
                report.exit_code = Some(code);
            }
            GracefulOutcome::TimedOut => {
                report.terminated = force_terminate(&mut process);
                self.state = LifecycleState::ForceKilled;
                match process.wait(self.reap_timeout) {
                    Ok(WaitOutcome::Exited(code)) => report.exit_code = Some(code),
                    Ok(WaitOutcome::TimedOut) => warn!(pid = process.id(), "worker still running after termination"),
                    Err(code) => warn!(pid = process.id(), %code, "waiting for the terminated worker failed"),
                }
            }
        }

        let pid = process.id();
        drop(process);
        *embedded = None;
        self.state = LifecycleState::Reaped;
        info!(pid, exit_code = ?report.exit_code, "worker process reaped and handle closed");
        report
    }
}

impl<P: WorkerProcess> Drop for LifecycleController<P> {
    fn drop(&mut self) {
        // A worker still attached here means teardown never ran; the handle
        // is released but the process left alone.
        if let Some(process) = self.process.take() {
            warn!(pid = process.id(), "releasing worker process without teardown");
        }
    }
}
