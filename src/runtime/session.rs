// SPDX-License-Identifier: MIT

//! The coordinator's hold on its worker's sandbox identity.
//!
//! The identity is ensured right before the worker is spawned and deleted
//! only once the worker is gone: after a failed spawn, or after teardown.
//! [`WorkerSession::finish`] takes the [`TeardownReport`] so it cannot run
//! before the teardown did.  Without sandboxing there is nothing to hold.

use std::fmt::Display;

use tracing::{debug, warn};

use super::{
    error::FollowerError,
    identity::{DeleteOutcome, IdentityProfile, IdentityStore, SandboxIdentityManager},
    launcher::{self, ProcessSpawner, WorkerCommand},
    lifecycle::TeardownReport,
};

pub struct WorkerSession<S: IdentityStore> {
    profile: IdentityProfile,
    identities: Option<SandboxIdentityManager<S>>,
}

impl<S: IdentityStore> WorkerSession<S>
where
    S::Sid: Display,
{
    /// `store` is `Some` when the worker is to run sandboxed.
    pub fn new(profile: IdentityProfile, store: Option<S>) -> Self {
        Self { profile, identities: store.map(SandboxIdentityManager::new) }
    }

    pub fn is_sandboxed(&self) -> bool {
        self.identities.is_some()
    }

    /// Ensure the identity when sandboxed, then spawn the worker.  On any
    /// failure the identity is deleted again before the error is returned.
    pub fn start<P>(&mut self, spawner: &mut P, command: &WorkerCommand) -> Result<P::Process, FollowerError>
    where
        P: ProcessSpawner<Sid = S::Sid>,
    {
        let started = match self.identities.as_mut() {
            Some(manager) => manager.ensure_identity(&self.profile).and_then(|identity| {
                debug!(name = identity.name(), sid = %identity.sid(), created = identity.created(), "sandbox identity");
                launcher::spawn(spawner, command, Some(&identity))
            }),
            None => launcher::spawn(spawner, command, None),
        };
        if started.is_err() {
            self.release();
        }
        started
    }

    /// Delete the identity of a worker that has been torn down.  Failures
    /// are logged only.
    pub fn finish(mut self, teardown: TeardownReport) -> Option<DeleteOutcome> {
        debug!(?teardown, sandboxed = self.is_sandboxed(), "worker gone, releasing the session");
        self.release()
    }

    fn release(&mut self) -> Option<DeleteOutcome> {
        let manager = self.identities.as_mut()?;
        match manager.delete_identity(&self.profile.name) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(error = %e, "sandbox identity left behind");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{path::Path, time::Duration};

    use super::*;
    use crate::runtime::{
        error::{ErrorCategory, OsCode},
        identity::fake::MemoryStore,
        launcher::fake::RecordingSpawner,
        lifecycle::{
            fake::{FakeCloser, FakeProcess},
            LifecycleController,
        },
    };

    const NAME: &str = "WindowFollower.Session";

    fn profile() -> IdentityProfile {
        IdentityProfile::new(NAME, "Session", "Session test")
    }

    fn command() -> WorkerCommand {
        WorkerCommand::new(Path::new("w.exe"), false)
    }

    fn stored(session: &WorkerSession<MemoryStore>) -> bool {
        session.identities.as_ref().is_some_and(|m| m.store().profiles.contains_key(NAME))
    }

    #[test]
    fn identity_outlives_the_worker_until_teardown() {
        let mut session = WorkerSession::new(profile(), Some(MemoryStore::default()));
        let mut spawner = RecordingSpawner::default();
        let pid = session.start(&mut spawner, &command()).unwrap();
        assert!(spawner.calls[0].1.is_some(), "sandboxed spawn carries the identity");
        assert!(stored(&session));

        let process = FakeProcess::running(pid);
        let mut closer = FakeCloser::for_process(&process);
        let mut lifecycle = LifecycleController::new(Duration::from_millis(20), Duration::from_millis(10));
        lifecycle.attach(process);
        // The worker is still being torn down; the identity stays.
        let report = lifecycle.teardown(&mut Some(0x1isize), &mut closer);
        assert!(stored(&session));

        assert_eq!(session.finish(report), Some(DeleteOutcome::Deleted));
    }

    #[test]
    fn unsandboxed_session_leaves_the_store_alone() {
        let mut session = WorkerSession::<MemoryStore>::new(profile(), None);
        assert!(!session.is_sandboxed());
        let mut spawner = RecordingSpawner::default();
        session.start(&mut spawner, &command()).unwrap();
        assert_eq!(spawner.calls[0].1, None);
        let report = TeardownReport { close_requested: true, terminated: false, exit_code: Some(0) };
        assert_eq!(session.finish(report), None);
    }

    #[test]
    fn spawn_failure_deletes_the_identity_and_is_fatal() {
        let mut session = WorkerSession::new(profile(), Some(MemoryStore::default()));
        let mut spawner = RecordingSpawner { fail: Some(OsCode(2)), ..Default::default() };
        let err = session.start(&mut spawner, &command()).unwrap_err();
        assert!(matches!(err, FollowerError::Spawn(OsCode(2))));
        assert_eq!(err.category(), ErrorCategory::StartupFatal);
        assert_eq!(spawner.calls.len(), 1);
        assert!(!stored(&session));
    }

    #[test]
    fn identity_setup_failure_does_not_spawn() {
        let store = MemoryStore { fail_create: Some(OsCode(5)), ..Default::default() };
        let mut session = WorkerSession::new(profile(), Some(store));
        let mut spawner = RecordingSpawner::default();
        let err = session.start(&mut spawner, &command()).unwrap_err();
        assert!(matches!(err, FollowerError::IdentitySetup { .. }));
        assert_eq!(err.category(), ErrorCategory::StartupFatal);
        assert!(spawner.calls.is_empty());
    }

    #[test]
    fn failed_delete_is_only_logged() {
        let mut session = WorkerSession::new(profile(), Some(MemoryStore::default()));
        session.start(&mut RecordingSpawner::default(), &command()).unwrap();
        if let Some(manager) = session.identities.as_mut() {
            manager.store_mut().fail_delete = Some(OsCode(32));
        }
        let report = TeardownReport { close_requested: false, terminated: true, exit_code: Some(0) };
        assert_eq!(session.finish(report), None);
    }
}
