// SPDX-License-Identifier: MIT

//! Sandbox identity management.
//!
//! A sandbox identity is a named, durable restricted execution context (an
//! AppContainer profile on Windows).  It outlives the process that created
//! it, so creation has to be idempotent: finding the profile already there
//! resolves to the existing identity instead of failing.

use tracing::{debug, info, warn};

use super::error::{FollowerError, OsCode};

/// Profile description handed to the store when creating the identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProfile {
    pub name: String,
    pub display_name: String,
    pub description: String,
}

impl IdentityProfile {
    pub fn new(name: &str, display_name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    AlreadyExists,
    NotFound,
    Os(OsCode),
}

/// The OS facility that stores the named identities.
///
/// Implementations grant no capabilities to created identities.
pub trait IdentityStore {
    /// Security identifier, owned by the caller.
    type Sid;

    fn create(&mut self, profile: &IdentityProfile) -> Result<Self::Sid, StoreError>;

    /// Resolve the identifier of an existing identity from its name.
    fn derive(&mut self, name: &str) -> Result<Self::Sid, StoreError>;

    fn delete(&mut self, name: &str) -> Result<(), StoreError>;
}

/// A resolved identity.
#[derive(Debug)]
pub struct IdentityRef<Sid> {
    name: String,
    sid: Sid,
    created: bool,
}

impl<Sid> IdentityRef<Sid> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sid(&self) -> &Sid {
        &self.sid
    }

    /// True if this run created the identity, false if it already existed.
    pub fn created(&self) -> bool {
        self.created
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// There was nothing to delete.
    AlreadyClean,
}

pub struct SandboxIdentityManager<S: IdentityStore> {
    store: S,
}

impl<S: IdentityStore> SandboxIdentityManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Create the identity, or resolve it if it already exists.
    pub fn ensure_identity(&mut self, profile: &IdentityProfile) -> Result<IdentityRef<S::Sid>, FollowerError> {
        let setup_err = |code| FollowerError::IdentitySetup { name: profile.name.clone(), code };
        match self.store.create(profile) {
            Ok(sid) => {
                info!(name = %profile.name, "created sandbox identity");
                Ok(IdentityRef { name: profile.name.clone(), sid, created: true })
            }
            Err(StoreError::AlreadyExists) => {
                debug!(name = %profile.name, "sandbox identity already exists, deriving its identifier");
                match self.store.derive(&profile.name) {
                    Ok(sid) => {
                        info!(name = %profile.name, "reusing existing sandbox identity");
                        Ok(IdentityRef { name: profile.name.clone(), sid, created: false })
                    }
                    Err(e) => {
                        let code = store_code(e);
                        warn!(name = %profile.name, %code, "failed to derive sandbox identity");
                        Err(setup_err(code))
                    }
                }
            }
            Err(e) => {
                let code = store_code(e);
                warn!(name = %profile.name, %code, "failed to create sandbox identity");
                Err(setup_err(code))
            }
        }
    }

    /// Remove the identity.  A missing identity counts as already clean.
    /// Callers log a returned error and carry on.
    pub fn delete_identity(&mut self, name: &str) -> Result<DeleteOutcome, FollowerError> {
        match self.store.delete(name) {
            Ok(()) => {
                info!(name, "deleted sandbox identity");
                Ok(DeleteOutcome::Deleted)
            }
            Err(StoreError::NotFound) => {
                info!(name, "sandbox identity not found (already deleted or never created)");
                Ok(DeleteOutcome::AlreadyClean)
            }
            Err(e) => {
                let code = store_code(e);
                warn!(name, %code, "failed to delete sandbox identity");
                Err(FollowerError::IdentityDelete { name: name.to_string(), code })
            }
        }
    }
}

fn store_code(e: StoreError) -> OsCode {
    match e {
        StoreError::Os(code) => code,
        StoreError::AlreadyExists => OsCode(183), // ERROR_ALREADY_EXISTS
        StoreError::NotFound => OsCode(1168),     // ERROR_NOT_FOUND
    }
}


#[cfg(test)]
mod tests {
    use super::fake::{MemoryStore, sid_for};
    use super::*;

    fn profile() -> IdentityProfile {
        IdentityProfile::new("WindowFollower.Test", "Test", "Test container")
    }

    #[test]
    fn ensure_identity_twice_resolves_to_the_same_identity() {
        let mut mgr = SandboxIdentityManager::new(MemoryStore::default());
        let first = mgr.ensure_identity(&profile()).unwrap();
        let second = mgr.ensure_identity(&profile()).unwrap();
        assert!(first.created());
        assert!(!second.created());
        assert_eq!(first.sid(), second.sid());
        assert_eq!(second.sid(), &sid_for("WindowFollower.Test"));
        assert_eq!(second.name(), "WindowFollower.Test");
    }

    #[test]
    fn consecutive_runs_never_report_already_exists() {
        // The store survives the coordinator, the manager does not.
        let mut store = MemoryStore::default();
        for _ in 0..2 {
            let mut mgr = SandboxIdentityManager::new(std::mem::take(&mut store));
            assert!(mgr.ensure_identity(&profile()).is_ok());
            store = mgr.store;
        }
        assert_eq!(store.creates, 2);
        assert_eq!(store.profiles.len(), 1);
    }

    #[test]
    fn create_failure_is_a_setup_error() {
        let mut mgr = SandboxIdentityManager::new(MemoryStore {
            fail_create: Some(OsCode(5)),
            ..Default::default()
        });
        match mgr.ensure_identity(&profile()) {
            Err(FollowerError::IdentitySetup { name, code }) => {
                assert_eq!(name, "WindowFollower.Test");
                assert_eq!(code, OsCode(5));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn delete_missing_identity_is_already_clean() {
        let mut mgr = SandboxIdentityManager::new(MemoryStore::default());
        assert_eq!(mgr.delete_identity("nothing").unwrap(), DeleteOutcome::AlreadyClean);

        mgr.ensure_identity(&profile()).unwrap();
        assert_eq!(mgr.delete_identity("WindowFollower.Test").unwrap(), DeleteOutcome::Deleted);
        assert_eq!(mgr.delete_identity("WindowFollower.Test").unwrap(), DeleteOutcome::AlreadyClean);
    }

    #[test]
    fn delete_failure_is_reported() {
        let mut mgr = SandboxIdentityManager::new(MemoryStore {
            fail_delete: Some(OsCode(32)),
            ..Default::default()
        });
        let err = mgr.delete_identity("busy").unwrap_err();
        assert_eq!(err.os_code(), Some(OsCode(32)));
    }
}
