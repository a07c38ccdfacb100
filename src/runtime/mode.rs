// SPDX-License-Identifier: MIT

//! Invocation mode markers.
//!
//! The same executable plays both roles.  The markers are matched exactly
//! (case-sensitive) anywhere on the command line; everything else is ignored.

use std::ffi::OsString;

/// Selects the worker role.
pub const WORKER_MARKER: &str = "--child";

/// Runs the worker inside the sandbox identity.
pub const SANDBOX_MARKER: &str = "--launch_child_ac";

/// Enables debug-level tracing.
pub const VERBOSE_MARKER: &str = "--verbose";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Coordinator,
    Worker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationMode {
    pub role: Role,
    pub sandbox: bool,
    pub verbose: bool,
}

impl InvocationMode {
    /// Read the mode from the current process's arguments.
    pub fn from_env() -> Self {
        Self::from_args(std::env::args_os().skip(1))
    }

    pub fn from_args<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        let mut mode = InvocationMode { role: Role::Coordinator, sandbox: false, verbose: false };
        for arg in args {
            let arg: OsString = arg.into();
            // Non-unicode arguments can never match a marker.
            match arg.to_str() {
                Some(WORKER_MARKER) => mode.role = Role::Worker,
                Some(SANDBOX_MARKER) => mode.sandbox = true,
                Some(VERBOSE_MARKER) => mode.verbose = true,
                _ => (),
            }
        }
        mode
    }
}
