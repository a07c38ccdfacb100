// SPDX-License-Identifier: MIT

//! Common error type.
//!
//! Every failure is sorted into one of three categories, which decides what
//! the caller does with it: startup failures end the process, handshake
//! failures abandon the embedding, and teardown failures are only logged.

use std::fmt::Display;

/// A raw OS status: either a Win32 error code or an HRESULT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OsCode(pub i32);

impl OsCode {
    /// Status for an operation the object can no longer perform.
    pub const UNSUPPORTED: OsCode = OsCode(50); // ERROR_NOT_SUPPORTED

    /// The calling thread's last OS error.
    pub fn last() -> Self {
        OsCode(std::io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }
}

impl Display for OsCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 < 0 {
            // HRESULT values read better in hex.
            write!(f, "0x{:08X}", self.0 as u32)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(target_os = "windows")]
impl From<windows::core::Error> for OsCode {
    fn from(e: windows::core::Error) -> Self {
        OsCode(e.code().0)
    }
}

/// What the caller is expected to do with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Report to the operator and exit non-zero.
    StartupFatal,
    /// Log, abandon the handshake, leave the worker running.
    Handshake,
    /// Log and keep tearing down.
    Teardown,
}

/// Failures in the embedding handshake, on either side.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("coordinator window class {class:?} not found")]
    CoordinatorNotFound { class: String },
    #[error("announcing the surface failed: {0}")]
    Announce(OsCode),
    #[error("message did not carry a surface handle")]
    NullSurface,
    #[error("a surface is already embedded")]
    AlreadyEmbedded,
    #[error("rewriting the surface style failed: {0}")]
    Style(OsCode),
    #[error("reparenting the surface failed: {0}")]
    Reparent(OsCode),
    #[error("surface was not attached under the coordinator window")]
    ReparentNotApplied,
    #[error("reading the coordinator client area failed: {0}")]
    ClientArea(OsCode),
    #[error("positioning the surface failed: {0}")]
    Placement(OsCode),
    #[error("finding the surface's owning process failed: {0}")]
    OwnerLookup(OsCode),
    #[error("surface belongs to process {owner}, not the worker {expected}")]
    ForeignSurface { owner: u32, expected: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum FollowerError {
    #[error("failed to register window class {class:?}: {code}")]
    ClassRegistration { class: String, code: OsCode },
    #[error("failed to create window {class:?}: {code}")]
    WindowCreation { class: String, code: OsCode },
    #[error("failed to spawn the worker process: {0}")]
    Spawn(OsCode),
    #[error("failed to set up sandbox identity {name:?}: {code}")]
    IdentitySetup { name: String, code: OsCode },
    #[error("failed to delete sandbox identity {name:?}: {code}")]
    IdentityDelete { name: String, code: OsCode },
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("invalid command line: {0}")]
    CommandLine(String),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("windowfollower requires Windows")]
    UnsupportedPlatform,
}

impl FollowerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Handshake(HandshakeError::CoordinatorNotFound { .. }) => ErrorCategory::StartupFatal,
            Self::Handshake(_) => ErrorCategory::Handshake,
            Self::IdentityDelete { .. } => ErrorCategory::Teardown,
            Self::ClassRegistration { .. }
            | Self::WindowCreation { .. }
            | Self::Spawn(_)
            | Self::IdentitySetup { .. }
            | Self::CommandLine(_)
            | Self::Io(_)
            | Self::UnsupportedPlatform => ErrorCategory::StartupFatal,
        }
    }

    /// The OS status behind the error, when there is one.
    pub fn os_code(&self) -> Option<OsCode> {
        match self {
            Self::ClassRegistration { code, .. }
            | Self::WindowCreation { code, .. }
            | Self::IdentitySetup { code, .. }
            | Self::IdentityDelete { code, .. } => Some(*code),
            Self::Spawn(code) => Some(*code),
            Self::Handshake(h) => match h {
                HandshakeError::Announce(c)
                | HandshakeError::Style(c)
                | HandshakeError::Reparent(c)
                | HandshakeError::ClientArea(c)
                | HandshakeError::Placement(c)
                | HandshakeError::OwnerLookup(c) => Some(*c),
                _ => None,
            },
            Self::Io(e) => e.raw_os_error().map(OsCode),
            Self::CommandLine(_) | Self::UnsupportedPlatform => None,
        }
    }
}
