// SPDX-License-Identifier: MIT

//! Process-level concerns of the two roles: invocation mode, configuration,
//! the sandbox identity, launching the worker, and shutting it down again.
//! [`session::WorkerSession`] puts identity and spawn in order.
//!
//! The platform-neutral pieces work through small traits
//! ([`identity::IdentityStore`], [`launcher::ProcessSpawner`],
//! [`lifecycle::WorkerProcess`]).  The Win32 implementations live in
//! `spawn_windows`.

pub mod config;
pub mod conv;
pub mod error;
pub mod identity;
pub mod launcher;
pub mod lifecycle;
pub mod mode;
pub mod session;

#[cfg(target_os = "windows")]
pub mod spawn_windows;
