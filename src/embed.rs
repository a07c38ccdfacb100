// SPDX-License-Identifier: MIT

//! Embedding of the worker's surface inside the coordinator's window.
//!
//! The role logic is platform neutral: it talks to windows through
//! [`surface::SurfaceOps`] and to the other process through
//! [`protocol::AsyncNotifier`].  The `win32` module supplies the real
//! implementations and the window procedures that drive [`coordinator`]
//! and [`worker`].

pub mod coordinator;
pub mod layout;
pub mod protocol;
pub mod surface;
pub mod worker;

#[cfg(target_os = "windows")]
pub mod win32;

/// What a window procedure does after a role handled a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Return this value from the window procedure.
    Handled(isize),
    /// Hand the message to the default window procedure.
    PassThrough,
    /// Destroy the window, then return 0.
    Destroy,
    /// Post a quit message with this exit code, then return 0.
    Quit(i32),
}
