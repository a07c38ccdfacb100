// SPDX-License-Identifier: MIT

//! # windowfollower
//!
//! Shows the window of a separate, optionally sandboxed worker process as a
//! child region of the coordinator's window.
//!
//! The same executable plays both roles.  Run plainly it is the
//! coordinator: it creates its window, starts itself again as the worker
//! (inside an AppContainer with `--launch_child_ac`), embeds the surface the
//! worker announces, keeps it laid out, and shuts the worker down on exit.

pub mod embed;
pub mod runtime;
pub mod trace;

pub use runtime::config::FollowerConfig;
pub use runtime::error::{ErrorCategory, FollowerError};
pub use runtime::mode::{InvocationMode, Role};
