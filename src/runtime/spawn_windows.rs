// SPDX-License-Identifier: MIT

//! Win32 implementations of the sandbox identity store, the process
//! spawner and the worker process handle.

mod appcontainer;
mod attribute_list;
mod launch;
mod process;

pub use appcontainer::{AppContainerSid, AppContainerStore};
pub use launch::Win32Spawner;
pub use process::WorkerHandle;
