// SPDX-License-Identifier: MIT

//! The worker's process handle.

use std::time::Duration;

use windows::Win32::{
    Foundation::{CloseHandle, HANDLE, STILL_ACTIVE, WAIT_EVENT, WAIT_OBJECT_0, WAIT_TIMEOUT},
    System::Threading::{GetExitCodeProcess, TerminateProcess, WaitForSingleObject},
    UI::WindowsAndMessaging::{MsgWaitForMultipleObjects, QS_SENDMESSAGE},
};

use crate::runtime::{
    error::OsCode,
    lifecycle::{WaitOutcome, WaitWake, WorkerProcess},
};

fn millis(timeout: Duration) -> u32 {
    // INFINITE is u32::MAX; stay just below it.
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX - 1)
}

/// Owns the process handle; closes it (and only it) on drop.
#[derive(Debug)]
pub struct WorkerHandle {
    process: HANDLE,
    pid: u32,
}

impl WorkerHandle {
    pub(super) fn new(process: HANDLE, pid: u32) -> Self {
        Self { process, pid }
    }

    fn exit_code(&self) -> Result<Option<u32>, OsCode> {
        let mut code = 0u32;
        unsafe { GetExitCodeProcess(self.process, &mut code) }?;
        if code == STILL_ACTIVE.0 as u32 { Ok(None) } else { Ok(Some(code)) }
    }

    /// The code of a process whose handle is signaled.
    fn exited(&self) -> Result<u32, OsCode> {
        // A process that exited with STILL_ACTIVE as its code reads as running.
        Ok(self.exit_code()?.unwrap_or(STILL_ACTIVE.0 as u32))
    }
}

impl WorkerProcess for WorkerHandle {
    fn id(&self) -> u32 {
        self.pid
    }

    fn wait(&mut self, timeout: Duration) -> Result<WaitOutcome, OsCode> {
        let result = unsafe { WaitForSingleObject(self.process, millis(timeout)) };
        if result == WAIT_OBJECT_0 {
            Ok(WaitOutcome::Exited(self.exited()?))
        } else if result == WAIT_TIMEOUT {
            Ok(WaitOutcome::TimedOut)
        } else {
            Err(OsCode::last())
        }
    }

    fn terminate(&mut self, exit_code: u32) -> Result<(), OsCode> {
        unsafe { TerminateProcess(self.process, exit_code) }?;
        Ok(())
    }

    fn wait_or_sent_message(&mut self, timeout: Duration) -> Result<WaitWake, OsCode> {
        let handles = [self.process];
        let result = unsafe { MsgWaitForMultipleObjects(Some(&handles), false, millis(timeout), QS_SENDMESSAGE) };
        if result == WAIT_OBJECT_0 {
            Ok(WaitWake::Exited(self.exited()?))
        } else if result == WAIT_EVENT(WAIT_OBJECT_0.0 + 1) {
            Ok(WaitWake::SentMessage)
        } else if result == WAIT_TIMEOUT {
            Ok(WaitWake::TimedOut)
        } else {
            Err(OsCode::last())
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if !self.process.is_invalid() {
            let _ = unsafe { CloseHandle(self.process) };
            self.process = HANDLE(std::ptr::null_mut());
        }
    }
}
