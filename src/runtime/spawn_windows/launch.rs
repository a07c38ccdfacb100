// SPDX-License-Identifier: MIT

//! Create the worker process, optionally inside an AppContainer.

use std::mem;

use tracing::debug;
use windows::Win32::{Foundation::CloseHandle, System::Threading};
use windows::core::{PCWSTR, PWSTR};

use super::{
    appcontainer::AppContainerSid,
    attribute_list::{ThreadAttribute, ThreadAttributeList, ThreadAttributeSecurityCapabilities},
    process::WorkerHandle,
};
use crate::runtime::{
    error::OsCode,
    launcher::{display_command_line, ProcessSpawner, SecurityCapabilities},
};

#[derive(Debug, Default)]
pub struct Win32Spawner;

impl ProcessSpawner for Win32Spawner {
    type Sid = AppContainerSid;
    type Process = WorkerHandle;

    fn spawn(
        &mut self,
        command_line: &[u16],
        capabilities: Option<SecurityCapabilities<'_, AppContainerSid>>,
    ) -> Result<WorkerHandle, OsCode> {
        debug!(cmdline = %display_command_line(command_line), "CreateProcessW");

        let mut attributes: Vec<Box<dyn ThreadAttribute>> = vec![];
        if let Some(caps) = &capabilities {
            // The capability list is empty, so only the container SID goes in.
            debug_assert!(caps.capabilities.is_empty());
            attributes.push(Box::new(ThreadAttributeSecurityCapabilities {
                AppContainerSid: caps.identity.psid(),
                Capabilities: std::ptr::null_mut(),
                CapabilityCount: 0,
                Reserved: 0,
            }));
        }
        let attr_list = ThreadAttributeList::new(attributes)?;

        let mut si_ex: Threading::STARTUPINFOEXW = unsafe { mem::zeroed() };
        let mut flags = Threading::PROCESS_CREATION_FLAGS(0);
        if attr_list.is_empty() {
            si_ex.StartupInfo.cb = mem::size_of::<Threading::STARTUPINFOW>() as u32;
        } else {
            si_ex.StartupInfo.cb = mem::size_of::<Threading::STARTUPINFOEXW>() as u32;
            si_ex.lpAttributeList = attr_list.list();
            flags |= Threading::EXTENDED_STARTUPINFO_PRESENT;
        }

        // CreateProcessW may write into the command line buffer.
        let mut cmdline = command_line.to_vec();
        let mut pi: Threading::PROCESS_INFORMATION = unsafe { mem::zeroed() };
        unsafe {
            Threading::CreateProcessW(
                PCWSTR::null(),                     // application name comes from the command line
                Some(PWSTR(cmdline.as_mut_ptr())),  // command line
                None,                               // process attributes
                None,                               // thread attributes
                false,                              // no handle inheritance
                flags,
                None,                               // inherit the environment
                PCWSTR::null(),                     // inherit the current directory
                &si_ex.StartupInfo,
                &mut pi,
            )
        }?;
        // Only the process handle is kept.
        let _ = unsafe { CloseHandle(pi.hThread) };
        drop(attr_list);

        Ok(WorkerHandle::new(pi.hProcess, pi.dwProcessId))
    }
}
