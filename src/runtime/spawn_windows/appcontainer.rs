// SPDX-License-Identifier: MIT

//! AppContainer profiles as the sandbox identity store.
//!
//! The SID returned by the profile APIs must be released with `FreeSid`, so
//! it is wrapped in a struct that implements Drop.

use std::ffi::OsString;
use std::fmt;
use std::os::windows::ffi::OsStringExt;

use windows::Win32::Foundation::{ERROR_ALREADY_EXISTS, ERROR_FILE_NOT_FOUND, ERROR_NOT_FOUND};
use windows::Win32::Security::{self, Isolation};
use windows::core::PCWSTR;
use windows_result::HRESULT;

use crate::runtime::{
    conv::str_c_w,
    error::OsCode,
    identity::{IdentityProfile, IdentityStore, StoreError},
};

/// An AppContainer SID owned by this process.
#[derive(Debug)]
pub struct AppContainerSid {
    sid: Option<Security::PSID>,
}

impl AppContainerSid {
    fn new(sid: Security::PSID) -> Self {
        Self { sid: Some(sid) }
    }

    pub fn psid(&self) -> Security::PSID {
        self.sid.unwrap_or(Security::PSID(std::ptr::null_mut()))
    }

    /// The `S-1-15-2-...` string form, for the log.
    pub fn sid_str(&self) -> Result<OsString, OsCode> {
        let Some(sid) = self.sid else {
            return Err(OsCode::UNSUPPORTED);
        };
        // The windows crate doesn't wrap this one.  Windows allocates the
        // string, and it has to be released with LocalFree.
        let mut buf_ptr: *mut u16 = std::ptr::null_mut();
        let result = unsafe { winapi::shared::sddl::ConvertSidToStringSidW(sid.0 as _, &mut buf_ptr) };
        if result == 0 {
            return Err(OsCode::last());
        }

        let mut len = 0;
        while unsafe { *buf_ptr.add(len) } != 0 {
            len += 1;
        }
        let os_string = OsString::from_wide(unsafe { std::slice::from_raw_parts(buf_ptr, len) });
        unsafe { winapi::um::winbase::LocalFree(buf_ptr as *mut _) };
        Ok(os_string)
    }
}

impl fmt::Display for AppContainerSid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sid_str() {
            Ok(sid) => write!(f, "{}", sid.to_string_lossy()),
            Err(code) => write!(f, "<unrenderable SID: {}>", code),
        }
    }
}

impl Drop for AppContainerSid {
    fn drop(&mut self) {
        if let Some(sid) = self.sid.take() {
            let _ = unsafe { Security::FreeSid(sid) };
        }
    }
}

/// The per-user AppContainer profile store.
#[derive(Debug, Default)]
pub struct AppContainerStore;

fn store_error(e: windows::core::Error) -> StoreError {
    let code = e.code();
    if code == HRESULT::from(ERROR_ALREADY_EXISTS) {
        StoreError::AlreadyExists
    } else if code == HRESULT::from(ERROR_NOT_FOUND) || code == HRESULT::from(ERROR_FILE_NOT_FOUND) {
        StoreError::NotFound
    } else {
        StoreError::Os(e.into())
    }
}

impl IdentityStore for AppContainerStore {
    type Sid = AppContainerSid;

    fn create(&mut self, profile: &IdentityProfile) -> Result<AppContainerSid, StoreError> {
        let name = str_c_w(&profile.name);
        let display_name = str_c_w(&profile.display_name);
        let description = str_c_w(&profile.description);
        let sid = unsafe {
            Isolation::CreateAppContainerProfile(
                PCWSTR(name.as_ptr()),         // pszAppContainerName: identifies the container profile
                PCWSTR(display_name.as_ptr()), // pszDisplayName: human-readable
                PCWSTR(description.as_ptr()),  // pszDescription
                None,                          // pCapabilities: none (== no capabilities)
            )
        }
        .map_err(store_error)?;
        Ok(AppContainerSid::new(sid))
    }

    fn derive(&mut self, name: &str) -> Result<AppContainerSid, StoreError> {
        let name = str_c_w(name);
        let sid = unsafe { Isolation::DeriveAppContainerSidFromAppContainerName(PCWSTR(name.as_ptr())) }
            .map_err(store_error)?;
        Ok(AppContainerSid::new(sid))
    }

    fn delete(&mut self, name: &str) -> Result<(), StoreError> {
        let name = str_c_w(name);
        unsafe { Isolation::DeleteAppContainerProfile(PCWSTR(name.as_ptr())) }.map_err(store_error)
    }
}
