// SPDX-License-Identifier: MIT

//! Process/Thread Attribute List.
//! Because much of windows requires explicit add/remove actions,
//! wrapping it in a single struct that implements Drop will make code maintenance easier.

use windows::Win32::{
    Foundation::{ERROR_INSUFFICIENT_BUFFER, GetLastError},
    Security,
    System::Threading,
};

use crate::runtime::error::OsCode;

pub trait ThreadAttribute {
    fn lp_value(&self) -> *const core::ffi::c_void;
    fn attribute(&self) -> usize;
    fn cb_size(&self) -> usize;
}

pub type ThreadAttributeSecurityCapabilities = Security::SECURITY_CAPABILITIES;

impl ThreadAttribute for ThreadAttributeSecurityCapabilities {
    fn lp_value(&self) -> *const core::ffi::c_void {
        (self as *const Security::SECURITY_CAPABILITIES).cast()
    }
    fn attribute(&self) -> usize {
        Threading::PROC_THREAD_ATTRIBUTE_SECURITY_CAPABILITIES as usize
    }
    fn cb_size(&self) -> usize {
        std::mem::size_of::<Security::SECURITY_CAPABILITIES>()
    }
}

pub struct ThreadAttributeList {
    // The list stores pointers into the attribute values, so they are kept
    // alive (and boxed, so they don't move) for as long as the list.
    _attributes: Vec<Box<dyn ThreadAttribute>>,
    // Backing memory for the list itself.
    _attr_buf: Vec<u8>,
    attr_list: Option<Threading::LPPROC_THREAD_ATTRIBUTE_LIST>,
}

impl ThreadAttributeList {
    pub fn new(attributes: Vec<Box<dyn ThreadAttribute>>) -> Result<Self, OsCode> {
        if attributes.is_empty() {
            return Ok(Self { _attributes: vec![], _attr_buf: vec![], attr_list: None });
        }
        unsafe {
            // Get the expected size.  This reports insufficient buffer, which,
            // yes, is what a 0 size query is expected to do.
            let mut attr_size: usize = 0;
            if let Err(e) = Threading::InitializeProcThreadAttributeList(
                None,                    // query buffer size
                attributes.len() as u32, // number of attributes to set
                Some(0),                 // must be 0
                &mut attr_size,          // output required size in bytes
            ) {
                if GetLastError() != ERROR_INSUFFICIENT_BUFFER {
                    return Err(e.into());
                }
            }

            let mut attr_buf = vec![0u8; attr_size];
            let attr_list = Threading::LPPROC_THREAD_ATTRIBUTE_LIST(attr_buf.as_mut_ptr().cast::<_>());
            Threading::InitializeProcThreadAttributeList(
                Some(attr_list),         // allocated buffer
                attributes.len() as u32, // matches number of attributes to set
                Some(0),                 // must be 0
                &mut attr_size,          // the computed size from the previous call
            )?;
            // From here on Drop deletes the list, even if an update fails.
            let list = Self { _attributes: attributes, _attr_buf: attr_buf, attr_list: Some(attr_list) };

            for attr in &list._attributes {
                Threading::UpdateProcThreadAttribute(
                    attr_list,
                    0, // dwFlags must be 0
                    attr.attribute(),
                    Some(attr.lp_value()),
                    attr.cb_size(),
                    None, // previous value, not used
                    None, // previous value size, not used
                )?;
            }
            Ok(list)
        }
    }

    /// The list, or a null list when no attributes were given.
    pub fn list(&self) -> Threading::LPPROC_THREAD_ATTRIBUTE_LIST {
        self.attr_list.unwrap_or(Threading::LPPROC_THREAD_ATTRIBUTE_LIST(std::ptr::null_mut()))
    }

    pub fn is_empty(&self) -> bool {
        self.attr_list.is_none()
    }
}

impl Drop for ThreadAttributeList {
    fn drop(&mut self) {
        if let Some(list) = self.attr_list.take() {
            unsafe { Threading::DeleteProcThreadAttributeList(list) };
        }
    }
}
