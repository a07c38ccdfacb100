// SPDX-License-Identifier: MIT

//! Various type conversion routines.

use std::ffi::OsStr;

/// Convert the OS string into wide (16-bit) characters, without a terminator.
#[cfg(target_os = "windows")]
pub fn to_wide(s: &OsStr) -> Vec<u16> {
    use std::os::windows::ffi::OsStrExt;
    s.encode_wide().collect()
}

/// Convert the OS string into wide (16-bit) characters, without a terminator.
/// Bytes that are not valid UTF-8 are replaced.
#[cfg(not(target_os = "windows"))]
pub fn to_wide(s: &OsStr) -> Vec<u16> {
    s.to_string_lossy().encode_utf16().collect()
}

/// Convert a string literal into a null-terminated wide C string.
pub fn str_c_w(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}
