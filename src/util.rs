//! Utility functions for FFI operations.

use crate::error::{BridgeError, WbError};
use libc::size_t;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

/// Convert a C string to a Rust String.
///
/// Returns an error if the pointer is null or contains invalid UTF-8.
///
/// # Safety
///
/// The caller must ensure `ptr` is either null or points to a valid
/// null-terminated C string.
pub unsafe fn cstr_to_string(
    ptr: *const c_char,
    param_name: &'static str,
) -> Result<String, BridgeError> {
    if ptr.is_null() {
        return Err(BridgeError::NullPointer(param_name));
    }

    let cstr = unsafe { CStr::from_ptr(ptr) };
    match cstr.to_str() {
        Ok(s) => Ok(s.to_string()),
        Err(_) => Err(BridgeError::InvalidUtf8(param_name)),
    }
}

/// Convert an optional C string to an Option<String>.
///
/// # Safety
///
/// The caller must ensure `ptr` is either null or points to a valid
/// null-terminated C string.
pub unsafe fn cstr_to_option_string(
    ptr: *const c_char,
    param_name: &'static str,
) -> Result<Option<String>, BridgeError> {
    if ptr.is_null() {
        return Ok(None);
    }
    unsafe { cstr_to_string(ptr, param_name) }.map(Some)
}

/// Borrow a caller-supplied byte buffer.
///
/// A null pointer is accepted only for an empty buffer.
///
/// # Safety
///
/// `ptr` must be null or valid for reads of `len` bytes.
pub unsafe fn bytes_from_raw<'a>(
    ptr: *const u8,
    len: size_t,
    param_name: &'static str,
) -> Result<&'a [u8], BridgeError> {
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(BridgeError::NullPointer(param_name));
    }
    Ok(unsafe { std::slice::from_raw_parts(ptr, len) })
}

/// Convert a Rust string to a C string, returning an owned pointer.
///
/// The caller is responsible for freeing the returned pointer with `wb_string_free`.
/// Returns null if the string contains internal null bytes.
pub fn string_to_cstr(s: String) -> *mut c_char {
    CString::new(s)
        .map(CString::into_raw)
        .unwrap_or(std::ptr::null_mut())
}

/// Copy `s` into `buf` as a NUL-terminated string, truncating on a UTF-8
/// character boundary if it does not fit.
///
/// Returns the number of bytes written, excluding the terminator.
/// An empty `buf` receives nothing.
pub fn copy_truncated_cstr(s: &str, buf: &mut [u8]) -> usize {
    let Some(room) = buf.len().checked_sub(1) else {
        return 0;
    };
    let mut end = s.len().min(room);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    buf[..end].copy_from_slice(&s.as_bytes()[..end]);
    buf[end] = 0;
    end
}

/// Set an error in the out-parameter and return a default value.
///
/// # Safety
///
/// The caller must ensure `error` is either null or a valid pointer.
pub unsafe fn set_error<T: Default>(error: *mut WbError, err: BridgeError) -> T {
    tracing::debug!(code = ?err.code(), "{err}");
    if let Some(e) = unsafe { error.as_mut() } {
        *e = WbError::from(err);
    }
    T::default()
}

/// Set an error in the out-parameter and return null.
///
/// # Safety
///
/// The caller must ensure `error` is either null or a valid pointer.
pub unsafe fn set_error_null<T>(error: *mut WbError, err: BridgeError) -> *mut T {
    unsafe { set_error::<()>(error, err) };
    std::ptr::null_mut()
}

/// Set success in the out-parameter error.
///
/// # Safety
///
/// The caller must ensure `error` is either null or a valid pointer.
pub unsafe fn set_ok(error: *mut WbError) {
    if let Some(e) = unsafe { error.as_mut() } {
        *e = WbError::ok();
    }
}

/// Free a string returned by this library.
///
/// # Safety
///
/// `s` must be a pointer returned by a `wb_*` function, or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_string_free(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(s));
    }
}
