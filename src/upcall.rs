//! Synchronous upcalls from engine threads into the host's device transport.
//!
//! Each upcall attaches the calling engine thread, blocks for as long as the
//! host takes to answer, copies the answer into the caller's buffer without
//! ever writing past its capacity, and detaches on every exit path.

use crate::attach::AttachGuard;
use crate::context::BridgeContext;
use crate::error::BridgeError;
use crate::util::copy_truncated_cstr;

/// Send `request` to the device and copy its answer into `response`.
///
/// Returns the response length. Fails with `NoDevice` when the host reports no
/// transport (or none was registered) and with `BufferTooSmall`, leaving
/// `response` untouched, when the answer does not fit.
pub fn exchange(
    ctx: &BridgeContext,
    request: &[u8],
    response: &mut [u8],
) -> Result<usize, BridgeError> {
    let limit = ctx.config().max_exchange_len;
    if request.len() > limit {
        return Err(BridgeError::InvalidArgument(format!(
            "request of {} bytes exceeds limit of {limit} bytes",
            request.len()
        )));
    }
    let methods = ctx.exchange_methods().ok_or(BridgeError::NoDevice)?;

    let guard = AttachGuard::attach(ctx)?;
    let reply = methods.exchange(guard.env(), request);
    drop(guard);

    let reply = reply.ok_or(BridgeError::NoDevice)?;
    if reply.len() > response.len() {
        tracing::warn!(
            needed = reply.len(),
            capacity = response.len(),
            "device response too large"
        );
        return Err(BridgeError::BufferTooSmall {
            needed: reply.len(),
            capacity: response.len(),
        });
    }
    response[..reply.len()].copy_from_slice(&reply);
    tracing::trace!(request = request.len(), response = reply.len(), "device exchange");
    Ok(reply.len())
}

/// Resolve the attached device's name into `buffer` as a NUL-terminated string.
///
/// Names that do not fit are truncated. Returns the bytes written, excluding
/// the terminator, which is never 0. An unresolved or empty name is
/// `NotFound`; a buffer too small for even the first character is
/// `BufferTooSmall`.
pub fn find_device_name(ctx: &BridgeContext, buffer: &mut [u8]) -> Result<usize, BridgeError> {
    let methods = ctx.exchange_methods().ok_or(BridgeError::NotFound)?;

    let guard = AttachGuard::attach(ctx)?;
    let name = methods.device_name(guard.env());
    drop(guard);

    let name = name.filter(|n| !n.is_empty()).ok_or(BridgeError::NotFound)?;
    // Room for at least the first character and the terminator
    let first = name.chars().next().map_or(1, char::len_utf8);
    if buffer.len() <= first {
        return Err(BridgeError::BufferTooSmall {
            needed: name.len() + 1,
            capacity: buffer.len(),
        });
    }
    let written = copy_truncated_cstr(&name, buffer);
    if written < name.len() {
        tracing::debug!(name_len = name.len(), written, "device name truncated");
    }
    Ok(written)
}

/// Exchange a request with the hardware device.
///
/// Called by the engine on its own thread; blocks until the host answers.
///
/// # Parameters
///
/// - `request`: Request bytes
/// - `request_len`: Length of `request`
/// - `response`: Caller buffer for the response
/// - `max_response_len`: Capacity of `response`, at most `INT32_MAX`
///
/// # Returns
///
/// Response length (>= 0) on success, or a negated `WbErrorCode`:
/// `-NoDevice`, `-BufferTooSmall`, `-RuntimeUnavailable`, `-InvalidArgument`,
/// `-NullPointer`.
///
/// # Safety
///
/// - `request` must be valid for reads of `request_len` bytes (or NULL if 0)
/// - `response` must be valid for writes of `max_response_len` bytes (or NULL if 0)
#[cfg(feature = "device")]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_device_exchange(
    request: *const u8,
    request_len: libc::size_t,
    response: *mut u8,
    max_response_len: libc::size_t,
) -> i32 {
    let result = (|| {
        if max_response_len > i32::MAX as usize {
            return Err(BridgeError::InvalidArgument(format!(
                "response capacity {max_response_len} exceeds {}",
                i32::MAX
            )));
        }
        let ctx = crate::context::current()
            .map_err(|_| BridgeError::RuntimeUnavailable("bridge not loaded"))?;
        let request = unsafe { crate::util::bytes_from_raw(request, request_len, "request") }?;
        let response: &mut [u8] = if max_response_len == 0 {
            &mut []
        } else if response.is_null() {
            return Err(BridgeError::NullPointer("response"));
        } else {
            unsafe { std::slice::from_raw_parts_mut(response, max_response_len) }
        };
        exchange(&ctx, request, response)
    })();

    match result {
        Ok(n) => i32::try_from(n).unwrap_or(i32::MAX),
        Err(e) => {
            tracing::debug!("device exchange failed: {e}");
            e.status()
        }
    }
}

/// Resolve the hardware device's name.
///
/// # Parameters
///
/// - `buffer`: Caller buffer for the NUL-terminated name
/// - `capacity`: Capacity of `buffer`, including the terminator
///
/// # Returns
///
/// Bytes written excluding the terminator, or a negated `WbErrorCode`:
/// `-NotFound`, `-RuntimeUnavailable`, `-BufferTooSmall`, `-NullPointer`.
///
/// # Safety
///
/// `buffer` must be valid for writes of `capacity` bytes (or NULL if 0).
/// Capacity beyond `INT32_MAX` is not used.
#[cfg(feature = "device")]
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_device_find_name(
    buffer: *mut std::os::raw::c_char,
    capacity: libc::size_t,
) -> i32 {
    let result = (|| {
        let ctx = crate::context::current()
            .map_err(|_| BridgeError::RuntimeUnavailable("bridge not loaded"))?;
        let buffer: &mut [u8] = if capacity == 0 {
            &mut []
        } else if buffer.is_null() {
            return Err(BridgeError::NullPointer("buffer"));
        } else {
            let capacity = capacity.min(i32::MAX as usize);
            unsafe { std::slice::from_raw_parts_mut(buffer.cast::<u8>(), capacity) }
        };
        find_device_name(&ctx, buffer)
    })();

    match result {
        Ok(n) => i32::try_from(n).unwrap_or(i32::MAX),
        Err(e) => e.status(),
    }
}
