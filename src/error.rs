//! Error handling for the bridge.
//!
//! [`BridgeError`] is the error type used inside the crate. At the C boundary it is
//! flattened into a [`WbError`] out-parameter carrying a stable [`WbErrorCode`].

use std::ffi::CString;
use std::os::raw::c_char;

/// Errors raised by the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The runtime handle is unset, or the runtime rejected the interface version.
    #[error("managed runtime unavailable: {0}")]
    RuntimeUnavailable(&'static str),

    /// The host exchange produced no response (no device or transport).
    #[error("no device available")]
    NoDevice,

    /// A response did not fit into the buffer supplied by the caller.
    #[error("response of {needed} bytes exceeds capacity of {capacity} bytes")]
    BufferTooSmall { needed: usize, capacity: usize },

    /// The host could not resolve a device name.
    #[error("device name not found")]
    NotFound,

    /// The handle is null, of the wrong kind, released, or stale.
    #[error("invalid or stale handle")]
    InvalidHandle,

    /// An observer is already installed on this listener bridge.
    #[error("observer already installed")]
    AlreadyInstalled,

    /// `wb_on_load` was called twice without an unload in between.
    #[error("bridge already loaded")]
    AlreadyLoaded,

    /// An entry point was called before `wb_on_load`.
    #[error("bridge not loaded")]
    NotLoaded,

    /// No wallet manager has been registered by the engine.
    #[error("wallet engine unavailable")]
    EngineUnavailable,

    /// The engine refused to close the wallet.
    #[error("wallet close failed")]
    CloseFailed,

    /// The engine reported a failure.
    #[error("engine error: {0}")]
    Engine(String),

    /// A required pointer argument was null.
    #[error("null pointer passed for parameter: {0}")]
    NullPointer(&'static str),

    /// A string argument was not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// An argument was out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// JSON input or output failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error codes for FFI functions.
///
/// These codes are stable. The engine-facing upcall hooks return them negated.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WbErrorCode {
    /// No error
    Ok = 0,

    // Bridge errors (1-20)
    /// Runtime missing or incompatible
    RuntimeUnavailable = 1,
    /// No device answered the exchange
    NoDevice = 2,
    /// Response larger than the caller's buffer
    BufferTooSmall = 3,
    /// Device name could not be resolved
    NotFound = 4,
    /// Observer already installed
    AlreadyInstalled = 5,
    /// Bridge already loaded
    AlreadyLoaded = 6,
    /// Bridge not loaded
    NotLoaded = 7,

    // Engine errors (21-30)
    /// No wallet manager registered
    EngineUnavailable = 21,
    /// Wallet close refused by the engine
    CloseFailed = 22,
    /// Engine failure
    Engine = 23,

    // FFI-specific errors (100+)
    /// Null pointer passed
    NullPointer = 100,
    /// Invalid UTF-8 string
    InvalidUtf8 = 101,
    /// JSON parse error
    JsonParse = 102,
    /// Invalid handle
    InvalidHandle = 103,
    /// Argument out of range
    InvalidArgument = 104,
    /// Unknown error
    Unknown = 255,
}

impl BridgeError {
    /// Stable code for this error.
    pub fn code(&self) -> WbErrorCode {
        match self {
            BridgeError::RuntimeUnavailable(_) => WbErrorCode::RuntimeUnavailable,
            BridgeError::NoDevice => WbErrorCode::NoDevice,
            BridgeError::BufferTooSmall { .. } => WbErrorCode::BufferTooSmall,
            BridgeError::NotFound => WbErrorCode::NotFound,
            BridgeError::InvalidHandle => WbErrorCode::InvalidHandle,
            BridgeError::AlreadyInstalled => WbErrorCode::AlreadyInstalled,
            BridgeError::AlreadyLoaded => WbErrorCode::AlreadyLoaded,
            BridgeError::NotLoaded => WbErrorCode::NotLoaded,
            BridgeError::EngineUnavailable => WbErrorCode::EngineUnavailable,
            BridgeError::CloseFailed => WbErrorCode::CloseFailed,
            BridgeError::Engine(_) => WbErrorCode::Engine,
            BridgeError::NullPointer(_) => WbErrorCode::NullPointer,
            BridgeError::InvalidUtf8(_) => WbErrorCode::InvalidUtf8,
            BridgeError::InvalidArgument(_) => WbErrorCode::InvalidArgument,
            BridgeError::Json(_) => WbErrorCode::JsonParse,
        }
    }

    /// Negative status value returned by the engine-facing hooks.
    pub fn status(&self) -> i32 {
        -(self.code() as i32)
    }
}

/// Error structure returned via out-parameter.
///
/// # Memory Ownership
///
/// The `message` field is owned by the FFI layer when non-null.
/// Call `wb_error_free()` to release the message memory.
#[repr(C)]
pub struct WbError {
    /// Error code
    pub code: WbErrorCode,
    /// Error message (NULL if code == Ok)
    pub message: *mut c_char,
}

impl WbError {
    /// Create a success result (no error).
    pub fn ok() -> Self {
        Self {
            code: WbErrorCode::Ok,
            message: std::ptr::null_mut(),
        }
    }
}

impl From<BridgeError> for WbError {
    fn from(e: BridgeError) -> Self {
        let message = CString::new(e.to_string())
            .map(CString::into_raw)
            .unwrap_or(std::ptr::null_mut());
        Self {
            code: e.code(),
            message,
        }
    }
}

/// Free error message memory.
///
/// Safe to call with NULL error or NULL message.
///
/// # Safety
///
/// The error pointer must be valid or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_error_free(error: *mut WbError) {
    if error.is_null() {
        return;
    }
    unsafe {
        let err = &mut *error;
        if !err.message.is_null() {
            drop(CString::from_raw(err.message));
            err.message = std::ptr::null_mut();
        }
    }
}
