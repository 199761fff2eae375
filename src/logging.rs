//! Log subscriber installation.

use crate::error::{BridgeError, WbError};
use crate::util::{cstr_to_option_string, set_error, set_ok};
use std::os::raw::c_char;
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber filtered at `level`.
///
/// Installing twice is not an error; the first subscriber stays in place.
pub fn init_logging(level: &str) -> Result<(), BridgeError> {
    let filter = EnvFilter::try_new(level).map_err(|_| {
        BridgeError::InvalidArgument(format!(
            "invalid log level '{level}'. Valid: error, warn, info, debug, trace"
        ))
    })?;

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_err()
    {
        tracing::debug!("log subscriber already installed");
    }
    Ok(())
}

/// Initialize logging.
///
/// # Parameters
///
/// - `level`: Filter directive such as `"info"` or `"walletbridge=debug"`.
///   NULL means `"info"`.
/// - `error`: Out-parameter for error information
///
/// # Returns
///
/// 1 on success, 0 on failure.
///
/// # Safety
///
/// - `level` must be a valid null-terminated UTF-8 string or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_init_logging(level: *const c_char, error: *mut WbError) -> i32 {
    let level = match unsafe { cstr_to_option_string(level, "level") } {
        Ok(l) => l.unwrap_or_else(|| "info".to_string()),
        Err(e) => return unsafe { set_error(error, e) },
    };

    match init_logging(&level) {
        Ok(()) => {
            unsafe { set_ok(error) };
            1
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}
