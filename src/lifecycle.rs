//! Wallet lifecycle functions (create, open, recover, close) and listener wiring.
//!
//! Closing is two-step: the engine closes the wallet first, and only once it
//! reports success are the wallet's handles released and its listener bridge
//! torn down. The engine may still deliver events while it closes, so the
//! bridge must stay installed until then.

use crate::context::{self, BridgeContext};
use crate::engine::{NetworkType, Wallet, WalletKeys};
use crate::error::{BridgeError, WbError};
use crate::handle::WbHandle;
use crate::host::ObjectRef;
use crate::listener::ListenerBridge;
use crate::util::{cstr_to_string, set_error, set_ok};
use std::os::raw::{c_char, c_void};
use std::sync::Arc;

fn register(
    ctx: &BridgeContext,
    wallet: Arc<dyn Wallet>,
    created_by: &'static str,
) -> Result<WbHandle, BridgeError> {
    let handle = ctx.registry().insert_wallet(wallet, created_by)?;
    tracing::debug!(handle = handle.0, created_by, "wallet registered");
    Ok(handle)
}

pub fn create_wallet(
    ctx: &BridgeContext,
    path: &str,
    password: &str,
    language: &str,
    network: NetworkType,
) -> Result<WbHandle, BridgeError> {
    let wallet = ctx.manager().create_wallet(path, password, language, network)?;
    register(ctx, wallet, "create_wallet")
}

pub fn open_wallet(
    ctx: &BridgeContext,
    path: &str,
    password: &str,
    network: NetworkType,
) -> Result<WbHandle, BridgeError> {
    let wallet = ctx.manager().open_wallet(path, password, network)?;
    register(ctx, wallet, "open_wallet")
}

pub fn recovery_wallet(
    ctx: &BridgeContext,
    path: &str,
    mnemonic: &str,
    network: NetworkType,
    restore_height: u64,
) -> Result<WbHandle, BridgeError> {
    let wallet = ctx
        .manager()
        .recovery_wallet(path, mnemonic, network, restore_height)?;
    register(ctx, wallet, "recovery_wallet")
}

/// Restore a wallet from its address and secret keys, given as JSON.
pub fn create_wallet_from_keys(
    ctx: &BridgeContext,
    path: &str,
    language: &str,
    network: NetworkType,
    restore_height: u64,
    keys_json: &str,
) -> Result<WbHandle, BridgeError> {
    let keys: WalletKeys = serde_json::from_str(keys_json)?;
    let wallet = ctx
        .manager()
        .create_wallet_from_keys(path, language, network, restore_height, &keys)?;
    register(ctx, wallet, "create_wallet_from_keys")
}

/// Close `wallet` and release it together with every handle it owns.
///
/// The handle stops resolving before the engine is asked, so a concurrent
/// close or lookup fails with `InvalidHandle` instead of reaching the engine
/// object. If the engine refuses, nothing is released and the listener keeps
/// receiving events. Otherwise the listener bridge is torn down exactly once.
pub fn close_wallet(ctx: &BridgeContext, wallet: WbHandle, store: bool) -> Result<(), BridgeError> {
    let target = ctx.registry().begin_close(wallet)?;
    if !ctx.manager().close_wallet(&target, store) {
        ctx.registry().abort_close(wallet);
        tracing::warn!(handle = wallet.0, "engine refused to close wallet");
        return Err(BridgeError::CloseFailed);
    }

    let removed = ctx.registry().remove_wallet(wallet)?;
    if let Some(listener) = removed.listener {
        listener.teardown();
    }
    tracing::debug!(handle = wallet.0, children = removed.children, "wallet closed");
    Ok(())
}

/// Replace the observer receiving `wallet`'s events.
///
/// The engine's listener is cleared and the previous bridge torn down before a
/// new bridge is installed. A null `observer` only clears, returning the null
/// handle.
pub fn set_listener(
    ctx: &Arc<BridgeContext>,
    wallet: WbHandle,
    observer: ObjectRef,
) -> Result<WbHandle, BridgeError> {
    let target = ctx.registry().wallet(wallet)?;

    target.set_listener(None);
    if let Some(previous) = ctx.registry().take_listener(wallet)? {
        previous.teardown();
    }
    if observer.is_null() {
        return Ok(WbHandle::NULL);
    }

    let bridge = Arc::new(ListenerBridge::new(ctx.clone()));
    bridge.install(observer)?;
    let handle = match ctx
        .registry()
        .insert_listener(wallet, bridge.clone(), "set_listener")
    {
        Ok(h) => h,
        Err(e) => {
            bridge.teardown();
            return Err(e);
        }
    };
    target.set_listener(Some(bridge));
    Ok(handle)
}

/// Create a new wallet.
///
/// # Parameters
///
/// - `path`: Wallet file path (UTF-8, null-terminated)
/// - `password`: Wallet password (UTF-8, null-terminated)
/// - `language`: Mnemonic language (UTF-8, null-terminated)
/// - `network`: Network the wallet operates on
/// - `error`: Out-parameter for error information
///
/// # Returns
///
/// Wallet handle on success, the null handle (0) on failure.
///
/// # Ownership
///
/// The handle stays valid until `wb_wallet_manager_close_wallet()` succeeds.
///
/// # Safety
///
/// - `path`, `password` and `language` must be valid null-terminated UTF-8 strings or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_wallet_manager_create_wallet(
    path: *const c_char,
    password: *const c_char,
    language: *const c_char,
    network: NetworkType,
    error: *mut WbError,
) -> WbHandle {
    let result = (|| {
        let path = unsafe { cstr_to_string(path, "path") }?;
        let password = unsafe { cstr_to_string(password, "password") }?;
        let language = unsafe { cstr_to_string(language, "language") }?;
        let ctx = context::current()?;
        create_wallet(&ctx, &path, &password, &language, network)
    })();

    match result {
        Ok(handle) => {
            unsafe { set_ok(error) };
            handle
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Open an existing wallet.
///
/// # Returns
///
/// Wallet handle on success, the null handle (0) on failure.
///
/// # Safety
///
/// - `path` and `password` must be valid null-terminated UTF-8 strings or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_wallet_manager_open_wallet(
    path: *const c_char,
    password: *const c_char,
    network: NetworkType,
    error: *mut WbError,
) -> WbHandle {
    let result = (|| {
        let path = unsafe { cstr_to_string(path, "path") }?;
        let password = unsafe { cstr_to_string(password, "password") }?;
        let ctx = context::current()?;
        open_wallet(&ctx, &path, &password, network)
    })();

    match result {
        Ok(handle) => {
            unsafe { set_ok(error) };
            handle
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Restore a wallet from its mnemonic seed.
///
/// # Parameters
///
/// - `restore_height`: Block height to start scanning from (0 scans everything)
///
/// # Returns
///
/// Wallet handle on success, the null handle (0) on failure.
///
/// # Safety
///
/// - `path` and `mnemonic` must be valid null-terminated UTF-8 strings or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_wallet_manager_recovery_wallet(
    path: *const c_char,
    mnemonic: *const c_char,
    network: NetworkType,
    restore_height: u64,
    error: *mut WbError,
) -> WbHandle {
    let result = (|| {
        let path = unsafe { cstr_to_string(path, "path") }?;
        let mnemonic = unsafe { cstr_to_string(mnemonic, "mnemonic") }?;
        let ctx = context::current()?;
        recovery_wallet(&ctx, &path, &mnemonic, network, restore_height)
    })();

    match result {
        Ok(handle) => {
            unsafe { set_ok(error) };
            handle
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Restore a wallet from its keys.
///
/// # Parameters
///
/// - `path`: Wallet file path (UTF-8, null-terminated)
/// - `language`: Mnemonic language (UTF-8, null-terminated)
/// - `network`: Network the wallet operates on
/// - `restore_height`: Block height to start scanning from
/// - `keys_json`: `{"address": ..., "view_key": ..., "spend_key"?: ...}`;
///   without `spend_key` the wallet is view-only
/// - `error`: Out-parameter for error information
///
/// # Returns
///
/// Wallet handle on success, the null handle (0) on failure.
///
/// # Safety
///
/// - `path`, `language` and `keys_json` must be valid null-terminated UTF-8 strings or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_wallet_manager_create_wallet_from_keys(
    path: *const c_char,
    language: *const c_char,
    network: NetworkType,
    restore_height: u64,
    keys_json: *const c_char,
    error: *mut WbError,
) -> WbHandle {
    let result = (|| {
        let path = unsafe { cstr_to_string(path, "path") }?;
        let language = unsafe { cstr_to_string(language, "language") }?;
        let keys_json = unsafe { cstr_to_string(keys_json, "keys_json") }?;
        let ctx = context::current()?;
        create_wallet_from_keys(&ctx, &path, &language, network, restore_height, &keys_json)
    })();

    match result {
        Ok(handle) => {
            unsafe { set_ok(error) };
            handle
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Check whether a wallet exists at `path`.
///
/// # Returns
///
/// 1 if it exists, 0 if not or on error.
///
/// # Safety
///
/// `path` must be a valid null-terminated UTF-8 string or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_wallet_manager_wallet_exists(path: *const c_char) -> i32 {
    let Ok(path) = (unsafe { cstr_to_string(path, "path") }) else {
        return 0;
    };
    match context::current() {
        Ok(ctx) => i32::from(ctx.manager().wallet_exists(&path)),
        Err(_) => 0,
    }
}

/// Close a wallet.
///
/// On success the wallet handle and all handles derived from it (pending
/// transactions, history, listener) become invalid, and the wallet's observer
/// receives no further events. On failure every handle stays valid.
///
/// # Parameters
///
/// - `wallet`: Wallet handle
/// - `store`: Persist the wallet before closing
/// - `error`: Out-parameter for error information
///
/// # Returns
///
/// 1 on success, 0 on failure.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_wallet_manager_close_wallet(
    wallet: WbHandle,
    store: bool,
    error: *mut WbError,
) -> i32 {
    let result = context::current().and_then(|ctx| close_wallet(&ctx, wallet, store));
    match result {
        Ok(()) => {
            unsafe { set_ok(error) };
            1
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Set or clear the observer receiving a wallet's events.
///
/// # Parameters
///
/// - `wallet`: Wallet handle
/// - `observer`: Runtime-local reference to the observer, or NULL to clear
/// - `error`: Out-parameter for error information
///
/// # Returns
///
/// Listener handle, or the null handle (0) when cleared or on failure.
///
/// # Safety
///
/// - `observer` must be a live local reference on the calling thread, or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_wallet_set_listener(
    wallet: WbHandle,
    observer: *mut c_void,
    error: *mut WbError,
) -> WbHandle {
    let result = context::current().and_then(|ctx| set_listener(&ctx, wallet, ObjectRef(observer)));
    match result {
        Ok(handle) => {
            unsafe { set_ok(error) };
            handle
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}
