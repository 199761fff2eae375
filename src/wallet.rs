//! Wallet, transaction history and pending transaction accessors.
//!
//! Every entry point resolves its handle through the registry, clones the
//! object out, and calls the engine without holding the registry lock.

use crate::context::{self, BridgeContext};
use crate::engine::{TransactionRequest, WalletStatus};
use crate::error::{BridgeError, WbError};
use crate::handle::WbHandle;
use crate::util::{
    cstr_to_option_string, cstr_to_string, set_error, set_error_null, set_ok, string_to_cstr,
};
use std::os::raw::c_char;

/// History of `wallet`, issuing its handle on first use.
pub fn history(ctx: &BridgeContext, wallet: WbHandle) -> Result<WbHandle, BridgeError> {
    if let Some(existing) = ctx.registry().history_of(wallet)? {
        return Ok(existing);
    }
    let history = ctx.registry().wallet(wallet)?.history();
    ctx.registry().insert_history(wallet, history, "wallet_history")
}

/// Persist `wallet`, at `path` or where it was opened when `path` is empty.
pub fn store(ctx: &BridgeContext, wallet: WbHandle, path: &str) -> Result<(), BridgeError> {
    let target = ctx.registry().wallet(wallet)?;
    if target.store(path) {
        tracing::debug!(handle = wallet.0, "wallet stored");
        Ok(())
    } else {
        Err(BridgeError::Engine(target.error_string()))
    }
}

/// Entry `index` of `history` as a JSON object.
pub fn history_entry_json(
    ctx: &BridgeContext,
    history: WbHandle,
    index: usize,
) -> Result<String, BridgeError> {
    let info = ctx
        .registry()
        .history(history)?
        .transaction(index)
        .ok_or(BridgeError::NotFound)?;
    Ok(serde_json::to_string(&info)?)
}

/// Every entry of `history` as a JSON array.
pub fn history_json(ctx: &BridgeContext, history: WbHandle) -> Result<String, BridgeError> {
    let entries = ctx.registry().history(history)?.all();
    Ok(serde_json::to_string(&entries)?)
}

/// Build a pending transaction from a JSON request.
pub fn create_transaction(
    ctx: &BridgeContext,
    wallet: WbHandle,
    request_json: &str,
) -> Result<WbHandle, BridgeError> {
    let request: TransactionRequest = serde_json::from_str(request_json)?;
    let target = ctx.registry().wallet(wallet)?;
    let tx = target.create_transaction(&request);
    if tx.status() != WalletStatus::Ok {
        let message = tx.error_string();
        target.dispose_transaction(tx);
        return Err(BridgeError::Engine(message));
    }
    match ctx.registry().insert_pending(wallet, tx.clone(), "create_transaction") {
        Ok(h) => Ok(h),
        Err(e) => {
            target.dispose_transaction(tx);
            Err(e)
        }
    }
}

/// Release `pending` back to the wallet that created it.
pub fn dispose_transaction(
    ctx: &BridgeContext,
    wallet: WbHandle,
    pending: WbHandle,
) -> Result<(), BridgeError> {
    let target = ctx.registry().wallet(wallet)?;
    let tx = ctx.registry().remove_pending(wallet, pending)?;
    target.dispose_transaction(tx);
    Ok(())
}

/// Transaction ids of `pending` as a JSON array.
pub fn transaction_ids_json(ctx: &BridgeContext, pending: WbHandle) -> Result<String, BridgeError> {
    let ids = ctx.registry().pending(pending)?.tx_ids();
    Ok(serde_json::to_string(&ids)?)
}

/// Live handles as a JSON array.
pub fn handles_snapshot_json(ctx: &BridgeContext) -> Result<String, BridgeError> {
    Ok(serde_json::to_string_pretty(&ctx.registry().snapshot())?)
}

unsafe fn status_or_error(result: Result<WalletStatus, BridgeError>, error: *mut WbError) -> WalletStatus {
    match result {
        Ok(status) => {
            unsafe { set_ok(error) };
            status
        }
        Err(e) => {
            unsafe { set_error::<()>(error, e) };
            WalletStatus::Error
        }
    }
}

unsafe fn flag_or_error(result: Result<(), BridgeError>, error: *mut WbError) -> i32 {
    match result {
        Ok(()) => {
            unsafe { set_ok(error) };
            1
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

unsafe fn value_or_error<T: Default>(result: Result<T, BridgeError>, error: *mut WbError) -> T {
    match result {
        Ok(v) => {
            unsafe { set_ok(error) };
            v
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

unsafe fn string_or_error(result: Result<String, BridgeError>, error: *mut WbError) -> *mut c_char {
    match result {
        Ok(s) => {
            unsafe { set_ok(error) };
            string_to_cstr(s)
        }
        Err(e) => unsafe { set_error_null(error, e) },
    }
}

/// Status of a wallet.
///
/// # Returns
///
/// The wallet status, or `Error` with `error` set if the handle is invalid.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_wallet_status(wallet: WbHandle, error: *mut WbError) -> WalletStatus {
    let result = context::current().and_then(|ctx| Ok(ctx.registry().wallet(wallet)?.status()));
    unsafe { status_or_error(result, error) }
}

/// Last error reported by a wallet.
///
/// # Returns
///
/// Owned string (possibly empty), NULL on failure. Free with `wb_string_free()`.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_wallet_error_string(
    wallet: WbHandle,
    error: *mut WbError,
) -> *mut c_char {
    let result =
        context::current().and_then(|ctx| Ok(ctx.registry().wallet(wallet)?.error_string()));
    unsafe { string_or_error(result, error) }
}

/// Refresh a wallet synchronously.
///
/// The observer receives `refreshed` when the refresh finishes.
///
/// # Returns
///
/// 1 on success, 0 on failure.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_wallet_refresh(wallet: WbHandle, error: *mut WbError) -> i32 {
    let result = context::current().and_then(|ctx| {
        let target = ctx.registry().wallet(wallet)?;
        if target.refresh() {
            Ok(())
        } else {
            Err(BridgeError::Engine(target.error_string()))
        }
    });
    unsafe { flag_or_error(result, error) }
}

/// Primary address of a wallet.
///
/// # Returns
///
/// Owned string, NULL on failure. Free with `wb_string_free()`.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_wallet_address(wallet: WbHandle, error: *mut WbError) -> *mut c_char {
    let result = context::current().and_then(|ctx| Ok(ctx.registry().wallet(wallet)?.address()));
    unsafe { string_or_error(result, error) }
}

/// Total balance of a wallet in atomic units.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_wallet_balance(wallet: WbHandle, error: *mut WbError) -> u64 {
    let result = context::current().and_then(|ctx| Ok(ctx.registry().wallet(wallet)?.balance()));
    unsafe { value_or_error(result, error) }
}

/// Spendable balance of a wallet in atomic units.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_wallet_unlocked_balance(wallet: WbHandle, error: *mut WbError) -> u64 {
    let result =
        context::current().and_then(|ctx| Ok(ctx.registry().wallet(wallet)?.unlocked_balance()));
    unsafe { value_or_error(result, error) }
}

/// Persist a wallet.
///
/// # Parameters
///
/// - `wallet`: Wallet handle
/// - `path`: Destination path, or NULL/empty to store where the wallet was opened
/// - `error`: Out-parameter for error information
///
/// # Returns
///
/// 1 on success, 0 on failure.
///
/// # Safety
///
/// - `path` must be a valid null-terminated UTF-8 string or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_wallet_store(
    wallet: WbHandle,
    path: *const c_char,
    error: *mut WbError,
) -> i32 {
    let result = (|| {
        let path = unsafe { cstr_to_option_string(path, "path") }?.unwrap_or_default();
        let ctx = context::current()?;
        store(&ctx, wallet, &path)
    })();
    unsafe { flag_or_error(result, error) }
}

/// Start or resume the wallet's background refresh.
///
/// The observer receives `new_block`, `updated` and `refreshed` events from
/// the engine's refresh thread until `wb_wallet_pause_refresh()` or close.
///
/// # Returns
///
/// 1 on success, 0 on failure.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_wallet_start_refresh(wallet: WbHandle, error: *mut WbError) -> i32 {
    let result = context::current().and_then(|ctx| {
        ctx.registry().wallet(wallet)?.start_refresh();
        Ok(())
    });
    unsafe { flag_or_error(result, error) }
}

/// Pause the wallet's background refresh.
///
/// # Returns
///
/// 1 on success, 0 on failure.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_wallet_pause_refresh(wallet: WbHandle, error: *mut WbError) -> i32 {
    let result = context::current().and_then(|ctx| {
        ctx.registry().wallet(wallet)?.pause_refresh();
        Ok(())
    });
    unsafe { flag_or_error(result, error) }
}

/// Refresh a wallet on an engine thread and return immediately.
///
/// The observer receives `refreshed` when the refresh finishes.
///
/// # Returns
///
/// 1 if the refresh was started, 0 on failure.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_wallet_refresh_async(wallet: WbHandle, error: *mut WbError) -> i32 {
    let result = context::current().and_then(|ctx| {
        ctx.registry().wallet(wallet)?.refresh_async();
        Ok(())
    });
    unsafe { flag_or_error(result, error) }
}

/// History handle of a wallet.
///
/// Repeated calls return the same handle until `wb_history_dispose()`.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_wallet_history(wallet: WbHandle, error: *mut WbError) -> WbHandle {
    let result = context::current().and_then(|ctx| history(&ctx, wallet));
    unsafe { value_or_error(result, error) }
}

/// Number of entries in a transaction history.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_history_count(history: WbHandle, error: *mut WbError) -> libc::size_t {
    let result = context::current().and_then(|ctx| Ok(ctx.registry().history(history)?.count()));
    unsafe { value_or_error(result, error) }
}

/// Reload a transaction history from its wallet.
///
/// # Returns
///
/// 1 on success, 0 on failure.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_history_refresh(history: WbHandle, error: *mut WbError) -> i32 {
    let result = context::current().and_then(|ctx| {
        ctx.registry().history(history)?.refresh();
        Ok(())
    });
    unsafe { flag_or_error(result, error) }
}

/// One entry of a transaction history.
///
/// # Returns
///
/// JSON object (`direction`, `pending`, `failed`, `amount`, `fee`,
/// `block_height`, `confirmations`, `hash`, `timestamp`, `payment_id`,
/// `transfers`), NULL on failure (`NotFound` past the last entry).
/// Free with `wb_string_free()`.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_history_transaction(
    history: WbHandle,
    index: libc::size_t,
    error: *mut WbError,
) -> *mut c_char {
    let result = context::current().and_then(|ctx| history_entry_json(&ctx, history, index));
    unsafe { string_or_error(result, error) }
}

/// Every entry of a transaction history.
///
/// # Returns
///
/// JSON array of the objects `wb_history_transaction()` returns, NULL on
/// failure. Free with `wb_string_free()`.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_history_all(history: WbHandle, error: *mut WbError) -> *mut c_char {
    let result = context::current().and_then(|ctx| history_json(&ctx, history));
    unsafe { string_or_error(result, error) }
}

/// Release a history handle. The history itself stays with its wallet.
///
/// # Returns
///
/// 1 on success, 0 on failure.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_history_dispose(history: WbHandle, error: *mut WbError) -> i32 {
    let result = context::current().and_then(|ctx| ctx.registry().remove_history(history));
    unsafe { flag_or_error(result, error) }
}

/// Create a pending transaction.
///
/// # Parameters
///
/// - `wallet`: Wallet handle
/// - `request_json`: `{"address": ..., "payment_id"?: ..., "amount"?: ..., "mixin"?: ..., "priority"?: ...}`
/// - `error`: Out-parameter for error information
///
/// # Returns
///
/// Pending transaction handle, the null handle (0) on failure.
///
/// # Ownership
///
/// Release with `wb_wallet_dispose_transaction()`; closing the wallet releases it too.
///
/// # Safety
///
/// - `request_json` must be a valid null-terminated UTF-8 string or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_wallet_create_transaction(
    wallet: WbHandle,
    request_json: *const c_char,
    error: *mut WbError,
) -> WbHandle {
    let result = (|| {
        let request_json = unsafe { cstr_to_string(request_json, "request_json") }?;
        let ctx = context::current()?;
        create_transaction(&ctx, wallet, &request_json)
    })();
    unsafe { value_or_error(result, error) }
}

/// Release a pending transaction created on `wallet`.
///
/// # Returns
///
/// 1 on success, 0 on failure (`InvalidHandle` if `pending` belongs to another wallet).
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_wallet_dispose_transaction(
    wallet: WbHandle,
    pending: WbHandle,
    error: *mut WbError,
) -> i32 {
    let result = context::current().and_then(|ctx| dispose_transaction(&ctx, wallet, pending));
    unsafe { flag_or_error(result, error) }
}

/// Status of a pending transaction.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_pending_transaction_status(
    pending: WbHandle,
    error: *mut WbError,
) -> WalletStatus {
    let result = context::current().and_then(|ctx| Ok(ctx.registry().pending(pending)?.status()));
    unsafe { status_or_error(result, error) }
}

/// Amount of a pending transaction in atomic units.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_pending_transaction_amount(pending: WbHandle, error: *mut WbError) -> u64 {
    let result = context::current().and_then(|ctx| Ok(ctx.registry().pending(pending)?.amount()));
    unsafe { value_or_error(result, error) }
}

/// Fee of a pending transaction in atomic units.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_pending_transaction_fee(pending: WbHandle, error: *mut WbError) -> u64 {
    let result = context::current().and_then(|ctx| Ok(ctx.registry().pending(pending)?.fee()));
    unsafe { value_or_error(result, error) }
}

/// Transaction ids of a pending transaction.
///
/// # Returns
///
/// JSON array of hex ids, NULL on failure. Free with `wb_string_free()`.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_pending_transaction_tx_id(
    pending: WbHandle,
    error: *mut WbError,
) -> *mut c_char {
    let result = context::current().and_then(|ctx| transaction_ids_json(&ctx, pending));
    unsafe { string_or_error(result, error) }
}

/// Broadcast a pending transaction.
///
/// # Returns
///
/// 1 on success, 0 on failure.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_pending_transaction_commit(pending: WbHandle, error: *mut WbError) -> i32 {
    let result = context::current().and_then(|ctx| {
        let tx = ctx.registry().pending(pending)?;
        if tx.commit() {
            Ok(())
        } else {
            Err(BridgeError::Engine(tx.error_string()))
        }
    });
    unsafe { flag_or_error(result, error) }
}

/// Live handles with kind, creator and owner, for leak diagnostics.
///
/// # Returns
///
/// JSON array, NULL on failure. Free with `wb_string_free()`.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_handles_snapshot(error: *mut WbError) -> *mut c_char {
    let result = context::current().and_then(|ctx| handles_snapshot_json(&ctx));
    unsafe { string_or_error(result, error) }
}
