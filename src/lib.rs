//! C FFI bridge between a wallet engine and a managed host runtime.
//!
//! The host (a managed runtime with its own threads, objects and exceptions)
//! drives the wallet engine through opaque handles, and receives the engine's
//! push events through an observer object of its own. The engine in turn calls
//! back into the host, from its own threads, to exchange bytes with a hardware
//! device.
//!
//! # Loading
//!
//! The engine registers its wallet manager with [`register_wallet_manager`].
//! The host then calls `wb_on_load` with its runtime, observer and (optional)
//! exchange function tables, and `wb_on_unload` before it goes away.
//!
//! # Thread Safety
//!
//! All entry points may be called from any thread. Engine threads are attached
//! to the runtime for the duration of each callback and detached afterwards;
//! threads the host attached itself are left attached.
//!
//! # Memory Management
//!
//! - Handles are non-owning tokens; stale or foreign handles fail with `InvalidHandle`
//! - Wallet handles are released by `wb_wallet_manager_close_wallet`, together
//!   with every pending transaction, history and listener handle of the wallet
//! - Strings returned by functions must be freed with `wb_string_free`
//! - Error messages must be freed with `wb_error_free`
//!
//! # Feature Flags
//!
//! - `device` (default): engine-facing hardware device upcalls

#![allow(clippy::missing_safety_doc)]

mod attach;
mod config;
mod context;
mod engine;
mod error;
mod handle;
mod host;
mod lifecycle;
mod listener;
mod logging;
mod registry;
mod upcall;
mod util;
mod wallet;


// Re-export all public FFI types and functions
pub use attach::AttachGuard;
pub use config::{BridgeConfig, DEFAULT_INTERFACE_VERSION, DEFAULT_MAX_EXCHANGE_LEN};
pub use context::{BridgeContext, BridgeContextBuilder, wb_on_load, wb_on_unload};
pub use engine::{
    NetworkType, PendingTransaction, Priority, TransactionDirection, TransactionHistory,
    TransactionInfo, TransactionRequest, Transfer, Wallet, WalletKeys, WalletListener,
    WalletManager, WalletStatus, register_wallet_manager,
};
pub use error::{BridgeError, WbError, WbErrorCode, wb_error_free};
pub use handle::{HandleKind, WbHandle};
pub use host::{
    EnvPtr, EnvStatus, ExchangeMethods, ManagedRuntime, ObjectRef, ObserverMethods,
    WB_ENV_DETACHED, WB_ENV_EVERSION, WB_ENV_OK, WbExchangeVTable, WbObserverVTable,
    WbRuntimeVTable,
};
pub use lifecycle::{
    wb_wallet_manager_close_wallet, wb_wallet_manager_create_wallet,
    wb_wallet_manager_create_wallet_from_keys, wb_wallet_manager_open_wallet,
    wb_wallet_manager_recovery_wallet, wb_wallet_manager_wallet_exists, wb_wallet_set_listener,
};
pub use listener::{ListenerBridge, ListenerState};
pub use logging::{init_logging, wb_init_logging};
pub use registry::{HandleInfo, HandleRegistry};
#[cfg(feature = "device")]
pub use upcall::{wb_device_exchange, wb_device_find_name};
pub use util::wb_string_free;
pub use wallet::{
    wb_handles_snapshot, wb_history_all, wb_history_count, wb_history_dispose,
    wb_history_refresh, wb_history_transaction, wb_pending_transaction_amount,
    wb_pending_transaction_commit, wb_pending_transaction_fee, wb_pending_transaction_status,
    wb_pending_transaction_tx_id, wb_wallet_address, wb_wallet_balance,
    wb_wallet_create_transaction, wb_wallet_dispose_transaction, wb_wallet_error_string,
    wb_wallet_history, wb_wallet_pause_refresh, wb_wallet_refresh, wb_wallet_refresh_async,
    wb_wallet_start_refresh, wb_wallet_status, wb_wallet_store, wb_wallet_unlocked_balance,
};

use std::os::raw::c_char;

/// Library version string.
///
/// # Returns
///
/// Static string containing the version (e.g., "0.1.0").
/// Do not free this string.
#[unsafe(no_mangle)]
pub extern "C" fn wb_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

/// Feature flags bitmask.
///
/// # Returns
///
/// Bitmask indicating which features are compiled in:
/// - Bit 0 (0x01): `device` - Hardware device upcalls
///
/// # Example
///
/// ```c
/// uint32_t features = wb_features();
/// if (features & 0x01) { /* device upcalls available */ }
/// ```
#[unsafe(no_mangle)]
pub extern "C" fn wb_features() -> u32 {
    let mut flags = 0u32;

    #[cfg(feature = "device")]
    {
        flags |= 1 << 0;
    }

    flags
}
