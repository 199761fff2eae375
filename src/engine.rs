//! Interface of the wrapped wallet engine.
//!
//! The engine is a black box: it owns wallets, pending transactions and
//! transaction histories, runs its own refresh threads, and pushes events into
//! whatever [`WalletListener`] is set on a wallet. The engine registers its
//! [`WalletManager`] once with [`register_wallet_manager`] before the host loads
//! the bridge.

use crate::error::BridgeError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

static WALLET_MANAGER: RwLock<Option<Arc<dyn WalletManager>>> = parking_lot::const_rwlock(None);

/// Register the engine's wallet manager. Replaces any previous registration.
pub fn register_wallet_manager(manager: Arc<dyn WalletManager>) {
    *WALLET_MANAGER.write() = Some(manager);
}

/// The registered wallet manager, if any.
pub fn registered_wallet_manager() -> Option<Arc<dyn WalletManager>> {
    WALLET_MANAGER.read().clone()
}

/// Network a wallet operates on.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Mainnet = 0,
    Testnet = 1,
    Stagenet = 2,
}

/// Status reported by wallets and pending transactions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletStatus {
    Ok = 0,
    Error = 1,
    Critical = 2,
}

/// Transaction priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Default,
    Low,
    Medium,
    High,
}

/// Parameters for [`Wallet::create_transaction`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransactionRequest {
    /// Destination address
    pub address: String,
    /// Optional payment id
    #[serde(default)]
    pub payment_id: Option<String>,
    /// Amount in atomic units; `None` sweeps all
    #[serde(default)]
    pub amount: Option<u64>,
    /// Ring size override
    #[serde(default)]
    pub mixin: Option<u32>,
    #[serde(default)]
    pub priority: Priority,
}

/// Keys of a wallet restored without its seed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WalletKeys {
    /// Primary address
    pub address: String,
    /// Secret view key (hex)
    pub view_key: String,
    /// Secret spend key (hex); absent for a view-only wallet
    #[serde(default)]
    pub spend_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionDirection {
    In,
    Out,
}

/// One destination of an outgoing transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transfer {
    pub amount: u64,
    pub address: String,
}

/// A history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionInfo {
    pub direction: TransactionDirection,
    pub pending: bool,
    pub failed: bool,
    pub amount: u64,
    pub fee: u64,
    pub block_height: u64,
    pub confirmations: u64,
    pub hash: String,
    /// Unix seconds
    pub timestamp: u64,
    pub payment_id: String,
    pub transfers: Vec<Transfer>,
}

/// Push-style wallet events, issued from engine threads.
pub trait WalletListener: Send + Sync {
    fn money_spent(&self, tx_id: &str, amount: u64);
    fn money_received(&self, tx_id: &str, amount: u64);
    fn unconfirmed_money_received(&self, tx_id: &str, amount: u64);
    fn new_block(&self, height: u64);
    /// Any change to the wallet.
    fn updated(&self);
    /// A refresh finished, whether background or explicit.
    fn refreshed(&self);
}

pub trait Wallet: Send + Sync {
    fn status(&self) -> WalletStatus;
    fn error_string(&self) -> String;
    /// Replace the listener the engine pushes events into.
    fn set_listener(&self, listener: Option<Arc<dyn WalletListener>>);
    fn address(&self) -> String;
    /// Total balance in atomic units.
    fn balance(&self) -> u64;
    fn unlocked_balance(&self) -> u64;
    /// Persist the wallet; an empty `path` stores it where it was opened.
    fn store(&self, path: &str) -> bool;
    /// Refresh in the calling thread, blocking until done.
    fn refresh(&self) -> bool;
    /// Start (or resume) the engine's background refresh thread.
    fn start_refresh(&self);
    /// Pause background refresh. No background event follows once this returns.
    fn pause_refresh(&self);
    /// Run one refresh on an engine thread and return immediately.
    fn refresh_async(&self);
    /// The wallet's history. Storage stays with the wallet.
    fn history(&self) -> Arc<dyn TransactionHistory>;
    fn create_transaction(&self, request: &TransactionRequest) -> Arc<dyn PendingTransaction>;
    /// Release a transaction produced by [`Wallet::create_transaction`].
    fn dispose_transaction(&self, tx: Arc<dyn PendingTransaction>);
}

pub trait PendingTransaction: Send + Sync {
    fn status(&self) -> WalletStatus;
    fn error_string(&self) -> String;
    fn amount(&self) -> u64;
    fn fee(&self) -> u64;
    fn tx_ids(&self) -> Vec<String>;
    fn commit(&self) -> bool;
}

pub trait TransactionHistory: Send + Sync {
    fn count(&self) -> usize;
    fn transaction(&self, index: usize) -> Option<TransactionInfo>;
    fn all(&self) -> Vec<TransactionInfo>;
    /// Reload entries from the wallet.
    fn refresh(&self);
}

/// Process-wide wallet factory and closer.
pub trait WalletManager: Send + Sync {
    fn create_wallet(
        &self,
        path: &str,
        password: &str,
        language: &str,
        network: NetworkType,
    ) -> Result<Arc<dyn Wallet>, BridgeError>;

    fn open_wallet(
        &self,
        path: &str,
        password: &str,
        network: NetworkType,
    ) -> Result<Arc<dyn Wallet>, BridgeError>;

    fn recovery_wallet(
        &self,
        path: &str,
        mnemonic: &str,
        network: NetworkType,
        restore_height: u64,
    ) -> Result<Arc<dyn Wallet>, BridgeError>;

    fn create_wallet_from_keys(
        &self,
        path: &str,
        language: &str,
        network: NetworkType,
        restore_height: u64,
        keys: &WalletKeys,
    ) -> Result<Arc<dyn Wallet>, BridgeError>;

    fn wallet_exists(&self, path: &str) -> bool;

    /// Close `wallet`, blocking until in-progress operations quiesce.
    /// No listener event is delivered after this returns `true`.
    fn close_wallet(&self, wallet: &Arc<dyn Wallet>, store: bool) -> bool;
}
