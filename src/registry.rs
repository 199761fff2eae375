//! Slot-map registry owning every native object handed to the host.
//!
//! The registry lock guards the slot table only. Objects are reference counted
//! and cloned out before use, so engine calls never run under the lock.
//!
//! A wallet being closed stays in its slot until the engine is done with it,
//! but is marked closing: every lookup through it fails with `InvalidHandle`
//! so no second caller can reach the engine object in the meantime.

use crate::engine::{PendingTransaction, TransactionHistory, Wallet};
use crate::error::BridgeError;
use crate::handle::{HandleKind, WbHandle};
use crate::listener::ListenerBridge;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

struct WalletEntry {
    wallet: Arc<dyn Wallet>,
    listener: WbHandle,
    history: WbHandle,
    closing: bool,
}

enum Entry {
    Wallet(WalletEntry),
    PendingTransaction {
        owner: WbHandle,
        tx: Arc<dyn PendingTransaction>,
    },
    TransactionHistory {
        owner: WbHandle,
        history: Arc<dyn TransactionHistory>,
    },
    Listener {
        owner: WbHandle,
        bridge: Arc<ListenerBridge>,
    },
}

impl Entry {
    fn kind(&self) -> HandleKind {
        match self {
            Entry::Wallet(_) => HandleKind::Wallet,
            Entry::PendingTransaction { .. } => HandleKind::PendingTransaction,
            Entry::TransactionHistory { .. } => HandleKind::TransactionHistory,
            Entry::Listener { .. } => HandleKind::Listener,
        }
    }

    fn owner(&self) -> WbHandle {
        match self {
            Entry::Wallet(_) => WbHandle::NULL,
            Entry::PendingTransaction { owner, .. }
            | Entry::TransactionHistory { owner, .. }
            | Entry::Listener { owner, .. } => *owner,
        }
    }
}

struct Occupant {
    entry: Entry,
    created_by: &'static str,
}

#[derive(Default)]
struct Slot {
    generation: u32,
    occupant: Option<Occupant>,
}

#[derive(Default)]
struct Slots {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Slots {
    fn insert(&mut self, entry: Entry, created_by: &'static str) -> Result<WbHandle, BridgeError> {
        let kind = entry.kind();
        let index = match self.free.pop() {
            Some(i) => i,
            None => {
                let i = u32::try_from(self.slots.len())
                    .map_err(|_| BridgeError::InvalidArgument("handle table full".into()))?;
                self.slots.push(Slot::default());
                i
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.occupant = Some(Occupant { entry, created_by });
        Ok(WbHandle::new(kind, index, slot.generation))
    }

    fn get(&self, handle: WbHandle, kind: HandleKind) -> Result<&Entry, BridgeError> {
        if handle.kind() != Some(kind) {
            return Err(BridgeError::InvalidHandle);
        }
        let slot = self
            .slots
            .get(handle.index())
            .ok_or(BridgeError::InvalidHandle)?;
        match &slot.occupant {
            Some(o) if slot.generation == handle.generation() => Ok(&o.entry),
            _ => Err(BridgeError::InvalidHandle),
        }
    }

    fn get_mut(&mut self, handle: WbHandle, kind: HandleKind) -> Result<&mut Entry, BridgeError> {
        self.get(handle, kind)?;
        match self.slots[handle.index()].occupant.as_mut() {
            Some(o) => Ok(&mut o.entry),
            None => Err(BridgeError::InvalidHandle),
        }
    }

    fn remove(&mut self, handle: WbHandle, kind: HandleKind) -> Result<Entry, BridgeError> {
        self.get(handle, kind)?;
        let index = handle.index();
        let slot = &mut self.slots[index];
        let occupant = slot.occupant.take().ok_or(BridgeError::InvalidHandle)?;
        slot.generation = WbHandle::next_generation(slot.generation);
        self.free.push(index as u32);
        Ok(occupant.entry)
    }

    fn wallet_entry_mut(&mut self, wallet: WbHandle) -> Result<&mut WalletEntry, BridgeError> {
        match self.get_mut(wallet, HandleKind::Wallet)? {
            Entry::Wallet(w) => Ok(w),
            _ => Err(BridgeError::InvalidHandle),
        }
    }

    /// Wallet entry that is not being closed.
    fn open_wallet(&self, wallet: WbHandle) -> Result<&WalletEntry, BridgeError> {
        match self.get(wallet, HandleKind::Wallet)? {
            Entry::Wallet(w) if !w.closing => Ok(w),
            _ => Err(BridgeError::InvalidHandle),
        }
    }

    fn open_wallet_mut(&mut self, wallet: WbHandle) -> Result<&mut WalletEntry, BridgeError> {
        let w = self.wallet_entry_mut(wallet)?;
        if w.closing {
            return Err(BridgeError::InvalidHandle);
        }
        Ok(w)
    }

    fn live(&self) -> impl Iterator<Item = (WbHandle, &Occupant)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.occupant
                .as_ref()
                .map(|o| (WbHandle::new(o.entry.kind(), i as u32, slot.generation), o))
        })
    }
}

/// What closing a wallet released.
pub struct RemovedWallet {
    /// Listener bridge that was attached to the wallet; still installed
    pub listener: Option<Arc<ListenerBridge>>,
    /// Number of child handles (transactions, history, listener) released
    pub children: usize,
}

/// Diagnostic view of one live handle.
#[derive(Debug, Clone, Serialize)]
pub struct HandleInfo {
    pub handle: WbHandle,
    pub kind: HandleKind,
    pub created_by: &'static str,
    pub owner: Option<WbHandle>,
}

/// Owner of all native objects reachable from the host.
#[derive(Default)]
pub struct HandleRegistry {
    inner: Mutex<Slots>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_wallet(
        &self,
        wallet: Arc<dyn Wallet>,
        created_by: &'static str,
    ) -> Result<WbHandle, BridgeError> {
        let entry = Entry::Wallet(WalletEntry {
            wallet,
            listener: WbHandle::NULL,
            history: WbHandle::NULL,
            closing: false,
        });
        self.inner.lock().insert(entry, created_by)
    }

    pub fn wallet(&self, handle: WbHandle) -> Result<Arc<dyn Wallet>, BridgeError> {
        Ok(self.inner.lock().open_wallet(handle)?.wallet.clone())
    }

    /// Mark `wallet` as closing and return it for the engine to close.
    ///
    /// Until [`abort_close`](Self::abort_close) or
    /// [`remove_wallet`](Self::remove_wallet), the handle resolves for nobody,
    /// including a second close.
    pub fn begin_close(&self, wallet: WbHandle) -> Result<Arc<dyn Wallet>, BridgeError> {
        let mut slots = self.inner.lock();
        let entry = slots.open_wallet_mut(wallet)?;
        entry.closing = true;
        Ok(entry.wallet.clone())
    }

    /// Make a wallet whose close was refused usable again.
    pub fn abort_close(&self, wallet: WbHandle) {
        if let Ok(entry) = self.inner.lock().wallet_entry_mut(wallet) {
            entry.closing = false;
        }
    }

    pub fn insert_pending(
        &self,
        owner: WbHandle,
        tx: Arc<dyn PendingTransaction>,
        created_by: &'static str,
    ) -> Result<WbHandle, BridgeError> {
        let mut slots = self.inner.lock();
        slots.open_wallet(owner)?;
        slots.insert(Entry::PendingTransaction { owner, tx }, created_by)
    }

    pub fn pending(&self, handle: WbHandle) -> Result<Arc<dyn PendingTransaction>, BridgeError> {
        match self.inner.lock().get(handle, HandleKind::PendingTransaction)? {
            Entry::PendingTransaction { tx, .. } => Ok(tx.clone()),
            _ => Err(BridgeError::InvalidHandle),
        }
    }

    /// Release `pending`, which must belong to `owner`.
    pub fn remove_pending(
        &self,
        owner: WbHandle,
        pending: WbHandle,
    ) -> Result<Arc<dyn PendingTransaction>, BridgeError> {
        let mut slots = self.inner.lock();
        slots.open_wallet(owner)?;
        match slots.get(pending, HandleKind::PendingTransaction)? {
            Entry::PendingTransaction { owner: o, .. } if *o == owner => {}
            _ => return Err(BridgeError::InvalidHandle),
        }
        match slots.remove(pending, HandleKind::PendingTransaction)? {
            Entry::PendingTransaction { tx, .. } => Ok(tx),
            _ => Err(BridgeError::InvalidHandle),
        }
    }

    /// Existing history handle of `owner`, if one was issued.
    pub fn history_of(&self, owner: WbHandle) -> Result<Option<WbHandle>, BridgeError> {
        let mut slots = self.inner.lock();
        let h = slots.open_wallet_mut(owner)?.history;
        Ok((!h.is_null()).then_some(h))
    }

    /// Register `history` for `owner`, or return the handle issued concurrently.
    pub fn insert_history(
        &self,
        owner: WbHandle,
        history: Arc<dyn TransactionHistory>,
        created_by: &'static str,
    ) -> Result<WbHandle, BridgeError> {
        let mut slots = self.inner.lock();
        let existing = slots.open_wallet_mut(owner)?.history;
        if !existing.is_null() {
            return Ok(existing);
        }
        let h = slots.insert(Entry::TransactionHistory { owner, history }, created_by)?;
        slots.wallet_entry_mut(owner)?.history = h;
        Ok(h)
    }

    pub fn history(&self, handle: WbHandle) -> Result<Arc<dyn TransactionHistory>, BridgeError> {
        match self.inner.lock().get(handle, HandleKind::TransactionHistory)? {
            Entry::TransactionHistory { history, .. } => Ok(history.clone()),
            _ => Err(BridgeError::InvalidHandle),
        }
    }

    /// Forget a history token. The history itself stays with its wallet.
    pub fn remove_history(&self, handle: WbHandle) -> Result<(), BridgeError> {
        let mut slots = self.inner.lock();
        let owner = slots.get(handle, HandleKind::TransactionHistory)?.owner();
        slots.remove(handle, HandleKind::TransactionHistory)?;
        if let Ok(w) = slots.wallet_entry_mut(owner) {
            w.history = WbHandle::NULL;
        }
        Ok(())
    }

    /// Attach `bridge` to `owner`. Fails if a listener is still attached.
    pub fn insert_listener(
        &self,
        owner: WbHandle,
        bridge: Arc<ListenerBridge>,
        created_by: &'static str,
    ) -> Result<WbHandle, BridgeError> {
        let mut slots = self.inner.lock();
        if !slots.open_wallet_mut(owner)?.listener.is_null() {
            return Err(BridgeError::AlreadyInstalled);
        }
        let h = slots.insert(Entry::Listener { owner, bridge }, created_by)?;
        slots.wallet_entry_mut(owner)?.listener = h;
        Ok(h)
    }

    /// Detach and return the listener bridge of `owner`, releasing its handle.
    pub fn take_listener(&self, owner: WbHandle) -> Result<Option<Arc<ListenerBridge>>, BridgeError> {
        let mut slots = self.inner.lock();
        let entry = slots.open_wallet_mut(owner)?;
        let h = std::mem::replace(&mut entry.listener, WbHandle::NULL);
        if h.is_null() {
            return Ok(None);
        }
        match slots.remove(h, HandleKind::Listener)? {
            Entry::Listener { bridge, .. } => Ok(Some(bridge)),
            _ => Err(BridgeError::InvalidHandle),
        }
    }

    pub fn listener(&self, handle: WbHandle) -> Result<Arc<ListenerBridge>, BridgeError> {
        match self.inner.lock().get(handle, HandleKind::Listener)? {
            Entry::Listener { bridge, .. } => Ok(bridge.clone()),
            _ => Err(BridgeError::InvalidHandle),
        }
    }

    /// Release `wallet` and every handle it owns.
    pub fn remove_wallet(&self, wallet: WbHandle) -> Result<RemovedWallet, BridgeError> {
        let mut slots = self.inner.lock();
        slots.remove(wallet, HandleKind::Wallet)?;

        let children: Vec<(WbHandle, HandleKind)> = slots
            .live()
            .filter(|(_, o)| o.entry.owner() == wallet)
            .map(|(h, o)| (h, o.entry.kind()))
            .collect();

        let mut listener = None;
        for (h, kind) in &children {
            if let Entry::Listener { bridge, .. } = slots.remove(*h, *kind)? {
                listener = Some(bridge);
            }
        }
        Ok(RemovedWallet {
            listener,
            children: children.len(),
        })
    }

    /// Live handles, for leak diagnostics.
    pub fn snapshot(&self) -> Vec<HandleInfo> {
        self.inner
            .lock()
            .live()
            .map(|(handle, o)| {
                let owner = o.entry.owner();
                HandleInfo {
                    handle,
                    kind: o.entry.kind(),
                    created_by: o.created_by,
                    owner: (!owner.is_null()).then_some(owner),
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().live().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
