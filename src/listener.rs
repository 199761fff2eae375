//! Listener bridge: forwards wallet engine events to a managed observer.
//!
//! The bridge owns one global reference to the observer. A single mutex guards
//! that reference across the whole check-attach-call-detach sequence of every
//! delivery, and across install and teardown. Once [`ListenerBridge::teardown`]
//! returns, no delivery can reach the released reference: a delivery already in
//! progress finishes first, and any later one finds the slot empty.
//!
//! Observer callbacks run with the mutex held and must not re-enter the same
//! bridge (for example by replacing the wallet listener from inside a callback).

use crate::attach::AttachGuard;
use crate::context::BridgeContext;
use crate::engine::WalletListener;
use crate::error::BridgeError;
use crate::host::{EnvPtr, ObjectRef, ObserverMethods};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObserverSlot {
    Uninstalled,
    Installed(ObjectRef),
    TornDown,
}

/// Lifecycle state of a [`ListenerBridge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Uninstalled,
    Installed,
    TornDown,
}

pub struct ListenerBridge {
    ctx: Arc<BridgeContext>,
    observer: Mutex<ObserverSlot>,
}

impl ListenerBridge {
    pub fn new(ctx: Arc<BridgeContext>) -> Self {
        tracing::debug!("created listener bridge");
        Self {
            ctx,
            observer: Mutex::new(ObserverSlot::Uninstalled),
        }
    }

    pub fn state(&self) -> ListenerState {
        match *self.observer.lock() {
            ObserverSlot::Uninstalled => ListenerState::Uninstalled,
            ObserverSlot::Installed(_) => ListenerState::Installed,
            ObserverSlot::TornDown => ListenerState::TornDown,
        }
    }

    /// Take a global reference to `observer` and start delivering events to it.
    ///
    /// `observer` only needs to be valid for this call. Fails with
    /// `AlreadyInstalled` if an observer is held; clear it with
    /// [`teardown`](Self::teardown) first.
    pub fn install(&self, observer: ObjectRef) -> Result<(), BridgeError> {
        if observer.is_null() {
            return Err(BridgeError::NullPointer("observer"));
        }
        let mut slot = self.observer.lock();
        if let ObserverSlot::Installed(_) = *slot {
            return Err(BridgeError::AlreadyInstalled);
        }

        let guard = AttachGuard::attach(&self.ctx)?;
        let global = guard
            .runtime()
            .new_global_ref(guard.env(), observer)
            .ok_or(BridgeError::RuntimeUnavailable("global reference refused"))?;
        *slot = ObserverSlot::Installed(global);
        tracing::debug!("observer installed");
        Ok(())
    }

    /// Release the observer reference. Waits for any in-flight delivery.
    ///
    /// Idempotent; a bridge that never had an observer moves to `TornDown` too.
    pub fn teardown(&self) {
        let mut slot = self.observer.lock();
        let previous = std::mem::replace(&mut *slot, ObserverSlot::TornDown);
        if let ObserverSlot::Installed(global) = previous {
            self.release(global);
            tracing::debug!("observer torn down");
        }
    }

    fn release(&self, global: ObjectRef) {
        match AttachGuard::attach(&self.ctx) {
            Ok(guard) => guard.runtime().delete_global_ref(guard.env(), global),
            // The runtime is gone; so is the reference
            Err(e) => tracing::warn!("observer reference not released: {e}"),
        }
    }

    fn deliver<F>(&self, event: &'static str, call: F)
    where
        F: FnOnce(&dyn ObserverMethods, EnvPtr, ObjectRef),
    {
        let slot = self.observer.lock();
        let ObserverSlot::Installed(observer) = *slot else {
            return;
        };
        let guard = match AttachGuard::attach(&self.ctx) {
            Ok(g) => g,
            Err(e) => {
                tracing::error!(event, "event dropped: {e}");
                return;
            }
        };
        call(self.ctx.observer_methods(), guard.env(), observer);
        drop(guard);
        drop(slot);
    }
}

impl WalletListener for ListenerBridge {
    fn money_spent(&self, tx_id: &str, amount: u64) {
        tracing::debug!(amount, "moneySpent");
        self.deliver("moneySpent", |m, env, o| m.money_spent(env, o, tx_id, amount));
    }

    fn money_received(&self, tx_id: &str, amount: u64) {
        tracing::debug!(amount, "moneyReceived");
        self.deliver("moneyReceived", |m, env, o| {
            m.money_received(env, o, tx_id, amount)
        });
    }

    fn unconfirmed_money_received(&self, tx_id: &str, amount: u64) {
        tracing::debug!(amount, "unconfirmedMoneyReceived");
        self.deliver("unconfirmedMoneyReceived", |m, env, o| {
            m.unconfirmed_money_received(env, o, tx_id, amount)
        });
    }

    fn new_block(&self, height: u64) {
        self.deliver("newBlock", |m, env, o| m.new_block(env, o, height));
    }

    fn updated(&self) {
        tracing::debug!("updated");
        self.deliver("updated", |m, env, o| m.updated(env, o));
    }

    fn refreshed(&self) {
        tracing::debug!("refreshed");
        self.deliver("refreshed", |m, env, o| m.refreshed(env, o));
    }
}

impl Drop for ListenerBridge {
    fn drop(&mut self) {
        let previous = std::mem::replace(self.observer.get_mut(), ObserverSlot::TornDown);
        if let ObserverSlot::Installed(global) = previous {
            tracing::warn!("listener bridge dropped while installed");
            self.release(global);
        }
        tracing::debug!("destroyed listener bridge");
    }
}
