//! Load-time bridge state and the module load/unload hooks.
//!
//! Everything the bridge resolves from the host is gathered once into an
//! immutable [`BridgeContext`]. The process-wide slot is written by
//! `wb_on_load` and cleared by `wb_on_unload`; readers take a cheap read lock
//! and clone the `Arc`. Listener bridges keep their own clone, so a context
//! outlives unload until the last bridge is gone, but reports
//! `RuntimeUnavailable` from that point on.

use crate::config::BridgeConfig;
use crate::engine::{WalletManager, registered_wallet_manager};
use crate::error::{BridgeError, WbError};
use crate::host::{
    ExchangeMethods, HostExchangeMethods, HostObserverMethods, HostRuntime, ManagedRuntime,
    ObserverMethods, WbExchangeVTable, WbObserverVTable, WbRuntimeVTable,
};
use crate::registry::HandleRegistry;
use crate::util::{cstr_to_option_string, set_error, set_ok};
use parking_lot::RwLock;
use std::os::raw::c_char;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

static CONTEXT: RwLock<Option<Arc<BridgeContext>>> = parking_lot::const_rwlock(None);

/// Host capabilities, engine and handle registry shared by all bridge parts.
pub struct BridgeContext {
    runtime: Arc<dyn ManagedRuntime>,
    observer_methods: Arc<dyn ObserverMethods>,
    exchange_methods: Option<Arc<dyn ExchangeMethods>>,
    manager: Arc<dyn WalletManager>,
    registry: HandleRegistry,
    config: BridgeConfig,
    loaded: AtomicBool,
}

impl BridgeContext {
    pub fn builder(
        runtime: Arc<dyn ManagedRuntime>,
        observer_methods: Arc<dyn ObserverMethods>,
        manager: Arc<dyn WalletManager>,
    ) -> BridgeContextBuilder {
        BridgeContextBuilder {
            runtime,
            observer_methods,
            exchange_methods: None,
            manager,
            config: BridgeConfig::default(),
        }
    }

    /// The runtime, unless the context has been unloaded.
    pub fn runtime(&self) -> Result<&dyn ManagedRuntime, BridgeError> {
        if self.loaded.load(Ordering::Acquire) {
            Ok(self.runtime.as_ref())
        } else {
            Err(BridgeError::RuntimeUnavailable("bridge unloaded"))
        }
    }

    pub fn observer_methods(&self) -> &dyn ObserverMethods {
        self.observer_methods.as_ref()
    }

    pub fn exchange_methods(&self) -> Option<&dyn ExchangeMethods> {
        self.exchange_methods.as_deref()
    }

    pub fn manager(&self) -> &dyn WalletManager {
        self.manager.as_ref()
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    fn mark_unloaded(&self) {
        self.loaded.store(false, Ordering::Release);
    }
}

pub struct BridgeContextBuilder {
    runtime: Arc<dyn ManagedRuntime>,
    observer_methods: Arc<dyn ObserverMethods>,
    exchange_methods: Option<Arc<dyn ExchangeMethods>>,
    manager: Arc<dyn WalletManager>,
    config: BridgeConfig,
}

impl BridgeContextBuilder {
    pub fn exchange_methods(mut self, methods: Arc<dyn ExchangeMethods>) -> Self {
        self.exchange_methods = Some(methods);
        self
    }

    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Arc<BridgeContext> {
        Arc::new(BridgeContext {
            runtime: self.runtime,
            observer_methods: self.observer_methods,
            exchange_methods: self.exchange_methods,
            manager: self.manager,
            registry: HandleRegistry::new(),
            config: self.config,
            loaded: AtomicBool::new(true),
        })
    }
}

/// Publish `ctx` as the process-wide context.
pub fn load(ctx: Arc<BridgeContext>) -> Result<(), BridgeError> {
    let mut slot = CONTEXT.write();
    if slot.is_some() {
        return Err(BridgeError::AlreadyLoaded);
    }
    tracing::info!(
        interface_version = ctx.config.interface_version,
        exchange = ctx.exchange_methods.is_some(),
        "bridge loaded"
    );
    *slot = Some(ctx);
    Ok(())
}

/// Clear the process-wide context and return it.
pub fn unload() -> Option<Arc<BridgeContext>> {
    let ctx = CONTEXT.write().take()?;
    ctx.mark_unloaded();

    if ctx.config.report_leaks_on_unload {
        for info in ctx.registry.snapshot() {
            tracing::warn!(
                handle = info.handle.0,
                kind = ?info.kind,
                created_by = info.created_by,
                "handle outstanding at unload"
            );
        }
    }
    tracing::info!("bridge unloaded");
    Some(ctx)
}

/// The process-wide context.
pub fn current() -> Result<Arc<BridgeContext>, BridgeError> {
    CONTEXT.read().clone().ok_or(BridgeError::NotLoaded)
}

/// Load the bridge.
///
/// Validates and caches the host function tables, then publishes the bridge
/// context. The engine must have registered its wallet manager beforehand.
///
/// # Parameters
///
/// - `runtime`: Runtime function table (required)
/// - `observer`: Observer function table (required)
/// - `exchange`: Exchange function table (NULL disables device upcalls)
/// - `config_json`: JSON configuration (NULL for defaults)
/// - `error`: Out-parameter for error information
///
/// # Returns
///
/// 1 on success, 0 on failure.
///
/// # Safety
///
/// - `runtime` and `observer` must be valid pointers; `exchange` valid or NULL
/// - `config_json` must be a valid null-terminated UTF-8 string or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wb_on_load(
    runtime: *const WbRuntimeVTable,
    observer: *const WbObserverVTable,
    exchange: *const WbExchangeVTable,
    config_json: *const c_char,
    error: *mut WbError,
) -> i32 {
    let result = (|| {
        let runtime = unsafe { runtime.as_ref() }.ok_or(BridgeError::NullPointer("runtime"))?;
        let observer = unsafe { observer.as_ref() }.ok_or(BridgeError::NullPointer("observer"))?;
        let config_json = unsafe { cstr_to_option_string(config_json, "config_json") }?;
        let config = BridgeConfig::from_json(config_json.as_deref())?;

        if let Some(level) = &config.log_level {
            crate::logging::init_logging(level)?;
        }

        let manager = registered_wallet_manager().ok_or(BridgeError::EngineUnavailable)?;
        let mut builder = BridgeContext::builder(
            Arc::new(HostRuntime::from_vtable(runtime)?),
            Arc::new(HostObserverMethods::from_vtable(observer)?),
            manager,
        )
        .config(config);
        if let Some(exchange) = unsafe { exchange.as_ref() } {
            builder = builder.exchange_methods(Arc::new(HostExchangeMethods::from_vtable(exchange)?));
        }
        load(builder.build())
    })();

    match result {
        Ok(()) => {
            unsafe { set_ok(error) };
            1
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Unload the bridge.
///
/// Releases the cached host tables. Safe to call when not loaded.
#[unsafe(no_mangle)]
pub extern "C" fn wb_on_unload() {
    unload();
}
