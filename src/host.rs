//! Host-side capabilities the bridge calls into.
//!
//! The managed runtime is modelled by three traits, resolved once at load time:
//!
//! - [`ManagedRuntime`]: thread attachment, pending-exception handling and
//!   cross-call (global) object references
//! - [`ObserverMethods`]: the wallet observer interface
//! - [`ExchangeMethods`]: the hardware exchange and device-name interface
//!
//! C hosts supply `repr(C)` function tables ([`WbRuntimeVTable`],
//! [`WbObserverVTable`], [`WbExchangeVTable`]); these are validated once and
//! wrapped in types implementing the traits.

use crate::error::BridgeError;
use libc::size_t;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};

/// `get_env` status: the thread is attached and `env_out` is valid.
pub const WB_ENV_OK: i32 = 0;
/// `get_env` status: the thread is not attached.
pub const WB_ENV_DETACHED: i32 = -2;
/// `get_env` status: the requested interface version is unsupported.
pub const WB_ENV_EVERSION: i32 = -3;

/// Per-thread interface handle into the runtime.
///
/// Only valid on the thread that obtained it.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvPtr(pub *mut c_void);

/// Reference to a managed object.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectRef(pub *mut c_void);

// Global references are valid on every attached thread.
unsafe impl Send for ObjectRef {}
unsafe impl Sync for ObjectRef {}

impl ObjectRef {
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

/// Result of asking the runtime for the calling thread's interface handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvStatus {
    Attached(EnvPtr),
    Detached,
    VersionUnsupported,
}

/// Thread attachment and reference primitives of the managed runtime.
pub trait ManagedRuntime: Send + Sync {
    fn get_env(&self, version: u32) -> EnvStatus;
    fn attach_current_thread(&self) -> Option<EnvPtr>;
    fn detach_current_thread(&self);
    fn exception_check(&self, env: EnvPtr) -> bool;
    fn exception_describe(&self, env: EnvPtr);
    fn exception_clear(&self, env: EnvPtr);
    /// Promote `obj` to a reference that survives the current call.
    fn new_global_ref(&self, env: EnvPtr, obj: ObjectRef) -> Option<ObjectRef>;
    fn delete_global_ref(&self, env: EnvPtr, obj: ObjectRef);
}

/// Wallet observer interface implemented by the managed side.
pub trait ObserverMethods: Send + Sync {
    fn updated(&self, env: EnvPtr, observer: ObjectRef);
    fn money_spent(&self, env: EnvPtr, observer: ObjectRef, tx_id: &str, amount: u64);
    fn money_received(&self, env: EnvPtr, observer: ObjectRef, tx_id: &str, amount: u64);
    fn unconfirmed_money_received(
        &self,
        env: EnvPtr,
        observer: ObjectRef,
        tx_id: &str,
        amount: u64,
    );
    fn new_block(&self, env: EnvPtr, observer: ObjectRef, height: u64);
    fn refreshed(&self, env: EnvPtr, observer: ObjectRef);
}

/// Hardware exchange interface implemented by the managed side.
pub trait ExchangeMethods: Send + Sync {
    /// Send `request` and block until a response arrives. `None` means no
    /// device or transport is available.
    fn exchange(&self, env: EnvPtr, request: &[u8]) -> Option<Vec<u8>>;
    /// Name of the attached device, if any.
    fn device_name(&self, env: EnvPtr) -> Option<String>;
}

/// Runtime function table supplied by a C host.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct WbRuntimeVTable {
    /// Opaque runtime pointer passed back to the thread functions
    pub vm: *mut c_void,
    /// Write the thread's env to `env_out`; return a `WB_ENV_*` status
    pub get_env:
        Option<unsafe extern "C" fn(vm: *mut c_void, version: u32, env_out: *mut *mut c_void) -> i32>,
    /// Attach the calling thread; return 0 on success
    pub attach_current_thread:
        Option<unsafe extern "C" fn(vm: *mut c_void, env_out: *mut *mut c_void) -> i32>,
    /// Detach the calling thread
    pub detach_current_thread: Option<unsafe extern "C" fn(vm: *mut c_void) -> i32>,
    pub exception_check: Option<unsafe extern "C" fn(env: *mut c_void) -> bool>,
    pub exception_describe: Option<unsafe extern "C" fn(env: *mut c_void)>,
    pub exception_clear: Option<unsafe extern "C" fn(env: *mut c_void)>,
    pub new_global_ref: Option<unsafe extern "C" fn(env: *mut c_void, obj: *mut c_void) -> *mut c_void>,
    pub delete_global_ref: Option<unsafe extern "C" fn(env: *mut c_void, obj: *mut c_void)>,
}

/// Observer function table supplied by a C host.
///
/// String arguments are only valid for the duration of the call.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct WbObserverVTable {
    pub updated: Option<unsafe extern "C" fn(env: *mut c_void, observer: *mut c_void, user_data: *mut c_void)>,
    pub money_spent: Option<
        unsafe extern "C" fn(
            env: *mut c_void,
            observer: *mut c_void,
            tx_id: *const c_char,
            amount: u64,
            user_data: *mut c_void,
        ),
    >,
    pub money_received: Option<
        unsafe extern "C" fn(
            env: *mut c_void,
            observer: *mut c_void,
            tx_id: *const c_char,
            amount: u64,
            user_data: *mut c_void,
        ),
    >,
    pub unconfirmed_money_received: Option<
        unsafe extern "C" fn(
            env: *mut c_void,
            observer: *mut c_void,
            tx_id: *const c_char,
            amount: u64,
            user_data: *mut c_void,
        ),
    >,
    pub new_block: Option<
        unsafe extern "C" fn(env: *mut c_void, observer: *mut c_void, height: u64, user_data: *mut c_void),
    >,
    pub refreshed: Option<unsafe extern "C" fn(env: *mut c_void, observer: *mut c_void, user_data: *mut c_void)>,
    pub user_data: *mut c_void,
}

/// Exchange function table supplied by a C host.
///
/// Buffers handed out through `response_out`/`name_out` stay owned by the host
/// and are returned through `release_buffer` once copied.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct WbExchangeVTable {
    /// Return false when no device answered
    pub exchange: Option<
        unsafe extern "C" fn(
            env: *mut c_void,
            request: *const u8,
            request_len: size_t,
            response_out: *mut *mut u8,
            response_len_out: *mut size_t,
            user_data: *mut c_void,
        ) -> bool,
    >,
    /// Return false when no name could be resolved
    pub device_name: Option<
        unsafe extern "C" fn(env: *mut c_void, name_out: *mut *mut c_char, user_data: *mut c_void) -> bool,
    >,
    pub release_buffer:
        Option<unsafe extern "C" fn(env: *mut c_void, buffer: *mut c_void, user_data: *mut c_void)>,
    pub user_data: *mut c_void,
}

type GetEnvFn = unsafe extern "C" fn(*mut c_void, u32, *mut *mut c_void) -> i32;
type AttachFn = unsafe extern "C" fn(*mut c_void, *mut *mut c_void) -> i32;
type DetachFn = unsafe extern "C" fn(*mut c_void) -> i32;
type EnvFn = unsafe extern "C" fn(*mut c_void);
type CheckFn = unsafe extern "C" fn(*mut c_void) -> bool;
type NewRefFn = unsafe extern "C" fn(*mut c_void, *mut c_void) -> *mut c_void;
type DeleteRefFn = unsafe extern "C" fn(*mut c_void, *mut c_void);

/// A validated [`WbRuntimeVTable`].
pub struct HostRuntime {
    vm: *mut c_void,
    get_env: GetEnvFn,
    attach: AttachFn,
    detach: DetachFn,
    exception_check: CheckFn,
    exception_describe: EnvFn,
    exception_clear: EnvFn,
    new_global_ref: NewRefFn,
    delete_global_ref: DeleteRefFn,
}

/// # Safety
///
/// The host guarantees that `vm` and every function in the table may be used
/// from any thread, which is the contract of a process-wide runtime pointer.
unsafe impl Send for HostRuntime {}
unsafe impl Sync for HostRuntime {}

fn required<T>(f: Option<T>, name: &'static str) -> Result<T, BridgeError> {
    f.ok_or(BridgeError::NullPointer(name))
}

impl HostRuntime {
    pub fn from_vtable(v: &WbRuntimeVTable) -> Result<Self, BridgeError> {
        if v.vm.is_null() {
            return Err(BridgeError::NullPointer("runtime.vm"));
        }
        Ok(Self {
            vm: v.vm,
            get_env: required(v.get_env, "runtime.get_env")?,
            attach: required(v.attach_current_thread, "runtime.attach_current_thread")?,
            detach: required(v.detach_current_thread, "runtime.detach_current_thread")?,
            exception_check: required(v.exception_check, "runtime.exception_check")?,
            exception_describe: required(v.exception_describe, "runtime.exception_describe")?,
            exception_clear: required(v.exception_clear, "runtime.exception_clear")?,
            new_global_ref: required(v.new_global_ref, "runtime.new_global_ref")?,
            delete_global_ref: required(v.delete_global_ref, "runtime.delete_global_ref")?,
        })
    }
}

impl ManagedRuntime for HostRuntime {
    fn get_env(&self, version: u32) -> EnvStatus {
        let mut env = std::ptr::null_mut();
        match unsafe { (self.get_env)(self.vm, version, &mut env) } {
            WB_ENV_OK if !env.is_null() => EnvStatus::Attached(EnvPtr(env)),
            WB_ENV_EVERSION => EnvStatus::VersionUnsupported,
            _ => EnvStatus::Detached,
        }
    }

    fn attach_current_thread(&self) -> Option<EnvPtr> {
        let mut env = std::ptr::null_mut();
        let rc = unsafe { (self.attach)(self.vm, &mut env) };
        (rc == 0 && !env.is_null()).then_some(EnvPtr(env))
    }

    fn detach_current_thread(&self) {
        let rc = unsafe { (self.detach)(self.vm) };
        if rc != 0 {
            tracing::warn!(rc, "runtime refused to detach thread");
        }
    }

    fn exception_check(&self, env: EnvPtr) -> bool {
        unsafe { (self.exception_check)(env.0) }
    }

    fn exception_describe(&self, env: EnvPtr) {
        unsafe { (self.exception_describe)(env.0) }
    }

    fn exception_clear(&self, env: EnvPtr) {
        unsafe { (self.exception_clear)(env.0) }
    }

    fn new_global_ref(&self, env: EnvPtr, obj: ObjectRef) -> Option<ObjectRef> {
        let global = unsafe { (self.new_global_ref)(env.0, obj.0) };
        (!global.is_null()).then_some(ObjectRef(global))
    }

    fn delete_global_ref(&self, env: EnvPtr, obj: ObjectRef) {
        unsafe { (self.delete_global_ref)(env.0, obj.0) }
    }
}

type TxEventFn = unsafe extern "C" fn(*mut c_void, *mut c_void, *const c_char, u64, *mut c_void);
type PlainEventFn = unsafe extern "C" fn(*mut c_void, *mut c_void, *mut c_void);
type BlockEventFn = unsafe extern "C" fn(*mut c_void, *mut c_void, u64, *mut c_void);

/// A validated [`WbObserverVTable`].
pub struct HostObserverMethods {
    updated: PlainEventFn,
    money_spent: TxEventFn,
    money_received: TxEventFn,
    unconfirmed_money_received: TxEventFn,
    new_block: BlockEventFn,
    refreshed: PlainEventFn,
    user_data: *mut c_void,
}

/// # Safety
///
/// Observer callbacks are invoked from engine threads; the host guarantees the
/// functions and `user_data` tolerate that.
unsafe impl Send for HostObserverMethods {}
unsafe impl Sync for HostObserverMethods {}

impl HostObserverMethods {
    pub fn from_vtable(v: &WbObserverVTable) -> Result<Self, BridgeError> {
        Ok(Self {
            updated: required(v.updated, "observer.updated")?,
            money_spent: required(v.money_spent, "observer.money_spent")?,
            money_received: required(v.money_received, "observer.money_received")?,
            unconfirmed_money_received: required(
                v.unconfirmed_money_received,
                "observer.unconfirmed_money_received",
            )?,
            new_block: required(v.new_block, "observer.new_block")?,
            refreshed: required(v.refreshed, "observer.refreshed")?,
            user_data: v.user_data,
        })
    }

    /// Events whose transaction id cannot cross as a C string are dropped.
    fn tx_event(&self, f: TxEventFn, env: EnvPtr, observer: ObjectRef, tx_id: &str, amount: u64) {
        let Ok(c_tx_id) = CString::new(tx_id) else {
            tracing::warn!(tx_id, amount, "dropping event: transaction id contains NUL");
            return;
        };
        unsafe { f(env.0, observer.0, c_tx_id.as_ptr(), amount, self.user_data) }
    }
}

impl ObserverMethods for HostObserverMethods {
    fn updated(&self, env: EnvPtr, observer: ObjectRef) {
        unsafe { (self.updated)(env.0, observer.0, self.user_data) }
    }

    fn money_spent(&self, env: EnvPtr, observer: ObjectRef, tx_id: &str, amount: u64) {
        self.tx_event(self.money_spent, env, observer, tx_id, amount)
    }

    fn money_received(&self, env: EnvPtr, observer: ObjectRef, tx_id: &str, amount: u64) {
        self.tx_event(self.money_received, env, observer, tx_id, amount)
    }

    fn unconfirmed_money_received(
        &self,
        env: EnvPtr,
        observer: ObjectRef,
        tx_id: &str,
        amount: u64,
    ) {
        self.tx_event(self.unconfirmed_money_received, env, observer, tx_id, amount)
    }

    fn new_block(&self, env: EnvPtr, observer: ObjectRef, height: u64) {
        unsafe { (self.new_block)(env.0, observer.0, height, self.user_data) }
    }

    fn refreshed(&self, env: EnvPtr, observer: ObjectRef) {
        unsafe { (self.refreshed)(env.0, observer.0, self.user_data) }
    }
}

type ExchangeFn =
    unsafe extern "C" fn(*mut c_void, *const u8, size_t, *mut *mut u8, *mut size_t, *mut c_void) -> bool;
type DeviceNameFn = unsafe extern "C" fn(*mut c_void, *mut *mut c_char, *mut c_void) -> bool;
type ReleaseFn = unsafe extern "C" fn(*mut c_void, *mut c_void, *mut c_void);

/// A validated [`WbExchangeVTable`].
pub struct HostExchangeMethods {
    exchange: ExchangeFn,
    device_name: DeviceNameFn,
    release_buffer: ReleaseFn,
    user_data: *mut c_void,
}

/// # Safety
///
/// Exchanges run on engine threads; the host guarantees the functions and
/// `user_data` tolerate that.
unsafe impl Send for HostExchangeMethods {}
unsafe impl Sync for HostExchangeMethods {}

impl HostExchangeMethods {
    pub fn from_vtable(v: &WbExchangeVTable) -> Result<Self, BridgeError> {
        Ok(Self {
            exchange: required(v.exchange, "exchange.exchange")?,
            device_name: required(v.device_name, "exchange.device_name")?,
            release_buffer: required(v.release_buffer, "exchange.release_buffer")?,
            user_data: v.user_data,
        })
    }
}

impl ExchangeMethods for HostExchangeMethods {
    fn exchange(&self, env: EnvPtr, request: &[u8]) -> Option<Vec<u8>> {
        let mut response: *mut u8 = std::ptr::null_mut();
        let mut response_len: size_t = 0;
        let answered = unsafe {
            (self.exchange)(
                env.0,
                request.as_ptr(),
                request.len(),
                &mut response,
                &mut response_len,
                self.user_data,
            )
        };
        if response.is_null() {
            return (answered && response_len == 0).then(Vec::new);
        }
        let copied = unsafe { std::slice::from_raw_parts(response, response_len) }.to_vec();
        unsafe { (self.release_buffer)(env.0, response.cast(), self.user_data) };
        answered.then_some(copied)
    }

    fn device_name(&self, env: EnvPtr) -> Option<String> {
        let mut name: *mut c_char = std::ptr::null_mut();
        let resolved = unsafe { (self.device_name)(env.0, &mut name, self.user_data) };
        if name.is_null() {
            return None;
        }
        let copied = unsafe { CStr::from_ptr(name) }
            .to_str()
            .ok()
            .map(str::to_owned);
        unsafe { (self.release_buffer)(env.0, name.cast(), self.user_data) };
        if resolved { copied } else { None }
    }
}
