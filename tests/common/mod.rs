//! C-level host and engine doubles for the integration tests.
//!
//! The host side is a set of `extern "C"` functions behind the bridge's
//! function tables, sharing one [`HostState`] reached through `vm`/`env` and
//! `user_data`. Global references are plain integers; a callback that receives
//! one that is not live, or that runs on an unattached thread, counts as a
//! stale use.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::cell::Cell;
use std::collections::HashSet;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use std::thread::JoinHandle;
use walletbridge::{
    BridgeError, NetworkType, PendingTransaction, TransactionHistory, TransactionInfo,
    TransactionRequest, WB_ENV_DETACHED, WB_ENV_EVERSION, WB_ENV_OK, Wallet, WalletKeys,
    WalletListener, WalletManager, WalletStatus, WbExchangeVTable, WbObserverVTable,
    WbRuntimeVTable,
};

pub const SUPPORTED_VERSION: u32 = 0x0001_0006;

thread_local! {
    static ATTACHED: Cell<bool> = const { Cell::new(false) };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Updated,
    Refreshed,
    MoneySpent(String, u64),
    MoneyReceived(String, u64),
    Unconfirmed(String, u64),
    NewBlock(u64),
}

#[derive(Default)]
pub struct HostState {
    attaches: AtomicUsize,
    detaches: AtomicUsize,
    next_ref: AtomicUsize,
    globals: Mutex<HashSet<usize>>,
    deleted: AtomicUsize,
    events: Mutex<Vec<Event>>,
    stale: AtomicUsize,
    callback_delay_ms: AtomicU64,
    device_present: AtomicBool,
    device_name: Mutex<Option<CString>>,
    outstanding_buffers: AtomicUsize,
}

impl HostState {
    pub fn new() -> Arc<Self> {
        let state = Self::default();
        state.next_ref.store(1, Ordering::SeqCst);
        state.device_present.store(true, Ordering::SeqCst);
        Arc::new(state)
    }

    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn detach_count(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }

    pub fn live_globals(&self) -> usize {
        self.globals.lock().len()
    }

    pub fn deleted_globals(&self) -> usize {
        self.deleted.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn stale_uses(&self) -> usize {
        self.stale.load(Ordering::SeqCst)
    }

    /// Make every observer callback sleep for `ms` before returning.
    pub fn set_callback_delay(&self, ms: u64) {
        self.callback_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn set_device_present(&self, present: bool) {
        self.device_present.store(present, Ordering::SeqCst);
    }

    pub fn set_device_name(&self, name: Option<&str>) {
        *self.device_name.lock() = name.map(|n| CString::new(n).unwrap());
    }

    pub fn outstanding_buffers(&self) -> usize {
        self.outstanding_buffers.load(Ordering::SeqCst)
    }

    /// A local reference the host would pass as an observer argument.
    pub fn local_observer(&self) -> *mut c_void {
        self.next_ref.fetch_add(1, Ordering::SeqCst) as *mut c_void
    }

    fn record(&self, observer: *mut c_void, event: Event) {
        let live = self.globals.lock().contains(&(observer as usize));
        if !live || !ATTACHED.with(Cell::get) {
            self.stale.fetch_add(1, Ordering::SeqCst);
        }
        let delay = self.callback_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        self.events.lock().push(event);
    }
}

/// Mark the calling thread as a host thread, attached outside the bridge.
pub fn attach_host_thread() {
    ATTACHED.with(|a| a.set(true));
}

unsafe fn state<'a>(ptr: *mut c_void) -> &'a HostState {
    unsafe { &*(ptr as *const HostState) }
}

unsafe extern "C" fn get_env(vm: *mut c_void, version: u32, env_out: *mut *mut c_void) -> i32 {
    if version > SUPPORTED_VERSION {
        return WB_ENV_EVERSION;
    }
    if ATTACHED.with(Cell::get) {
        unsafe { *env_out = vm };
        WB_ENV_OK
    } else {
        WB_ENV_DETACHED
    }
}

unsafe extern "C" fn attach_current_thread(vm: *mut c_void, env_out: *mut *mut c_void) -> i32 {
    assert!(!ATTACHED.with(Cell::get), "thread attached twice");
    ATTACHED.with(|a| a.set(true));
    unsafe { state(vm) }.attaches.fetch_add(1, Ordering::SeqCst);
    unsafe { *env_out = vm };
    0
}

unsafe extern "C" fn detach_current_thread(vm: *mut c_void) -> i32 {
    ATTACHED.with(|a| a.set(false));
    unsafe { state(vm) }.detaches.fetch_add(1, Ordering::SeqCst);
    0
}

unsafe extern "C" fn exception_check(_env: *mut c_void) -> bool {
    false
}

unsafe extern "C" fn exception_noop(_env: *mut c_void) {}

unsafe extern "C" fn new_global_ref(env: *mut c_void, _obj: *mut c_void) -> *mut c_void {
    let host = unsafe { state(env) };
    let id = host.next_ref.fetch_add(1, Ordering::SeqCst);
    host.globals.lock().insert(id);
    id as *mut c_void
}

unsafe extern "C" fn delete_global_ref(env: *mut c_void, obj: *mut c_void) {
    let host = unsafe { state(env) };
    assert!(host.globals.lock().remove(&(obj as usize)), "global deleted twice");
    host.deleted.fetch_add(1, Ordering::SeqCst);
}

unsafe fn tx(tx_id: *const c_char) -> String {
    unsafe { CStr::from_ptr(tx_id) }.to_string_lossy().into_owned()
}

unsafe extern "C" fn on_updated(_env: *mut c_void, observer: *mut c_void, user_data: *mut c_void) {
    unsafe { state(user_data) }.record(observer, Event::Updated);
}

unsafe extern "C" fn on_refreshed(_env: *mut c_void, observer: *mut c_void, user_data: *mut c_void) {
    unsafe { state(user_data) }.record(observer, Event::Refreshed);
}

unsafe extern "C" fn on_money_spent(
    _env: *mut c_void,
    observer: *mut c_void,
    tx_id: *const c_char,
    amount: u64,
    user_data: *mut c_void,
) {
    let event = Event::MoneySpent(unsafe { tx(tx_id) }, amount);
    unsafe { state(user_data) }.record(observer, event);
}

unsafe extern "C" fn on_money_received(
    _env: *mut c_void,
    observer: *mut c_void,
    tx_id: *const c_char,
    amount: u64,
    user_data: *mut c_void,
) {
    let event = Event::MoneyReceived(unsafe { tx(tx_id) }, amount);
    unsafe { state(user_data) }.record(observer, event);
}

unsafe extern "C" fn on_unconfirmed(
    _env: *mut c_void,
    observer: *mut c_void,
    tx_id: *const c_char,
    amount: u64,
    user_data: *mut c_void,
) {
    let event = Event::Unconfirmed(unsafe { tx(tx_id) }, amount);
    unsafe { state(user_data) }.record(observer, event);
}

unsafe extern "C" fn on_new_block(
    _env: *mut c_void,
    observer: *mut c_void,
    height: u64,
    user_data: *mut c_void,
) {
    unsafe { state(user_data) }.record(observer, Event::NewBlock(height));
}

/// Answers with the request reversed, in a host-owned buffer.
unsafe extern "C" fn exchange(
    _env: *mut c_void,
    request: *const u8,
    request_len: libc::size_t,
    response_out: *mut *mut u8,
    response_len_out: *mut libc::size_t,
    user_data: *mut c_void,
) -> bool {
    let host = unsafe { state(user_data) };
    if !ATTACHED.with(Cell::get) {
        host.stale.fetch_add(1, Ordering::SeqCst);
    }
    if !host.device_present.load(Ordering::SeqCst) {
        return false;
    }
    let mut reply = unsafe { std::slice::from_raw_parts(request, request_len) }.to_vec();
    reply.reverse();
    let reply = reply.into_boxed_slice();
    unsafe { *response_len_out = reply.len() };
    unsafe { *response_out = Box::into_raw(reply).cast::<u8>() };
    host.outstanding_buffers.fetch_add(1, Ordering::SeqCst);
    true
}

unsafe extern "C" fn device_name(
    _env: *mut c_void,
    name_out: *mut *mut c_char,
    user_data: *mut c_void,
) -> bool {
    let host = unsafe { state(user_data) };
    match host.device_name.lock().clone() {
        Some(name) => {
            unsafe { *name_out = name.into_raw() };
            host.outstanding_buffers.fetch_add(1, Ordering::SeqCst);
            true
        }
        None => false,
    }
}

/// Buffers are only counted; the few bytes handed out are leaked.
unsafe extern "C" fn release_buffer(_env: *mut c_void, _buffer: *mut c_void, user_data: *mut c_void) {
    unsafe { state(user_data) }
        .outstanding_buffers
        .fetch_sub(1, Ordering::SeqCst);
}

pub struct HostTables {
    pub runtime: WbRuntimeVTable,
    pub observer: WbObserverVTable,
    pub exchange: WbExchangeVTable,
}

/// Function tables wired to `host`. `host` must outlive the loaded bridge.
pub fn host_tables(host: &Arc<HostState>) -> HostTables {
    let ptr = Arc::as_ptr(host) as *mut c_void;
    HostTables {
        runtime: WbRuntimeVTable {
            vm: ptr,
            get_env: Some(get_env),
            attach_current_thread: Some(attach_current_thread),
            detach_current_thread: Some(detach_current_thread),
            exception_check: Some(exception_check),
            exception_describe: Some(exception_noop),
            exception_clear: Some(exception_noop),
            new_global_ref: Some(new_global_ref),
            delete_global_ref: Some(delete_global_ref),
        },
        observer: WbObserverVTable {
            updated: Some(on_updated),
            money_spent: Some(on_money_spent),
            money_received: Some(on_money_received),
            unconfirmed_money_received: Some(on_unconfirmed),
            new_block: Some(on_new_block),
            refreshed: Some(on_refreshed),
            user_data: ptr,
        },
        exchange: WbExchangeVTable {
            exchange: Some(exchange),
            device_name: Some(device_name),
            release_buffer: Some(release_buffer),
            user_data: ptr,
        },
    }
}

struct NoHistory;

impl TransactionHistory for NoHistory {
    fn count(&self) -> usize {
        0
    }

    fn transaction(&self, _index: usize) -> Option<TransactionInfo> {
        None
    }

    fn all(&self) -> Vec<TransactionInfo> {
        Vec::new()
    }

    fn refresh(&self) {}
}

/// Listener slot shared with the wallet's refresh threads. `emit` clones the
/// listener out before calling it, so a replaced listener may still be called
/// once.
#[derive(Default)]
struct Sink {
    listener: Mutex<Option<Arc<dyn WalletListener>>>,
    closed: AtomicBool,
}

impl Sink {
    fn emit<F: FnOnce(&dyn WalletListener)>(&self, f: F) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let listener = self.listener.lock().clone();
        match listener {
            Some(l) => {
                f(l.as_ref());
                true
            }
            None => false,
        }
    }
}

struct Refresher {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Minimal engine wallet with a background refresh thread that reports one
/// new block per millisecond.
#[derive(Default)]
pub struct TestWallet {
    sink: Arc<Sink>,
    height: Arc<AtomicU64>,
    refresher: Mutex<Option<Refresher>>,
    async_jobs: Mutex<Vec<JoinHandle<()>>>,
}

impl TestWallet {
    pub fn emit<F: FnOnce(&dyn WalletListener)>(&self, f: F) -> bool {
        self.sink.emit(f)
    }

    pub fn is_closed(&self) -> bool {
        self.sink.closed.load(Ordering::SeqCst)
    }

    pub fn join_async(&self) {
        let jobs = std::mem::take(&mut *self.async_jobs.lock());
        for job in jobs {
            job.join().unwrap();
        }
    }

    fn stop_refresher(&self) {
        if let Some(r) = self.refresher.lock().take() {
            r.stop.store(true, Ordering::SeqCst);
            r.thread.join().unwrap();
        }
    }
}

impl Wallet for TestWallet {
    fn status(&self) -> WalletStatus {
        WalletStatus::Ok
    }

    fn error_string(&self) -> String {
        String::new()
    }

    fn set_listener(&self, listener: Option<Arc<dyn WalletListener>>) {
        *self.sink.listener.lock() = listener;
    }

    fn address(&self) -> String {
        "9wviTest".into()
    }

    fn balance(&self) -> u64 {
        0
    }

    fn unlocked_balance(&self) -> u64 {
        0
    }

    fn store(&self, _path: &str) -> bool {
        true
    }

    fn refresh(&self) -> bool {
        self.emit(|l| l.refreshed());
        true
    }

    fn start_refresh(&self) {
        let mut refresher = self.refresher.lock();
        if refresher.is_some() || self.is_closed() {
            return;
        }
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let (stop, sink, height) = (stop.clone(), self.sink.clone(), self.height.clone());
            std::thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let h = height.fetch_add(1, Ordering::SeqCst) + 1;
                    sink.emit(|l| l.new_block(h));
                    std::thread::sleep(Duration::from_millis(1));
                }
            })
        };
        *refresher = Some(Refresher { stop, thread });
    }

    fn pause_refresh(&self) {
        self.stop_refresher();
    }

    fn refresh_async(&self) {
        let sink = self.sink.clone();
        let job = std::thread::spawn(move || {
            sink.emit(|l| l.refreshed());
        });
        self.async_jobs.lock().push(job);
    }

    fn history(&self) -> Arc<dyn TransactionHistory> {
        Arc::new(NoHistory)
    }

    fn create_transaction(&self, _request: &TransactionRequest) -> Arc<dyn PendingTransaction> {
        unimplemented!("transactions are covered by unit tests")
    }

    fn dispose_transaction(&self, _tx: Arc<dyn PendingTransaction>) {}
}

#[derive(Default)]
pub struct TestEngine {
    wallets: Mutex<Vec<Arc<TestWallet>>>,
    close_calls: AtomicUsize,
}

impl TestEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn last_wallet(&self) -> Arc<TestWallet> {
        self.wallets.lock().last().cloned().unwrap()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl WalletManager for TestEngine {
    fn create_wallet(
        &self,
        _path: &str,
        _password: &str,
        _language: &str,
        _network: NetworkType,
    ) -> Result<Arc<dyn Wallet>, BridgeError> {
        let wallet = Arc::new(TestWallet::default());
        self.wallets.lock().push(wallet.clone());
        Ok(wallet)
    }

    fn open_wallet(
        &self,
        path: &str,
        password: &str,
        network: NetworkType,
    ) -> Result<Arc<dyn Wallet>, BridgeError> {
        self.create_wallet(path, password, "English", network)
    }

    fn recovery_wallet(
        &self,
        path: &str,
        _mnemonic: &str,
        network: NetworkType,
        _restore_height: u64,
    ) -> Result<Arc<dyn Wallet>, BridgeError> {
        self.create_wallet(path, "", "English", network)
    }

    fn create_wallet_from_keys(
        &self,
        path: &str,
        language: &str,
        network: NetworkType,
        _restore_height: u64,
        _keys: &WalletKeys,
    ) -> Result<Arc<dyn Wallet>, BridgeError> {
        self.create_wallet(path, "", language, network)
    }

    fn wallet_exists(&self, _path: &str) -> bool {
        false
    }

    /// Stops background refresh and marks the wallet closed; later `emit`
    /// calls do nothing.
    fn close_wallet(&self, wallet: &Arc<dyn Wallet>, _store: bool) -> bool {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        let target = Arc::as_ptr(wallet) as *const ();
        let found = self
            .wallets
            .lock()
            .iter()
            .find(|w| Arc::as_ptr(w) as *const () == target)
            .cloned();
        if let Some(w) = found {
            w.stop_refresher();
            w.sink.closed.store(true, Ordering::SeqCst);
        }
        true
    }
}
