//! Runtime attachment for native threads.
//!
//! Every callback or upcall that reaches into the runtime holds an
//! [`AttachGuard`] for exactly the duration of that call. Dropping the guard
//! surfaces and clears any pending host exception, then detaches the thread if
//! the guard attached it. Guards are never cached across calls.

use crate::context::BridgeContext;
use crate::error::BridgeError;
use crate::host::{EnvPtr, EnvStatus, ManagedRuntime};
use std::marker::PhantomData;

/// Scoped attachment of the calling thread to the runtime.
#[must_use]
pub struct AttachGuard<'a> {
    runtime: &'a dyn ManagedRuntime,
    env: EnvPtr,
    was_already_attached: bool,
    // The env pointer is only valid on this thread
    _not_send: PhantomData<*const ()>,
}

impl<'a> AttachGuard<'a> {
    /// Obtain an interface handle for the calling thread, attaching it if needed.
    pub fn attach(ctx: &'a BridgeContext) -> Result<Self, BridgeError> {
        let runtime = ctx.runtime()?;
        match runtime.get_env(ctx.config().interface_version) {
            EnvStatus::Attached(env) => Ok(Self {
                runtime,
                env,
                was_already_attached: true,
                _not_send: PhantomData,
            }),
            EnvStatus::Detached => match runtime.attach_current_thread() {
                Some(env) => {
                    tracing::trace!("attached native thread to runtime");
                    Ok(Self {
                        runtime,
                        env,
                        was_already_attached: false,
                        _not_send: PhantomData,
                    })
                }
                None => {
                    tracing::error!("failed to attach native thread to runtime");
                    Err(BridgeError::RuntimeUnavailable("thread attach failed"))
                }
            },
            EnvStatus::VersionUnsupported => {
                tracing::error!(
                    version = ctx.config().interface_version,
                    "runtime interface version not supported"
                );
                Err(BridgeError::RuntimeUnavailable("interface version not supported"))
            }
        }
    }

    pub fn env(&self) -> EnvPtr {
        self.env
    }

    pub fn runtime(&self) -> &'a dyn ManagedRuntime {
        self.runtime
    }

    pub fn was_already_attached(&self) -> bool {
        self.was_already_attached
    }
}

impl Drop for AttachGuard<'_> {
    fn drop(&mut self) {
        if self.runtime.exception_check(self.env) {
            tracing::warn!("runtime call left a pending exception; clearing it");
            self.runtime.exception_describe(self.env);
            self.runtime.exception_clear(self.env);
        }
        if !self.was_already_attached {
            self.runtime.detach_current_thread();
            tracing::trace!("detached native thread from runtime");
        }
    }
}
