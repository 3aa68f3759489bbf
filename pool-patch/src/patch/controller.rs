//! One shot redirect installation.
//!
//! A controller accepts exactly one install attempt per process. Whatever the
//! outcome, later attempts are refused without resolving or touching memory
//! again, and a successful install keeps its hook alive until process exit.

use std::{
    any::Any,
    ffi::c_void,
    marker::PhantomData,
    sync::{
        OnceLock,
        atomic::{AtomicBool, Ordering},
    },
};

use libredirect::hook::traits::{Hook, Interceptor};

use super::{
    errors::{PatchError, PatchResult},
    resolver::{AddressResolver, HostBinaryHandle},
};

struct HookHolder<H, F> {
    hook: H,
    _fn: PhantomData<fn() -> F>,
}

trait InstalledHook: Send + Sync {
    fn enable_hook(&self) -> Result<(), String>;
    fn as_any(&self) -> &dyn Any;
}

impl<F: Copy + 'static, H: Hook<F> + 'static> InstalledHook for HookHolder<H, F> {
    fn enable_hook(&self) -> Result<(), String> {
        self.hook.enable().map_err(|err| err.to_string())
    }

    fn as_any(&self) -> &dyn Any {
        &self.hook
    }
}

struct Installed<F> {
    original: F,
    hook: Box<dyn InstalledHook>,
}

pub struct InterceptionController<F> {
    name: &'static str,
    attempted: AtomicBool,
    live: AtomicBool,
    installed: OnceLock<Installed<F>>,
}

impl<F: Copy + Send + Sync + 'static> InterceptionController<F> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            attempted: AtomicBool::new(false),
            live: AtomicBool::new(false),
            installed: OnceLock::new(),
        }
    }

    /// Resolves the target for `host` and redirects it to `detour`.
    ///
    /// The original entry point is published before the redirect goes live, so
    /// the detour can always reach it through [`Self::original`]. If enabling
    /// fails the controller goes back to reporting nothing installed.
    ///
    /// # Safety
    /// Every address `resolver` can produce for `host` must be the entry point
    /// of a function with signature `F`.
    pub unsafe fn install<I: Interceptor<F>>(
        &self,
        interceptor: &I,
        host: &HostBinaryHandle,
        resolver: &AddressResolver,
        detour: F,
    ) -> PatchResult<()> {
        if self.attempted.swap(true, Ordering::AcqRel) {
            log::warn!("{}: install already attempted, ignoring", self.name);
            return Err(PatchError::AlreadyAttempted);
        }

        let Some(address) = resolver.resolve(host) else {
            log::warn!(
                "{}: no known address for host version {}",
                self.name,
                host.version()
            );
            return Err(PatchError::UnsupportedVersion(host.version()));
        };

        log::debug!("{}: target resolved to {:#X}", self.name, address);

        let hook = unsafe { interceptor.intercept(self.name, address as *mut c_void, detour) }
            .map_err(|err| PatchError::Redirect(err.to_string()))?;

        let original = unsafe { hook.original() }.map_err(|err| PatchError::Redirect(err.to_string()))?;

        let installed = self.installed.get_or_init(|| Installed {
            original,
            hook: Box::new(HookHolder {
                hook,
                _fn: PhantomData,
            }),
        });

        self.live.store(true, Ordering::Release);

        if let Err(err) = installed.hook.enable_hook() {
            self.live.store(false, Ordering::Release);
            return Err(PatchError::Redirect(err));
        }

        log::info!("{}: redirect enabled at {:#X}", self.name, address);

        Ok(())
    }

    fn live_installation(&self) -> Option<&Installed<F>> {
        if self.live.load(Ordering::Acquire) {
            self.installed.get()
        } else {
            None
        }
    }

    /// Entry point of the unmodified target, once a redirect is in place
    pub fn original(&self) -> Option<F> {
        self.live_installation().map(|installed| installed.original)
    }

    pub fn is_installed(&self) -> bool {
        self.live_installation().is_some()
    }

    pub fn is_attempted(&self) -> bool {
        self.attempted.load(Ordering::Acquire)
    }

    /// Concrete hook behind the redirect, mostly useful for inspection
    pub fn hook<H: 'static>(&self) -> Option<&H> {
        self.live_installation()
            .and_then(|installed| installed.hook.as_any().downcast_ref::<H>())
    }
}
