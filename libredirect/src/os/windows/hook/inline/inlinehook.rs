use core::fmt;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use windows::Win32::System::Memory::PAGE_EXECUTE_READWRITE;

use super::InlineHookResult;
use super::disasm::{create_jump_bytes, verify_jump_bytes};
use super::errors::InlineHookError;
use super::trampoline::Trampoline;
use crate::ffi::fnptr::FnPtr;
use crate::hook::traits::Hook;
use crate::os::windows::winapi::{flush_instructions_cache, with_virtual_protect};

const NOP: u8 = 0x90;

pub struct InlineHook<F: Copy + 'static> {
    name: String,
    target_ptr: NonNull<c_void>,

    detour_fn: FnPtr<F>,
    original_fn: FnPtr<F>,

    trampoline: Trampoline,

    enabled: AtomicBool,
    guard: RwLock<()>,
}

// Safety: state changes go through the RwLock guard and atomics
unsafe impl<F: Copy + 'static> Send for InlineHook<F> {}
unsafe impl<F: Copy + 'static> Sync for InlineHook<F> {}

impl<F: Copy + 'static> InlineHook<F> {
    /// Prepares a hook for `target_ptr`. Target code is not touched until [`InlineHook::enable`].
    ///
    /// # Safety
    /// `target_ptr` must be the entry of a function with signature `F`
    pub unsafe fn new(
        name: impl Into<String>,
        target_ptr: *mut c_void,
        detour: F,
    ) -> InlineHookResult<Self> {
        let name = name.into();
        let target_ptr = NonNull::new(target_ptr).ok_or(InlineHookError::TargetIsNull)?;
        let detour_fn = FnPtr::from_fn(detour)?;

        log::debug!(
            "[{}] Preparing inline hook: target={:p} detour={:p}",
            name,
            target_ptr,
            detour_fn.as_raw_ptr()
        );

        let trampoline = Trampoline::new(target_ptr, detour_fn.as_raw_ptr())?;

        // Safety: the trampoline replays the target, so it shares its signature
        let original_fn = unsafe { FnPtr::from_raw(trampoline.as_ptr()) }?;

        Ok(Self {
            name,
            target_ptr,
            detour_fn,
            original_fn,
            trampoline,
            enabled: AtomicBool::new(false),
            guard: RwLock::new(()),
        })
    }

    /// Writes the jump to the detour over the target's first instructions
    pub fn enable(&self) -> InlineHookResult<()> {
        let _guard = self.guard.write();

        if self.is_enabled() {
            return Err(InlineHookError::AlreadyEnabled);
        }

        let target = self.target_ptr.as_ptr() as usize;
        let detour = self.detour_fn.as_raw_ptr() as usize;

        let mut patch = create_jump_bytes(target, detour)?;
        verify_jump_bytes(&patch, target, detour)?;

        // Keep whole instructions: pad the tail of the last stolen one
        patch.resize(self.trampoline.stolen_bytes().len(), NOP);

        self.write_target(&patch)?;
        self.enabled.store(true, Ordering::Release);

        log::debug!("[{}] Inline hook enabled at {:#X}", self.name, target);
        Ok(())
    }

    /// Puts the stolen bytes back
    pub fn disable(&self) -> InlineHookResult<()> {
        let _guard = self.guard.write();

        if !self.is_enabled() {
            return Err(InlineHookError::NotEnabled);
        }

        self.write_target(self.trampoline.stolen_bytes())?;
        self.enabled.store(false, Ordering::Release);

        log::debug!("[{}] Inline hook disabled", self.name);
        Ok(())
    }

    /// Callable copy of the unmodified target
    pub fn original(&self) -> F {
        let _guard = self.guard.read();

        // Safety: original_fn was built from a trampoline of type F
        unsafe { self.original_fn.as_fn() }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn write_target(&self, bytes: &[u8]) -> InlineHookResult<()> {
        let target = self.target_ptr.as_ptr();

        unsafe {
            with_virtual_protect(target, PAGE_EXECUTE_READWRITE, bytes.len(), || {
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), target as *mut u8, bytes.len());
            })
        }?;

        std::sync::atomic::fence(Ordering::SeqCst);
        flush_instructions_cache(target, bytes.len())?;

        Ok(())
    }
}

impl<F: Copy + 'static> Drop for InlineHook<F> {
    fn drop(&mut self) {
        if !self.is_enabled() {
            return;
        }

        match self.disable() {
            Ok(_) => log::debug!("[{}] Original bytes restored in Drop", self.name),
            Err(err) => log::error!("[{}] Failed to restore original bytes: {}", self.name, err),
        }
    }
}

impl<F: Copy + 'static> fmt::Debug for InlineHook<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineHook")
            .field("name", &self.name)
            .field("target_ptr", &self.target_ptr)
            .field("detour_fn", &self.detour_fn.as_raw_ptr())
            .field("original_fn", &self.original_fn.as_raw_ptr())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl<F: Copy + 'static> Hook<F> for InlineHook<F> {
    type Error = InlineHookError;

    fn enable(&self) -> Result<(), Self::Error> {
        InlineHook::enable(self)
    }

    fn disable(&self) -> Result<(), Self::Error> {
        InlineHook::disable(self)
    }

    fn is_enabled(&self) -> bool {
        InlineHook::is_enabled(self)
    }

    fn name(&self) -> &str {
        self.name.as_str()
    }

    unsafe fn original(&self) -> Result<F, Self::Error> {
        Ok(InlineHook::original(self))
    }
}
