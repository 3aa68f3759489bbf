use std::{ffi::c_void, ptr::NonNull};

use super::InlineHookResult;
use super::disasm::{Disasm, create_jump_bytes, jump_size};
use super::errors::{DisasmError, InlineHookError};
use crate::os::windows::winapi::{
    flush_instructions_cache, virtual_alloc_rwx, virtual_free, virtual_query,
};

/// Bytes reserved per trampoline. Relocation can grow short branches,
/// so this is far above the stolen length plus a jump back.
const TRAMPOLINE_CAPACITY: usize = 0x100;

/// Longest x86 instruction is 15 bytes
const MAX_INSTRUCTION_LEN: usize = 15;

/// Frees a fresh allocation unless released
struct AllocGuard {
    ptr: *mut c_void,
    should_free: bool,
}

impl AllocGuard {
    fn new(ptr: *mut c_void) -> Self {
        Self {
            ptr,
            should_free: true,
        }
    }

    fn release(mut self) -> *mut c_void {
        self.should_free = false;
        self.ptr
    }
}

impl Drop for AllocGuard {
    fn drop(&mut self) {
        if self.should_free
            && let Err(err) = unsafe { virtual_free(self.ptr) }
        {
            log::error!("Failed to free trampoline allocation {:p}: {}", self.ptr, err);
        }
    }
}

/// Allocates RWX memory within rel32 reach of `target` when possible.
/// Falls back to any address, relocation then decides whether that works.
fn allocate_near(target: usize, size: usize) -> InlineHookResult<*mut c_void> {
    #[cfg(target_arch = "x86_64")]
    {
        // Allocation granularity on Windows
        const ALIGNMENT: usize = 0x10000;
        const MAX_DISTANCE: usize = 0x4000_0000;

        let mut distance = ALIGNMENT;

        while distance <= MAX_DISTANCE {
            let candidates = [target.checked_sub(distance), target.checked_add(distance)];

            for address in candidates.into_iter().flatten() {
                let aligned = address & !(ALIGNMENT - 1);

                match unsafe { virtual_alloc_rwx(Some(aligned as *const c_void), size) } {
                    Ok(ptr) => {
                        log::trace!("Trampoline allocated at {:p} for target {:#X}", ptr, target);
                        return Ok(ptr);
                    }
                    Err(err) => {
                        log::trace!("No trampoline at {:#X}: {}", aligned, err);
                    }
                }
            }

            distance *= 2;
        }
    }

    log::debug!("Falling back to any address for trampoline of {:#X}", target);

    Ok(unsafe { virtual_alloc_rwx(None, size) }?)
}

/// Executable copy of the target's first instructions, followed by a
/// jump back into the rest of the target.
pub(super) struct Trampoline {
    ptr: *mut c_void,
    disasm: Disasm,
}

// Safety: owns its allocation, never mutated after construction
unsafe impl Send for Trampoline {}
unsafe impl Sync for Trampoline {}

impl Trampoline {
    pub(super) fn new(target: NonNull<c_void>, detour: *const c_void) -> InlineHookResult<Self> {
        let target_addr = target.as_ptr() as usize;

        let region = virtual_query(target.as_ptr())?;
        if !region.is_committed() || !region.is_executable() {
            return Err(InlineHookError::NonExecutableMemory(target_addr));
        }

        let needed = jump_size(target_addr, detour as usize);
        let window = (needed + MAX_INSTRUCTION_LEN).min(region.remaining_from(target.as_ptr()));

        if window < needed {
            return Err(InlineHookError::FunctionTooSmall {
                needed,
                available: window,
            });
        }

        // Safety: the region was queried as committed for `window` bytes
        let code = unsafe { std::slice::from_raw_parts(target.as_ptr() as *const u8, window) };
        let disasm = Disasm::decode(code, target_addr as u64, needed)?;

        let ptr = allocate_near(target_addr, TRAMPOLINE_CAPACITY)?;
        let alloc_guard = AllocGuard::new(ptr);

        let relocated = disasm.relocate(ptr as u64)?;

        let jump_back_at = ptr as usize + relocated.len();
        let resume_at = target_addr + disasm.stolen_len();
        let jump_back = create_jump_bytes(jump_back_at, resume_at)?;

        let used = relocated.len() + jump_back.len();
        if used > TRAMPOLINE_CAPACITY {
            return Err(InlineHookError::Disasm(DisasmError::EncodingError(format!(
                "trampoline needs {used} bytes, capacity is {TRAMPOLINE_CAPACITY}"
            ))));
        }

        // Safety: `ptr` is a fresh RWX allocation of TRAMPOLINE_CAPACITY bytes
        unsafe {
            let base = ptr as *mut u8;
            std::ptr::copy_nonoverlapping(relocated.as_ptr(), base, relocated.len());
            std::ptr::copy_nonoverlapping(
                jump_back.as_ptr(),
                base.add(relocated.len()),
                jump_back.len(),
            );
            // int3 on the unused tail
            std::ptr::write_bytes(base.add(used), 0xCC, TRAMPOLINE_CAPACITY - used);
        }

        flush_instructions_cache(ptr, TRAMPOLINE_CAPACITY)?;

        log::debug!(
            "Trampoline for {:#X} at {:p}: {} stolen bytes, resumes at {:#X}",
            target_addr,
            ptr,
            disasm.stolen_len(),
            resume_at
        );

        Ok(Self {
            ptr: alloc_guard.release(),
            disasm,
        })
    }

    pub(super) fn as_ptr(&self) -> *mut c_void {
        self.ptr
    }

    pub(super) fn stolen_bytes(&self) -> &[u8] {
        self.disasm.stolen_bytes()
    }
}

impl Drop for Trampoline {
    fn drop(&mut self) {
        if let Err(err) = unsafe { virtual_free(self.ptr) } {
            log::error!("Failed to free trampoline {:p}: {}", self.ptr, err);
        }
    }
}
