//! WinAPI wrapper
//!
//! Thin wrappers over the memory and process calls the inline detour backend needs.

use std::ffi::c_void;

use thiserror::Error;
use windows::Win32::Foundation::{GetLastError, HANDLE};
use windows::Win32::System::Diagnostics::Debug::FlushInstructionCache;
use windows::Win32::System::Memory::{
    MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, MEMORY_BASIC_INFORMATION, PAGE_EXECUTE,
    PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY, PAGE_PROTECTION_FLAGS,
    VirtualAlloc, VirtualFree, VirtualProtect, VirtualQuery,
};
use windows::Win32::System::Threading::GetCurrentProcess;

#[derive(Debug, Error)]
pub enum WinapiError {
    #[error("Windows core API error: {0}")]
    WindowsCore(#[from] windows::core::Error),

    #[error("Input PTR is NULL")]
    InputNullPtr,

    #[error("Size can't be zero")]
    ZeroSize,

    #[error("VirtualQuery failed with error code: {0}")]
    VirtualQuery(u32),

    #[error("Module file name is empty or truncated")]
    ModuleFileName,

    #[error("Version resource is missing in '{0}'")]
    VersionResourceMissing(String),
}

pub type WinapiResult<T> = std::result::Result<T, WinapiError>;

/// Parts of MEMORY_BASIC_INFORMATION we care about
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    pub base_address: *mut c_void,
    pub region_size: usize,
    pub state: u32,
    pub protect: PAGE_PROTECTION_FLAGS,
}

impl MemoryRegion {
    pub fn is_committed(&self) -> bool {
        self.state == MEM_COMMIT.0
    }

    pub fn is_executable(&self) -> bool {
        let exec_mask = PAGE_EXECUTE | PAGE_EXECUTE_READ | PAGE_EXECUTE_READWRITE | PAGE_EXECUTE_WRITECOPY;
        (self.protect.0 & exec_mask.0) != 0
    }

    /// Bytes left in this region starting at `ptr`
    pub fn remaining_from(&self, ptr: *const c_void) -> usize {
        let end = (self.base_address as usize).saturating_add(self.region_size);
        end.saturating_sub(ptr as usize)
    }
}

/// Query memory with VirtualQuery(...)
pub fn virtual_query(ptr: *const c_void) -> WinapiResult<MemoryRegion> {
    if ptr.is_null() {
        return Err(WinapiError::InputNullPtr);
    }

    let mut info = MEMORY_BASIC_INFORMATION::default();
    let info_size = std::mem::size_of::<MEMORY_BASIC_INFORMATION>();

    let result = unsafe { VirtualQuery(Some(ptr), &mut info, info_size) };

    if result == 0 {
        let last_error = unsafe { GetLastError().0 };
        return Err(WinapiError::VirtualQuery(last_error));
    }

    Ok(MemoryRegion {
        base_address: info.BaseAddress,
        region_size: info.RegionSize,
        state: info.State.0,
        protect: info.Protect,
    })
}

/// WinAPI: VirtualProtect(...)
/// Returns previous protection flags.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub fn virtual_protect(
    ptr: *mut c_void,
    protection_flags: PAGE_PROTECTION_FLAGS,
    size: usize,
) -> WinapiResult<PAGE_PROTECTION_FLAGS> {
    if ptr.is_null() {
        return Err(WinapiError::InputNullPtr);
    }

    if size == 0 {
        return Err(WinapiError::ZeroSize);
    }

    let mut old_protect = PAGE_PROTECTION_FLAGS(0);

    unsafe { VirtualProtect(ptr, size, protection_flags, &mut old_protect)? }

    Ok(old_protect)
}

/// Runs `func` while `ptr..ptr+size` carries `protection_flags`,
/// then puts the previous protection back.
///
/// # Safety
/// Same rules as for `VirtualProtect`; `func` must not outlive the range.
pub unsafe fn with_virtual_protect<T, U: FnOnce() -> T>(
    ptr: *mut c_void,
    protection_flags: PAGE_PROTECTION_FLAGS,
    size: usize,
    func: U,
) -> WinapiResult<T> {
    let old_protect = virtual_protect(ptr, protection_flags, size)?;

    let callback_result = func();

    virtual_protect(ptr, old_protect, size)?;

    Ok(callback_result)
}

/// Allocates committed RWX memory, optionally at a preferred address.
///
/// # Safety
/// Same rules as for `VirtualAlloc`
pub unsafe fn virtual_alloc_rwx(address: Option<*const c_void>, size: usize) -> WinapiResult<*mut c_void> {
    if size == 0 {
        return Err(WinapiError::ZeroSize);
    }

    let result = unsafe { VirtualAlloc(address, size, MEM_COMMIT | MEM_RESERVE, PAGE_EXECUTE_READWRITE) };

    if result.is_null() {
        return Err(WinapiError::WindowsCore(windows::core::Error::from_win32()));
    }

    Ok(result)
}

/// Releases memory obtained from [`virtual_alloc_rwx`]
///
/// # Safety
/// `address` must be the base returned by `VirtualAlloc` and not used afterwards
pub unsafe fn virtual_free(address: *mut c_void) -> WinapiResult<()> {
    if address.is_null() {
        return Err(WinapiError::InputNullPtr);
    }

    // dwSize must be 0 with MEM_RELEASE
    unsafe { VirtualFree(address, 0, MEM_RELEASE) }?;

    Ok(())
}

/// WinAPI: FlushInstructionCache(...)
pub fn flush_instructions_cache(base: *const c_void, size: usize) -> WinapiResult<()> {
    if base.is_null() {
        return Err(WinapiError::InputNullPtr);
    }

    let process: HANDLE = unsafe { GetCurrentProcess() };

    unsafe { FlushInstructionCache(process, Some(base), size)? };

    Ok(())
}
