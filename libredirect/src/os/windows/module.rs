//! Loaded module discovery: base address, file path and the version
//! resource of the executable a plugin lives in.

use std::{
    ffi::{OsString, c_void},
    os::windows::ffi::{OsStrExt, OsStringExt},
    path::{Path, PathBuf},
};

use windows::Win32::Foundation::HMODULE;
use windows::Win32::Storage::FileSystem::{
    GetFileVersionInfoSizeW, GetFileVersionInfoW, VS_FIXEDFILEINFO, VerQueryValueW,
};
use windows::Win32::System::LibraryLoader::{GetModuleFileNameW, GetModuleHandleW};
use windows::core::{PCWSTR, w};

use super::winapi::{WinapiError, WinapiResult};
use crate::common::exe_version::ExeVersion;

/// Base load address of the main executable of the current process
pub fn main_module_base() -> WinapiResult<usize> {
    let hmodule = unsafe { GetModuleHandleW(None) }?;

    if hmodule.is_invalid() {
        return Err(WinapiError::InputNullPtr);
    }

    Ok(hmodule.0 as usize)
}

/// Full path of a loaded module. `None` means the main executable.
pub fn module_file_name(module: Option<*mut c_void>) -> WinapiResult<PathBuf> {
    let hmodule = module.map(HMODULE);
    let mut buffer = vec![0u16; 1024];

    loop {
        let written = unsafe { GetModuleFileNameW(hmodule, &mut buffer) } as usize;

        if written == 0 {
            return Err(WinapiError::WindowsCore(windows::core::Error::from_win32()));
        }

        // Truncated: grow and retry, path limit on Windows is 32767 chars
        if written == buffer.len() {
            if buffer.len() >= 32 * 1024 {
                return Err(WinapiError::ModuleFileName);
            }
            buffer.resize(buffer.len() * 2, 0);
            continue;
        }

        return Ok(PathBuf::from(OsString::from_wide(&buffer[..written])));
    }
}

/// Reads `VS_FIXEDFILEINFO` product version from a PE file on disk
pub fn product_version(path: &Path) -> WinapiResult<ExeVersion> {
    let missing = || WinapiError::VersionResourceMissing(path.display().to_string());

    let wide: Vec<u16> = path.as_os_str().encode_wide().chain(Some(0)).collect();
    let file_name = PCWSTR(wide.as_ptr());

    let size = unsafe { GetFileVersionInfoSizeW(file_name, None) };
    if size == 0 {
        return Err(missing());
    }

    let mut data = vec![0u8; size as usize];
    unsafe { GetFileVersionInfoW(file_name, None, size, data.as_mut_ptr() as *mut c_void) }?;

    let mut info_ptr: *mut c_void = std::ptr::null_mut();
    let mut info_len = 0u32;

    let found = unsafe {
        VerQueryValueW(
            data.as_ptr() as *const c_void,
            w!("\\"),
            &mut info_ptr,
            &mut info_len,
        )
    };

    if !found.as_bool()
        || info_ptr.is_null()
        || (info_len as usize) < std::mem::size_of::<VS_FIXEDFILEINFO>()
    {
        return Err(missing());
    }

    // Safety: pointer and length checked above, it points into `data`
    let info = unsafe { &*(info_ptr as *const VS_FIXEDFILEINFO) };

    Ok(ExeVersion::new(
        info.dwProductVersionMS >> 16,
        info.dwProductVersionMS & 0xFFFF,
        info.dwProductVersionLS >> 16,
        info.dwProductVersionLS & 0xFFFF,
    ))
}
