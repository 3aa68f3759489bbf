//! libredirect
//! Small toolkit for in-process patches: redirecting a function inside a
//! loaded host binary and identifying which build of that binary is running.
//!
//! The platform independent parts (hook capability traits, typed function
//! pointers, executable versions) build everywhere. The inline detour backend
//! and WinAPI wrappers live under `os::windows` and only exist on Windows.

#[cfg(all(windows, not(any(target_arch = "x86_64", target_arch = "x86"))))]
compile_error!("Unsupported architecture - only x86/x64 supported");

pub mod common;
pub mod ffi;
pub mod hook;
pub mod os;
