//! Memory pool sizing plugin.
//!
//! Loaded into the host process as a DLL, it redirects the host's
//! `RegisterPoolOptions` so the CPU pool follows installed RAM and the GPU
//! pool follows dedicated video memory. Fractions come from `pool-patch.json`
//! next to the DLL.

#[cfg(windows)]
mod entry;
pub mod logger;
pub mod options;
pub mod patch;
