//! Hardware capacity probes.
//!
//! Both probes return 0 when the machine can't be queried. Callers treat 0 as
//! "unknown", never as "nothing installed". Nothing is cached: every call
//! queries again, so a driver that wasn't ready yet gets another chance.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[cfg(windows)]
    #[error("Windows API error: {0}")]
    Windows(#[from] windows::core::Error),

    #[error("No hardware graphics device could be created")]
    NoDevice,

    #[error("Physical memory query is not available on this platform")]
    Unsupported,
}

pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

pub trait ResourceProbe {
    /// Installed physical RAM in bytes, 0 if unknown
    fn cpu_memory_bytes(&self) -> u64;

    /// Dedicated video memory of the default hardware adapter in bytes, 0 if unknown
    fn gpu_memory_bytes(&self) -> u64;
}

impl<P: ResourceProbe + ?Sized> ResourceProbe for &P {
    fn cpu_memory_bytes(&self) -> u64 {
        (**self).cpu_memory_bytes()
    }

    fn gpu_memory_bytes(&self) -> u64 {
        (**self).gpu_memory_bytes()
    }
}

/// Probes the machine the process runs on
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl ResourceProbe for SystemProbe {
    fn cpu_memory_bytes(&self) -> u64 {
        physical_memory().unwrap_or_else(|err| {
            log::debug!("Physical memory query failed: {}", err);
            0
        })
    }

    fn gpu_memory_bytes(&self) -> u64 {
        dedicated_video_memory().unwrap_or_else(|err| {
            log::debug!("Video memory query failed: {}", err);
            0
        })
    }
}

#[cfg(windows)]
fn physical_memory() -> ProbeResult<u64> {
    use windows::Win32::System::SystemInformation::{GlobalMemoryStatusEx, MEMORYSTATUSEX};

    let mut status = MEMORYSTATUSEX {
        dwLength: std::mem::size_of::<MEMORYSTATUSEX>() as u32,
        ..Default::default()
    };

    unsafe { GlobalMemoryStatusEx(&mut status) }?;

    Ok(status.ullTotalPhys)
}

#[cfg(unix)]
fn physical_memory() -> ProbeResult<u64> {
    let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

    if pages <= 0 || page_size <= 0 {
        return Err(ProbeError::Unsupported);
    }

    Ok((pages as u64).saturating_mul(page_size as u64))
}

#[cfg(not(any(windows, unix)))]
fn physical_memory() -> ProbeResult<u64> {
    Err(ProbeError::Unsupported)
}

/// Creates a throwaway D3D11 device on the default hardware adapter and
/// reads the adapter description through DXGI.
#[cfg(windows)]
fn dedicated_video_memory() -> ProbeResult<u64> {
    use windows::Win32::Foundation::HMODULE;
    use windows::Win32::Graphics::Direct3D::{
        D3D_DRIVER_TYPE_HARDWARE, D3D_FEATURE_LEVEL, D3D_FEATURE_LEVEL_10_0,
        D3D_FEATURE_LEVEL_10_1, D3D_FEATURE_LEVEL_11_0,
    };
    use windows::Win32::Graphics::Direct3D11::{
        D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_SDK_VERSION, D3D11CreateDevice, ID3D11Device,
        ID3D11DeviceContext,
    };
    use windows::Win32::Graphics::Dxgi::IDXGIDevice;
    use windows::core::Interface;

    // Most capable first
    const FEATURE_LEVELS: [D3D_FEATURE_LEVEL; 3] = [
        D3D_FEATURE_LEVEL_11_0,
        D3D_FEATURE_LEVEL_10_1,
        D3D_FEATURE_LEVEL_10_0,
    ];

    let mut device: Option<ID3D11Device> = None;
    let mut context: Option<ID3D11DeviceContext> = None;
    let mut level = D3D_FEATURE_LEVEL_10_0;

    let created = unsafe {
        D3D11CreateDevice(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            HMODULE::default(),
            D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            Some(&FEATURE_LEVELS),
            D3D11_SDK_VERSION,
            Some(&mut device),
            Some(&mut level),
            Some(&mut context),
        )
    };

    if let Err(err) = created {
        log::debug!("D3D11CreateDevice failed: {}", err);
    }

    let device = device.ok_or(ProbeError::NoDevice)?;
    log::trace!("Probe device created with feature level {:#X}", level.0);

    let dxgi_device: IDXGIDevice = device.cast()?;
    let adapter = unsafe { dxgi_device.GetAdapter() }?;
    let desc = unsafe { adapter.GetDesc() }?;

    Ok(desc.DedicatedVideoMemory as u64)
}

#[cfg(not(windows))]
fn dedicated_video_memory() -> ProbeResult<u64> {
    Err(ProbeError::NoDevice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_probe_reports_zero_on_error() {
        let probe = SystemProbe;

        assert_eq!(probe.cpu_memory_bytes(), physical_memory().unwrap_or(0));
        assert_eq!(probe.gpu_memory_bytes(), dedicated_video_memory().unwrap_or(0));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_video_memory_unknown_off_windows() {
        assert!(matches!(dedicated_video_memory(), Err(ProbeError::NoDevice)));
        assert_eq!(SystemProbe.gpu_memory_bytes(), 0);
    }

    #[cfg(any(windows, unix))]
    #[test]
    fn test_cpu_memory_is_reported() {
        assert!(SystemProbe.cpu_memory_bytes() > 0);
    }

    #[test]
    fn test_probe_by_reference() {
        struct Fixed;

        impl ResourceProbe for Fixed {
            fn cpu_memory_bytes(&self) -> u64 {
                1
            }

            fn gpu_memory_bytes(&self) -> u64 {
                2
            }
        }

        let probe = &Fixed;
        assert_eq!(ResourceProbe::cpu_memory_bytes(&probe), 1);
        assert_eq!(ResourceProbe::gpu_memory_bytes(&probe), 2);
    }
}
