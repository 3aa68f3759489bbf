//! `RegisterPoolOptions` override.
//!
//! The host registers each memory pool through
//! `RegisterPoolOptions(this, name, size)`. The redirect rewrites `size` for
//! the CPU and GPU pools and forwards every call, rewritten or not, to the
//! original with the same handle and name.

pub mod controller;
pub mod errors;
pub mod policy;
pub mod probe;
pub mod resolver;

use std::{
    ffi::{CStr, c_char, c_void},
    sync::OnceLock,
};

use controller::InterceptionController;
use errors::PatchResult;
use policy::PoolSizePolicy;
use probe::{ResourceProbe, SystemProbe};
use resolver::{AddressResolver, HostBinaryHandle, VersionAddressTable, VersionOffset};

use crate::options::{FractionSource, OptionsFile};

pub type RegisterPoolOptionsFn = unsafe extern "C" fn(pool: *mut c_void, name: *const c_char, size: u64);

pub static REGISTER_POOL_OPTIONS_OFFSETS: [VersionOffset; 1] = [VersionOffset::new(1, 4, 0x1AD0F0)];

pub static REGISTER_POOL_OPTIONS: InterceptionController<RegisterPoolOptionsFn> =
    InterceptionController::new("RegisterPoolOptions");

static POOL_POLICY: OnceLock<PoolSizePolicy<SystemProbe, OptionsFile>> = OnceLock::new();

/// Applies `policy` to one intercepted registration and forwards it.
///
/// A null or non UTF-8 `name` can't match a known pool and is forwarded as is.
///
/// # Safety
/// `name` must be null or point to a NUL terminated string, and `original`
/// must accept `pool` and `name` as the host passed them.
pub unsafe fn forward_pool_options<P: ResourceProbe, O: FractionSource>(
    original: RegisterPoolOptionsFn,
    policy: &PoolSizePolicy<P, O>,
    pool: *mut c_void,
    name: *const c_char,
    size: u64,
) {
    let adjusted = if name.is_null() {
        size
    } else {
        match unsafe { CStr::from_ptr(name) }.to_str() {
            Ok(pool_name) => policy.adjust_size(pool_name, size),
            Err(_) => size,
        }
    };

    unsafe { original(pool, name, adjusted) }
}

unsafe extern "C" fn register_pool_options_detour(pool: *mut c_void, name: *const c_char, size: u64) {
    let Some(original) = REGISTER_POOL_OPTIONS.original() else {
        log::error!("RegisterPoolOptions reached the detour without an original");
        return;
    };

    match POOL_POLICY.get() {
        Some(policy) => unsafe { forward_pool_options(original, policy, pool, name, size) },
        None => unsafe { original(pool, name, size) },
    }
}

/// Installs the pool override into `host` using `interceptor`.
///
/// Only the first call in a process does anything. `options` is read again on
/// every pool registration, so edits apply to pools registered later.
///
/// # Safety
/// `host` must describe the running host executable, so the offsets listed
/// for its version point at `RegisterPoolOptions`.
pub unsafe fn install_pool_patch<I: libredirect::hook::traits::Interceptor<RegisterPoolOptionsFn>>(
    interceptor: &I,
    host: &HostBinaryHandle,
    options: OptionsFile,
) -> PatchResult<()> {
    log::info!("Installing pool patch for host version {}", host.version());

    let table = VersionAddressTable::new(&REGISTER_POOL_OPTIONS_OFFSETS)?;
    let resolver = AddressResolver::new(table);

    if POOL_POLICY.set(PoolSizePolicy::new(SystemProbe, options)).is_err() {
        log::debug!("Pool policy already configured");
    }

    let result = unsafe {
        REGISTER_POOL_OPTIONS.install(interceptor, host, &resolver, register_pool_options_detour)
    };

    match &result {
        Ok(()) => log::info!("\tPool patch: success"),
        Err(errors::PatchError::UnsupportedVersion(_)) => log::warn!("\tPool patch: failed"),
        Err(err) => log::error!("\tPool patch: error ({})", err),
    }

    result
}

#[cfg(test)]
mod tests {
    use std::{
        cell::RefCell,
        ffi::CString,
        fs, ptr,
        sync::atomic::{AtomicBool, Ordering},
    };

    use libredirect::{
        common::exe_version::ExeVersion,
        hook::traits::{Hook, Interceptor},
    };
    use parking_lot::Mutex;
    use thiserror::Error;

    use super::*;
    use crate::options::Fractions;
    use crate::patch::{errors::PatchError, policy::GIB};

    thread_local! {
        static FORWARDED: RefCell<Vec<(usize, usize, u64)>> = const { RefCell::new(Vec::new()) };
    }

    unsafe extern "C" fn recording_original(pool: *mut c_void, name: *const c_char, size: u64) {
        FORWARDED.with(|calls| calls.borrow_mut().push((pool as usize, name as usize, size)));
    }

    fn take_forwarded() -> Vec<(usize, usize, u64)> {
        FORWARDED.with(|calls| std::mem::take(&mut *calls.borrow_mut()))
    }

    struct Fixed;

    impl ResourceProbe for Fixed {
        fn cpu_memory_bytes(&self) -> u64 {
            16 * GIB
        }

        fn gpu_memory_bytes(&self) -> u64 {
            8 * GIB
        }
    }

    fn policy() -> PoolSizePolicy<Fixed, Fractions> {
        PoolSizePolicy::new(Fixed, Fractions::default())
    }

    #[derive(Debug, Error)]
    #[error("recorded hook can't fail")]
    struct NeverFails;

    #[derive(Debug)]
    struct RecordedHook {
        enabled: AtomicBool,
    }

    impl Hook<RegisterPoolOptionsFn> for RecordedHook {
        type Error = NeverFails;

        fn enable(&self) -> Result<(), NeverFails> {
            self.enabled.store(true, Ordering::Release);
            Ok(())
        }

        fn disable(&self) -> Result<(), NeverFails> {
            self.enabled.store(false, Ordering::Release);
            Ok(())
        }

        fn is_enabled(&self) -> bool {
            self.enabled.load(Ordering::Acquire)
        }

        fn name(&self) -> &str {
            "recorded"
        }

        unsafe fn original(&self) -> Result<RegisterPoolOptionsFn, NeverFails> {
            Ok(recording_original)
        }
    }

    /// Remembers `(target, detour)` of every intercept request
    #[derive(Default)]
    struct RecordingInterceptor {
        requests: Mutex<Vec<(usize, usize)>>,
    }

    impl Interceptor<RegisterPoolOptionsFn> for RecordingInterceptor {
        type Hook = RecordedHook;

        unsafe fn intercept(
            &self,
            _name: &str,
            target: *mut c_void,
            detour: RegisterPoolOptionsFn,
        ) -> Result<RecordedHook, NeverFails> {
            self.requests.lock().push((target as usize, detour as usize));

            Ok(RecordedHook {
                enabled: AtomicBool::new(false),
            })
        }
    }

    #[test]
    fn test_known_pools_are_resized_and_forwarded() {
        let pool = 0xDEAD_0000usize as *mut c_void;
        let cpu = CString::new("PoolCPU").unwrap();
        let gpu = CString::new("PoolGPU").unwrap();

        unsafe {
            forward_pool_options(recording_original, &policy(), pool, cpu.as_ptr(), GIB);
            forward_pool_options(recording_original, &policy(), pool, gpu.as_ptr(), GIB);
        }

        assert_eq!(
            take_forwarded(),
            vec![
                (pool as usize, cpu.as_ptr() as usize, 8 * GIB),
                (pool as usize, gpu.as_ptr() as usize, 8 * GIB),
            ]
        );
    }

    #[test]
    fn test_other_pools_pass_through() {
        let pool = 0x1000usize as *mut c_void;
        let audio = CString::new("PoolAudio").unwrap();
        let lower = CString::new("poolcpu").unwrap();

        unsafe {
            forward_pool_options(recording_original, &policy(), pool, audio.as_ptr(), 1234);
            forward_pool_options(recording_original, &policy(), pool, lower.as_ptr(), 5678);
        }

        let forwarded = take_forwarded();
        assert_eq!(forwarded[0].2, 1234);
        assert_eq!(forwarded[1].2, 5678);
    }

    #[test]
    fn test_unreadable_names_pass_through() {
        let invalid = [0xFFu8, 0xFE, 0x00];

        unsafe {
            forward_pool_options(recording_original, &policy(), ptr::null_mut(), ptr::null(), 77);
            forward_pool_options(
                recording_original,
                &policy(),
                ptr::null_mut(),
                invalid.as_ptr().cast(),
                88,
            );
        }

        assert_eq!(
            take_forwarded(),
            vec![(0, 0, 77), (0, invalid.as_ptr() as usize, 88)]
        );
    }

    #[test]
    fn test_offset_table_is_valid() {
        let table = VersionAddressTable::new(&REGISTER_POOL_OPTIONS_OFFSETS).unwrap();
        let host = HostBinaryHandle::new(
            libredirect::common::exe_version::ExeVersion::new(1, 4, 0, 0),
            0x1_4000_0000,
        );

        assert_eq!(
            AddressResolver::new(table).resolve(&host),
            Some(0x1_4000_0000 + 0x1AD0F0)
        );
    }

    // The only test touching the process wide install state
    #[test]
    fn test_installed_detour_resizes_and_forwards() {
        let dir = std::env::temp_dir().join(format!("pool-patch-install-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let options = OptionsFile::in_dir(&dir);
        fs::write(options.path(), r#"{ "cpu_memory_pool_fraction": 0.25 }"#).unwrap();

        let interceptor = RecordingInterceptor::default();
        let host = HostBinaryHandle::new(ExeVersion::new(1, 4, 0, 0), 0x1_4000_0000);

        unsafe { install_pool_patch(&interceptor, &host, options.clone()) }.unwrap();

        assert_eq!(
            *interceptor.requests.lock(),
            vec![(
                0x1_4000_0000 + 0x1AD0F0,
                register_pool_options_detour as usize
            )]
        );
        assert!(REGISTER_POOL_OPTIONS.is_installed());
        assert!(REGISTER_POOL_OPTIONS.hook::<RecordedHook>().unwrap().is_enabled());

        let expected_cpu = PoolSizePolicy::new(SystemProbe, Fractions { cpu: 0.25, gpu: 1.0 })
            .adjust_size("PoolCPU", GIB);

        let pool = 0xBEEF_0000usize as *mut c_void;
        let cpu = CString::new("PoolCPU").unwrap();
        let audio = CString::new("PoolAudio").unwrap();

        take_forwarded();
        unsafe {
            register_pool_options_detour(pool, cpu.as_ptr(), GIB);
            register_pool_options_detour(pool, audio.as_ptr(), 4321);
        }

        assert_eq!(
            take_forwarded(),
            vec![
                (pool as usize, cpu.as_ptr() as usize, expected_cpu),
                (pool as usize, audio.as_ptr() as usize, 4321),
            ]
        );

        let again = unsafe { install_pool_patch(&interceptor, &host, options) };
        assert!(matches!(again, Err(PatchError::AlreadyAttempted)));
        assert_eq!(interceptor.requests.lock().len(), 1);
    }
}
