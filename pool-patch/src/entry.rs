use std::ffi::c_void;

use anyhow::Context;
use libredirect::os::windows::{hook::inline::InlineInterceptor, module::module_file_name};
use parking_lot::Once;
use windows::{
    Win32::{
        Foundation::HINSTANCE,
        System::SystemServices::{
            DLL_PROCESS_ATTACH, DLL_PROCESS_DETACH, DLL_THREAD_ATTACH, DLL_THREAD_DETACH,
        },
    },
    core::BOOL,
};

use crate::{
    logger::GlobalLogger,
    options::OptionsFile,
    patch::{install_pool_patch, resolver::HostBinaryHandle},
};

#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub extern "system" fn DllMain(hmodule: HINSTANCE, reason: u32, _reserved: *mut c_void) -> BOOL {
    static POOL_PATCH_INIT: Once = Once::new();

    match reason {
        DLL_PROCESS_ATTACH => {
            GlobalLogger::init();

            log::info!("Process attach (module: {:p})", hmodule.0);

            POOL_PATCH_INIT.call_once(|| {
                if let Err(err) = entry(hmodule) {
                    log::error!("Pool patch not installed: {:?}", err);
                }
            });
        }
        DLL_PROCESS_DETACH => {
            log::info!("Process detach (module: {:p})", hmodule.0);
        }
        DLL_THREAD_ATTACH | DLL_THREAD_DETACH => {}
        _ => {
            log::warn!("Unknown DLL reason code {:#x}", reason);
        }
    }

    true.into()
}

fn entry(hmodule: HINSTANCE) -> anyhow::Result<()> {
    let plugin_path = module_file_name(Some(hmodule.0)).context("Plugin path lookup failed")?;
    let plugin_dir = plugin_path
        .parent()
        .context("Plugin path has no parent directory")?;

    let options = OptionsFile::in_dir(plugin_dir);
    log::debug!("Pool options file: {}", options.path().display());

    let host = HostBinaryHandle::current().context("Host executable lookup failed")?;

    unsafe { install_pool_patch(&InlineInterceptor, &host, options) }?;

    Ok(())
}
