use std::ffi::c_void;

use super::errors::InlineHookError;
use super::inlinehook::InlineHook;
use crate::hook::traits::Interceptor;

/// [`Interceptor`] backed by inline detours
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineInterceptor;

impl<F: Copy + 'static> Interceptor<F> for InlineInterceptor {
    type Hook = InlineHook<F>;

    unsafe fn intercept(
        &self,
        name: &str,
        target: *mut c_void,
        detour: F,
    ) -> Result<InlineHook<F>, InlineHookError> {
        let hook = unsafe { InlineHook::new(name, target, detour) }?;

        log::debug!("Inline hook '{}' prepared at {:p}", name, target);

        Ok(hook)
    }
}
