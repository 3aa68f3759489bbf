use std::{ffi::c_void, fmt::Debug};

/// Core trait for all hook types providing common functionality
pub trait Hook<F: Copy + 'static>: Send + Sync + Debug {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Enable the hook, redirecting calls to the detour function
    fn enable(&self) -> Result<(), Self::Error>;

    /// Disable the hook, restoring original behavior
    fn disable(&self) -> Result<(), Self::Error>;

    /// Check if the hook is currently enabled
    fn is_enabled(&self) -> bool;

    /// Get a descriptive name for this hook (for debugging/logging)
    fn name(&self) -> &str;

    /// Get a callable reference to the unmodified target.
    /// Stays valid while the hook is alive, enabled or not.
    ///
    /// # Safety
    /// The caller must ensure that calling this function is safe in the current context
    unsafe fn original(&self) -> Result<F, Self::Error>;
}

/// Capability: redirect calls reaching one address to another function,
/// keeping the means to run the code that used to live there.
pub trait Interceptor<F: Copy + 'static> {
    type Hook: Hook<F> + 'static;

    /// Prepares a redirect from `target` to `detour`. The target keeps running
    /// unmodified until [`Hook::enable`] is called on the result, which lets
    /// callers store [`Hook::original`] before any call can reach the detour.
    ///
    /// Dropping the returned hook removes the redirect, so callers keep it
    /// alive for as long as the redirect must stay in place.
    ///
    /// # Safety
    /// `target` must be the entry point of a function with signature `F`
    /// inside executable memory of the current process.
    unsafe fn intercept(
        &self,
        name: &str,
        target: *mut c_void,
        detour: F,
    ) -> Result<Self::Hook, <Self::Hook as Hook<F>>::Error>;
}
