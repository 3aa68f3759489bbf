//! Inline detour backend.
//!
//! The first instructions of the target are replaced with a jump to the detour.
//! Those instructions are relocated into a trampoline which then jumps back
//! into the target, so the trampoline behaves like the unmodified function.

pub mod errors;
pub mod inlinehook;
pub mod interceptor;

mod disasm;
mod trampoline;

pub use errors::*;
pub use inlinehook::InlineHook;
pub use interceptor::InlineInterceptor;

pub type InlineHookResult<T> = std::result::Result<T, errors::InlineHookError>;
