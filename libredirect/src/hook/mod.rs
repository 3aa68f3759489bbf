//! Interception capability.
//!
//! Callers depend on [`Interceptor`] and [`Hook`] only. How the redirect is
//! physically made (inline detour, IAT slot, vtable entry) is a backend detail.

pub mod traits;

pub use traits::*;
