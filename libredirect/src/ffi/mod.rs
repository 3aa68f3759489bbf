pub mod arch;
pub mod fnptr;

pub use arch::*;
pub use fnptr::*;
