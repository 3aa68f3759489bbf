use iced_x86::{IcedError, Mnemonic};
use thiserror::Error;

use crate::ffi::fnptr::FnPtrError;
use crate::os::windows::winapi::WinapiError;

#[derive(Debug, Error)]
pub enum DisasmError {
    #[error("Iced error: {0}")]
    Iced(#[from] IcedError),

    #[error("Invalid instruction at 0x{0:X}")]
    InvalidInstruction(u64),

    #[error("Function ends with {0:?} before {1} bytes could be stolen")]
    ShortTarget(Mnemonic, usize),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Jump verification failed: expected target {0:#x}, got {1:#x}")]
    JumpVerificationFailed(usize, usize),
}

#[derive(Debug, Error)]
pub enum InlineHookError {
    #[error("WinAPI error: {0}")]
    Winapi(#[from] WinapiError),

    #[error("FnPtr error: {0}")]
    FnPtr(#[from] FnPtrError),

    #[error("Disassembly error: {0}")]
    Disasm(#[from] DisasmError),

    #[error("Target pointer is NULL")]
    TargetIsNull,

    #[error("Target memory at {0:#x} is not committed executable code")]
    NonExecutableMemory(usize),

    #[error("Target region too small: {available} bytes left, need {needed}")]
    FunctionTooSmall { needed: usize, available: usize },

    #[error("Hook is already enabled")]
    AlreadyEnabled,

    #[error("Hook is not enabled")]
    NotEnabled,
}
