/// Size of `jmp rel32`
pub const JUMP_REL_SIZE: usize = 5;

/// Size of `jmp [rip+0]` followed by the 8 byte destination
pub const JUMP_ABS_SIZE: usize = 14;

#[cfg(target_arch = "x86_64")]
pub const BITNESS: u32 = 64;

#[cfg(not(target_arch = "x86_64"))]
pub const BITNESS: u32 = 32;
