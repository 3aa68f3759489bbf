use iced_x86::{
    BlockEncoder, BlockEncoderOptions, Code, Decoder, DecoderOptions, Encoder, FlowControl,
    Instruction, InstructionBlock, Mnemonic, Register,
};

use super::errors::DisasmError;
use crate::ffi::{BITNESS, JUMP_REL_SIZE};

#[cfg(target_arch = "x86_64")]
use crate::ffi::JUMP_ABS_SIZE;

pub(super) type DisasmResult<T> = Result<T, DisasmError>;

/// `rel32` displacement of a 5 byte jump placed at `from`, if it can reach `to`
fn rel32_displacement(from: usize, to: usize) -> Option<i32> {
    let distance = (to as i64)
        .wrapping_sub(from as i64)
        .wrapping_sub(JUMP_REL_SIZE as i64);

    i32::try_from(distance).ok()
}

/// Bytes needed for a jump from `from` to `to`.
///
/// On x86 a relative jump always reaches. On x86_64 it reaches +-2GiB,
/// beyond that an absolute `jmp [rip+0]` with inline address is used.
pub(super) fn jump_size(from: usize, to: usize) -> usize {
    #[cfg(target_arch = "x86_64")]
    {
        if rel32_displacement(from, to).is_some() {
            JUMP_REL_SIZE
        } else {
            JUMP_ABS_SIZE
        }
    }

    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = (from, to);
        JUMP_REL_SIZE
    }
}

/// Instructions that end the function or jump away before we have enough bytes.
/// Loops are refused as well, relocating them needs rewriting into jcc pairs.
fn ends_stolen_range(instruction: &Instruction) -> bool {
    use Mnemonic::*;

    matches!(
        instruction.flow_control(),
        FlowControl::Return
            | FlowControl::UnconditionalBranch
            | FlowControl::IndirectBranch
            | FlowControl::Interrupt
    ) || matches!(
        instruction.mnemonic(),
        Loop | Loope | Loopne | Jecxz | Jcxz | Jrcxz
    )
}

/// Whole instructions taken from the start of a hook target
pub(super) struct Disasm {
    ip: u64,
    instructions: Vec<Instruction>,
    stolen_bytes: Vec<u8>,
}

impl Disasm {
    /// Decodes instructions from `code`, which lives at address `ip`,
    /// until at least `min_len` bytes are covered.
    pub(super) fn decode(code: &[u8], ip: u64, min_len: usize) -> DisasmResult<Self> {
        let mut decoder = Decoder::with_ip(BITNESS, code, ip, DecoderOptions::NONE);
        let mut instructions = Vec::new();
        let mut stolen_len = 0usize;

        while stolen_len < min_len {
            if !decoder.can_decode() {
                return Err(DisasmError::InvalidInstruction(decoder.ip()));
            }

            let instruction = decoder.decode();

            if instruction.is_invalid() {
                return Err(DisasmError::InvalidInstruction(instruction.ip()));
            }

            if ends_stolen_range(&instruction) {
                log::error!(
                    "Cannot steal {} bytes at {:#X}: {:?} at {:#X}",
                    min_len,
                    ip,
                    instruction.mnemonic(),
                    instruction.ip()
                );
                return Err(DisasmError::ShortTarget(instruction.mnemonic(), min_len));
            }

            log::trace!(
                "Stolen instruction at {:#X}: {:?}, len={}",
                instruction.ip(),
                instruction.mnemonic(),
                instruction.len()
            );

            stolen_len += instruction.len();
            instructions.push(instruction);
        }

        Ok(Self {
            ip,
            instructions,
            stolen_bytes: code[..stolen_len].to_vec(),
        })
    }

    /// Re-encodes the stolen instructions to run at `new_ip`.
    ///
    /// Relative branches and RIP-relative operands are fixed up by
    /// `BlockEncoder`, short branches grow to near form when needed.
    pub(super) fn relocate(&self, new_ip: u64) -> DisasmResult<Vec<u8>> {
        let block = InstructionBlock::new(&self.instructions, new_ip);
        let encoded = BlockEncoder::encode(BITNESS, block, BlockEncoderOptions::NONE)?;

        if encoded.code_buffer.is_empty() {
            return Err(DisasmError::EncodingError(format!(
                "empty relocation for {:#X}",
                self.ip
            )));
        }

        log::debug!(
            "Relocated {} instructions from {:#X} to {:#X}: {} -> {} bytes",
            self.instructions.len(),
            self.ip,
            new_ip,
            self.stolen_bytes.len(),
            encoded.code_buffer.len()
        );

        Ok(encoded.code_buffer)
    }

    pub(super) fn stolen_bytes(&self) -> &[u8] {
        &self.stolen_bytes
    }

    pub(super) fn stolen_len(&self) -> usize {
        self.stolen_bytes.len()
    }
}

/// Encodes a jump placed at `from` that lands on `to`
pub(super) fn create_jump_bytes(from: usize, to: usize) -> DisasmResult<Vec<u8>> {
    #[cfg(target_arch = "x86_64")]
    if rel32_displacement(from, to).is_none() {
        // jmp [rip+0] followed by the absolute destination
        let mut bytes = vec![0xFF, 0x25, 0x00, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(&(to as u64).to_le_bytes());
        return Ok(bytes);
    }

    let code = if BITNESS == 64 {
        Code::Jmp_rel32_64
    } else {
        Code::Jmp_rel32_32
    };

    let instruction = Instruction::with_branch(code, to as u64)?;
    let mut encoder = Encoder::new(BITNESS);
    let encoded_len = encoder.encode(&instruction, from as u64)?;

    if encoded_len != JUMP_REL_SIZE {
        return Err(DisasmError::EncodingError(format!(
            "expected {JUMP_REL_SIZE} bytes for near jump, got {encoded_len}"
        )));
    }

    Ok(encoder.take_buffer())
}

/// Decodes `jump_bytes` as if placed at `from` and checks it lands on `expected`
pub(super) fn verify_jump_bytes(jump_bytes: &[u8], from: usize, expected: usize) -> DisasmResult<()> {
    let mut decoder = Decoder::with_ip(BITNESS, jump_bytes, from as u64, DecoderOptions::NONE);
    let instruction = decoder.decode();

    if instruction.is_invalid() || instruction.mnemonic() != Mnemonic::Jmp {
        return Err(DisasmError::JumpVerificationFailed(expected, 0));
    }

    let actual = match instruction.code() {
        Code::Jmp_rel32_32 | Code::Jmp_rel32_64 => instruction.near_branch_target() as usize,

        Code::Jmp_rm64 if instruction.memory_base() == Register::RIP => {
            let start = instruction.len();
            let address = jump_bytes
                .get(start..start + 8)
                .and_then(|raw| <[u8; 8]>::try_from(raw).ok())
                .map(u64::from_le_bytes)
                .ok_or(DisasmError::JumpVerificationFailed(expected, 0))?;

            address as usize
        }

        other => {
            return Err(DisasmError::EncodingError(format!(
                "unexpected jump encoding {other:?}"
            )));
        }
    };

    if actual != expected {
        return Err(DisasmError::JumpVerificationFailed(expected, actual));
    }

    Ok(())
}
