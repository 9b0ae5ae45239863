//! Decode errors for SVML opcode bytes.

use thiserror::Error;

/// Errors that occur when decoding an opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Opcode 0x00 is illegal and always rejected.
    #[error("illegal opcode 0x00")]
    IllegalOpcode,

    /// Opcode 0x53 (`JMP`) is reserved and always rejected.
    #[error("reserved opcode JMP (0x53)")]
    ReservedJmp,

    /// Opcode falls in a reserved range.
    #[error("reserved opcode: {0:#04x}")]
    ReservedOpcode(u8),
}
