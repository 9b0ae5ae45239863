//! Error types for the SVML assembler and disassembler.

use svml_common::DecodeError;
use thiserror::Error;

/// Errors produced while serialising a program to the binary container.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssembleError {
    /// The program's entry index does not name a function.
    #[error("entry index {index} out of range")]
    EntryOutOfRange { index: usize },

    /// A function header field does not fit its u8 encoding.
    #[error("function {function}: {what} is {value}, limit is 255")]
    FunctionLimit {
        function: usize,
        what: &'static str,
        value: usize,
    },

    /// An instruction argument does not match its operand layout.
    #[error("function {function}: malformed operand at instruction {at}")]
    BadOperand { function: usize, at: usize },

    /// A branch targets an instruction index outside the function.
    #[error("function {function}: branch at instruction {at} targets {target}, out of range")]
    BranchOutOfRange {
        function: usize,
        at: usize,
        target: i64,
    },

    /// An LGCS argument does not name a pool string.
    #[error("function {function}: instruction {at} references unknown string {index}")]
    StringOutOfRange {
        function: usize,
        at: usize,
        index: i64,
    },

    /// A NEWC argument does not name a function.
    #[error("function {function}: instruction {at} references unknown function {index}")]
    FunctionOutOfRange {
        function: usize,
        at: usize,
        index: i64,
    },
}

/// Errors produced while parsing the binary container.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisassembleError {
    /// The magic number does not match.
    #[error("bad magic: {found:#010x}")]
    BadMagic { found: u32 },

    /// The container version is newer than this implementation.
    #[error("unsupported version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    /// The file ends in the middle of a structure.
    #[error("truncated at byte {offset}")]
    Truncated { offset: usize },

    /// A string table entry has an unknown tag.
    #[error("bad string tag {tag:#06x} at byte {offset}")]
    BadStringTag { offset: usize, tag: u16 },

    /// A string table entry has a zero size.
    #[error("bad string size {size} at byte {offset}")]
    BadStringSize { offset: usize, size: u32 },

    /// A string is not NUL-terminated.
    #[error("unterminated string at byte {offset}")]
    UnterminatedString { offset: usize },

    /// A string is not valid UTF-8.
    #[error("invalid UTF-8 in string at byte {offset}")]
    InvalidUtf8 { offset: usize },

    /// A function does not start on a 4-byte boundary.
    #[error("misaligned function at byte offset {offset}")]
    MisalignedFunction { offset: u32 },

    /// An opcode byte could not be decoded.
    #[error("byte {offset}: {source}")]
    Opcode {
        offset: usize,
        #[source]
        source: DecodeError,
    },

    /// An LGCS byte offset does not point at a string table entry.
    #[error("instruction at byte {offset} references unknown string offset {target}")]
    UnresolvedString { offset: usize, target: u32 },

    /// A NEWC byte offset does not point at a parsed function.
    #[error("instruction at byte {offset} references unknown function offset {target}")]
    UnresolvedFunction { offset: usize, target: u32 },

    /// A branch delta does not land on an instruction boundary.
    #[error("branch at byte {offset} targets byte {target}, not an instruction")]
    BadBranchTarget { offset: usize, target: i64 },

    /// A function's instruction stream reached end of file without a
    /// terminating return.
    #[error("function at byte offset {offset} has no terminating return")]
    MissingReturn { offset: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_assemble_errors() {
        assert_eq!(
            AssembleError::EntryOutOfRange { index: 3 }.to_string(),
            "entry index 3 out of range"
        );
        assert_eq!(
            AssembleError::FunctionLimit {
                function: 1,
                what: "env_size",
                value: 300
            }
            .to_string(),
            "function 1: env_size is 300, limit is 255"
        );
    }

    #[test]
    fn display_disassemble_errors() {
        assert_eq!(
            DisassembleError::BadMagic { found: 0xdeadbeef }.to_string(),
            "bad magic: 0xdeadbeef"
        );
        assert_eq!(
            DisassembleError::UnsupportedVersion { major: 1, minor: 0 }.to_string(),
            "unsupported version 1.0"
        );
        assert_eq!(
            DisassembleError::Truncated { offset: 12 }.to_string(),
            "truncated at byte 12"
        );
        assert_eq!(
            DisassembleError::MisalignedFunction { offset: 18 }.to_string(),
            "misaligned function at byte offset 18"
        );
    }

    #[test]
    fn opcode_error_carries_source() {
        let e = DisassembleError::Opcode {
            offset: 20,
            source: DecodeError::ReservedJmp,
        };
        assert_eq!(e.to_string(), "byte 20: reserved opcode JMP (0x53)");
    }
}
