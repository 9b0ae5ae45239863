//! SVML common types.
//!
//! This crate provides the foundational data structures shared by the
//! compiler, the assembler and the interpreter:
//!
//! - [`Opcode`] — the full SVML opcode set with operand layouts and
//!   on-wire sizes
//! - [`Instruction`] — the in-memory instruction form with the
//!   per-opcode stack-effect tables
//! - [`SvmFunction`] / [`SvmProgram`] — compiled code
//! - [`primitives`] — the fixed primitive index table
//! - [`verify`] — static stack-discipline analysis
//! - [`DecodeError`] — opcode byte decoding errors
//!
//! # Usage
//!
//! ```
//! use svml_common::{Instruction, Opcode, SvmFunction, verify};
//!
//! let code = vec![
//!     Instruction::with_int(Opcode::Lgci, 5),
//!     Instruction::with_int(Opcode::Lgci, 3),
//!     Instruction::nullary(Opcode::Addg),
//!     Instruction::nullary(Opcode::Retg),
//! ];
//! let function = SvmFunction::new(2, 0, 0, code);
//! assert!(verify::check_function(&function).is_ok());
//! ```

pub mod error;
pub mod function;
pub mod instruction;
pub mod instrument;
pub mod opcode;
pub mod primitives;
pub mod program;
pub mod verify;

// Re-export commonly used types at the crate root.
pub use error::DecodeError;
pub use function::SvmFunction;
pub use instruction::{stack_effect, stack_pops, Arg, Instruction};
pub use instrument::{FunctionProfile, Instrumentation};
pub use opcode::{Opcode, OperandLayout, ALL_OPCODES, RESERVED_JMP};
pub use program::SvmProgram;
