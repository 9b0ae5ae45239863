//! SVML assembler — bidirectional program ↔ binary container
//! translation.
//!
//! The container is versioned and self-describing: a 16-byte header
//! (magic `0x5005ACAD`, version, entry offset, string count), a
//! deduplicated string table, and 4-byte-aligned function records.
//! See [`assemble`] and [`disassemble`] for the two directions and
//! [`dump`] for a human-readable listing.
//!
//! # Roundtrip guarantee
//!
//! For every well-formed program whose functions are all reachable
//! from the entry, `disassemble(assemble(p))` reproduces the function
//! count, each function's `(max_stack, env_size, num_args)`, the
//! instruction sequences, and the entry index.
//!
//! ```
//! use svml_assembler::{assemble, disassemble};
//! use svml_common::{Instruction, Opcode, SvmFunction, SvmProgram};
//!
//! let program = SvmProgram::new(0, vec![SvmFunction::new(
//!     1,
//!     0,
//!     0,
//!     vec![
//!         Instruction::with_int(Opcode::Lgci, 42),
//!         Instruction::nullary(Opcode::Retg),
//!     ],
//! )]);
//! let bytes = assemble(&program).unwrap();
//! let back = disassemble(&bytes).unwrap();
//! assert_eq!(back, program);
//! ```

pub mod error;

mod assemble;
mod disassemble;
mod dump;

pub use assemble::{assemble, HEADER_SIZE, MAGIC, MAJOR_VERSION, MINOR_VERSION};
pub use disassemble::disassemble;
pub use dump::dump;
pub use error::{AssembleError, DisassembleError};
