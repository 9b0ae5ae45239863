//! SVML interpreter — executes compiled programs.
//!
//! A stack-based machine: each call frame owns its operand stack, a
//! program counter and an environment frame; environments live in an
//! arena and form a lexical parent chain that closures capture. Tail
//! calls reuse the current frame, memoized closures short-circuit
//! repeated calls, and every execution runs under configurable caps.
//!
//! # Usage
//!
//! ```
//! use svml_common::{Instruction, Opcode, SvmFunction, SvmProgram};
//! use svml_vm::{run, ExecutionLimits, Value};
//!
//! let program = SvmProgram::new(0, vec![SvmFunction::new(
//!     2,
//!     0,
//!     0,
//!     vec![
//!         Instruction::with_int(Opcode::Lgci, 5),
//!         Instruction::with_int(Opcode::Lgci, 3),
//!         Instruction::nullary(Opcode::Addg),
//!         Instruction::nullary(Opcode::Retg),
//!     ],
//! )]);
//!
//! let outcome = run(&program, &ExecutionLimits::default(), None).unwrap();
//! assert_eq!(outcome.value, Value::Int(8));
//! assert!(outcome.stdout.is_empty());
//! ```

pub mod error;
pub mod execute;
pub mod machine;
pub mod primitives;
pub mod value;

pub use error::RuntimeError;
pub use machine::{Execution, ExecutionLimits, Machine};
pub use value::Value;

use svml_common::{Instrumentation, SvmProgram};

/// Execute a program and return its final value and stdout.
///
/// `instrumentation` enables memoization for the functions it flags;
/// pass `None` to run without (a program loaded from a binary has no
/// instrumentation).
///
/// # Errors
///
/// Returns [`RuntimeError`] if execution fails: type mismatch,
/// division by zero, arity mismatch, a configured limit exceeded, and
/// so on. The error is the whole result; no partial stdout survives.
pub fn run(
    program: &SvmProgram,
    limits: &ExecutionLimits,
    instrumentation: Option<&Instrumentation>,
) -> Result<Execution, RuntimeError> {
    let mut machine = Machine::new(program, limits, instrumentation);
    machine.execute()
}
