//! Compiled function representation.

use crate::instruction::Instruction;

/// One compiled SVML function.
///
/// `max_stack` is a contract, not advisory: no legal execution of
/// `code` may exceed it. `env_size` counts environment slots, with
/// parameters occupying slots `0..num_args`. `code` is non-empty and
/// ends with a return on every reachable control path.
#[derive(Debug, Clone, PartialEq)]
pub struct SvmFunction {
    /// Peak operand-stack depth during any legal execution of `code`.
    pub max_stack: usize,
    /// Slot count of the function's environment frame.
    pub env_size: usize,
    /// Number of parameters.
    pub num_args: usize,
    /// The instruction stream.
    pub code: Vec<Instruction>,
}

impl SvmFunction {
    /// Create a new function.
    pub fn new(max_stack: usize, env_size: usize, num_args: usize, code: Vec<Instruction>) -> Self {
        Self {
            max_stack,
            env_size,
            num_args,
            code,
        }
    }
}
