//! Static analysis of instruction streams.
//!
//! An abstract interpretation tracks operand-stack depth along every
//! control-flow edge: depth must never go negative, must be exactly
//! zero immediately after each return, must agree wherever paths
//! merge, and the peak must equal the function's declared `max_stack`.
//! Branch targets must land inside the code.
//!
//! The compiler runs [`max_depth`] to compute `max_stack` for freshly
//! built functions; tests run [`check_function`] and [`check_program`]
//! against everything the compiler and disassembler produce.

use thiserror::Error;

use crate::function::SvmFunction;
use crate::instruction::{stack_effect, stack_pops, Arg, Instruction};
use crate::opcode::{Opcode, OperandLayout};
use crate::program::SvmProgram;

/// Violations found by static analysis.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    /// The instruction list is empty.
    #[error("empty instruction list")]
    EmptyCode,

    /// An instruction pops more values than are on the stack.
    #[error("stack underflow at instruction {at}")]
    StackUnderflow { at: usize },

    /// Two control-flow paths reach an instruction at different depths.
    #[error("stack depth mismatch at instruction {at}: {first} vs {second}")]
    DepthMismatch { at: usize, first: i64, second: i64 },

    /// The declared `max_stack` does not match the analyzed peak.
    #[error("max_stack is {declared} but peak depth is {actual}")]
    MaxStackMismatch { declared: usize, actual: usize },

    /// The stack is not empty immediately after a return.
    #[error("stack depth {depth} after return at instruction {at}")]
    NonZeroAfterReturn { at: usize, depth: i64 },

    /// A branch targets an instruction index outside the code.
    #[error("branch at instruction {at} targets {target}, out of range")]
    BranchOutOfRange { at: usize, target: i64 },

    /// Control can fall off the end of the code.
    #[error("control falls off the end of the code at instruction {at}")]
    MissingTerminator { at: usize },

    /// The last instruction is not a return.
    #[error("terminal instruction at {at} is not a return")]
    BadTerminator { at: usize },

    /// An instruction's arguments do not match its operand layout.
    #[error("malformed operands at instruction {at}")]
    MalformedOperand { at: usize },

    /// The program's entry index is out of range.
    #[error("entry index {index} out of range")]
    BadEntryIndex { index: usize },

    /// A NEWC operand references a function that does not exist.
    #[error("NEWC at instruction {at} references unknown function {index}")]
    UnknownFunction { at: usize, index: i64 },

    /// An LGCS operand references a string that does not exist.
    #[error("LGCS at instruction {at} references unknown string {index}")]
    UnknownString { at: usize, index: i64 },

    /// `env_size` is smaller than `num_args`.
    #[error("env_size {env_size} is smaller than num_args {num_args}")]
    EnvTooSmall { env_size: usize, num_args: usize },

    /// Wraps an error with the index of the offending function.
    #[error("function {index}: {error}")]
    Function {
        index: usize,
        #[source]
        error: Box<CheckError>,
    },
}

/// Result of a successful depth analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackAnalysis {
    /// Peak operand-stack depth over all reachable instructions.
    pub max_depth: usize,
}

fn branch_target(code: &[Instruction], at: usize) -> Result<usize, CheckError> {
    let delta = code[at]
        .arg1
        .as_int()
        .ok_or(CheckError::MalformedOperand { at })?;
    let target = at as i64 + 1 + delta;
    if target < 0 || target >= code.len() as i64 {
        return Err(CheckError::BranchOutOfRange { at, target });
    }
    Ok(target as usize)
}

/// Abstractly interpret `code`, returning the peak stack depth.
///
/// Depths propagate along fall-through and branch edges from
/// instruction 0 with an empty stack; paths that merge must agree.
pub fn analyze(code: &[Instruction]) -> Result<StackAnalysis, CheckError> {
    if code.is_empty() {
        return Err(CheckError::EmptyCode);
    }

    let mut depths: Vec<Option<i64>> = vec![None; code.len()];
    let mut worklist = vec![0usize];
    depths[0] = Some(0);
    let mut max_depth: i64 = 0;

    while let Some(at) = worklist.pop() {
        let depth = depths[at].expect("worklist entries always have a depth");
        let instr = &code[at];

        if depth < stack_pops(instr) {
            return Err(CheckError::StackUnderflow { at });
        }
        let after = depth + stack_effect(instr);
        if after < 0 {
            return Err(CheckError::StackUnderflow { at });
        }
        max_depth = max_depth.max(depth).max(after);

        let mut successors: [Option<usize>; 2] = [None, None];
        match instr.opcode {
            op if op.is_return() => {
                if after != 0 {
                    return Err(CheckError::NonZeroAfterReturn { at, depth: after });
                }
            }
            Opcode::Br => {
                successors[0] = Some(branch_target(code, at)?);
            }
            Opcode::Brt | Opcode::Brf => {
                successors[0] = Some(branch_target(code, at)?);
                successors[1] = Some(at + 1);
            }
            _ => {
                successors[0] = Some(at + 1);
            }
        }

        for succ in successors.into_iter().flatten() {
            if succ >= code.len() {
                return Err(CheckError::MissingTerminator { at });
            }
            match depths[succ] {
                None => {
                    depths[succ] = Some(after);
                    worklist.push(succ);
                }
                Some(existing) if existing != after => {
                    return Err(CheckError::DepthMismatch {
                        at: succ,
                        first: existing,
                        second: after,
                    });
                }
                Some(_) => {}
            }
        }
    }

    Ok(StackAnalysis {
        max_depth: max_depth as usize,
    })
}

/// Peak stack depth of `code`, for builders computing `max_stack`.
pub fn max_depth(code: &[Instruction]) -> Result<usize, CheckError> {
    analyze(code).map(|a| a.max_depth)
}

fn check_operands(instr: &Instruction, at: usize) -> Result<(), CheckError> {
    let int_in = move |arg: &Arg, lo: i64, hi: i64| -> Result<(), CheckError> {
        match arg.as_int() {
            Some(v) if v >= lo && v <= hi => Ok(()),
            _ => Err(CheckError::MalformedOperand { at }),
        }
    };
    let none = move |arg: &Arg| -> Result<(), CheckError> {
        match arg {
            Arg::None => Ok(()),
            _ => Err(CheckError::MalformedOperand { at }),
        }
    };

    match instr.opcode.operands() {
        OperandLayout::None => {
            none(&instr.arg1)?;
            none(&instr.arg2)
        }
        OperandLayout::Int32 => {
            int_in(&instr.arg1, i32::MIN as i64, i32::MAX as i64)?;
            none(&instr.arg2)
        }
        OperandLayout::Float64 => match instr.arg1 {
            Arg::Float(_) => none(&instr.arg2),
            _ => Err(CheckError::MalformedOperand { at }),
        },
        OperandLayout::Offset32 => {
            int_in(&instr.arg1, 0, u32::MAX as i64)?;
            none(&instr.arg2)
        }
        OperandLayout::Branch32 => {
            int_in(&instr.arg1, i32::MIN as i64, i32::MAX as i64)?;
            none(&instr.arg2)
        }
        OperandLayout::Byte => {
            int_in(&instr.arg1, 0, u8::MAX as i64)?;
            none(&instr.arg2)
        }
        OperandLayout::BytePair => {
            int_in(&instr.arg1, 0, u8::MAX as i64)?;
            int_in(&instr.arg2, 0, u8::MAX as i64)
        }
    }
}

/// Check a single function against its declared contract.
pub fn check_function(function: &SvmFunction) -> Result<(), CheckError> {
    if function.env_size < function.num_args {
        return Err(CheckError::EnvTooSmall {
            env_size: function.env_size,
            num_args: function.num_args,
        });
    }
    let code = &function.code;
    if code.is_empty() {
        return Err(CheckError::EmptyCode);
    }
    for (at, instr) in code.iter().enumerate() {
        check_operands(instr, at)?;
    }
    let last = code.len() - 1;
    if !code[last].opcode.is_return() {
        return Err(CheckError::BadTerminator { at: last });
    }

    let analysis = analyze(code)?;
    if analysis.max_depth != function.max_stack {
        return Err(CheckError::MaxStackMismatch {
            declared: function.max_stack,
            actual: analysis.max_depth,
        });
    }
    Ok(())
}

/// Check a whole program: every function plus cross-references.
pub fn check_program(program: &SvmProgram) -> Result<(), CheckError> {
    if program.entry_index >= program.functions.len() {
        return Err(CheckError::BadEntryIndex {
            index: program.entry_index,
        });
    }

    for (index, function) in program.functions.iter().enumerate() {
        let wrap = |error: CheckError| CheckError::Function {
            index,
            error: Box::new(error),
        };

        check_function(function).map_err(wrap)?;

        for (at, instr) in function.code.iter().enumerate() {
            match instr.opcode {
                Opcode::Newc => {
                    let target = instr.arg1.as_int().unwrap_or(-1);
                    if target < 0 || target >= program.functions.len() as i64 {
                        return Err(wrap(CheckError::UnknownFunction { at, index: target }));
                    }
                }
                Opcode::Lgcs => {
                    let target = instr.arg1.as_int().unwrap_or(-1);
                    if target < 0 || target >= program.strings.len() as i64 {
                        return Err(wrap(CheckError::UnknownString { at, index: target }));
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}
