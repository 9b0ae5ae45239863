//! In-memory instruction representation and the per-opcode stack
//! effect tables.
//!
//! An instruction is an opcode with up to two typed arguments. The
//! in-memory form is what the compiler emits and the interpreter
//! executes; byte-level encoding lives in the assembler, which derives
//! every width from [`Opcode::operands`](crate::Opcode::operands).
//!
//! Argument meaning by opcode:
//!
//! - `LGCI`: `arg1` = i32 immediate
//! - `LGCF64`: `arg1` = f64 immediate
//! - `LGCS`: `arg1` = string pool index; `NEWC`: `arg1` = function index
//! - `LDLG`/`STLG`/`LDLF`/`STLF`: `arg1` = slot
//! - `LDPG`/`STPG`: `arg1` = slot, `arg2` = environment level
//! - `BR`/`BRT`/`BRF`: `arg1` = instruction delta, relative to the
//!   instruction following the branch
//! - `CALL`/`CALLT`: `arg1` = argument count
//! - `CALLP`/`CALLTP`: `arg1` = primitive index, `arg2` = argument count

use crate::opcode::Opcode;

/// One instruction argument.
///
/// Floats compare by bit pattern so that [`Instruction`] is well
/// behaved under `PartialEq` (NaN payloads included); the interpreter
/// never relies on `Arg` float equality.
#[derive(Debug, Clone, Copy)]
pub enum Arg {
    /// Argument absent.
    None,
    /// Integral argument: immediates, slots, levels, counts, indices,
    /// branch deltas.
    Int(i64),
    /// Float immediate (LGCF64 only).
    Float(f64),
}

impl PartialEq for Arg {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Arg::None, Arg::None) => true,
            (Arg::Int(a), Arg::Int(b)) => a == b,
            (Arg::Float(a), Arg::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Arg {
    /// The integral payload, if this is an `Int` argument.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Arg::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The float payload, if this is a `Float` argument.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Arg::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// A single SVML instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instruction {
    /// The operation to perform.
    pub opcode: Opcode,
    /// First operand. Meaning depends on opcode.
    pub arg1: Arg,
    /// Second operand. Meaning depends on opcode.
    pub arg2: Arg,
}

impl Instruction {
    /// An instruction with no operands.
    pub fn nullary(opcode: Opcode) -> Self {
        Self {
            opcode,
            arg1: Arg::None,
            arg2: Arg::None,
        }
    }

    /// An instruction with one operand.
    pub fn unary(opcode: Opcode, arg1: Arg) -> Self {
        Self {
            opcode,
            arg1,
            arg2: Arg::None,
        }
    }

    /// An instruction with two operands.
    pub fn binary(opcode: Opcode, arg1: Arg, arg2: Arg) -> Self {
        Self { opcode, arg1, arg2 }
    }

    /// Shorthand for a single integral operand.
    pub fn with_int(opcode: Opcode, arg1: i64) -> Self {
        Self::unary(opcode, Arg::Int(arg1))
    }

    /// Shorthand for two integral operands.
    pub fn with_ints(opcode: Opcode, arg1: i64, arg2: i64) -> Self {
        Self::binary(opcode, Arg::Int(arg1), Arg::Int(arg2))
    }
}

/// Number of operand-stack values this instruction pops.
///
/// Call opcodes derive their pop count from the argument count
/// operand; a malformed operand is treated as zero (the static checker
/// reports it separately).
pub fn stack_pops(instr: &Instruction) -> i64 {
    let n_args = |arg: &Arg| arg.as_int().unwrap_or(0);

    match instr.opcode {
        Opcode::Lgci
        | Opcode::Lgcf64
        | Opcode::Lgcb0
        | Opcode::Lgcb1
        | Opcode::Lgcu
        | Opcode::Lgcn
        | Opcode::Lgcs
        | Opcode::Ldlg
        | Opcode::Ldlf
        | Opcode::Ldpg
        | Opcode::Dup
        | Opcode::Br
        | Opcode::Newc
        | Opcode::Retu
        | Opcode::Retn => 0,

        Opcode::Stlg
        | Opcode::Stlf
        | Opcode::Stpg
        | Opcode::Negg
        | Opcode::Notg
        | Opcode::Popg
        | Opcode::Brt
        | Opcode::Brf
        | Opcode::Retg
        | Opcode::Newa => 1,

        Opcode::Addg
        | Opcode::Subg
        | Opcode::Mulg
        | Opcode::Divg
        | Opcode::Modg
        | Opcode::Ltg
        | Opcode::Gtg
        | Opcode::Leg
        | Opcode::Geg
        | Opcode::Eqg
        | Opcode::Neqg
        | Opcode::Ldag => 2,

        Opcode::Stag => 3,

        // Arguments plus the callee closure.
        Opcode::Call | Opcode::Callt => n_args(&instr.arg1) + 1,
        // Arguments only; primitives are not closures on the stack.
        Opcode::Callp | Opcode::Calltp => n_args(&instr.arg2),
    }
}

/// Net operand-stack depth change of this instruction.
///
/// Tail calls (`CALLT`, `CALLTP`) are accounted as pushing their
/// result even though the reused frame never sees it; the terminal
/// `RETG` that follows them in well-formed code nets the depth to
/// zero.
pub fn stack_effect(instr: &Instruction) -> i64 {
    let n_args = |arg: &Arg| arg.as_int().unwrap_or(0);

    match instr.opcode {
        Opcode::Lgci
        | Opcode::Lgcf64
        | Opcode::Lgcb0
        | Opcode::Lgcb1
        | Opcode::Lgcu
        | Opcode::Lgcn
        | Opcode::Lgcs
        | Opcode::Ldlg
        | Opcode::Ldlf
        | Opcode::Ldpg
        | Opcode::Dup
        | Opcode::Newc => 1,

        Opcode::Stlg
        | Opcode::Stlf
        | Opcode::Stpg
        | Opcode::Popg
        | Opcode::Brt
        | Opcode::Brf
        | Opcode::Retg
        | Opcode::Ldag => -1,

        Opcode::Negg | Opcode::Notg | Opcode::Br | Opcode::Retu | Opcode::Retn | Opcode::Newa => 0,

        Opcode::Addg
        | Opcode::Subg
        | Opcode::Mulg
        | Opcode::Divg
        | Opcode::Modg
        | Opcode::Ltg
        | Opcode::Gtg
        | Opcode::Leg
        | Opcode::Geg
        | Opcode::Eqg
        | Opcode::Neqg => -1,

        Opcode::Stag => -3,

        // Pop n args + closure, push one result.
        Opcode::Call | Opcode::Callt => -n_args(&instr.arg1),
        // Pop n args, push one result.
        Opcode::Callp | Opcode::Calltp => 1 - n_args(&instr.arg2),
    }
}
