//! Runtime errors.
//!
//! Each distinct fatal condition has its own variant. None of these
//! are recoverable within a run; the interpreter halts with the error
//! as the result. The tail of the list covers contract violations
//! that only a malformed program (one the compiler and static checker
//! never produce) can trigger.

use thiserror::Error;

/// Errors that occur during program execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// A binary opcode applied to incompatible operand types.
    #[error("unsupported operand type(s) for {op}: {lhs} and {rhs}")]
    UnsupportedOperandType {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    /// A unary opcode applied to an incompatible operand type.
    #[error("unsupported operand type for {op}: {operand}")]
    UnsupportedUnaryType {
        op: &'static str,
        operand: &'static str,
    },

    /// BRT/BRF popped something other than a boolean.
    #[error("branch condition is {got}, expected bool")]
    ConditionNotBool { got: &'static str },

    /// Integer or float division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Integer or float modulo by zero.
    #[error("modulo by zero")]
    ModuloByZero,

    /// A closure called with the wrong number of arguments.
    #[error("function expects {expected} argument(s), got {got}")]
    WrongArity { expected: usize, got: usize },

    /// A primitive called with the wrong number of arguments.
    #[error("{name} expects {expected} argument(s), got {got}")]
    PrimitiveArity {
        name: &'static str,
        expected: usize,
        got: usize,
    },

    /// A primitive applied to an operand it does not accept.
    #[error("unsupported operand for {name}: {got}")]
    PrimitiveOperand {
        name: &'static str,
        got: &'static str,
    },

    /// A math primitive left its domain (e.g. sqrt of a negative).
    #[error("math domain error in {primitive}")]
    MathDomain { primitive: &'static str },

    /// CALL/CALLT on a value that is not a closure.
    #[error("call target is {got}, not a closure")]
    CallOnNonClosure { got: &'static str },

    /// Array access outside the array's bounds.
    #[error("array index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: i64, len: usize },

    /// Array access with a non-integer index.
    #[error("array index is {got}, expected int")]
    IndexNotInteger { got: &'static str },

    /// LDAG/STAG on a value that is not an array.
    #[error("array operation on {got}, not an array")]
    NotAnArray { got: &'static str },

    /// NEWA with a negative size.
    #[error("negative array size {size}")]
    NegativeArraySize { size: i64 },

    /// An operand stack grew past the configured cap.
    #[error("operand stack limit exceeded (max_operand_stack = {limit})")]
    OperandStackOverflow { limit: usize },

    /// The non-tail call chain grew past the configured cap.
    #[error("call depth limit exceeded (max_call_depth = {limit})")]
    CallDepthExceeded { limit: usize },

    /// The deterministic fuel bound ran out.
    #[error("instruction limit exceeded (max_instructions = {limit})")]
    InstructionLimitExceeded { limit: u64 },

    /// CALLP/CALLTP with an index the primitive table does not assign.
    #[error("unknown primitive index {index}")]
    UnknownPrimitive { index: u8 },

    // ---- Contract violations ----
    /// Pop on an empty operand stack.
    #[error("operand stack underflow")]
    OperandStackUnderflow,

    /// LDLG/STLG outside the environment frame.
    #[error("environment slot {slot} out of range (size {size})")]
    InvalidSlot { slot: i64, size: usize },

    /// LDPG/STPG walked past the environment chain's root.
    #[error("no parent environment at level {level}")]
    MissingParentFrame { level: i64 },

    /// NEWC or the entry index named a missing function.
    #[error("unknown function index {index}")]
    InvalidFunctionIndex { index: i64 },

    /// LGCS named a missing string.
    #[error("unknown string index {index}")]
    InvalidStringIndex { index: i64 },

    /// The program counter left the function's code.
    #[error("program counter {pc} out of range")]
    PcOutOfRange { pc: i64 },

    /// An instruction argument had the wrong shape.
    #[error("malformed operand for {op}")]
    MalformedOperand { op: &'static str },
}
