//! Opcode definitions for the SVML instruction set.
//!
//! Every opcode has a stable byte value, a mnemonic, and an operand
//! layout. The layout table is the single source of truth for the
//! on-wire size of each instruction; the assembler and disassembler
//! never hard-code operand widths.

use crate::error::DecodeError;

/// Identifies the operation to perform.
///
/// The `#[repr(u8)]` attribute ensures each variant has a stable byte
/// value. Byte 0x00 is illegal, 0x53 (`JMP`) is reserved and always
/// rejected, and all other unassigned bytes are reserved for future
/// opcodes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Load constant
    /// Push a 32-bit signed integer constant.
    Lgci = 0x01,
    /// Push a 64-bit float constant.
    Lgcf64 = 0x02,
    /// Push boolean false.
    Lgcb0 = 0x03,
    /// Push boolean true.
    Lgcb1 = 0x04,
    /// Push undefined.
    Lgcu = 0x05,
    /// Push null.
    Lgcn = 0x06,
    /// Push a string constant from the program's string pool.
    Lgcs = 0x07,

    // Variable access
    /// Push the value in slot `arg1` of the current environment frame.
    Ldlg = 0x10,
    /// Pop a value into slot `arg1` of the current environment frame.
    Stlg = 0x11,
    /// Variant of LDLG for function-typed slots. Executes identically.
    Ldlf = 0x12,
    /// Variant of STLG for function-typed slots. Executes identically.
    Stlf = 0x13,
    /// Push the value in slot `arg1`, `arg2` parent frames up.
    Ldpg = 0x14,
    /// Pop a value into slot `arg1`, `arg2` parent frames up.
    Stpg = 0x15,

    // Arithmetic
    /// Pop two values, push their sum (or concatenation of two strings).
    Addg = 0x20,
    /// Pop two values, push (second_popped - first_popped).
    Subg = 0x21,
    /// Pop two values, push their product.
    Mulg = 0x22,
    /// Pop two values, push the true-division quotient (always a float).
    Divg = 0x23,
    /// Pop two values, push the floored remainder.
    Modg = 0x24,
    /// Pop one numeric value, push its negation.
    Negg = 0x25,

    // Comparison and logic
    /// Pop two, push true if second_popped < first_popped.
    Ltg = 0x30,
    /// Pop two, push true if second_popped > first_popped.
    Gtg = 0x31,
    /// Pop two, push true if second_popped <= first_popped.
    Leg = 0x32,
    /// Pop two, push true if second_popped >= first_popped.
    Geg = 0x33,
    /// Pop two, push true if equal.
    Eqg = 0x34,
    /// Pop two, push true if not equal.
    Neqg = 0x35,
    /// Pop one boolean, push its negation.
    Notg = 0x36,

    // Operand stack
    /// Pop and discard the top of stack.
    Popg = 0x40,
    /// Push a copy of the top of stack.
    Dup = 0x41,

    // Control flow. Offsets are in instructions, relative to the
    // instruction following the branch. 0x53 (JMP) is reserved.
    /// Unconditional branch.
    Br = 0x50,
    /// Pop a boolean; branch if true.
    Brt = 0x51,
    /// Pop a boolean; branch if false.
    Brf = 0x52,

    // Functions
    /// Push a closure over function `arg1`, capturing the current
    /// environment frame.
    Newc = 0x60,
    /// Call a closure with `arg1` arguments.
    Call = 0x61,
    /// Tail-call a closure with `arg1` arguments, reusing the frame.
    Callt = 0x62,
    /// Call primitive `arg1` with `arg2` arguments.
    Callp = 0x63,
    /// Tail-call primitive `arg1` with `arg2` arguments.
    Calltp = 0x64,
    /// Return the top of stack.
    Retg = 0x65,
    /// Return undefined.
    Retu = 0x66,
    /// Return null.
    Retn = 0x67,

    // Arrays
    /// Pop a size, push a fresh array of that size.
    Newa = 0x70,
    /// Pop an index and an array, push the element.
    Ldag = 0x71,
    /// Pop a value, an index and an array; store the element.
    Stag = 0x72,
}

/// Byte value of the reserved `JMP` opcode. Decoding it is an error.
pub const RESERVED_JMP: u8 = 0x53;

/// All valid opcodes, in definition order. Useful for exhaustive testing.
pub const ALL_OPCODES: [Opcode; 42] = [
    Opcode::Lgci,
    Opcode::Lgcf64,
    Opcode::Lgcb0,
    Opcode::Lgcb1,
    Opcode::Lgcu,
    Opcode::Lgcn,
    Opcode::Lgcs,
    Opcode::Ldlg,
    Opcode::Stlg,
    Opcode::Ldlf,
    Opcode::Stlf,
    Opcode::Ldpg,
    Opcode::Stpg,
    Opcode::Addg,
    Opcode::Subg,
    Opcode::Mulg,
    Opcode::Divg,
    Opcode::Modg,
    Opcode::Negg,
    Opcode::Ltg,
    Opcode::Gtg,
    Opcode::Leg,
    Opcode::Geg,
    Opcode::Eqg,
    Opcode::Neqg,
    Opcode::Notg,
    Opcode::Popg,
    Opcode::Dup,
    Opcode::Br,
    Opcode::Brt,
    Opcode::Brf,
    Opcode::Newc,
    Opcode::Call,
    Opcode::Callt,
    Opcode::Callp,
    Opcode::Calltp,
    Opcode::Retg,
    Opcode::Retu,
    Opcode::Retn,
    Opcode::Newa,
    Opcode::Ldag,
    Opcode::Stag,
];

/// On-wire operand layout of an opcode.
///
/// Widths per the container format: `Int32` and `Branch32` are signed
/// 32-bit little-endian, `Offset32` is an unsigned 32-bit byte offset
/// (a pool or table index in memory), `Float64` is an IEEE 754 double,
/// `Byte` and `BytePair` are unsigned 8-bit operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandLayout {
    /// No operands.
    None,
    /// One i32 immediate (LGCI).
    Int32,
    /// One f64 immediate (LGCF64).
    Float64,
    /// One u32 byte offset on the wire, an index in memory (LGCS, NEWC).
    Offset32,
    /// One i32 branch delta (BR, BRT, BRF).
    Branch32,
    /// One u8 operand.
    Byte,
    /// Two u8 operands.
    BytePair,
}

impl TryFrom<u8> for Opcode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Err(DecodeError::IllegalOpcode),

            0x01 => Ok(Opcode::Lgci),
            0x02 => Ok(Opcode::Lgcf64),
            0x03 => Ok(Opcode::Lgcb0),
            0x04 => Ok(Opcode::Lgcb1),
            0x05 => Ok(Opcode::Lgcu),
            0x06 => Ok(Opcode::Lgcn),
            0x07 => Ok(Opcode::Lgcs),

            0x10 => Ok(Opcode::Ldlg),
            0x11 => Ok(Opcode::Stlg),
            0x12 => Ok(Opcode::Ldlf),
            0x13 => Ok(Opcode::Stlf),
            0x14 => Ok(Opcode::Ldpg),
            0x15 => Ok(Opcode::Stpg),

            0x20 => Ok(Opcode::Addg),
            0x21 => Ok(Opcode::Subg),
            0x22 => Ok(Opcode::Mulg),
            0x23 => Ok(Opcode::Divg),
            0x24 => Ok(Opcode::Modg),
            0x25 => Ok(Opcode::Negg),

            0x30 => Ok(Opcode::Ltg),
            0x31 => Ok(Opcode::Gtg),
            0x32 => Ok(Opcode::Leg),
            0x33 => Ok(Opcode::Geg),
            0x34 => Ok(Opcode::Eqg),
            0x35 => Ok(Opcode::Neqg),
            0x36 => Ok(Opcode::Notg),

            0x40 => Ok(Opcode::Popg),
            0x41 => Ok(Opcode::Dup),

            0x50 => Ok(Opcode::Br),
            0x51 => Ok(Opcode::Brt),
            0x52 => Ok(Opcode::Brf),
            0x53 => Err(DecodeError::ReservedJmp),

            0x60 => Ok(Opcode::Newc),
            0x61 => Ok(Opcode::Call),
            0x62 => Ok(Opcode::Callt),
            0x63 => Ok(Opcode::Callp),
            0x64 => Ok(Opcode::Calltp),
            0x65 => Ok(Opcode::Retg),
            0x66 => Ok(Opcode::Retu),
            0x67 => Ok(Opcode::Retn),

            0x70 => Ok(Opcode::Newa),
            0x71 => Ok(Opcode::Ldag),
            0x72 => Ok(Opcode::Stag),

            // Everything else is reserved: 0x08..=0x0F, 0x16..=0x1F,
            // 0x26..=0x2F, 0x37..=0x3F, 0x42..=0x4F, 0x54..=0x5F,
            // 0x68..=0x6F, 0x73..=0xFF.
            _ => Err(DecodeError::ReservedOpcode(value)),
        }
    }
}

impl Opcode {
    /// Returns the assembly mnemonic for this opcode.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Lgci => "LGCI",
            Opcode::Lgcf64 => "LGCF64",
            Opcode::Lgcb0 => "LGCB0",
            Opcode::Lgcb1 => "LGCB1",
            Opcode::Lgcu => "LGCU",
            Opcode::Lgcn => "LGCN",
            Opcode::Lgcs => "LGCS",
            Opcode::Ldlg => "LDLG",
            Opcode::Stlg => "STLG",
            Opcode::Ldlf => "LDLF",
            Opcode::Stlf => "STLF",
            Opcode::Ldpg => "LDPG",
            Opcode::Stpg => "STPG",
            Opcode::Addg => "ADDG",
            Opcode::Subg => "SUBG",
            Opcode::Mulg => "MULG",
            Opcode::Divg => "DIVG",
            Opcode::Modg => "MODG",
            Opcode::Negg => "NEGG",
            Opcode::Ltg => "LTG",
            Opcode::Gtg => "GTG",
            Opcode::Leg => "LEG",
            Opcode::Geg => "GEG",
            Opcode::Eqg => "EQG",
            Opcode::Neqg => "NEQG",
            Opcode::Notg => "NOTG",
            Opcode::Popg => "POPG",
            Opcode::Dup => "DUP",
            Opcode::Br => "BR",
            Opcode::Brt => "BRT",
            Opcode::Brf => "BRF",
            Opcode::Newc => "NEWC",
            Opcode::Call => "CALL",
            Opcode::Callt => "CALLT",
            Opcode::Callp => "CALLP",
            Opcode::Calltp => "CALLTP",
            Opcode::Retg => "RETG",
            Opcode::Retu => "RETU",
            Opcode::Retn => "RETN",
            Opcode::Newa => "NEWA",
            Opcode::Ldag => "LDAG",
            Opcode::Stag => "STAG",
        }
    }

    /// Returns the operand layout of this opcode.
    pub fn operands(&self) -> OperandLayout {
        match self {
            Opcode::Lgci => OperandLayout::Int32,
            Opcode::Lgcf64 => OperandLayout::Float64,
            Opcode::Lgcs | Opcode::Newc => OperandLayout::Offset32,
            Opcode::Br | Opcode::Brt | Opcode::Brf => OperandLayout::Branch32,
            Opcode::Ldlg
            | Opcode::Stlg
            | Opcode::Ldlf
            | Opcode::Stlf
            | Opcode::Call
            | Opcode::Callt => OperandLayout::Byte,
            Opcode::Ldpg | Opcode::Stpg | Opcode::Callp | Opcode::Calltp => {
                OperandLayout::BytePair
            }
            _ => OperandLayout::None,
        }
    }

    /// On-wire size of an instruction with this opcode, in bytes.
    pub fn encoded_size(&self) -> usize {
        1 + match self.operands() {
            OperandLayout::None => 0,
            OperandLayout::Byte => 1,
            OperandLayout::BytePair => 2,
            OperandLayout::Int32 | OperandLayout::Offset32 | OperandLayout::Branch32 => 4,
            OperandLayout::Float64 => 8,
        }
    }

    /// True for RETG, RETU and RETN.
    pub fn is_return(&self) -> bool {
        matches!(self, Opcode::Retg | Opcode::Retu | Opcode::Retn)
    }

    /// True for BR, BRT and BRF.
    pub fn is_branch(&self) -> bool {
        matches!(self, Opcode::Br | Opcode::Brt | Opcode::Brf)
    }
}
