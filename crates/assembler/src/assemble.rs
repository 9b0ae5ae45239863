//! Program → binary container serialisation.
//!
//! Layout: a fixed 16-byte header, the deduplicated string table, then
//! the functions, each aligned to 4 bytes. `LGCS` and `NEWC` operands
//! become absolute byte offsets patched through a hole list once the
//! final layout is known; branch operands become signed byte deltas
//! measured from the end of the branch instruction.

use std::collections::HashMap;

use svml_common::{Instruction, Opcode, OperandLayout, SvmFunction, SvmProgram};
use tracing::debug;

use crate::error::AssembleError;

/// Container magic, little-endian on the wire.
pub const MAGIC: u32 = 0x5005_ACAD;
/// Container major version.
pub const MAJOR_VERSION: u16 = 0;
/// Container minor version.
pub const MINOR_VERSION: u16 = 0;
/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 16;

/// What a patched u32 in a function body refers to.
enum HoleTarget {
    /// Index into the program's string pool.
    Str(usize),
    /// Index into the program's function table.
    Func(usize),
}

struct Hole {
    /// Position of the u32 within the function's code bytes.
    pos: usize,
    target: HoleTarget,
}

struct FnImage {
    code: Vec<u8>,
    holes: Vec<Hole>,
}

/// Serialise a program to the binary container format.
pub fn assemble(program: &SvmProgram) -> Result<Vec<u8>, AssembleError> {
    if program.entry_index >= program.functions.len() {
        return Err(AssembleError::EntryOutOfRange {
            index: program.entry_index,
        });
    }

    let mut images = Vec::with_capacity(program.functions.len());
    for (findex, function) in program.functions.iter().enumerate() {
        images.push(encode_function(findex, function, program)?);
    }

    // Deduplicate the string table, preserving first-occurrence order.
    let mut unique: Vec<&str> = Vec::new();
    for s in &program.strings {
        if !unique.contains(&s.as_str()) {
            unique.push(s);
        }
    }

    let mut buf = Vec::new();
    buf.extend_from_slice(&MAGIC.to_le_bytes());
    buf.extend_from_slice(&MAJOR_VERSION.to_le_bytes());
    buf.extend_from_slice(&MINOR_VERSION.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // entry offset, patched below
    buf.extend_from_slice(&(unique.len() as u32).to_le_bytes());

    // String table: align-4, u16 tag, u32 size (bytes + NUL), bytes, NUL.
    let mut offset_of_content: HashMap<&str, u32> = HashMap::new();
    for s in &unique {
        align4(&mut buf);
        offset_of_content.insert(s, buf.len() as u32);
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.extend_from_slice(&((s.len() + 1) as u32).to_le_bytes());
        buf.extend_from_slice(s.as_bytes());
        buf.push(0);
    }
    let string_offsets: Vec<u32> = program
        .strings
        .iter()
        .map(|s| offset_of_content[s.as_str()])
        .collect();

    // Functions: align-4, u8 stack, u8 env, u8 args, u8 pad, code.
    let mut fn_offsets = Vec::with_capacity(program.functions.len());
    let mut patches: Vec<(usize, HoleTarget)> = Vec::new();
    for (findex, (function, image)) in program.functions.iter().zip(images).enumerate() {
        align4(&mut buf);
        fn_offsets.push(buf.len() as u32);
        buf.push(header_byte(findex, "max_stack", function.max_stack)?);
        buf.push(header_byte(findex, "env_size", function.env_size)?);
        buf.push(header_byte(findex, "num_args", function.num_args)?);
        buf.push(0);
        let code_start = buf.len();
        buf.extend_from_slice(&image.code);
        for hole in image.holes {
            patches.push((code_start + hole.pos, hole.target));
        }
    }

    for (pos, target) in patches {
        let value = match target {
            // Index validity was checked during encoding.
            HoleTarget::Str(index) => string_offsets[index],
            HoleTarget::Func(index) => fn_offsets[index],
        };
        buf[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
    }

    let entry = fn_offsets[program.entry_index].to_le_bytes();
    buf[8..12].copy_from_slice(&entry);

    debug!(
        bytes = buf.len(),
        functions = program.functions.len(),
        strings = unique.len(),
        "assembled program"
    );
    Ok(buf)
}

fn align4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

fn header_byte(function: usize, what: &'static str, value: usize) -> Result<u8, AssembleError> {
    u8::try_from(value).map_err(|_| AssembleError::FunctionLimit {
        function,
        what,
        value,
    })
}

fn encode_function(
    findex: usize,
    function: &SvmFunction,
    program: &SvmProgram,
) -> Result<FnImage, AssembleError> {
    let code = &function.code;

    // Instruction byte offsets within the function body, plus one
    // sentinel for the end; needed to turn instruction-relative branch
    // deltas into byte-relative ones.
    let mut offsets = Vec::with_capacity(code.len() + 1);
    let mut pos = 0usize;
    for instr in code {
        offsets.push(pos);
        pos += instr.opcode.encoded_size();
    }
    offsets.push(pos);

    let mut out = Vec::with_capacity(pos);
    let mut holes = Vec::new();

    for (at, instr) in code.iter().enumerate() {
        let bad = AssembleError::BadOperand { function: findex, at };
        out.push(instr.opcode as u8);
        match instr.opcode.operands() {
            OperandLayout::None => {}
            OperandLayout::Int32 => {
                let v = instr.arg1.as_int().ok_or_else(|| bad.clone())?;
                let v = i32::try_from(v).map_err(|_| bad.clone())?;
                out.extend_from_slice(&v.to_le_bytes());
            }
            OperandLayout::Float64 => {
                let v = instr.arg1.as_float().ok_or_else(|| bad.clone())?;
                out.extend_from_slice(&v.to_bits().to_le_bytes());
            }
            OperandLayout::Offset32 => {
                let index = instr.arg1.as_int().ok_or_else(|| bad.clone())?;
                let target = hole_target(findex, at, instr, index, program)?;
                holes.push(Hole {
                    pos: out.len(),
                    target,
                });
                out.extend_from_slice(&0u32.to_le_bytes());
            }
            OperandLayout::Branch32 => {
                let delta = instr.arg1.as_int().ok_or_else(|| bad.clone())?;
                let target = at as i64 + 1 + delta;
                if target < 0 || target >= code.len() as i64 {
                    return Err(AssembleError::BranchOutOfRange {
                        function: findex,
                        at,
                        target,
                    });
                }
                let byte_delta = offsets[target as usize] as i64 - offsets[at + 1] as i64;
                let byte_delta = i32::try_from(byte_delta).map_err(|_| bad.clone())?;
                out.extend_from_slice(&byte_delta.to_le_bytes());
            }
            OperandLayout::Byte => {
                let v = instr.arg1.as_int().ok_or_else(|| bad.clone())?;
                let v = u8::try_from(v).map_err(|_| bad.clone())?;
                out.push(v);
            }
            OperandLayout::BytePair => {
                let a = instr.arg1.as_int().ok_or_else(|| bad.clone())?;
                let b = instr.arg2.as_int().ok_or_else(|| bad.clone())?;
                let a = u8::try_from(a).map_err(|_| bad.clone())?;
                let b = u8::try_from(b).map_err(|_| bad)?;
                out.push(a);
                out.push(b);
            }
        }
    }

    Ok(FnImage { code: out, holes })
}

fn hole_target(
    findex: usize,
    at: usize,
    instr: &Instruction,
    index: i64,
    program: &SvmProgram,
) -> Result<HoleTarget, AssembleError> {
    match instr.opcode {
        Opcode::Lgcs => {
            if index < 0 || index >= program.strings.len() as i64 {
                return Err(AssembleError::StringOutOfRange {
                    function: findex,
                    at,
                    index,
                });
            }
            Ok(HoleTarget::Str(index as usize))
        }
        Opcode::Newc => {
            if index < 0 || index >= program.functions.len() as i64 {
                return Err(AssembleError::FunctionOutOfRange {
                    function: findex,
                    at,
                    index,
                });
            }
            Ok(HoleTarget::Func(index as usize))
        }
        _ => Err(AssembleError::BadOperand { function: findex, at }),
    }
}
