//! Binary container → program parsing.
//!
//! The container does not record a function count, so functions are
//! discovered as the transitive closure of `NEWC` targets reachable
//! from the entry offset. A function's instruction stream ends at the
//! first return that no earlier branch of the same function jumps
//! over — well-formed functions always terminate with a return, so
//! discovery is deterministic.
//!
//! Functions are indexed in ascending byte-offset order; byte-relative
//! branch deltas are converted back to instruction-relative ones
//! through a per-function offset table, and `NEWC`/`LGCS` byte offsets
//! are remapped to table indices.

use std::collections::{BTreeMap, HashMap};

use svml_common::{Arg, Instruction, Opcode, OperandLayout, SvmFunction, SvmProgram};
use tracing::debug;

use crate::assemble::{HEADER_SIZE, MAGIC, MAJOR_VERSION, MINOR_VERSION};
use crate::error::DisassembleError;

struct RawFunction {
    max_stack: u8,
    env_size: u8,
    num_args: u8,
    /// Instructions with raw wire operands: branches hold byte deltas,
    /// NEWC/LGCS hold absolute byte offsets.
    code: Vec<Instruction>,
    /// Absolute byte offset of each instruction, plus one end sentinel.
    offsets: Vec<usize>,
}

/// Parse a binary container back into a program.
pub fn disassemble(bytes: &[u8]) -> Result<SvmProgram, DisassembleError> {
    if bytes.len() < HEADER_SIZE {
        return Err(DisassembleError::Truncated {
            offset: bytes.len(),
        });
    }
    let magic = read_u32(bytes, 0)?;
    if magic != MAGIC {
        return Err(DisassembleError::BadMagic { found: magic });
    }
    let major = read_u16(bytes, 4)?;
    let minor = read_u16(bytes, 6)?;
    if major != MAJOR_VERSION || minor != MINOR_VERSION {
        return Err(DisassembleError::UnsupportedVersion { major, minor });
    }
    let entry_offset = read_u32(bytes, 8)?;
    let num_strings = read_u32(bytes, 12)?;

    // String table.
    let mut strings = Vec::with_capacity(num_strings as usize);
    let mut string_by_offset: HashMap<u32, usize> = HashMap::new();
    let mut pos = HEADER_SIZE;
    for _ in 0..num_strings {
        pos = align4(pos);
        let entry_offset = pos;
        let tag = read_u16(bytes, pos)?;
        if tag != 1 {
            return Err(DisassembleError::BadStringTag {
                offset: entry_offset,
                tag,
            });
        }
        let size = read_u32(bytes, pos + 2)?;
        if size == 0 {
            return Err(DisassembleError::BadStringSize {
                offset: entry_offset,
                size,
            });
        }
        pos += 6;
        let end = pos
            .checked_add(size as usize)
            .filter(|&end| end <= bytes.len())
            .ok_or(DisassembleError::Truncated { offset: pos })?;
        let raw = &bytes[pos..end];
        if raw[raw.len() - 1] != 0 {
            return Err(DisassembleError::UnterminatedString {
                offset: entry_offset,
            });
        }
        let text = std::str::from_utf8(&raw[..raw.len() - 1])
            .map_err(|_| DisassembleError::InvalidUtf8 {
                offset: entry_offset,
            })?;
        string_by_offset.insert(entry_offset as u32, strings.len());
        strings.push(text.to_string());
        pos = end;
    }

    // Function discovery: transitive closure of NEWC targets.
    let mut parsed: BTreeMap<u32, RawFunction> = BTreeMap::new();
    let mut worklist = vec![entry_offset];
    while let Some(offset) = worklist.pop() {
        if parsed.contains_key(&offset) {
            continue;
        }
        let (raw, targets) = parse_function(bytes, offset)?;
        for target in targets {
            if !parsed.contains_key(&target) {
                worklist.push(target);
            }
        }
        parsed.insert(offset, raw);
    }

    // Index functions in ascending offset order.
    let index_by_offset: HashMap<u32, usize> = parsed
        .keys()
        .enumerate()
        .map(|(index, &offset)| (offset, index))
        .collect();
    let entry_index = index_by_offset[&entry_offset];

    let mut functions = Vec::with_capacity(parsed.len());
    for (_, raw) in parsed.iter() {
        functions.push(resolve_function(
            raw,
            &index_by_offset,
            &string_by_offset,
        )?);
    }

    let program = SvmProgram {
        entry_index,
        functions,
        strings,
    };
    debug!(
        functions = program.functions.len(),
        strings = program.strings.len(),
        "disassembled program"
    );
    Ok(program)
}

fn align4(pos: usize) -> usize {
    (pos + 3) & !3
}

fn read_u16(bytes: &[u8], pos: usize) -> Result<u16, DisassembleError> {
    bytes
        .get(pos..pos + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(DisassembleError::Truncated { offset: pos })
}

fn read_u32(bytes: &[u8], pos: usize) -> Result<u32, DisassembleError> {
    bytes
        .get(pos..pos + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(DisassembleError::Truncated { offset: pos })
}

fn read_u64(bytes: &[u8], pos: usize) -> Result<u64, DisassembleError> {
    bytes
        .get(pos..pos + 8)
        .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .ok_or(DisassembleError::Truncated { offset: pos })
}

/// Parse one function record, returning it plus the NEWC byte targets
/// it references.
fn parse_function(
    bytes: &[u8],
    offset: u32,
) -> Result<(RawFunction, Vec<u32>), DisassembleError> {
    if offset % 4 != 0 {
        return Err(DisassembleError::MisalignedFunction { offset });
    }
    let start = offset as usize;
    if start + 4 > bytes.len() {
        return Err(DisassembleError::Truncated { offset: start });
    }
    let max_stack = bytes[start];
    let env_size = bytes[start + 1];
    let num_args = bytes[start + 2];

    let mut code = Vec::new();
    let mut offsets = Vec::new();
    let mut newc_targets = Vec::new();
    // Farthest absolute byte position any branch of this function
    // jumps to; a return at or past it terminates the stream.
    let mut farthest = start + 4;
    let mut pos = start + 4;

    loop {
        if pos >= bytes.len() {
            return Err(DisassembleError::MissingReturn { offset });
        }
        offsets.push(pos);
        let opcode = Opcode::try_from(bytes[pos])
            .map_err(|source| DisassembleError::Opcode { offset: pos, source })?;
        let size = opcode.encoded_size();
        if pos + size > bytes.len() {
            return Err(DisassembleError::Truncated { offset: pos });
        }

        let instr = match opcode.operands() {
            OperandLayout::None => Instruction::nullary(opcode),
            OperandLayout::Int32 => {
                let v = read_u32(bytes, pos + 1)? as i32;
                Instruction::with_int(opcode, v as i64)
            }
            OperandLayout::Float64 => {
                let bits = read_u64(bytes, pos + 1)?;
                Instruction::unary(opcode, Arg::Float(f64::from_bits(bits)))
            }
            OperandLayout::Offset32 => {
                let target = read_u32(bytes, pos + 1)?;
                if opcode == Opcode::Newc {
                    newc_targets.push(target);
                }
                Instruction::with_int(opcode, target as i64)
            }
            OperandLayout::Branch32 => {
                let delta = read_u32(bytes, pos + 1)? as i32 as i64;
                let target = (pos + size) as i64 + delta;
                if target < (start + 4) as i64 {
                    return Err(DisassembleError::BadBranchTarget {
                        offset: pos,
                        target,
                    });
                }
                farthest = farthest.max(target as usize);
                Instruction::with_int(opcode, delta)
            }
            OperandLayout::Byte => Instruction::with_int(opcode, bytes[pos + 1] as i64),
            OperandLayout::BytePair => Instruction::with_ints(
                opcode,
                bytes[pos + 1] as i64,
                bytes[pos + 2] as i64,
            ),
        };
        code.push(instr);
        pos += size;

        if opcode.is_return() && pos > farthest {
            break;
        }
    }
    offsets.push(pos);

    Ok((
        RawFunction {
            max_stack,
            env_size,
            num_args,
            code,
            offsets,
        },
        newc_targets,
    ))
}

/// Convert raw wire operands back to in-memory form.
fn resolve_function(
    raw: &RawFunction,
    index_by_offset: &HashMap<u32, usize>,
    string_by_offset: &HashMap<u32, usize>,
) -> Result<SvmFunction, DisassembleError> {
    let byte_to_index: HashMap<usize, usize> = raw
        .offsets
        .iter()
        .take(raw.code.len())
        .enumerate()
        .map(|(index, &offset)| (offset, index))
        .collect();

    let mut code = Vec::with_capacity(raw.code.len());
    for (at, instr) in raw.code.iter().enumerate() {
        let mut instr = *instr;
        match instr.opcode {
            Opcode::Br | Opcode::Brt | Opcode::Brf => {
                let delta = instr.arg1.as_int().unwrap_or(0);
                let target_byte = raw.offsets[at + 1] as i64 + delta;
                let target = byte_to_index
                    .get(&(target_byte as usize))
                    .copied()
                    .ok_or(DisassembleError::BadBranchTarget {
                        offset: raw.offsets[at],
                        target: target_byte,
                    })?;
                instr.arg1 = Arg::Int(target as i64 - (at as i64 + 1));
            }
            Opcode::Newc => {
                let target = instr.arg1.as_int().unwrap_or(0) as u32;
                let index = index_by_offset.get(&target).copied().ok_or(
                    DisassembleError::UnresolvedFunction {
                        offset: raw.offsets[at],
                        target,
                    },
                )?;
                instr.arg1 = Arg::Int(index as i64);
            }
            Opcode::Lgcs => {
                let target = instr.arg1.as_int().unwrap_or(0) as u32;
                let index = string_by_offset.get(&target).copied().ok_or(
                    DisassembleError::UnresolvedString {
                        offset: raw.offsets[at],
                        target,
                    },
                )?;
                instr.arg1 = Arg::Int(index as i64);
            }
            _ => {}
        }
        code.push(instr);
    }

    Ok(SvmFunction::new(
        raw.max_stack as usize,
        raw.env_size as usize,
        raw.num_args as usize,
        code,
    ))
}
