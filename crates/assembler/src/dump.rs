//! Human-readable program listing, for the CLI's text output mode.

use std::fmt::Write;

use svml_common::{OperandLayout, SvmProgram};

/// Render a program as a textual listing: one function block per
/// function, one mnemonic per line, the string pool at the end.
pub fn dump(program: &SvmProgram) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; entry: function {}", program.entry_index);

    for (index, function) in program.functions.iter().enumerate() {
        let _ = writeln!(
            out,
            "function {index} (stack={}, env={}, args={}):",
            function.max_stack, function.env_size, function.num_args
        );
        for (at, instr) in function.code.iter().enumerate() {
            let mnemonic = instr.opcode.mnemonic();
            let line = match instr.opcode.operands() {
                OperandLayout::None => mnemonic.to_string(),
                OperandLayout::Float64 => {
                    format!("{mnemonic} {}", instr.arg1.as_float().unwrap_or(0.0))
                }
                OperandLayout::Branch32 => {
                    format!("{mnemonic} {:+}", instr.arg1.as_int().unwrap_or(0))
                }
                OperandLayout::BytePair => format!(
                    "{mnemonic} {} {}",
                    instr.arg1.as_int().unwrap_or(0),
                    instr.arg2.as_int().unwrap_or(0)
                ),
                _ => format!("{mnemonic} {}", instr.arg1.as_int().unwrap_or(0)),
            };
            let _ = writeln!(out, "{at:>5}  {line}");
        }
    }

    if !program.strings.is_empty() {
        let _ = writeln!(out, "strings:");
        for (index, s) in program.strings.iter().enumerate() {
            let _ = writeln!(out, "{index:>5}  {s:?}");
        }
    }
    out
}
