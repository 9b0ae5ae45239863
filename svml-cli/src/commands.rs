//! CLI command implementations.

use std::fs;

use svml_vm::ExecutionLimits;

/// Disassemble and run a .svm binary program.
///
/// Prints the program's stdout, then the final value. Runs without
/// instrumentation: the container does not carry memoization flags.
pub fn interpret(args: &[String]) -> Result<(), i32> {
    if args.is_empty() {
        eprintln!("error: interpret requires an input file");
        eprintln!("Usage: svml interpret <input.svm>");
        return Err(1);
    }

    let input = &args[0];
    let program = read_program(input)?;

    match svml_vm::run(&program, &ExecutionLimits::default(), None) {
        Ok(outcome) => {
            print!("{}", outcome.stdout);
            println!("{}", outcome.value);
            Ok(())
        }
        Err(e) => {
            eprintln!("runtime error: {e}");
            Err(2)
        }
    }
}

/// Disassemble a .svm binary to a textual listing.
pub fn disassemble(args: &[String]) -> Result<(), i32> {
    if args.is_empty() {
        eprintln!("error: disassemble requires an input file");
        eprintln!("Usage: svml disassemble <input.svm> [-o out.txt]");
        return Err(1);
    }

    let input = &args[0];
    let output = if args.len() >= 3 && args[1] == "-o" {
        Some(args[2].clone())
    } else {
        None
    };

    let program = read_program(input)?;
    let text = svml_assembler::dump(&program);

    match output {
        Some(path) => {
            fs::write(&path, &text).map_err(|e| {
                eprintln!("error: cannot write '{path}': {e}");
                3
            })?;
            eprintln!("wrote {} -> {path}", input);
        }
        None => print!("{text}"),
    }
    Ok(())
}

/// Read and parse a .svm binary file.
fn read_program(path: &str) -> Result<svml_common::SvmProgram, i32> {
    let bytes = fs::read(path).map_err(|e| {
        eprintln!("error: cannot read '{path}': {e}");
        3
    })?;

    svml_assembler::disassemble(&bytes).map_err(|e| {
        eprintln!("error: invalid binary: {e}");
        1
    })
}
