//! SVML CLI — interpret and inspect compiled programs.
//!
//! Exit codes:
//! - 0: Success
//! - 1: Decode/compile error
//! - 2: Runtime error
//! - 3: I/O error

mod commands;

use std::process;

use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "interpret" => commands::interpret(&args[2..]),
        "disassemble" => commands::disassemble(&args[2..]),
        "--help" | "-h" | "help" => {
            print_usage();
            process::exit(0);
        }
        other => {
            eprintln!("error: unknown command '{other}'");
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    if let Err(code) = result {
        process::exit(code);
    }
}

fn print_usage() {
    eprintln!("Usage: svml <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  interpret <input.svm>                 Disassemble and run a binary program");
    eprintln!("  disassemble <input.svm> [-o out.txt]  Render a binary program as text");
}
