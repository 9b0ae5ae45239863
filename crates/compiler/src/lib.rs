//! SVML compiler — turns the surface language's AST into executable
//! SVML programs.
//!
//! The pipeline: [`resolve`](resolve::resolve) builds the lexical
//! environment tree and attaches a slot coordinate to every identifier
//! occurrence; [`compile_program`] lowers the tree through per-function
//! [`builder::FunctionBuilder`]s into an
//! [`SvmProgram`](svml_common::SvmProgram), recording a call graph that
//! [`instrument`] turns into recursion and memoization flags.
//!
//! # Usage
//!
//! ```
//! use svml_compiler::ast::AstBuilder;
//! use svml_compiler::{compile_program, CompilerOptions};
//!
//! // def add(x, y): return x + y
//! // add(5, 3)
//! let mut b = AstBuilder::new();
//! let x = b.ident("x");
//! let y = b.ident("y");
//! let sum = b.bin(svml_compiler::ast::BinaryOp::Add, x, y);
//! let ret = b.ret(sum);
//! let def = b.def("add", &["x", "y"], vec![ret]);
//! let five = b.int(5);
//! let three = b.int(3);
//! let call = b.call_name("add", vec![five, three]);
//! let stmt = b.expr_stmt(call);
//! let module = b.module(vec![def, stmt]);
//!
//! let (program, instrumentation) =
//!     compile_program(&module, &CompilerOptions::default()).unwrap();
//! assert_eq!(program.functions.len(), 2);
//! assert!(!instrumentation.profiles[1].is_recursive);
//! ```

pub mod ast;
pub mod builder;
pub mod compile;
pub mod error;
pub mod instrument;
pub mod resolve;

pub use compile::{compile_program, CompilerOptions};
pub use error::CompileError;
pub use instrument::{strongly_connected_components, FunctionProfile, Instrumentation};
pub use resolve::{resolve, Coordinate, Resolution};
