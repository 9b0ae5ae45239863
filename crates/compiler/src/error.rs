//! Compile-time errors.
//!
//! Every error carries the source position of the offending token.
//! Compile errors are fatal for the whole program.

use thiserror::Error;

use crate::ast::Position;

/// Errors raised during resolution or code generation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A name could not be resolved in any enclosing scope or the
    /// primitive table.
    #[error("{pos}: undefined name '{name}'")]
    UndefinedName { name: String, pos: Position },

    /// A name is declared twice in one scope with conflicting kinds
    /// (for example both a parameter and a `global`).
    #[error("{pos}: conflicting declarations of '{name}'")]
    DuplicateDeclaration { name: String, pos: Position },

    /// A `nonlocal` name has no binding in any enclosing function scope.
    #[error("{pos}: no binding for nonlocal '{name}'")]
    NoBindingForNonlocal { name: String, pos: Position },

    /// A syntactic construct outside the supported subset.
    #[error("{pos}: unsupported construct: {what}")]
    UnsupportedConstruct { what: &'static str, pos: Position },

    /// A literal kind the code generator cannot express.
    #[error("{pos}: unsupported literal")]
    UnsupportedLiteral { pos: Position },

    /// A primitive name used as a value rather than called.
    #[error("{pos}: primitive '{name}' can only be called")]
    PrimitiveReference { name: String, pos: Position },

    /// A function declares more environment slots than a frame can hold.
    #[error("function needs {count} environment slots, limit is 255")]
    TooManyLocals { count: usize },

    /// A call site passes more arguments than the instruction encoding
    /// can carry.
    #[error("{pos}: call with {count} arguments, limit is 255")]
    TooManyArguments { count: usize, pos: Position },

    /// An internal invariant of the code generator failed.
    #[error("internal compiler error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_undefined_name() {
        let e = CompileError::UndefinedName {
            name: "x".to_string(),
            pos: Position { line: 3, col: 7 },
        };
        assert_eq!(e.to_string(), "line 3, column 7: undefined name 'x'");
    }

    #[test]
    fn display_unsupported_construct() {
        let e = CompileError::UnsupportedConstruct {
            what: "break",
            pos: Position { line: 1, col: 0 },
        };
        assert_eq!(e.to_string(), "line 1, column 0: unsupported construct: break");
    }

    #[test]
    fn display_too_many_locals() {
        let e = CompileError::TooManyLocals { count: 300 };
        assert_eq!(
            e.to_string(),
            "function needs 300 environment slots, limit is 255"
        );
    }
}
