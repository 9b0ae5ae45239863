//! Per-function instrumentation records.
//!
//! The compiler populates these while lowering; the interpreter
//! consults them at `NEWC` to decide whether a closure gets a memo
//! cache. The binary container does not carry them, so a program
//! loaded from disk runs without memoization unless the embedder
//! passes records along.

use std::collections::BTreeSet;

/// Instrumentation record for one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionProfile {
    /// Source name; `<module>` for the entry, `<lambda>` for lambdas.
    pub name: String,
    /// Index into the program's function table.
    pub function_index: usize,
    /// Parameter names in order.
    pub parameters: Vec<String>,
    /// Names this function calls.
    pub called_names: BTreeSet<String>,
    /// True if the function calls itself, directly or transitively.
    pub is_recursive: bool,
    /// True if closures over this function get a memo cache.
    pub needs_memoization: bool,
}

/// Per-program instrumentation, indexed by function index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instrumentation {
    pub profiles: Vec<FunctionProfile>,
}

impl Instrumentation {
    /// Whether closures over function `index` should carry a memo cache.
    pub fn needs_memoization(&self, index: usize) -> bool {
        self.profiles
            .get(index)
            .is_some_and(|p| p.needs_memoization)
    }

    /// The profile of function `index`, if any.
    pub fn profile(&self, index: usize) -> Option<&FunctionProfile> {
        self.profiles.get(index)
    }

    /// The profile of the function named `name`, if any.
    pub fn by_name(&self, name: &str) -> Option<&FunctionProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }
}
