//! The fixed primitive table.
//!
//! Primitives are intrinsic functions invoked via `CALLP`/`CALLTP`.
//! They are not closures and hold no environment. The index → name
//! mapping is part of the wire contract and never changes.

/// `print` / `display` — variadic, writes to the interpreter's stdout
/// buffer.
pub const PRINT: u8 = 5;
/// `abs(x)`.
pub const ABS: u8 = 10;
/// `min(...)` — variadic, at least one argument.
pub const MIN: u8 = 20;
/// `max(...)` — variadic, at least one argument.
pub const MAX: u8 = 21;
/// `pow(x, y)`.
pub const POW: u8 = 22;
/// `sqrt(x)`.
pub const SQRT: u8 = 23;
/// `floor(x)`.
pub const FLOOR: u8 = 24;
/// `ceil(x)`.
pub const CEIL: u8 = 25;
/// `round(x)` — banker's rounding.
pub const ROUND: u8 = 26;

/// All assigned primitive indices.
pub const ALL_PRIMITIVES: [u8; 9] = [PRINT, ABS, MIN, MAX, POW, SQRT, FLOOR, CEIL, ROUND];

/// Expected argument count of a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many arguments.
    Exact(usize),
    /// At least this many arguments.
    AtLeast(usize),
}

/// Resolve a source-level name to a primitive index.
pub fn lookup(name: &str) -> Option<u8> {
    match name {
        "print" | "display" => Some(PRINT),
        "abs" => Some(ABS),
        "min" => Some(MIN),
        "max" => Some(MAX),
        "pow" => Some(POW),
        "sqrt" => Some(SQRT),
        "floor" => Some(FLOOR),
        "ceil" => Some(CEIL),
        "round" => Some(ROUND),
        _ => None,
    }
}

/// The canonical name of a primitive index.
pub fn name(index: u8) -> Option<&'static str> {
    match index {
        PRINT => Some("print"),
        ABS => Some("abs"),
        MIN => Some("min"),
        MAX => Some("max"),
        POW => Some("pow"),
        SQRT => Some("sqrt"),
        FLOOR => Some("floor"),
        CEIL => Some("ceil"),
        ROUND => Some("round"),
        _ => None,
    }
}

/// The arity contract of a primitive index.
pub fn arity(index: u8) -> Option<Arity> {
    match index {
        PRINT => Some(Arity::AtLeast(0)),
        MIN | MAX => Some(Arity::AtLeast(1)),
        POW => Some(Arity::Exact(2)),
        ABS | SQRT | FLOOR | CEIL | ROUND => Some(Arity::Exact(1)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_all_names() {
        assert_eq!(lookup("print"), Some(5));
        assert_eq!(lookup("display"), Some(5));
        assert_eq!(lookup("abs"), Some(10));
        assert_eq!(lookup("min"), Some(20));
        assert_eq!(lookup("max"), Some(21));
        assert_eq!(lookup("pow"), Some(22));
        assert_eq!(lookup("sqrt"), Some(23));
        assert_eq!(lookup("floor"), Some(24));
        assert_eq!(lookup("ceil"), Some(25));
        assert_eq!(lookup("round"), Some(26));
        assert_eq!(lookup("fib"), None);
    }

    #[test]
    fn name_roundtrips_through_lookup() {
        for &index in &ALL_PRIMITIVES {
            let n = name(index).unwrap();
            assert_eq!(lookup(n), Some(index), "index {index} name {n}");
        }
    }

    #[test]
    fn unassigned_indices_have_no_name() {
        assert_eq!(name(0), None);
        assert_eq!(name(11), None);
        assert_eq!(name(255), None);
    }

    #[test]
    fn arity_table() {
        assert_eq!(arity(PRINT), Some(Arity::AtLeast(0)));
        assert_eq!(arity(MIN), Some(Arity::AtLeast(1)));
        assert_eq!(arity(MAX), Some(Arity::AtLeast(1)));
        assert_eq!(arity(POW), Some(Arity::Exact(2)));
        assert_eq!(arity(ABS), Some(Arity::Exact(1)));
        assert_eq!(arity(99), None);
    }
}
