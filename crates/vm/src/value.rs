//! Runtime value representation.
//!
//! Values are what live on operand stacks and in environment frames.
//! Scalars and strings compare by value (floats by bit pattern, so
//! `Value` stays well-behaved under `Eq` and `Hash`); closures and
//! arrays compare by identity. `Hash` agrees with `Eq`, which is what
//! lets argument vectors key memo caches.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::machine::EnvId;

/// A closure's memoization cache, keyed by argument vector.
pub type MemoCache = Rc<RefCell<HashMap<Vec<Value>, Value>>>;

/// Heap payload of a closure value.
#[derive(Debug)]
pub struct ClosureData {
    /// Index into the program's function table.
    pub function: usize,
    /// Captured environment frame, `None` for the entry function.
    pub parent: Option<EnvId>,
    /// Present iff instrumentation flagged the function.
    pub memo: Option<MemoCache>,
}

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(Rc<str>),
    Null,
    Undefined,
    Closure(Rc<ClosureData>),
    Array(Rc<RefCell<Vec<Value>>>),
}

impl Value {
    /// The value's type name, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "str",
            Value::Null => "NoneType",
            Value::Undefined => "undefined",
            Value::Closure(_) => "closure",
            Value::Array(_) => "array",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Undefined, Value::Undefined) => true,
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Int(v) => {
                state.write_u8(0);
                v.hash(state);
            }
            Value::Float(v) => {
                state.write_u8(1);
                v.to_bits().hash(state);
            }
            Value::Bool(v) => {
                state.write_u8(2);
                v.hash(state);
            }
            Value::Str(v) => {
                state.write_u8(3);
                v.hash(state);
            }
            Value::Null => state.write_u8(4),
            Value::Undefined => state.write_u8(5),
            Value::Closure(v) => {
                state.write_u8(6);
                (Rc::as_ptr(v) as usize).hash(state);
            }
            Value::Array(v) => {
                state.write_u8(7);
                (Rc::as_ptr(v) as usize).hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => {
                if v.is_nan() {
                    write!(f, "nan")
                } else if v.is_infinite() {
                    write!(f, "{}", if *v > 0.0 { "inf" } else { "-inf" })
                } else if v.fract() == 0.0 && v.abs() < 1e16 {
                    // Floats always show a decimal point.
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            Value::Bool(v) => write!(f, "{}", if *v { "True" } else { "False" }),
            Value::Str(v) => write!(f, "{v}"),
            Value::Null => write!(f, "None"),
            Value::Undefined => write!(f, "undefined"),
            Value::Closure(v) => write!(f, "<closure {}>", v.function),
            Value::Array(v) => {
                write!(f, "[")?;
                for (i, element) in v.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, "]")
            }
        }
    }
}
