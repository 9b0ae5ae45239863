//! Primitive dispatch.
//!
//! Primitives are atomic: they never create frames. `print` writes to
//! the machine's stdout buffer and returns None; the numeric
//! primitives follow Python semantics (`floor`/`ceil` return ints,
//! `round` uses banker's rounding).

use svml_common::primitives::{self as table, Arity};

use crate::error::RuntimeError;
use crate::value::Value;

/// Invoke primitive `index` on `args`.
pub(crate) fn call(
    index: u8,
    args: &[Value],
    stdout: &mut String,
) -> Result<Value, RuntimeError> {
    let name = table::name(index).ok_or(RuntimeError::UnknownPrimitive { index })?;

    match table::arity(index) {
        Some(Arity::Exact(n)) if args.len() != n => {
            return Err(RuntimeError::PrimitiveArity {
                name,
                expected: n,
                got: args.len(),
            });
        }
        Some(Arity::AtLeast(n)) if args.len() < n => {
            return Err(RuntimeError::PrimitiveArity {
                name,
                expected: n,
                got: args.len(),
            });
        }
        _ => {}
    }

    match index {
        table::PRINT => {
            for (i, value) in args.iter().enumerate() {
                if i > 0 {
                    stdout.push(' ');
                }
                stdout.push_str(&value.to_string());
            }
            stdout.push('\n');
            Ok(Value::Null)
        }
        table::ABS => match &args[0] {
            Value::Int(v) => Ok(Value::Int(v.wrapping_abs())),
            Value::Float(v) => Ok(Value::Float(v.abs())),
            other => Err(operand(name, other)),
        },
        table::MIN => pick(name, args, |candidate, best| candidate < best),
        table::MAX => pick(name, args, |candidate, best| candidate > best),
        table::POW => pow(name, &args[0], &args[1]),
        table::SQRT => {
            let x = numeric(name, &args[0])?;
            if x < 0.0 {
                return Err(RuntimeError::MathDomain { primitive: name });
            }
            Ok(Value::Float(x.sqrt()))
        }
        table::FLOOR => match &args[0] {
            Value::Int(v) => Ok(Value::Int(*v)),
            Value::Float(v) => Ok(Value::Int(v.floor() as i64)),
            other => Err(operand(name, other)),
        },
        table::CEIL => match &args[0] {
            Value::Int(v) => Ok(Value::Int(*v)),
            Value::Float(v) => Ok(Value::Int(v.ceil() as i64)),
            other => Err(operand(name, other)),
        },
        table::ROUND => match &args[0] {
            Value::Int(v) => Ok(Value::Int(*v)),
            Value::Float(v) => Ok(Value::Int(v.round_ties_even() as i64)),
            other => Err(operand(name, other)),
        },
        _ => Err(RuntimeError::UnknownPrimitive { index }),
    }
}

fn operand(name: &'static str, got: &Value) -> RuntimeError {
    RuntimeError::PrimitiveOperand {
        name,
        got: got.type_name(),
    }
}

fn numeric(name: &'static str, value: &Value) -> Result<f64, RuntimeError> {
    match value {
        Value::Int(v) => Ok(*v as f64),
        Value::Float(v) => Ok(*v),
        other => Err(operand(name, other)),
    }
}

/// Select one argument by numeric comparison, returning the original
/// value (so `max(3, 7.0)` keeps the float).
fn pick(
    name: &'static str,
    args: &[Value],
    better: fn(f64, f64) -> bool,
) -> Result<Value, RuntimeError> {
    let mut best = args[0].clone();
    let mut best_key = numeric(name, &best)?;
    for candidate in &args[1..] {
        let key = numeric(name, candidate)?;
        if better(key, best_key) {
            best = candidate.clone();
            best_key = key;
        }
    }
    Ok(best)
}

fn pow(name: &'static str, base: &Value, exp: &Value) -> Result<Value, RuntimeError> {
    match (base, exp) {
        (Value::Int(x), Value::Int(y)) if *y >= 0 && *y <= u32::MAX as i64 => {
            Ok(Value::Int(x.wrapping_pow(*y as u32)))
        }
        _ => {
            let x = numeric(name, base)?;
            let y = numeric(name, exp)?;
            Ok(Value::Float(x.powf(y)))
        }
    }
}
