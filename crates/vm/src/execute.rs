//! The fetch-execute loop and opcode dispatch.
//!
//! Each iteration fetches the instruction at the current frame's pc,
//! advances the pc by one instruction, and executes. Branches add
//! their (already pre-increment-adjusted) delta to the pc. Inter-frame
//! effects happen only at calls and returns; returning from the entry
//! frame halts execution with that value as the program's result.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use svml_common::{Instruction, Opcode};
use tracing::{debug, trace};

use crate::error::RuntimeError;
use crate::machine::{CallFrame, Execution, Machine};
use crate::primitives;
use crate::value::{ClosureData, Value};

fn int1(instr: &Instruction) -> Result<i64, RuntimeError> {
    instr.arg1.as_int().ok_or(RuntimeError::MalformedOperand {
        op: instr.opcode.mnemonic(),
    })
}

fn int2(instr: &Instruction) -> Result<i64, RuntimeError> {
    instr.arg2.as_int().ok_or(RuntimeError::MalformedOperand {
        op: instr.opcode.mnemonic(),
    })
}

fn float1(instr: &Instruction) -> Result<f64, RuntimeError> {
    instr.arg1.as_float().ok_or(RuntimeError::MalformedOperand {
        op: instr.opcode.mnemonic(),
    })
}

impl Machine<'_> {
    /// Execute the program to completion.
    pub fn execute(&mut self) -> Result<Execution, RuntimeError> {
        let entry_index = self.program.entry_index;
        let entry = self
            .program
            .functions
            .get(entry_index)
            .ok_or(RuntimeError::InvalidFunctionIndex {
                index: entry_index as i64,
            })?;
        let env = self.alloc_env(entry.env_size, None, Vec::new());
        self.frames.push(CallFrame {
            func: entry_index,
            pc: 0,
            env,
            stack: Vec::new(),
            memo_pending: Vec::new(),
        });

        loop {
            self.executed += 1;
            if self.executed > self.limits.max_instructions {
                return Err(RuntimeError::InstructionLimitExceeded {
                    limit: self.limits.max_instructions,
                });
            }
            let instr = self.fetch()?;
            self.frame_mut().pc += 1;
            if let Some(done) = self.dispatch(&instr)? {
                return Ok(done);
            }
        }
    }

    fn fetch(&self) -> Result<Instruction, RuntimeError> {
        let frame = self.frame();
        let function = self.program.functions.get(frame.func).ok_or(
            RuntimeError::InvalidFunctionIndex {
                index: frame.func as i64,
            },
        )?;
        function
            .code
            .get(frame.pc)
            .copied()
            .ok_or(RuntimeError::PcOutOfRange {
                pc: frame.pc as i64,
            })
    }

    fn dispatch(&mut self, instr: &Instruction) -> Result<Option<Execution>, RuntimeError> {
        match instr.opcode {
            // Constants
            Opcode::Lgci => self.push(Value::Int(int1(instr)?))?,
            Opcode::Lgcf64 => self.push(Value::Float(float1(instr)?))?,
            Opcode::Lgcb0 => self.push(Value::Bool(false))?,
            Opcode::Lgcb1 => self.push(Value::Bool(true))?,
            Opcode::Lgcu => self.push(Value::Undefined)?,
            Opcode::Lgcn => self.push(Value::Null)?,
            Opcode::Lgcs => {
                let index = int1(instr)?;
                let s = usize::try_from(index)
                    .ok()
                    .and_then(|i| self.strings.get(i).cloned())
                    .ok_or(RuntimeError::InvalidStringIndex { index })?;
                self.push(Value::Str(s))?;
            }

            // Variables
            Opcode::Ldlg | Opcode::Ldlf => {
                let slot = int1(instr)?;
                let env = self.frame().env;
                let value = self.load_slot(env, slot)?;
                self.push(value)?;
            }
            Opcode::Stlg | Opcode::Stlf => {
                let slot = int1(instr)?;
                let value = self.pop()?;
                let env = self.frame().env;
                self.store_slot(env, slot, value)?;
            }
            Opcode::Ldpg => {
                let slot = int1(instr)?;
                let level = int2(instr)?;
                let env = self.env_at(self.frame().env, level)?;
                let value = self.load_slot(env, slot)?;
                self.push(value)?;
            }
            Opcode::Stpg => {
                let slot = int1(instr)?;
                let level = int2(instr)?;
                let value = self.pop()?;
                let env = self.env_at(self.frame().env, level)?;
                self.store_slot(env, slot, value)?;
            }

            // Arithmetic
            Opcode::Addg | Opcode::Subg | Opcode::Mulg | Opcode::Divg | Opcode::Modg => {
                let b = self.pop()?;
                let a = self.pop()?;
                let result = arith(instr.opcode, a, b)?;
                self.push(result)?;
            }
            Opcode::Negg => {
                let a = self.pop()?;
                let result = match a {
                    Value::Int(v) => Value::Int(v.wrapping_neg()),
                    Value::Float(v) => Value::Float(-v),
                    other => {
                        return Err(RuntimeError::UnsupportedUnaryType {
                            op: "NEGG",
                            operand: other.type_name(),
                        })
                    }
                };
                self.push(result)?;
            }

            // Comparison and logic
            Opcode::Ltg
            | Opcode::Gtg
            | Opcode::Leg
            | Opcode::Geg
            | Opcode::Eqg
            | Opcode::Neqg => {
                let b = self.pop()?;
                let a = self.pop()?;
                let result = compare(instr.opcode, a, b)?;
                self.push(result)?;
            }
            Opcode::Notg => {
                let a = self.pop()?;
                let result = match a {
                    Value::Bool(v) => Value::Bool(!v),
                    other => {
                        return Err(RuntimeError::UnsupportedUnaryType {
                            op: "NOTG",
                            operand: other.type_name(),
                        })
                    }
                };
                self.push(result)?;
            }

            // Operand stack
            Opcode::Popg => {
                self.pop()?;
            }
            Opcode::Dup => {
                let top = self
                    .frame()
                    .stack
                    .last()
                    .cloned()
                    .ok_or(RuntimeError::OperandStackUnderflow)?;
                self.push(top)?;
            }

            // Control flow
            Opcode::Br => self.branch(int1(instr)?)?,
            Opcode::Brt => {
                let delta = int1(instr)?;
                if self.condition()? {
                    self.branch(delta)?;
                }
            }
            Opcode::Brf => {
                let delta = int1(instr)?;
                if !self.condition()? {
                    self.branch(delta)?;
                }
            }

            // Functions
            Opcode::Newc => self.exec_newc(int1(instr)?)?,
            Opcode::Call => return self.exec_call(int1(instr)?, false),
            Opcode::Callt => return self.exec_call(int1(instr)?, true),
            Opcode::Callp => return self.exec_callp(int1(instr)?, int2(instr)?, false),
            Opcode::Calltp => return self.exec_callp(int1(instr)?, int2(instr)?, true),
            Opcode::Retg => {
                let value = self.pop()?;
                return self.exec_return(value);
            }
            Opcode::Retu => return self.exec_return(Value::Undefined),
            Opcode::Retn => return self.exec_return(Value::Null),

            // Arrays
            Opcode::Newa => {
                let size = self.pop()?;
                let size = match size {
                    Value::Int(v) => v,
                    other => {
                        return Err(RuntimeError::UnsupportedUnaryType {
                            op: "NEWA",
                            operand: other.type_name(),
                        })
                    }
                };
                if size < 0 {
                    return Err(RuntimeError::NegativeArraySize { size });
                }
                let elements = vec![Value::Undefined; size as usize];
                self.push(Value::Array(Rc::new(RefCell::new(elements))))?;
            }
            Opcode::Ldag => {
                let index = self.pop()?;
                let array = self.pop()?;
                let element = array_get(&array, &index)?;
                self.push(element)?;
            }
            Opcode::Stag => {
                let value = self.pop()?;
                let index = self.pop()?;
                let array = self.pop()?;
                array_set(&array, &index, value)?;
            }
        }
        Ok(None)
    }

    fn branch(&mut self, delta: i64) -> Result<(), RuntimeError> {
        // pc was already advanced past the branch, so a delta of zero
        // falls through.
        let target = self.frame().pc as i64 + delta;
        if target < 0 {
            return Err(RuntimeError::PcOutOfRange { pc: target });
        }
        self.frame_mut().pc = target as usize;
        Ok(())
    }

    fn condition(&mut self) -> Result<bool, RuntimeError> {
        match self.pop()? {
            Value::Bool(v) => Ok(v),
            other => Err(RuntimeError::ConditionNotBool {
                got: other.type_name(),
            }),
        }
    }

    fn exec_newc(&mut self, index: i64) -> Result<(), RuntimeError> {
        if index < 0 || index >= self.program.functions.len() as i64 {
            return Err(RuntimeError::InvalidFunctionIndex { index });
        }
        let function = index as usize;
        let memo = self
            .needs_memoization(function)
            .then(|| Rc::new(RefCell::new(HashMap::new())));
        let parent = Some(self.frame().env);
        self.push(Value::Closure(Rc::new(ClosureData {
            function,
            parent,
            memo,
        })))
    }

    fn exec_call(&mut self, n_args: i64, tail: bool) -> Result<Option<Execution>, RuntimeError> {
        if n_args < 0 {
            return Err(RuntimeError::MalformedOperand { op: "CALL" });
        }
        let n = n_args as usize;
        let mut args = Vec::with_capacity(n);
        for _ in 0..n {
            args.push(self.pop()?);
        }
        args.reverse();

        let closure = match self.pop()? {
            Value::Closure(c) => c,
            other => {
                return Err(RuntimeError::CallOnNonClosure {
                    got: other.type_name(),
                })
            }
        };

        let (function, env_size, num_args) = {
            let f = self.program.functions.get(closure.function).ok_or(
                RuntimeError::InvalidFunctionIndex {
                    index: closure.function as i64,
                },
            )?;
            (closure.function, f.env_size, f.num_args)
        };
        if args.len() != num_args {
            return Err(RuntimeError::WrongArity {
                expected: num_args,
                got: args.len(),
            });
        }

        if let Some(cache) = &closure.memo {
            let cached = cache.borrow().get(&args).cloned();
            if let Some(value) = cached {
                trace!(function, "memo hit");
                if tail {
                    return self.exec_return(value);
                }
                self.push(value)?;
                return Ok(None);
            }
        }

        let pending = closure
            .memo
            .as_ref()
            .map(|cache| (Rc::clone(cache), args.clone()));
        let env = self.alloc_env(env_size, closure.parent, args);

        if tail {
            // Frame reuse: depth stays constant over tail chains.
            let frame = self.frame_mut();
            frame.func = function;
            frame.pc = 0;
            frame.env = env;
            frame.stack.clear();
            if let Some(p) = pending {
                frame.memo_pending.push(p);
            }
        } else {
            if self.frames.len() >= self.limits.max_call_depth {
                return Err(RuntimeError::CallDepthExceeded {
                    limit: self.limits.max_call_depth,
                });
            }
            self.frames.push(CallFrame {
                func: function,
                pc: 0,
                env,
                stack: Vec::new(),
                memo_pending: pending.into_iter().collect(),
            });
        }
        Ok(None)
    }

    fn exec_callp(
        &mut self,
        index: i64,
        n_args: i64,
        tail: bool,
    ) -> Result<Option<Execution>, RuntimeError> {
        if !(0..=u8::MAX as i64).contains(&index) || n_args < 0 {
            return Err(RuntimeError::MalformedOperand { op: "CALLP" });
        }
        let n = n_args as usize;
        let mut args = Vec::with_capacity(n);
        for _ in 0..n {
            args.push(self.pop()?);
        }
        args.reverse();

        let result = primitives::call(index as u8, &args, &mut self.stdout)?;
        if tail {
            self.exec_return(result)
        } else {
            self.push(result)?;
            Ok(None)
        }
    }

    fn exec_return(&mut self, value: Value) -> Result<Option<Execution>, RuntimeError> {
        let frame = self.frames.pop().expect("a frame exists while executing");
        for (cache, key) in frame.memo_pending {
            cache.borrow_mut().insert(key, value.clone());
        }
        if self.frames.is_empty() {
            debug!(instructions = self.executed, "execution halted");
            return Ok(Some(Execution {
                value,
                stdout: std::mem::take(&mut self.stdout),
            }));
        }
        self.push(value)?;
        Ok(None)
    }
}

enum Nums {
    Ints(i64, i64),
    Floats(f64, f64),
}

fn nums(a: &Value, b: &Value) -> Option<Nums> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(Nums::Ints(*x, *y)),
        (Value::Int(x), Value::Float(y)) => Some(Nums::Floats(*x as f64, *y)),
        (Value::Float(x), Value::Int(y)) => Some(Nums::Floats(*x, *y as f64)),
        (Value::Float(x), Value::Float(y)) => Some(Nums::Floats(*x, *y)),
        _ => None,
    }
}

fn type_error(op: Opcode, a: &Value, b: &Value) -> RuntimeError {
    RuntimeError::UnsupportedOperandType {
        op: op.mnemonic(),
        lhs: a.type_name(),
        rhs: b.type_name(),
    }
}

/// Floored modulo, matching Python's sign rule.
fn floored_mod(x: i64, y: i64) -> i64 {
    let r = x % y;
    if r != 0 && (r < 0) != (y < 0) {
        r + y
    } else {
        r
    }
}

fn arith(op: Opcode, a: Value, b: Value) -> Result<Value, RuntimeError> {
    if op == Opcode::Addg {
        if let (Value::Str(x), Value::Str(y)) = (&a, &b) {
            let mut s = String::with_capacity(x.len() + y.len());
            s.push_str(x);
            s.push_str(y);
            return Ok(Value::Str(Rc::from(s)));
        }
    }

    let pair = nums(&a, &b).ok_or_else(|| type_error(op, &a, &b))?;
    match (op, pair) {
        (Opcode::Addg, Nums::Ints(x, y)) => Ok(Value::Int(x.wrapping_add(y))),
        (Opcode::Addg, Nums::Floats(x, y)) => Ok(Value::Float(x + y)),
        (Opcode::Subg, Nums::Ints(x, y)) => Ok(Value::Int(x.wrapping_sub(y))),
        (Opcode::Subg, Nums::Floats(x, y)) => Ok(Value::Float(x - y)),
        (Opcode::Mulg, Nums::Ints(x, y)) => Ok(Value::Int(x.wrapping_mul(y))),
        (Opcode::Mulg, Nums::Floats(x, y)) => Ok(Value::Float(x * y)),
        // True division: always a float, like the surface language.
        (Opcode::Divg, Nums::Ints(x, y)) => {
            if y == 0 {
                Err(RuntimeError::DivisionByZero)
            } else {
                Ok(Value::Float(x as f64 / y as f64))
            }
        }
        (Opcode::Divg, Nums::Floats(x, y)) => {
            if y == 0.0 {
                Err(RuntimeError::DivisionByZero)
            } else {
                Ok(Value::Float(x / y))
            }
        }
        (Opcode::Modg, Nums::Ints(x, y)) => {
            if y == 0 {
                Err(RuntimeError::ModuloByZero)
            } else {
                Ok(Value::Int(floored_mod(x, y)))
            }
        }
        (Opcode::Modg, Nums::Floats(x, y)) => {
            if y == 0.0 {
                Err(RuntimeError::ModuloByZero)
            } else {
                Ok(Value::Float(x - y * (x / y).floor()))
            }
        }
        _ => Err(type_error(op, &a, &b)),
    }
}

/// Numeric cross-type equality: `1 == 1.0`. Everything else falls back
/// to `Value`'s equality (strings by value, heap values by identity,
/// cross-type false).
fn values_equal(a: &Value, b: &Value) -> bool {
    match nums(a, b) {
        Some(Nums::Ints(x, y)) => x == y,
        Some(Nums::Floats(x, y)) => x == y,
        None => a == b,
    }
}

fn compare(op: Opcode, a: Value, b: Value) -> Result<Value, RuntimeError> {
    match op {
        Opcode::Eqg => return Ok(Value::Bool(values_equal(&a, &b))),
        Opcode::Neqg => return Ok(Value::Bool(!values_equal(&a, &b))),
        _ => {}
    }

    if let Some(pair) = nums(&a, &b) {
        let result = match pair {
            Nums::Ints(x, y) => match op {
                Opcode::Ltg => x < y,
                Opcode::Gtg => x > y,
                Opcode::Leg => x <= y,
                Opcode::Geg => x >= y,
                _ => return Err(type_error(op, &a, &b)),
            },
            Nums::Floats(x, y) => match op {
                Opcode::Ltg => x < y,
                Opcode::Gtg => x > y,
                Opcode::Leg => x <= y,
                Opcode::Geg => x >= y,
                _ => return Err(type_error(op, &a, &b)),
            },
        };
        return Ok(Value::Bool(result));
    }

    if let (Value::Str(x), Value::Str(y)) = (&a, &b) {
        let result = match op {
            Opcode::Ltg => x < y,
            Opcode::Gtg => x > y,
            Opcode::Leg => x <= y,
            Opcode::Geg => x >= y,
            _ => return Err(type_error(op, &a, &b)),
        };
        return Ok(Value::Bool(result));
    }

    Err(type_error(op, &a, &b))
}

fn array_get(array: &Value, index: &Value) -> Result<Value, RuntimeError> {
    let elements = match array {
        Value::Array(a) => a.borrow(),
        other => {
            return Err(RuntimeError::NotAnArray {
                got: other.type_name(),
            })
        }
    };
    let i = match index {
        Value::Int(i) => *i,
        other => {
            return Err(RuntimeError::IndexNotInteger {
                got: other.type_name(),
            })
        }
    };
    if i < 0 || i >= elements.len() as i64 {
        return Err(RuntimeError::IndexOutOfBounds {
            index: i,
            len: elements.len(),
        });
    }
    Ok(elements[i as usize].clone())
}

fn array_set(array: &Value, index: &Value, value: Value) -> Result<(), RuntimeError> {
    let mut elements = match array {
        Value::Array(a) => a.borrow_mut(),
        other => {
            return Err(RuntimeError::NotAnArray {
                got: other.type_name(),
            })
        }
    };
    let i = match index {
        Value::Int(i) => *i,
        other => {
            return Err(RuntimeError::IndexNotInteger {
                got: other.type_name(),
            })
        }
    };
    if i < 0 || i >= elements.len() as i64 {
        return Err(RuntimeError::IndexOutOfBounds {
            index: i,
            len: elements.len(),
        });
    }
    elements[i as usize] = value;
    Ok(())
}
