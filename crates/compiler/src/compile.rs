//! AST → SVML code generation.
//!
//! One [`compile_program`] call yields a fully relocated
//! [`SvmProgram`] plus per-function instrumentation. The entry
//! function is synthesised from the module body; nested `def`s and
//! lambdas become additional functions, indexed in definition order.
//!
//! Lowering invariants:
//!
//! - every statement leaves exactly one value on the operand stack;
//!   a block of N statements emits N−1 `POPG` separators, and the
//!   empty block emits a single `LGCU`;
//! - a call in tail position (the argument of `return`, or the last
//!   statement of a function, propagated through `if`/ternary arms)
//!   emits the `CALLT`/`CALLTP` variant, followed by a `RETG` the
//!   interpreter never reaches;
//! - a function body that completes without `return` returns its
//!   block value;
//! - statements after one that always returns are unreachable and are
//!   not emitted.

use std::collections::{BTreeSet, HashMap};

use svml_common::{Arg, Instruction, Opcode, SvmProgram};
use tracing::{debug, trace};

use crate::ast::{BinaryOp, BoolOp, Expr, FnId, Module, Name, Position, Stmt, UnaryOp};
use crate::builder::FunctionBuilder;
use crate::error::CompileError;
use crate::instrument::{build_instrumentation, Instrumentation, ProfileDraft};
use crate::resolve::{resolve, Coordinate, EnvId, Resolution};

/// Knobs for compilation.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Run the call-graph cycle detector.
    pub enable_recursion_detection: bool,
    /// Consume the detector's output to flag memoizable functions.
    pub enable_memoization: bool,
    /// Maximum parameter count for a memoizable function.
    pub memo_param_threshold: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            enable_recursion_detection: true,
            enable_memoization: true,
            memo_param_threshold: 10,
        }
    }
}

/// Whether a statement can fall through to the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Completes,
    /// Every path through the statement returns.
    Diverges,
}

/// What a lowered expression left behind, beyond its stack value.
struct ExprInfo {
    /// Set when the expression was a direct lambda: the function index
    /// of the closure it pushes. Used for static call-graph edges.
    closure_of: Option<usize>,
}

impl ExprInfo {
    fn plain() -> Self {
        Self { closure_of: None }
    }
}

struct Compiler {
    resolution: Resolution,
    builders: Vec<FunctionBuilder>,
    drafts: Vec<ProfileDraft>,
    strings: Vec<String>,
    string_index: HashMap<String, usize>,
    /// (owning environment, slot) → function index, from `def` and
    /// `name = lambda` forms.
    static_bindings: HashMap<(EnvId, usize), usize>,
    /// (caller function, owning environment, slot) of each named call.
    pending_edges: Vec<(usize, EnvId, usize)>,
}

/// Compile a module into a program and its instrumentation.
pub fn compile_program(
    module: &Module,
    options: &CompilerOptions,
) -> Result<(SvmProgram, Instrumentation), CompileError> {
    let resolution = resolve(module)?;
    let mut compiler = Compiler {
        resolution,
        builders: Vec::new(),
        drafts: Vec::new(),
        strings: Vec::new(),
        string_index: HashMap::new(),
        static_bindings: HashMap::new(),
        pending_edges: Vec::new(),
    };

    let entry_index = compiler.compile_module(module)?;

    let n = compiler.builders.len();
    let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    for &(caller, env, slot) in &compiler.pending_edges {
        if let Some(&target) = compiler.static_bindings.get(&(env, slot)) {
            edges[caller].insert(target);
        }
    }

    let mut functions = Vec::with_capacity(n);
    for builder in compiler.builders {
        functions.push(builder.build()?);
    }

    let instrumentation = build_instrumentation(compiler.drafts, &edges, options);
    let program = SvmProgram {
        entry_index,
        functions,
        strings: compiler.strings,
    };
    debug!(
        functions = program.functions.len(),
        strings = program.strings.len(),
        "compiled program"
    );
    Ok((program, instrumentation))
}

impl Compiler {
    fn b(&mut self, f: usize) -> &mut FunctionBuilder {
        &mut self.builders[f]
    }

    fn env_of(&self, id: FnId) -> Result<EnvId, CompileError> {
        self.resolution
            .env_of(id)
            .ok_or_else(|| CompileError::Internal("function node has no environment".to_string()))
    }

    fn coordinate(&self, name: &Name) -> Result<Coordinate, CompileError> {
        self.resolution.coordinate(name).ok_or_else(|| {
            CompileError::Internal(format!("no coordinate attached to '{}'", name.text))
        })
    }

    fn intern(&mut self, s: &str) -> usize {
        if let Some(&index) = self.string_index.get(s) {
            return index;
        }
        let index = self.strings.len();
        self.strings.push(s.to_string());
        self.string_index.insert(s.to_string(), index);
        index
    }

    fn new_function(&mut self, name: String, params: &[Name], env: EnvId) -> usize {
        let num_args = params.len();
        let env_size = self.resolution.environments[env].size().max(num_args);
        let index = self.builders.len();
        self.builders.push(FunctionBuilder::new(num_args, env_size));
        self.drafts.push(ProfileDraft {
            name,
            parameters: params.iter().map(|p| p.text.clone()).collect(),
            ..ProfileDraft::default()
        });
        index
    }

    fn compile_module(&mut self, module: &Module) -> Result<usize, CompileError> {
        let env = self.env_of(module.id)?;
        let f = self.new_function("<module>".to_string(), &[], env);
        let flow = self.lower_block(f, env, &module.body, true)?;
        if flow == Flow::Completes {
            self.b(f).emit(Instruction::nullary(Opcode::Retg));
        }
        Ok(f)
    }

    fn compile_def(
        &mut self,
        name: &str,
        params: &[Name],
        body: &[Stmt],
        id: FnId,
    ) -> Result<usize, CompileError> {
        let env = self.env_of(id)?;
        let f = self.new_function(name.to_string(), params, env);
        let flow = self.lower_block(f, env, body, true)?;
        if flow == Flow::Completes {
            // Fall-off return: the body's block value is the result.
            self.b(f).emit(Instruction::nullary(Opcode::Retg));
        }
        trace!(function = name, index = f, "lowered function");
        Ok(f)
    }

    fn compile_lambda(&mut self, params: &[Name], body: &Expr, id: FnId) -> Result<usize, CompileError> {
        let env = self.env_of(id)?;
        let f = self.new_function("<lambda>".to_string(), params, env);
        self.lower_expr(f, env, body, true)?;
        self.b(f).emit(Instruction::nullary(Opcode::Retg));
        trace!(index = f, "lowered lambda");
        Ok(f)
    }

    /// Lower a statement list. The block value is the value of the
    /// last statement executed.
    fn lower_block(
        &mut self,
        f: usize,
        env: EnvId,
        stmts: &[Stmt],
        tail: bool,
    ) -> Result<Flow, CompileError> {
        if stmts.is_empty() {
            self.b(f).emit(Instruction::nullary(Opcode::Lgcu));
            return Ok(Flow::Completes);
        }
        let last = stmts.len() - 1;
        for (i, stmt) in stmts.iter().enumerate() {
            let flow = self.lower_stmt(f, env, stmt, tail && i == last)?;
            if flow == Flow::Diverges {
                // Everything after this statement is unreachable.
                return Ok(Flow::Diverges);
            }
            if i != last {
                self.b(f).emit(Instruction::nullary(Opcode::Popg));
            }
        }
        Ok(Flow::Completes)
    }

    fn lower_stmt(
        &mut self,
        f: usize,
        env: EnvId,
        stmt: &Stmt,
        tail: bool,
    ) -> Result<Flow, CompileError> {
        match stmt {
            Stmt::Expr { value } => {
                self.lower_expr(f, env, value, tail)?;
                Ok(Flow::Completes)
            }
            Stmt::Assign { target, value } => {
                let info = self.lower_expr(f, env, value, false)?;
                if let Some(child) = info.closure_of {
                    self.record_binding(env, target, child)?;
                }
                self.emit_store(f, env, target)?;
                self.b(f).emit(Instruction::nullary(Opcode::Lgcu));
                Ok(Flow::Completes)
            }
            Stmt::FunctionDef {
                name,
                params,
                body,
                id,
                ..
            } => {
                let child = self.compile_def(&name.text, params, body, *id)?;
                self.b(f)
                    .emit(Instruction::with_int(Opcode::Newc, child as i64));
                self.record_binding(env, name, child)?;
                self.emit_store(f, env, name)?;
                self.b(f).emit(Instruction::nullary(Opcode::Lgcu));
                Ok(Flow::Completes)
            }
            Stmt::If {
                test,
                then_body,
                else_body,
                ..
            } => self.lower_if(f, env, test, then_body, else_body, tail),
            Stmt::While { test, body, .. } => self.lower_while(f, env, test, body),
            Stmt::Return { value, .. } => {
                match value {
                    Some(value) => {
                        self.lower_expr(f, env, value, true)?;
                        self.b(f).emit(Instruction::nullary(Opcode::Retg));
                    }
                    None => self.b(f).emit(Instruction::nullary(Opcode::Retn)),
                }
                Ok(Flow::Diverges)
            }
            Stmt::Pass { .. } | Stmt::Global { .. } | Stmt::Nonlocal { .. } => {
                self.b(f).emit(Instruction::nullary(Opcode::Lgcu));
                Ok(Flow::Completes)
            }
            Stmt::AnnAssign { pos } => Err(CompileError::UnsupportedConstruct {
                what: "annotated assignment",
                pos: *pos,
            }),
            Stmt::Break { pos } => Err(CompileError::UnsupportedConstruct {
                what: "break",
                pos: *pos,
            }),
            Stmt::Continue { pos } => Err(CompileError::UnsupportedConstruct {
                what: "continue",
                pos: *pos,
            }),
            Stmt::For { pos } => Err(CompileError::UnsupportedConstruct {
                what: "for",
                pos: *pos,
            }),
            Stmt::Assert { pos } => Err(CompileError::UnsupportedConstruct {
                what: "assert",
                pos: *pos,
            }),
            Stmt::Import { pos } => Err(CompileError::UnsupportedConstruct {
                what: "import",
                pos: *pos,
            }),
        }
    }

    fn lower_if(
        &mut self,
        f: usize,
        env: EnvId,
        test: &Expr,
        then_body: &[Stmt],
        else_body: &[Stmt],
        tail: bool,
    ) -> Result<Flow, CompileError> {
        let base = self.b(f).depth();
        self.lower_expr(f, env, test, false)?;
        let else_label = self.b(f).emit_jump(Opcode::Brf, None);

        let flow_then = self.lower_block(f, env, then_body, tail)?;
        let end_label = if flow_then == Flow::Completes {
            Some(self.b(f).emit_jump(Opcode::Br, None))
        } else {
            None
        };

        self.b(f).mark(else_label);
        self.b(f).set_depth(base);
        // A missing else still produces the statement value.
        let flow_else = self.lower_block(f, env, else_body, tail)?;

        if let Some(end) = end_label {
            self.b(f).mark(end);
        }

        if flow_then == Flow::Diverges && flow_else == Flow::Diverges {
            Ok(Flow::Diverges)
        } else {
            self.b(f).set_depth(base + 1);
            Ok(Flow::Completes)
        }
    }

    fn lower_while(
        &mut self,
        f: usize,
        env: EnvId,
        test: &Expr,
        body: &[Stmt],
    ) -> Result<Flow, CompileError> {
        let base = self.b(f).depth();
        let loop_label = self.b(f).mark_here();
        self.lower_expr(f, env, test, false)?;
        let end_label = self.b(f).emit_jump(Opcode::Brf, None);

        let flow_body = self.lower_block(f, env, body, false)?;
        if flow_body == Flow::Completes {
            // The body's block value is discarded each iteration.
            self.b(f).emit(Instruction::nullary(Opcode::Popg));
            self.b(f).emit_jump(Opcode::Br, Some(loop_label));
        }

        self.b(f).mark(end_label);
        self.b(f).set_depth(base);
        // A while statement yields undefined.
        self.b(f).emit(Instruction::nullary(Opcode::Lgcu));
        Ok(Flow::Completes)
    }

    fn lower_expr(
        &mut self,
        f: usize,
        env: EnvId,
        expr: &Expr,
        tail: bool,
    ) -> Result<ExprInfo, CompileError> {
        match expr {
            Expr::Int { value, .. } => {
                // The narrowest fitting constant: i32 range uses LGCI,
                // anything wider goes through the float encoding.
                if *value >= i32::MIN as i64 && *value <= i32::MAX as i64 {
                    self.b(f).emit(Instruction::with_int(Opcode::Lgci, *value));
                } else {
                    self.b(f)
                        .emit(Instruction::unary(Opcode::Lgcf64, Arg::Float(*value as f64)));
                }
                Ok(ExprInfo::plain())
            }
            Expr::Float { value, .. } => {
                self.b(f)
                    .emit(Instruction::unary(Opcode::Lgcf64, Arg::Float(*value)));
                Ok(ExprInfo::plain())
            }
            Expr::Complex { pos } => Err(CompileError::UnsupportedLiteral { pos: *pos }),
            Expr::Bool { value, .. } => {
                let op = if *value { Opcode::Lgcb1 } else { Opcode::Lgcb0 };
                self.b(f).emit(Instruction::nullary(op));
                Ok(ExprInfo::plain())
            }
            Expr::Str { value, .. } => {
                let index = self.intern(value);
                self.b(f)
                    .emit(Instruction::with_int(Opcode::Lgcs, index as i64));
                Ok(ExprInfo::plain())
            }
            Expr::NoneLit { .. } => {
                self.b(f).emit(Instruction::nullary(Opcode::Lgcn));
                Ok(ExprInfo::plain())
            }
            Expr::Ident(name) => {
                self.emit_load(f, name)?;
                Ok(ExprInfo::plain())
            }
            Expr::Unary { op, operand, .. } => {
                self.lower_expr(f, env, operand, false)?;
                let opcode = match op {
                    UnaryOp::Not => Opcode::Notg,
                    UnaryOp::Neg => Opcode::Negg,
                };
                self.b(f).emit(Instruction::nullary(opcode));
                Ok(ExprInfo::plain())
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                self.lower_expr(f, env, left, false)?;
                self.lower_expr(f, env, right, false)?;
                self.b(f).emit(Instruction::nullary(binary_opcode(*op)));
                Ok(ExprInfo::plain())
            }
            Expr::Bool2 {
                op, left, right, ..
            } => self.lower_boolop(f, env, *op, left, right, tail),
            Expr::Ternary {
                test, then, orelse, ..
            } => {
                let base = self.b(f).depth();
                self.lower_expr(f, env, test, false)?;
                let else_label = self.b(f).emit_jump(Opcode::Brf, None);
                self.lower_expr(f, env, then, tail)?;
                let end_label = self.b(f).emit_jump(Opcode::Br, None);
                self.b(f).mark(else_label);
                self.b(f).set_depth(base);
                self.lower_expr(f, env, orelse, tail)?;
                self.b(f).mark(end_label);
                Ok(ExprInfo::plain())
            }
            Expr::Call {
                callee, args, pos, ..
            } => self.lower_call(f, env, callee, args, *pos, tail),
            Expr::Lambda {
                params, body, id, ..
            } => {
                let child = self.compile_lambda(params, body, *id)?;
                self.b(f)
                    .emit(Instruction::with_int(Opcode::Newc, child as i64));
                Ok(ExprInfo {
                    closure_of: Some(child),
                })
            }
        }
    }

    /// `a and b` lowers as `a ? b : False`; `a or b` as `a ? True : b`.
    fn lower_boolop(
        &mut self,
        f: usize,
        env: EnvId,
        op: BoolOp,
        left: &Expr,
        right: &Expr,
        tail: bool,
    ) -> Result<ExprInfo, CompileError> {
        self.lower_expr(f, env, left, false)?;
        let else_label = self.b(f).emit_jump(Opcode::Brf, None);
        let base = self.b(f).depth();
        match op {
            BoolOp::And => {
                self.lower_expr(f, env, right, tail)?;
                let end_label = self.b(f).emit_jump(Opcode::Br, None);
                self.b(f).mark(else_label);
                self.b(f).set_depth(base);
                self.b(f).emit(Instruction::nullary(Opcode::Lgcb0));
                self.b(f).mark(end_label);
            }
            BoolOp::Or => {
                self.b(f).emit(Instruction::nullary(Opcode::Lgcb1));
                let end_label = self.b(f).emit_jump(Opcode::Br, None);
                self.b(f).mark(else_label);
                self.b(f).set_depth(base);
                self.lower_expr(f, env, right, tail)?;
                self.b(f).mark(end_label);
            }
        }
        Ok(ExprInfo::plain())
    }

    fn lower_call(
        &mut self,
        f: usize,
        env: EnvId,
        callee: &Expr,
        args: &[Expr],
        pos: Position,
        tail: bool,
    ) -> Result<ExprInfo, CompileError> {
        if args.len() > u8::MAX as usize {
            return Err(CompileError::TooManyArguments {
                count: args.len(),
                pos,
            });
        }
        let n = args.len() as i64;

        match callee {
            Expr::Ident(name) => {
                self.drafts[f].called_names.insert(name.text.clone());
                if let Coordinate::Primitive { index } = self.coordinate(name)? {
                    // Primitives are called directly; no load.
                    for arg in args {
                        self.lower_expr(f, env, arg, false)?;
                    }
                    let op = if tail { Opcode::Calltp } else { Opcode::Callp };
                    self.b(f)
                        .emit(Instruction::with_ints(op, index as i64, n));
                    return Ok(ExprInfo::plain());
                }
                if let Coordinate::User { slot, level } = self.coordinate(name)? {
                    if let Some(owner) = self.resolution.ancestor(env, level) {
                        self.pending_edges.push((f, owner, slot));
                    }
                }
                self.emit_load(f, name)?;
            }
            other => {
                self.lower_expr(f, env, other, false)?;
            }
        }

        for arg in args {
            self.lower_expr(f, env, arg, false)?;
        }
        let op = if tail { Opcode::Callt } else { Opcode::Call };
        self.b(f).emit(Instruction::with_int(op, n));
        Ok(ExprInfo::plain())
    }

    fn emit_load(&mut self, f: usize, name: &Name) -> Result<(), CompileError> {
        match self.coordinate(name)? {
            Coordinate::User { slot, level: 0 } => {
                self.b(f)
                    .emit(Instruction::with_int(Opcode::Ldlg, slot as i64));
                Ok(())
            }
            Coordinate::User { slot, level } => {
                self.b(f)
                    .emit(Instruction::with_ints(Opcode::Ldpg, slot as i64, level as i64));
                Ok(())
            }
            Coordinate::Primitive { .. } => Err(CompileError::PrimitiveReference {
                name: name.text.clone(),
                pos: name.pos,
            }),
        }
    }

    fn emit_store(&mut self, f: usize, _env: EnvId, name: &Name) -> Result<(), CompileError> {
        match self.coordinate(name)? {
            Coordinate::User { slot, level: 0 } => {
                self.b(f)
                    .emit(Instruction::with_int(Opcode::Stlg, slot as i64));
                Ok(())
            }
            Coordinate::User { slot, level } => {
                self.drafts[f].stores_outer = true;
                self.b(f)
                    .emit(Instruction::with_ints(Opcode::Stpg, slot as i64, level as i64));
                Ok(())
            }
            Coordinate::Primitive { .. } => Err(CompileError::PrimitiveReference {
                name: name.text.clone(),
                pos: name.pos,
            }),
        }
    }

    fn record_binding(
        &mut self,
        env: EnvId,
        name: &Name,
        function: usize,
    ) -> Result<(), CompileError> {
        if let Coordinate::User { slot, level } = self.coordinate(name)? {
            if let Some(owner) = self.resolution.ancestor(env, level) {
                self.static_bindings.insert((owner, slot), function);
            }
        }
        Ok(())
    }
}

fn binary_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Addg,
        BinaryOp::Sub => Opcode::Subg,
        BinaryOp::Mul => Opcode::Mulg,
        BinaryOp::Div => Opcode::Divg,
        BinaryOp::Mod => Opcode::Modg,
        BinaryOp::Lt => Opcode::Ltg,
        BinaryOp::Gt => Opcode::Gtg,
        BinaryOp::Le => Opcode::Leg,
        BinaryOp::Ge => Opcode::Geg,
        BinaryOp::Eq => Opcode::Eqg,
        BinaryOp::NotEq => Opcode::Neqg,
    }
}
