//! Name resolution.
//!
//! Builds the lexical environment tree and attaches a coordinate to
//! every identifier occurrence. Two passes per function scope: a
//! *declare* pass collects parameters and assignment targets in source
//! order (without descending into nested functions), then a *resolve*
//! pass walks the body searching innermost-outward for each use.
//!
//! The module scope plays the role of the global namespace; the
//! distinguished root above it holds only the primitive table. A name
//! whose innermost owner is that root resolves to a primitive
//! coordinate, or fails.
//!
//! Resolution is pure: it never mutates the tree, only records
//! coordinates keyed by [`NameId`].

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use svml_common::primitives;

use crate::ast::{Expr, FnId, Module, Name, NameId, Position, Stmt};
use crate::error::CompileError;

/// Index of an environment in [`Resolution::environments`].
pub type EnvId = usize;

/// How a name was introduced into its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    /// A function parameter.
    Param,
    /// A local, introduced by assignment or `def`.
    Local,
}

/// One declared name inside an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Declaration {
    /// 0-based slot in the owning scope. Parameters come first.
    pub slot: usize,
    pub kind: DeclKind,
}

/// A node in the lexical-scope tree.
#[derive(Debug, Clone)]
pub struct Environment {
    /// The function node this environment belongs to.
    pub fn_id: FnId,
    /// Enclosing scope, `None` for the module scope.
    pub parent: Option<EnvId>,
    /// Declared names in source order; the map order defines slots.
    pub names: IndexMap<String, Declaration>,
}

impl Environment {
    /// Number of environment slots this scope needs.
    pub fn size(&self) -> usize {
        self.names.len()
    }
}

/// Where a name use resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coordinate {
    /// An entry in the fixed primitive table.
    Primitive { index: u8 },
    /// Slot `slot` of the scope `level` parent hops away; 0 means the
    /// frame of the using function itself.
    User { slot: usize, level: usize },
}

/// Output of resolution.
#[derive(Debug, Default)]
pub struct Resolution {
    /// All environments; index 0 is the module scope.
    pub environments: Vec<Environment>,
    /// Environment of each function node.
    pub by_function: HashMap<FnId, EnvId>,
    /// Coordinate of each identifier occurrence.
    pub coordinates: HashMap<NameId, Coordinate>,
}

impl Resolution {
    /// Coordinate attached to an identifier occurrence.
    pub fn coordinate(&self, name: &Name) -> Option<Coordinate> {
        self.coordinates.get(&name.id).copied()
    }

    /// Environment of a function node.
    pub fn env_of(&self, id: FnId) -> Option<EnvId> {
        self.by_function.get(&id).copied()
    }

    /// Walk `level` parent hops from `env`.
    pub fn ancestor(&self, env: EnvId, level: usize) -> Option<EnvId> {
        let mut cur = env;
        for _ in 0..level {
            cur = self.environments[cur].parent?;
        }
        Some(cur)
    }
}

/// `global` / `nonlocal` markings of one scope.
#[derive(Debug, Default)]
struct Escapes {
    globals: HashSet<String>,
    nonlocals: HashSet<String>,
}

enum FnBody<'a> {
    Stmts(&'a [Stmt]),
    Expr(&'a Expr),
}

struct Resolver {
    res: Resolution,
    escapes: Vec<Escapes>,
}

/// Resolve a whole module.
pub fn resolve(module: &Module) -> Result<Resolution, CompileError> {
    let mut resolver = Resolver {
        res: Resolution::default(),
        escapes: Vec::new(),
    };
    resolver.function(module.id, &[], FnBody::Stmts(&module.body), None)?;
    Ok(resolver.res)
}

impl Resolver {
    fn function(
        &mut self,
        fn_id: FnId,
        params: &[Name],
        body: FnBody<'_>,
        parent: Option<EnvId>,
    ) -> Result<EnvId, CompileError> {
        let env = self.res.environments.len();
        self.res.environments.push(Environment {
            fn_id,
            parent,
            names: IndexMap::new(),
        });
        self.escapes.push(Escapes::default());
        self.res.by_function.insert(fn_id, env);

        for param in params {
            if self.res.environments[env].names.contains_key(&param.text) {
                return Err(CompileError::DuplicateDeclaration {
                    name: param.text.clone(),
                    pos: param.pos,
                });
            }
            let slot = self.res.environments[env].names.len();
            self.res.environments[env].names.insert(
                param.text.clone(),
                Declaration {
                    slot,
                    kind: DeclKind::Param,
                },
            );
        }

        match body {
            FnBody::Stmts(stmts) => {
                self.declare_stmts(env, stmts, parent.is_none())?;
                self.resolve_stmts(env, stmts)?;
            }
            FnBody::Expr(expr) => {
                self.resolve_expr(env, expr)?;
            }
        }
        Ok(env)
    }

    /// Declare pass: assignment and `def` targets anywhere in the body
    /// (descending into `if`/`while` arms, not into nested functions).
    fn declare_stmts(
        &mut self,
        env: EnvId,
        stmts: &[Stmt],
        is_module: bool,
    ) -> Result<(), CompileError> {
        for stmt in stmts {
            match stmt {
                Stmt::Assign { target, .. } => self.declare_local(env, target)?,
                Stmt::FunctionDef { name, .. } => self.declare_local(env, name)?,
                Stmt::Global { names, .. } => {
                    // At module level `global` is a no-op.
                    if !is_module {
                        for name in names {
                            self.mark_escape(env, name, true)?;
                        }
                    }
                }
                Stmt::Nonlocal { names, pos } => {
                    if is_module {
                        return Err(CompileError::UnsupportedConstruct {
                            what: "nonlocal at module level",
                            pos: *pos,
                        });
                    }
                    for name in names {
                        self.mark_escape(env, name, false)?;
                    }
                }
                Stmt::If {
                    then_body,
                    else_body,
                    ..
                } => {
                    self.declare_stmts(env, then_body, is_module)?;
                    self.declare_stmts(env, else_body, is_module)?;
                }
                Stmt::While { body, .. } => self.declare_stmts(env, body, is_module)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn declare_local(&mut self, env: EnvId, name: &Name) -> Result<(), CompileError> {
        let escapes = &self.escapes[env];
        if escapes.globals.contains(&name.text) || escapes.nonlocals.contains(&name.text) {
            // Marked as escaping: the slot lives in an outer scope.
            return Ok(());
        }
        let names = &mut self.res.environments[env].names;
        if names.contains_key(&name.text) {
            // The first textual occurrence wins; later targets reuse
            // the same slot.
            return Ok(());
        }
        let slot = names.len();
        names.insert(
            name.text.clone(),
            Declaration {
                slot,
                kind: DeclKind::Local,
            },
        );
        Ok(())
    }

    fn mark_escape(&mut self, env: EnvId, name: &Name, global: bool) -> Result<(), CompileError> {
        // A name already declared here (parameter, or assigned before
        // the marking) conflicts with the escape declaration.
        if self.res.environments[env].names.contains_key(&name.text) {
            return Err(CompileError::DuplicateDeclaration {
                name: name.text.clone(),
                pos: name.pos,
            });
        }
        let escapes = &mut self.escapes[env];
        let conflicting = if global {
            escapes.nonlocals.contains(&name.text)
        } else {
            escapes.globals.contains(&name.text)
        };
        if conflicting {
            return Err(CompileError::DuplicateDeclaration {
                name: name.text.clone(),
                pos: name.pos,
            });
        }
        if global {
            escapes.globals.insert(name.text.clone());
        } else {
            escapes.nonlocals.insert(name.text.clone());
        }
        Ok(())
    }

    fn resolve_stmts(&mut self, env: EnvId, stmts: &[Stmt]) -> Result<(), CompileError> {
        for stmt in stmts {
            match stmt {
                Stmt::Expr { value } => self.resolve_expr(env, value)?,
                Stmt::Assign { target, value } => {
                    self.resolve_expr(env, value)?;
                    self.resolve_use(env, target)?;
                }
                Stmt::FunctionDef {
                    name,
                    params,
                    body,
                    id,
                    ..
                } => {
                    self.resolve_use(env, name)?;
                    self.function(*id, params, FnBody::Stmts(body), Some(env))?;
                }
                Stmt::If {
                    test,
                    then_body,
                    else_body,
                    ..
                } => {
                    self.resolve_expr(env, test)?;
                    self.resolve_stmts(env, then_body)?;
                    self.resolve_stmts(env, else_body)?;
                }
                Stmt::While { test, body, .. } => {
                    self.resolve_expr(env, test)?;
                    self.resolve_stmts(env, body)?;
                }
                Stmt::Return { value, .. } => {
                    if let Some(value) = value {
                        self.resolve_expr(env, value)?;
                    }
                }
                // No names to resolve; the unsupported constructs are
                // rejected with positions by the code generator.
                Stmt::Pass { .. }
                | Stmt::Global { .. }
                | Stmt::Nonlocal { .. }
                | Stmt::AnnAssign { .. }
                | Stmt::Break { .. }
                | Stmt::Continue { .. }
                | Stmt::For { .. }
                | Stmt::Assert { .. }
                | Stmt::Import { .. } => {}
            }
        }
        Ok(())
    }

    fn resolve_expr(&mut self, env: EnvId, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Int { .. }
            | Expr::Float { .. }
            | Expr::Complex { .. }
            | Expr::Bool { .. }
            | Expr::Str { .. }
            | Expr::NoneLit { .. } => Ok(()),
            Expr::Ident(name) => self.resolve_use(env, name),
            Expr::Unary { operand, .. } => self.resolve_expr(env, operand),
            Expr::Binary { left, right, .. } | Expr::Bool2 { left, right, .. } => {
                self.resolve_expr(env, left)?;
                self.resolve_expr(env, right)
            }
            Expr::Ternary {
                test, then, orelse, ..
            } => {
                self.resolve_expr(env, test)?;
                self.resolve_expr(env, then)?;
                self.resolve_expr(env, orelse)
            }
            Expr::Call { callee, args, .. } => {
                self.resolve_expr(env, callee)?;
                for arg in args {
                    self.resolve_expr(env, arg)?;
                }
                Ok(())
            }
            Expr::Lambda {
                params, body, id, ..
            } => {
                self.function(*id, params, FnBody::Expr(body), Some(env))?;
                Ok(())
            }
        }
    }

    fn resolve_use(&mut self, env: EnvId, name: &Name) -> Result<(), CompileError> {
        let coord = self.lookup(env, &name.text, name.pos)?;
        self.res.coordinates.insert(name.id, coord);
        Ok(())
    }

    fn lookup(
        &self,
        env: EnvId,
        text: &str,
        pos: Position,
    ) -> Result<Coordinate, CompileError> {
        let escapes = &self.escapes[env];

        if escapes.globals.contains(text) {
            if let Some(decl) = self.res.environments[0].names.get(text) {
                return Ok(Coordinate::User {
                    slot: decl.slot,
                    level: self.hops_to_module(env),
                });
            }
            return self.primitive_or_undefined(text, pos);
        }

        if escapes.nonlocals.contains(text) {
            // Search strictly between this scope and the module scope.
            let mut level = 1;
            let mut cur = self.res.environments[env].parent;
            while let Some(e) = cur {
                if e == 0 {
                    break;
                }
                if let Some(decl) = self.res.environments[e].names.get(text) {
                    return Ok(Coordinate::User {
                        slot: decl.slot,
                        level,
                    });
                }
                cur = self.res.environments[e].parent;
                level += 1;
            }
            return Err(CompileError::NoBindingForNonlocal {
                name: text.to_string(),
                pos,
            });
        }

        let mut level = 0;
        let mut cur = Some(env);
        while let Some(e) = cur {
            if let Some(decl) = self.res.environments[e].names.get(text) {
                return Ok(Coordinate::User {
                    slot: decl.slot,
                    level,
                });
            }
            cur = self.res.environments[e].parent;
            level += 1;
        }
        self.primitive_or_undefined(text, pos)
    }

    fn primitive_or_undefined(
        &self,
        text: &str,
        pos: Position,
    ) -> Result<Coordinate, CompileError> {
        match primitives::lookup(text) {
            Some(index) => Ok(Coordinate::Primitive { index }),
            None => Err(CompileError::UndefinedName {
                name: text.to_string(),
                pos,
            }),
        }
    }

    fn hops_to_module(&self, env: EnvId) -> usize {
        let mut level = 0;
        let mut cur = env;
        while let Some(parent) = self.res.environments[cur].parent {
            cur = parent;
            level += 1;
        }
        level
    }
}
