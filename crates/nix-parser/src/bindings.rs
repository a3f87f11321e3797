//! Static environment construction.
//!
//! A single depth-first walk assigns every node the lexical scope chain
//! visible to it and resolves each variable reference to a
//! `(level, displacement)` pair, or marks it as resolvable only through an
//! enclosing `with`. The walk is total: it never raises on partial trees,
//! and `undefined variable` diagnostics are only emitted when no
//! with-marker is in scope.

use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::ast::{Expr, ExprAttrs, ExprId, ParseDiagnostic, ParseResult};
use crate::symbol::{Symbol, SymbolTable};

/// One lexical scope. `with_expr` marks the sentinel scope of a
/// `with E; body` block; such scopes have no variables of their own.
#[derive(Debug)]
pub struct StaticScope {
    /// The `with` expression this scope stands for, if any.
    pub with_expr: Option<ExprId>,
    /// Name → slot index, in declaration order.
    pub vars: IndexMap<Symbol, usize>,
    /// Enclosing scope.
    pub up: Option<Rc<StaticScope>>,
}

impl StaticScope {
    /// A scope with the given variables in slot order.
    pub fn with_vars(vars: IndexMap<Symbol, usize>, up: Option<Rc<StaticScope>>) -> Rc<Self> {
        Rc::new(StaticScope { with_expr: None, vars, up })
    }

    /// The sentinel scope of a `with` block.
    pub fn with_marker(with_expr: ExprId, up: Option<Rc<StaticScope>>) -> Rc<Self> {
        Rc::new(StaticScope { with_expr: Some(with_expr), vars: IndexMap::new(), up })
    }

    /// Whether this is a with-marker scope.
    pub fn is_with(&self) -> bool {
        self.with_expr.is_some()
    }

    /// Slot of a name within this scope alone.
    pub fn find(&self, sym: Symbol) -> Option<usize> {
        self.vars.get(&sym).copied()
    }
}

/// Where a variable reference resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarResolution {
    /// A slot `displ` in the scope `level` steps up the chain.
    Static {
        /// Scope distance from the reference.
        level: usize,
        /// Slot index within that scope.
        displ: usize,
    },
    /// Only resolvable at runtime through the nearest `with`, `level`
    /// steps up the chain.
    FromWith {
        /// Scope distance of the nearest with-marker.
        level: usize,
    },
}

/// Result of the binding walk over one document.
#[derive(Debug, Default)]
pub struct Bindings {
    scopes: Vec<Option<Rc<StaticScope>>>,
    vars: FxHashMap<ExprId, VarResolution>,
    /// Static-binding diagnostics (undefined variables).
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl Bindings {
    /// The static scope assigned to a node. Set for every node reachable
    /// from the root passed to [`bind_vars`].
    pub fn scope(&self, id: ExprId) -> Option<&Rc<StaticScope>> {
        self.scopes.get(id.index()).and_then(|s| s.as_ref())
    }

    /// The resolution of a variable node, if it was found anywhere.
    pub fn var(&self, id: ExprId) -> Option<VarResolution> {
        self.vars.get(&id).copied()
    }
}

/// Walk the tree from its root, assigning scopes and resolving variables.
pub fn bind_vars(
    result: &ParseResult,
    base: Rc<StaticScope>,
    symbols: &SymbolTable,
) -> Bindings {
    let mut bindings = Bindings {
        scopes: vec![None; result.ast.len()],
        vars: FxHashMap::default(),
        diagnostics: Vec::new(),
    };
    let mut binder = Binder { result, symbols, bindings: &mut bindings };
    binder.bind(result.root, &base);
    bindings
}

struct Binder<'a> {
    result: &'a ParseResult,
    symbols: &'a SymbolTable,
    bindings: &'a mut Bindings,
}

impl<'a> Binder<'a> {
    fn bind(&mut self, id: ExprId, env: &Rc<StaticScope>) {
        self.bindings.scopes[id.index()] = Some(env.clone());

        match self.result.ast.expr(id) {
            Expr::Var(sym) => self.bind_var(id, *sym, env),
            Expr::Attrs(attrs) => self.bind_attrs(attrs, env, None),
            Expr::Let { attrs, body } => self.bind_attrs(attrs, env, Some(*body)),
            Expr::Lambda(lambda) => {
                let mut vars = IndexMap::new();
                let mut displ = 0usize;
                if let Some(arg) = lambda.arg {
                    vars.insert(arg, displ);
                    displ += 1;
                }
                if let Some(formals) = &lambda.formals {
                    for formal in &formals.formals {
                        // A duplicate formal keeps its first slot.
                        if !vars.contains_key(&formal.name) {
                            vars.insert(formal.name, displ);
                            displ += 1;
                        }
                    }
                }
                let new_env = StaticScope::with_vars(vars, Some(env.clone()));
                if let Some(formals) = &lambda.formals {
                    for formal in &formals.formals {
                        if let Some(default) = formal.default {
                            self.bind(default, &new_env);
                        }
                    }
                }
                self.bind(lambda.body, &new_env);
            }
            Expr::With { attrs, body } => {
                self.bind(*attrs, env);
                let new_env = StaticScope::with_marker(id, Some(env.clone()));
                self.bind(*body, &new_env);
            }
            _ => {
                let mut children = Vec::new();
                self.result.ast.expr(id).children(&mut children);
                for child in children {
                    self.bind(child, env);
                }
            }
        }
    }

    /// `rec { }` and `let` introduce one slot per attribute; inherited
    /// value expressions bind under the enclosing scope.
    fn bind_attrs(&mut self, attrs: &ExprAttrs, env: &Rc<StaticScope>, body: Option<ExprId>) {
        let recursive = attrs.recursive || body.is_some();
        if !recursive {
            for def in attrs.attrs.values() {
                self.bind(def.expr, env);
            }
            for dynamic in &attrs.dynamic_attrs {
                self.bind(dynamic.name_expr, env);
                self.bind(dynamic.value_expr, env);
            }
            return;
        }

        let mut vars = IndexMap::new();
        for (displ, sym) in attrs.attrs.keys().enumerate() {
            vars.insert(*sym, displ);
        }
        let new_env = StaticScope::with_vars(vars, Some(env.clone()));

        for def in attrs.attrs.values() {
            let value_env = if def.inherited() { env } else { &new_env };
            self.bind(def.expr, value_env);
        }
        for dynamic in &attrs.dynamic_attrs {
            self.bind(dynamic.name_expr, &new_env);
            self.bind(dynamic.value_expr, &new_env);
        }
        if let Some(body) = body {
            self.bind(body, &new_env);
        }
    }

    fn bind_var(&mut self, id: ExprId, sym: Symbol, env: &Rc<StaticScope>) {
        let mut level = 0usize;
        let mut with_level = None;
        let mut cursor = Some(env);
        while let Some(scope) = cursor {
            if scope.is_with() {
                if with_level.is_none() {
                    with_level = Some(level);
                }
            } else if let Some(displ) = scope.find(sym) {
                self.bindings.vars.insert(id, VarResolution::Static { level, displ });
                return;
            }
            cursor = scope.up.as_ref();
            level += 1;
        }

        match with_level {
            Some(level) => {
                self.bindings.vars.insert(id, VarResolution::FromWith { level });
            }
            None => {
                let message =
                    format!("undefined variable '{}'", self.symbols.name(sym));
                let range = self.result.range(id);
                self.bindings.diagnostics.push(ParseDiagnostic { message, range });
            }
        }
    }
}
