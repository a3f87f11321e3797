//! The per-query analysis record: the cursor path, and the static and
//! dynamic environment of every expression along it.
//!
//! Dynamic reconstruction starts from the base environment at the
//! outermost path element and applies one transition per parent/child step
//! toward the cursor. Only the branches on the path are materialised, and
//! every thunk placement swallows constructor errors, so one broken
//! sibling never defeats a query.

use std::rc::Rc;

use nix_eval::{Env, SourceUnit, Value, ValueRef, value_ref};
use nix_parser::{AttrCursor, Expr, ExprId, FormalCursor};

use crate::diagnostics::Diagnostic;

/// One element of the cursor path.
pub struct PathEntry {
    /// The expression node.
    pub expr: ExprId,
    /// Synthetic or inferred lambda argument, when the node is a lambda.
    pub lambda_arg: Option<ValueRef>,
    /// The runtime environment the node would be evaluated in.
    pub env: Option<Rc<Env>>,
}

impl PathEntry {
    pub(crate) fn new(expr: ExprId) -> Self {
        PathEntry { expr, lambda_arg: None, env: None }
    }
}

/// Everything the query layer needs about one cursor position.
pub struct Analysis {
    /// The document's parse state.
    pub unit: Rc<SourceUnit>,
    /// Cursor path, innermost (index 0) to outermost (last). Empty iff
    /// the position lies outside the root's range.
    pub entries: Vec<PathEntry>,
    /// Selection component under the cursor.
    pub attr: Option<AttrCursor>,
    /// Formal parameter under the cursor.
    pub formal: Option<FormalCursor>,
    /// Inherit clause under the cursor (`Some(None)` is a plain inherit).
    pub inherit: Option<Option<ExprId>>,
    /// Evaluation errors captured while inferring lambda arguments.
    pub diagnostics: Vec<Diagnostic>,
}

impl Analysis {
    /// The node under the cursor.
    pub fn innermost(&self) -> Option<&PathEntry> {
        self.entries.first()
    }

    /// The runtime environment of the innermost node, defaulting to the
    /// base environment through `or_base`.
    pub fn innermost_env(&self, base: Rc<Env>) -> Rc<Env> {
        self.entries
            .first()
            .and_then(|entry| entry.env.clone())
            .unwrap_or(base)
    }
}

/// The environment transition from `parent` to `child`, mirroring how the
/// evaluator would have entered the child.
///
/// `lambda_arg` is the parent lambda's argument, when one was inferred.
/// Every thunk placement catches errors and substitutes null; this
/// function never fails.
pub fn update_env(
    eval: &nix_eval::Evaluator,
    unit: &Rc<SourceUnit>,
    parent: ExprId,
    child: ExprId,
    up: Rc<Env>,
    lambda_arg: Option<ValueRef>,
) -> Rc<Env> {
    let expr_ref = |id: ExprId| nix_eval::ExprRef { unit: unit.clone(), id };
    let null = || value_ref(Value::Null);

    match unit.result.ast.expr(parent) {
        Expr::Let { attrs, .. } => {
            let env2 = Env::new(Some(up.clone()), attrs.attrs.len());
            // An inherited binding's value expression evaluates in the
            // enclosing scope; everything else in the new one.
            let mut use_super_env = false;
            for (displ, def) in attrs.attrs.values().enumerate() {
                let value_env = if def.inherited() { &up } else { &env2 };
                let v = eval
                    .maybe_thunk(&expr_ref(def.expr), value_env)
                    .unwrap_or_else(|_| null());
                env2.set_slot(displ, v);
                if def.expr == child && def.inherited() {
                    use_super_env = true;
                }
            }
            if use_super_env { up } else { env2 }
        }
        Expr::Lambda(lambda) => {
            let env2 = Env::new(Some(up), lambda.env_size().max(1));
            let arg = lambda_arg.unwrap_or_else(null);
            let Some(formals) = &lambda.formals else {
                env2.set_slot(0, arg);
                return env2;
            };
            let set = match eval.force_attrs(&arg) {
                Ok(set) => set,
                // Argument of the wrong shape: leave every slot null.
                Err(_) => return env2,
            };
            let mut displ = 0usize;
            if lambda.arg.is_some() {
                env2.set_slot(displ, arg.clone());
                displ += 1;
            }
            for formal in &formals.formals {
                let v = match set.get(formal.name) {
                    Some(attr) => attr.value.clone(),
                    None => match formal.default {
                        Some(default) => eval
                            .maybe_thunk(&expr_ref(default), &env2)
                            .unwrap_or_else(|_| null()),
                        None => null(),
                    },
                };
                env2.set_slot(displ, v);
                displ += 1;
            }
            env2
        }
        Expr::Attrs(attrs) if attrs.recursive => {
            let env2 = Env::new(Some(up.clone()), attrs.attrs.len());
            for (displ, def) in attrs.attrs.values().enumerate() {
                let value_env = if def.inherited() { &up } else { &env2 };
                let v = eval
                    .maybe_thunk(&expr_ref(def.expr), value_env)
                    .unwrap_or_else(|_| null());
                env2.set_slot(displ, v);
            }
            env2
        }
        Expr::With { attrs, body } => {
            if child != *body {
                return up;
            }
            let slot = eval
                .maybe_thunk(&expr_ref(*attrs), &up)
                .unwrap_or_else(|_| null());
            Env::with_frame(Some(up), expr_ref(*attrs), slot)
        }
        _ => up,
    }
}
