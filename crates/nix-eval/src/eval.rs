//! The best-effort lazy evaluator.
//!
//! Every operation returns `Result`; no call panics or terminates the
//! process. Values are forced at their head only, and a thunk that fails
//! to force is restored so a later query can retry it.

use std::rc::Rc;

use nix_lexer::Position;
use nix_parser::{
    AttrName, Bindings, Expr, ExprLambda, ParseResult, StaticScope, Symbol, SymbolTable,
    VarResolution, bind_vars,
};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use tracing::debug;

use crate::builtins;
use crate::env::Env;
use crate::error::EvalError;
use crate::source::{ExprRef, SourceUnit};
use crate::value::{Attr, AttrSet, Closure, PrimOp, Value, ValueRef, value_ref};

/// The evaluator: base environment, symbol table, and import cache.
///
/// One instance is owned by the server and lives for the whole process;
/// forced values survive across queries by design.
pub struct Evaluator {
    symbols: Rc<SymbolTable>,
    base_scope: Rc<StaticScope>,
    base_env: Rc<Env>,
    import_cache: RefCell<FxHashMap<String, ValueRef>>,
}

impl Evaluator {
    /// Create an evaluator with the standard base environment.
    pub fn new(symbols: Rc<SymbolTable>) -> Self {
        let (base_scope, base_env) = builtins::build_base(&symbols);
        Evaluator { symbols, base_scope, base_env, import_cache: RefCell::new(FxHashMap::default()) }
    }

    /// The shared symbol table.
    pub fn symbols(&self) -> &Rc<SymbolTable> {
        &self.symbols
    }

    /// The static scope of the base environment.
    pub fn base_scope(&self) -> Rc<StaticScope> {
        self.base_scope.clone()
    }

    /// The base runtime environment.
    pub fn base_env(&self) -> Rc<Env> {
        self.base_env.clone()
    }

    /// Bind a parse result against the base scope, producing a shareable
    /// source unit.
    pub fn bind_unit(&self, result: ParseResult, path: Option<String>) -> Rc<SourceUnit> {
        let bindings: Bindings = bind_vars(&result, self.base_scope(), &self.symbols);
        Rc::new(SourceUnit { path, result, bindings })
    }

    // ===== Forcing =====

    /// Force a value at its head. On failure the thunk is restored so the
    /// value can be retried by a later query.
    pub fn force(&self, v: &ValueRef) -> Result<(), EvalError> {
        let pending = {
            match &*v.borrow() {
                Value::Thunk { expr, env } => Some((expr.clone(), env.clone())),
                Value::Blackhole => {
                    return Err(EvalError::new("infinite recursion encountered"));
                }
                _ => None,
            }
        };
        let Some((expr, env)) = pending else { return Ok(()) };
        *v.borrow_mut() = Value::Blackhole;
        match self.eval(&expr, &env) {
            Ok(result) => {
                let value = result.borrow().clone();
                *v.borrow_mut() = value;
                Ok(())
            }
            Err(err) => {
                *v.borrow_mut() = Value::Thunk { expr, env };
                Err(err)
            }
        }
    }

    /// Force and expect an attribute set.
    pub fn force_attrs(&self, v: &ValueRef) -> Result<AttrSet, EvalError> {
        self.force(v)?;
        match &*v.borrow() {
            Value::Attrs(set) => Ok(set.clone()),
            other => Err(EvalError::new(format!(
                "value is a {} while a set was expected",
                other.type_name()
            ))),
        }
    }

    /// Force and expect a list.
    pub fn force_list(&self, v: &ValueRef) -> Result<Vec<ValueRef>, EvalError> {
        self.force(v)?;
        match &*v.borrow() {
            Value::List(items) => Ok(items.clone()),
            other => Err(EvalError::new(format!(
                "value is a {} while a list was expected",
                other.type_name()
            ))),
        }
    }

    /// Force and expect a string (paths coerce).
    pub fn force_string(&self, v: &ValueRef) -> Result<String, EvalError> {
        self.force(v)?;
        match &*v.borrow() {
            Value::Str(s) => Ok(s.clone()),
            Value::Path(p) => Ok(p.clone()),
            other => Err(EvalError::new(format!(
                "value is a {} while a string was expected",
                other.type_name()
            ))),
        }
    }

    /// Force and expect a boolean.
    pub fn force_bool(&self, v: &ValueRef) -> Result<bool, EvalError> {
        self.force(v)?;
        match &*v.borrow() {
            Value::Bool(b) => Ok(*b),
            other => Err(EvalError::new(format!(
                "value is a {} while a Boolean was expected",
                other.type_name()
            ))),
        }
    }

    /// Force and expect an integer.
    pub fn force_int(&self, v: &ValueRef) -> Result<i64, EvalError> {
        self.force(v)?;
        match &*v.borrow() {
            Value::Int(n) => Ok(*n),
            other => Err(EvalError::new(format!(
                "value is a {} while an integer was expected",
                other.type_name()
            ))),
        }
    }

    // ===== Thunks =====

    /// Thunk an expression, evaluating trivially cheap literals eagerly.
    pub fn maybe_thunk(&self, expr: &ExprRef, env: &Rc<Env>) -> Result<ValueRef, EvalError> {
        match expr.expr() {
            Expr::Int(n) => Ok(value_ref(Value::Int(*n))),
            Expr::Float(f) => Ok(value_ref(Value::Float(*f))),
            Expr::Str(s) => Ok(value_ref(Value::Str(s.clone()))),
            Expr::Path(p) => Ok(value_ref(Value::Path(p.clone()))),
            _ => Ok(value_ref(Value::Thunk { expr: expr.clone(), env: env.clone() })),
        }
    }

    // ===== Evaluation =====

    /// Evaluate an expression in an environment.
    pub fn eval(&self, expr: &ExprRef, env: &Rc<Env>) -> Result<ValueRef, EvalError> {
        match expr.expr() {
            Expr::Int(n) => Ok(value_ref(Value::Int(*n))),
            Expr::Float(f) => Ok(value_ref(Value::Float(*f))),
            Expr::Str(s) => Ok(value_ref(Value::Str(s.clone()))),
            Expr::Path(p) => Ok(value_ref(Value::Path(p.clone()))),
            Expr::Var(sym) => self.eval_var(expr, env, *sym),
            Expr::Attrs(attrs) => self.eval_attrs(expr, env, attrs),
            Expr::List(elems) => {
                let mut items = Vec::with_capacity(elems.len());
                for elem in elems {
                    items.push(self.maybe_thunk(&expr.at(*elem), env)?);
                }
                Ok(value_ref(Value::List(items)))
            }
            Expr::Let { attrs, body } => {
                let env2 = Env::new(Some(env.clone()), attrs.attrs.len());
                for (displ, def) in attrs.attrs.values().enumerate() {
                    let value_env = if def.inherited() { env } else { &env2 };
                    let v = self.maybe_thunk(&expr.at(def.expr), value_env)?;
                    env2.set_slot(displ, v);
                }
                self.eval(&expr.at(*body), &env2)
            }
            Expr::Lambda(_) => {
                Ok(value_ref(Value::Lambda(Closure { expr: expr.clone(), env: env.clone() })))
            }
            Expr::Call { fun, args } => {
                let mut f = self.eval(&expr.at(*fun), env)?;
                for arg in args {
                    let arg_v = self.maybe_thunk(&expr.at(*arg), env)?;
                    f = self.call_with_pos(&f, arg_v, Some(expr.pos()))?;
                }
                Ok(f)
            }
            Expr::Select { base, path, default } => {
                self.eval_select(expr, env, *base, path, *default)
            }
            Expr::HasAttr { base, path } => {
                let mut v = self.eval(&expr.at(*base), env)?;
                for component in path {
                    let sym = self.attr_name_symbol(expr, env, component)?;
                    self.force(&v)?;
                    let next = match &*v.borrow() {
                        Value::Attrs(set) => set.get(sym).map(|attr| attr.value.clone()),
                        _ => None,
                    };
                    match next {
                        Some(next) => v = next,
                        None => return Ok(value_ref(Value::Bool(false))),
                    }
                }
                Ok(value_ref(Value::Bool(true)))
            }
            Expr::With { attrs, body } => {
                let slot = self.maybe_thunk(&expr.at(*attrs), env)?;
                let env2 = Env::with_frame(Some(env.clone()), expr.at(*attrs), slot);
                self.eval(&expr.at(*body), &env2)
            }
            Expr::If { cond, then, else_ } => {
                let c = self.eval(&expr.at(*cond), env)?;
                let branch = if self.force_bool(&c)? { *then } else { *else_ };
                self.eval(&expr.at(branch), env)
            }
            Expr::Assert { cond, body } => {
                let c = self.eval(&expr.at(*cond), env)?;
                if !self.force_bool(&c)? {
                    return Err(EvalError::at("assertion failed", expr.pos()));
                }
                self.eval(&expr.at(*body), env)
            }
            Expr::OpNot(e) => {
                let v = self.eval(&expr.at(*e), env)?;
                Ok(value_ref(Value::Bool(!self.force_bool(&v)?)))
            }
            Expr::ConcatStrings { force_string, parts } => {
                self.eval_concat(expr, env, *force_string, parts)
            }
            Expr::OpEq(a, b) => {
                let va = self.eval(&expr.at(*a), env)?;
                let vb = self.eval(&expr.at(*b), env)?;
                Ok(value_ref(Value::Bool(self.eq_values(&va, &vb)?)))
            }
            Expr::OpNeq(a, b) => {
                let va = self.eval(&expr.at(*a), env)?;
                let vb = self.eval(&expr.at(*b), env)?;
                Ok(value_ref(Value::Bool(!self.eq_values(&va, &vb)?)))
            }
            Expr::OpAnd(a, b) => {
                let va = self.eval(&expr.at(*a), env)?;
                if !self.force_bool(&va)? {
                    return Ok(value_ref(Value::Bool(false)));
                }
                let vb = self.eval(&expr.at(*b), env)?;
                Ok(value_ref(Value::Bool(self.force_bool(&vb)?)))
            }
            Expr::OpOr(a, b) => {
                let va = self.eval(&expr.at(*a), env)?;
                if self.force_bool(&va)? {
                    return Ok(value_ref(Value::Bool(true)));
                }
                let vb = self.eval(&expr.at(*b), env)?;
                Ok(value_ref(Value::Bool(self.force_bool(&vb)?)))
            }
            Expr::OpImpl(a, b) => {
                let va = self.eval(&expr.at(*a), env)?;
                if !self.force_bool(&va)? {
                    return Ok(value_ref(Value::Bool(true)));
                }
                let vb = self.eval(&expr.at(*b), env)?;
                Ok(value_ref(Value::Bool(self.force_bool(&vb)?)))
            }
            Expr::OpUpdate(a, b) => {
                let va = self.eval(&expr.at(*a), env)?;
                let vb = self.eval(&expr.at(*b), env)?;
                let left = self.force_attrs(&va)?;
                let right = self.force_attrs(&vb)?;
                let mut merged = left.attrs;
                for (sym, attr) in right.attrs {
                    merged.insert(sym, attr);
                }
                Ok(value_ref(Value::Attrs(AttrSet { attrs: merged })))
            }
            Expr::OpConcatLists(a, b) => {
                let va = self.eval(&expr.at(*a), env)?;
                let vb = self.eval(&expr.at(*b), env)?;
                let mut items = self.force_list(&va)?;
                items.extend(self.force_list(&vb)?);
                Ok(value_ref(Value::List(items)))
            }
            Expr::Pos => {
                let pos = expr.pos();
                let file = expr.unit.path.clone().unwrap_or_default();
                Ok(value_ref(Value::attrs_from([
                    (self.symbols.intern("file"), value_ref(Value::Str(file))),
                    (self.symbols.intern("line"), value_ref(Value::Int(i64::from(pos.line) + 1))),
                    (
                        self.symbols.intern("column"),
                        value_ref(Value::Int(i64::from(pos.col) + 1)),
                    ),
                ])))
            }
        }
    }

    fn eval_var(&self, expr: &ExprRef, env: &Rc<Env>, sym: Symbol) -> Result<ValueRef, EvalError> {
        let undefined = || {
            EvalError::at(
                format!("undefined variable '{}'", self.symbols.name(sym)),
                expr.pos(),
            )
        };
        match expr.unit.bindings.var(expr.id) {
            Some(VarResolution::Static { level, displ }) => {
                let frame = env.up_by(level).ok_or_else(undefined)?;
                let v = frame.slot(displ).ok_or_else(undefined)?;
                self.force(&v)?;
                Ok(v)
            }
            Some(VarResolution::FromWith { level }) => {
                let mut frame = env.up_by(level);
                while let Some(current) = frame {
                    if current.with_expr.is_some() {
                        if let Some(slot) = current.slot(0) {
                            // A `with` over a non-attrs value contributes
                            // nothing rather than failing the lookup.
                            if let Ok(set) = self.force_attrs(&slot) {
                                if let Some(attr) = set.get(sym) {
                                    let v = attr.value.clone();
                                    self.force(&v)?;
                                    return Ok(v);
                                }
                            }
                        }
                    }
                    frame = current.up.clone();
                }
                Err(undefined())
            }
            None => Err(undefined()),
        }
    }

    fn eval_attrs(
        &self,
        expr: &ExprRef,
        env: &Rc<Env>,
        attrs: &nix_parser::ExprAttrs,
    ) -> Result<ValueRef, EvalError> {
        let mut set = AttrSet::default();
        let dynamic_env;
        if attrs.recursive {
            let env2 = Env::new(Some(env.clone()), attrs.attrs.len());
            for (displ, (sym, def)) in attrs.attrs.iter().enumerate() {
                let value_env = if def.inherited() { env } else { &env2 };
                let v = self.maybe_thunk(&expr.at(def.expr), value_env)?;
                env2.set_slot(displ, v.clone());
                set.attrs.insert(*sym, Attr { value: v, pos: Some(def.pos) });
            }
            dynamic_env = env2;
        } else {
            for (sym, def) in &attrs.attrs {
                let v = self.maybe_thunk(&expr.at(def.expr), env)?;
                set.attrs.insert(*sym, Attr { value: v, pos: Some(def.pos) });
            }
            dynamic_env = env.clone();
        }
        for dynamic in &attrs.dynamic_attrs {
            let name_v = self.eval(&expr.at(dynamic.name_expr), &dynamic_env)?;
            self.force(&name_v)?;
            if matches!(&*name_v.borrow(), Value::Null) {
                continue;
            }
            let name = self.force_string(&name_v)?;
            let sym = self.symbols.intern(&name);
            if set.attrs.contains_key(&sym) {
                return Err(EvalError::at(
                    format!("dynamic attribute '{name}' already defined"),
                    dynamic.pos,
                ));
            }
            let v = self.maybe_thunk(&expr.at(dynamic.value_expr), &dynamic_env)?;
            set.attrs.insert(sym, Attr { value: v, pos: Some(dynamic.pos) });
        }
        Ok(value_ref(Value::Attrs(set)))
    }

    fn eval_select(
        &self,
        expr: &ExprRef,
        env: &Rc<Env>,
        base: nix_parser::ExprId,
        path: &[AttrName],
        default: Option<nix_parser::ExprId>,
    ) -> Result<ValueRef, EvalError> {
        let mut v = self.eval(&expr.at(base), env)?;
        for component in path {
            let sym = self.attr_name_symbol(expr, env, component)?;
            match self.select_step(&v, sym, expr) {
                Ok(next) => v = next,
                Err(err) => {
                    // `or` covers both a missing attribute and a non-set
                    // prefix, the way the strict selector does.
                    return match default {
                        Some(default) => self.eval(&expr.at(default), env),
                        None => Err(err),
                    };
                }
            }
        }
        self.force(&v)?;
        Ok(v)
    }

    fn select_step(
        &self,
        v: &ValueRef,
        sym: Symbol,
        expr: &ExprRef,
    ) -> Result<ValueRef, EvalError> {
        self.force(v)?;
        let found = match &*v.borrow() {
            Value::Attrs(set) => set.get(sym).map(|attr| attr.value.clone()),
            other => {
                return Err(EvalError::at(
                    format!("value is a {} while a set was expected", other.type_name()),
                    expr.pos(),
                ));
            }
        };
        found.ok_or_else(|| {
            EvalError::at(
                format!("attribute '{}' missing", self.symbols.name(sym)),
                expr.pos(),
            )
        })
    }

    fn attr_name_symbol(
        &self,
        expr: &ExprRef,
        env: &Rc<Env>,
        component: &AttrName,
    ) -> Result<Symbol, EvalError> {
        match component {
            AttrName::Symbol(sym, _) => Ok(*sym),
            AttrName::Dynamic(e) => {
                let v = self.eval(&expr.at(*e), env)?;
                let name = self.force_string(&v)?;
                Ok(self.symbols.intern(&name))
            }
        }
    }

    fn eval_concat(
        &self,
        expr: &ExprRef,
        env: &Rc<Env>,
        force_string: bool,
        parts: &[(Position, nix_parser::ExprId)],
    ) -> Result<ValueRef, EvalError> {
        let mut values = Vec::with_capacity(parts.len());
        for (pos, part) in parts {
            let v = self.eval(&expr.at(*part), env)?;
            self.force(&v)?;
            values.push((*pos, v));
        }
        if force_string {
            let mut out = String::new();
            for (pos, v) in &values {
                out.push_str(&self.coerce_to_string(v, false).map_err(|e| e.with_pos(*pos))?);
            }
            return Ok(value_ref(Value::Str(out)));
        }

        let first = &values[0].1;
        let first_kind = first.borrow().type_name();
        match first_kind {
            "int" | "float" => {
                let mut int_acc: i64 = 0;
                let mut float_acc: f64 = 0.0;
                let mut is_float = false;
                for (pos, v) in &values {
                    match &*v.borrow() {
                        Value::Int(n) => {
                            int_acc = int_acc.wrapping_add(*n);
                            float_acc += *n as f64;
                        }
                        Value::Float(f) => {
                            is_float = true;
                            float_acc += *f;
                        }
                        other => {
                            return Err(EvalError::at(
                                format!("cannot add a {} to an integer", other.type_name()),
                                *pos,
                            ));
                        }
                    }
                }
                if is_float {
                    Ok(value_ref(Value::Float(float_acc)))
                } else {
                    Ok(value_ref(Value::Int(int_acc)))
                }
            }
            "path" => {
                let mut out = String::new();
                for (pos, v) in &values {
                    out.push_str(&self.coerce_to_string(v, false).map_err(|e| e.with_pos(*pos))?);
                }
                Ok(value_ref(Value::Path(out)))
            }
            _ => {
                let mut out = String::new();
                for (pos, v) in &values {
                    out.push_str(&self.coerce_to_string(v, false).map_err(|e| e.with_pos(*pos))?);
                }
                Ok(value_ref(Value::Str(out)))
            }
        }
    }

    // ===== Application =====

    /// Apply a function value to an argument.
    pub fn call(&self, fun: &ValueRef, arg: ValueRef) -> Result<ValueRef, EvalError> {
        self.call_with_pos(fun, arg, None)
    }

    fn call_with_pos(
        &self,
        fun: &ValueRef,
        arg: ValueRef,
        pos: Option<Position>,
    ) -> Result<ValueRef, EvalError> {
        self.force(fun)?;
        enum Callee {
            Closure(Closure),
            Prim(PrimOp, Vec<ValueRef>),
            NotFunction(&'static str),
        }
        let callee = match &*fun.borrow() {
            Value::Lambda(closure) => Callee::Closure(closure.clone()),
            Value::PrimOp(op) => Callee::Prim(*op, Vec::new()),
            Value::PrimOpApp { op, args } => Callee::Prim(*op, args.clone()),
            other => Callee::NotFunction(other.type_name()),
        };
        match callee {
            Callee::Closure(closure) => self.apply_lambda(&closure, arg, pos),
            Callee::Prim(op, mut args) => {
                args.push(arg);
                if args.len() >= op.arity {
                    (op.func)(self, &args, pos)
                } else {
                    Ok(value_ref(Value::PrimOpApp { op, args }))
                }
            }
            Callee::NotFunction(type_name) => Err(EvalError {
                message: format!(
                    "attempt to call something which is not a function but a {type_name}"
                ),
                pos,
            }),
        }
    }

    fn apply_lambda(
        &self,
        closure: &Closure,
        arg: ValueRef,
        pos: Option<Position>,
    ) -> Result<ValueRef, EvalError> {
        let lambda: &ExprLambda = match closure.expr.expr() {
            Expr::Lambda(lambda) => lambda,
            _ => return Err(EvalError::new("corrupt lambda value")),
        };
        let env2 = Env::new(Some(closure.env.clone()), lambda.env_size().max(1));
        let mut displ = 0usize;

        match &lambda.formals {
            None => {
                env2.set_slot(displ, arg);
            }
            Some(formals) => {
                let set = self.force_attrs(&arg).map_err(|e| match pos {
                    Some(pos) => e.with_pos(pos),
                    None => e,
                })?;
                if lambda.arg.is_some() {
                    env2.set_slot(displ, arg.clone());
                    displ += 1;
                }
                for formal in &formals.formals {
                    match set.get(formal.name) {
                        Some(attr) => env2.set_slot(displ, attr.value.clone()),
                        None => match formal.default {
                            Some(default) => {
                                let v = self
                                    .maybe_thunk(&closure.expr.at(default), &env2)?;
                                env2.set_slot(displ, v);
                            }
                            None => {
                                return Err(EvalError {
                                    message: format!(
                                        "function called without required argument '{}'",
                                        self.symbols.name(formal.name)
                                    ),
                                    pos,
                                });
                            }
                        },
                    }
                    displ += 1;
                }
                if !formals.ellipsis {
                    for sym in set.attrs.keys() {
                        if !formals.formals.iter().any(|f| f.name == *sym) {
                            return Err(EvalError {
                                message: format!(
                                    "function called with unexpected argument '{}'",
                                    self.symbols.name(*sym)
                                ),
                                pos,
                            });
                        }
                    }
                }
            }
        }
        let result = self.eval(&closure.expr.at(lambda.body), &env2)?;
        self.force(&result)?;
        Ok(result)
    }

    // ===== Equality and coercion =====

    /// Structural equality with forcing, as `==` implements it.
    pub fn eq_values(&self, a: &ValueRef, b: &ValueRef) -> Result<bool, EvalError> {
        self.force(a)?;
        self.force(b)?;
        if Rc::ptr_eq(a, b) {
            return Ok(true);
        }
        let a = a.borrow();
        let b = b.borrow();
        Ok(match (&*a, &*b) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y,
            (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => {
                (*x as f64) == *y
            }
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::Path(x), Value::Path(y)) => x == y,
            (Value::List(xs), Value::List(ys)) => {
                if xs.len() != ys.len() {
                    return Ok(false);
                }
                for (x, y) in xs.iter().zip(ys) {
                    if !self.eq_values(x, y)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Value::Attrs(xs), Value::Attrs(ys)) => {
                if xs.attrs.len() != ys.attrs.len() {
                    return Ok(false);
                }
                for (sym, x) in &xs.attrs {
                    match ys.get(*sym) {
                        Some(y) => {
                            if !self.eq_values(&x.value, &y.value)? {
                                return Ok(false);
                            }
                        }
                        None => return Ok(false),
                    }
                }
                true
            }
            // Functions never compare equal.
            _ => false,
        })
    }

    /// String coercion. `coerce_more` additionally accepts nulls, bools,
    /// numbers, and lists, the way `toString` does.
    pub fn coerce_to_string(&self, v: &ValueRef, coerce_more: bool) -> Result<String, EvalError> {
        self.force(v)?;
        let out = match &*v.borrow() {
            Value::Str(s) => s.clone(),
            Value::Path(p) => p.clone(),
            Value::Null if coerce_more => String::new(),
            Value::Bool(true) if coerce_more => "1".to_string(),
            Value::Bool(false) if coerce_more => String::new(),
            Value::Int(n) if coerce_more => n.to_string(),
            Value::Float(f) if coerce_more => format_float(*f),
            Value::List(items) if coerce_more => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    parts.push(self.coerce_to_string(item, true)?);
                }
                parts.join(" ")
            }
            other => {
                return Err(EvalError::new(format!(
                    "cannot coerce a {} to a string",
                    other.type_name()
                )));
            }
        };
        Ok(out)
    }

    // ===== Import =====

    /// Import a file, with a process-wide cache keyed by resolved path.
    pub fn import(&self, path: &str) -> Result<ValueRef, EvalError> {
        let resolved = if std::path::Path::new(path).is_dir() {
            format!("{}/default.nix", path.trim_end_matches('/'))
        } else {
            path.to_string()
        };
        if let Some(cached) = self.import_cache.borrow().get(&resolved) {
            return Ok(cached.clone());
        }
        debug!(path = %resolved, "importing file");
        let source = std::fs::read_to_string(&resolved)
            .map_err(|err| EvalError::new(format!("opening file '{resolved}': {err}")))?;
        let base_path = std::path::Path::new(&resolved)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string());
        let result = nix_parser::parse(&source, Some(&resolved), &base_path, &self.symbols);
        if let Some(first) = result.diagnostics.first() {
            return Err(EvalError::at(
                format!("syntax error in '{}': {}", resolved, first.message),
                first.range.start,
            ));
        }
        let unit = self.bind_unit(result, Some(resolved.clone()));
        let root = ExprRef { unit: unit.clone(), id: unit.result.root };
        let v = self.eval(&root, &self.base_env())?;
        self.import_cache.borrow_mut().insert(resolved, v.clone());
        Ok(v)
    }

    /// Drop the import cache (configuration reload).
    pub fn clear_import_cache(&self) {
        self.import_cache.borrow_mut().clear();
    }

    // ===== Printing =====

    /// Render a value the way the strict printer does; unforced thunks
    /// print as `...`.
    pub fn print_value(&self, v: &ValueRef) -> String {
        let mut out = String::new();
        self.print_into(v, &mut out, 0);
        out
    }

    fn print_into(&self, v: &ValueRef, out: &mut String, depth: usize) {
        if depth > 8 {
            out.push_str("...");
            return;
        }
        match &*v.borrow() {
            Value::Null => out.push_str("null"),
            Value::Bool(true) => out.push_str("true"),
            Value::Bool(false) => out.push_str("false"),
            Value::Int(n) => out.push_str(&n.to_string()),
            Value::Float(f) => out.push_str(&format_float(*f)),
            Value::Str(s) => nix_parser::print::write_string_literal(s, out),
            Value::Path(p) => out.push_str(p),
            Value::List(items) => {
                out.push_str("[ ");
                for item in items {
                    self.print_into(item, out, depth + 1);
                    out.push(' ');
                }
                out.push(']');
            }
            Value::Attrs(set) => {
                out.push_str("{ ");
                for (sym, attr) in &set.attrs {
                    out.push_str(&self.symbols.name(*sym));
                    out.push_str(" = ");
                    self.print_into(&attr.value, out, depth + 1);
                    out.push_str("; ");
                }
                out.push('}');
            }
            Value::Lambda(_) => out.push_str("«lambda»"),
            Value::PrimOp(op) => {
                out.push_str("«primop ");
                out.push_str(op.name);
                out.push('»');
            }
            Value::PrimOpApp { op, .. } => {
                out.push_str("«primop-app ");
                out.push_str(op.name);
                out.push('»');
            }
            Value::Thunk { .. } | Value::Blackhole => out.push_str("..."),
        }
    }
}

/// Floats print with a trailing digit the way the strict printer does.
pub fn format_float(f: f64) -> String {
    if f == f.trunc() && f.is_finite() {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}
