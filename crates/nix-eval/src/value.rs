//! Runtime values.
//!
//! Values are shared through `Rc<RefCell<...>>` so forcing a thunk mutates
//! the variant in place and every holder observes the forced result. A
//! `Blackhole` replaces the thunk payload while it is being forced, turning
//! reference cycles into `infinite recursion encountered` errors instead of
//! stack overflows on repeat visits.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use nix_lexer::Position;
use nix_parser::Symbol;

use crate::env::Env;
use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::source::ExprRef;

/// Shared handle to a value cell.
pub type ValueRef = Rc<RefCell<Value>>;

/// Wrap a value into a fresh cell.
pub fn value_ref(value: Value) -> ValueRef {
    Rc::new(RefCell::new(value))
}

/// One attribute of an attribute-set value.
#[derive(Clone)]
pub struct Attr {
    /// The attribute's value, possibly still a thunk.
    pub value: ValueRef,
    /// Where the attribute was defined, when known.
    pub pos: Option<Position>,
}

/// An attribute-set value: an ordered mapping from symbol to attribute.
#[derive(Clone, Default)]
pub struct AttrSet {
    /// The attributes in definition order.
    pub attrs: IndexMap<Symbol, Attr>,
}

impl AttrSet {
    /// Look up an attribute.
    pub fn get(&self, sym: Symbol) -> Option<&Attr> {
        self.attrs.get(&sym)
    }
}

/// Signature of a builtin function.
pub type PrimOpFn = fn(&Evaluator, &[ValueRef], Option<Position>) -> Result<ValueRef, EvalError>;

/// A builtin function value.
#[derive(Clone, Copy)]
pub struct PrimOp {
    /// Name shown by the printer and in error messages.
    pub name: &'static str,
    /// Number of arguments the builtin needs before it fires.
    pub arity: usize,
    /// The implementation.
    pub func: PrimOpFn,
}

/// A lambda value: the lambda expression plus its captured environment.
#[derive(Clone)]
pub struct Closure {
    /// The `Expr::Lambda` node.
    pub expr: ExprRef,
    /// Environment the lambda was evaluated in.
    pub env: Rc<Env>,
}

/// A runtime value. The thunk case keeps evaluation lazy; everything that
/// may need forcing goes through [`Evaluator::force`].
#[derive(Clone)]
pub enum Value {
    /// `null`
    Null,
    /// Booleans.
    Bool(bool),
    /// Integers.
    Int(i64),
    /// Floats.
    Float(f64),
    /// Strings.
    Str(String),
    /// Paths.
    Path(String),
    /// Lists; elements may be thunks.
    List(Vec<ValueRef>),
    /// Attribute sets; values may be thunks.
    Attrs(AttrSet),
    /// A user lambda.
    Lambda(Closure),
    /// A builtin.
    PrimOp(PrimOp),
    /// A partially applied builtin.
    PrimOpApp {
        /// The builtin.
        op: PrimOp,
        /// Arguments collected so far.
        args: Vec<ValueRef>,
    },
    /// A deferred computation.
    Thunk {
        /// Expression to evaluate.
        expr: ExprRef,
        /// Environment to evaluate it in.
        env: Rc<Env>,
    },
    /// Marker placed while a thunk is being forced.
    Blackhole,
}

impl Value {
    /// Type name as the strict evaluator reports it.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Path(_) => "path",
            Value::List(_) => "list",
            Value::Attrs(_) => "set",
            Value::Lambda(_) | Value::PrimOp(_) | Value::PrimOpApp { .. } => "lambda",
            Value::Thunk { .. } | Value::Blackhole => "thunk",
        }
    }

    /// Whether the value still needs forcing.
    pub fn is_thunk(&self) -> bool {
        matches!(self, Value::Thunk { .. } | Value::Blackhole)
    }

    /// Build an attrs value from symbol/value pairs.
    pub fn attrs_from(pairs: impl IntoIterator<Item = (Symbol, ValueRef)>) -> Value {
        let mut set = AttrSet::default();
        for (sym, value) in pairs {
            set.attrs.insert(sym, Attr { value, pos: None });
        }
        Value::Attrs(set)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Shallow on purpose: values can be cyclic.
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Path(p) => write!(f, "Path({p:?})"),
            Value::List(items) => write!(f, "List(len={})", items.len()),
            Value::Attrs(set) => write!(f, "Attrs(len={})", set.attrs.len()),
            Value::Lambda(_) => write!(f, "Lambda"),
            Value::PrimOp(op) => write!(f, "PrimOp({})", op.name),
            Value::PrimOpApp { op, args } => {
                write!(f, "PrimOpApp({}, {} args)", op.name, args.len())
            }
            Value::Thunk { .. } => write!(f, "Thunk"),
            Value::Blackhole => write!(f, "Blackhole"),
        }
    }
}
