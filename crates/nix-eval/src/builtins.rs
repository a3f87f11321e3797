//! The base environment: `builtins`, the unprefixed globals, and the
//! double-underscore aliases the strict evaluator injects at top level.
//!
//! Builtins the analyzer cannot honestly implement (fetchers, derivations,
//! serialisation) are still present under their names so completion and
//! hover see them; applying one yields an evaluation error instead.

use std::rc::Rc;

use indexmap::IndexMap;
use nix_lexer::Position;
use nix_parser::{StaticScope, Symbol, SymbolTable};

use crate::env::Env;
use crate::error::EvalError;
use crate::eval::Evaluator;
use crate::value::{Attr, AttrSet, PrimOp, Value, ValueRef, value_ref};

/// Build the base static scope and runtime environment.
pub fn build_base(symbols: &SymbolTable) -> (Rc<StaticScope>, Rc<Env>) {
    let mut entries: Vec<(String, ValueRef)> = Vec::new();

    entries.push(("true".to_string(), value_ref(Value::Bool(true))));
    entries.push(("false".to_string(), value_ref(Value::Bool(false))));
    entries.push(("null".to_string(), value_ref(Value::Null)));

    let mut builtins_set = AttrSet::default();
    let mut add_builtin = |name: &str, value: ValueRef| {
        builtins_set
            .attrs
            .insert(symbols.intern(name), Attr { value, pos: None });
    };

    // Constants.
    add_builtin("nixVersion", value_ref(Value::Str("2.13.6".to_string())));
    add_builtin("langVersion", value_ref(Value::Int(6)));
    add_builtin("currentSystem", value_ref(Value::Str(current_system())));
    add_builtin("storeDir", value_ref(Value::Str("/nix/store".to_string())));
    add_builtin("true", value_ref(Value::Bool(true)));
    add_builtin("false", value_ref(Value::Bool(false)));
    add_builtin("null", value_ref(Value::Null));
    add_builtin("nixPath", nix_path_value(symbols));

    for op in PRIMOPS {
        let value = value_ref(Value::PrimOp(*op));
        add_builtin(op.name, value.clone());
        if UNPREFIXED.contains(&op.name) {
            entries.push((op.name.to_string(), value.clone()));
        }
        entries.push((format!("__{}", op.name), value));
    }

    entries.push(("__nixPath".to_string(), nix_path_value(symbols)));
    entries.push((
        "__currentSystem".to_string(),
        value_ref(Value::Str(current_system())),
    ));
    entries.push(("builtins".to_string(), value_ref(Value::Attrs(builtins_set))));

    let mut vars = IndexMap::new();
    let mut slots = Vec::with_capacity(entries.len());
    for (displ, (name, value)) in entries.into_iter().enumerate() {
        vars.insert(symbols.intern(&name), displ);
        slots.push(value);
    }
    let scope = StaticScope::with_vars(vars, None);
    let env = Env::new(None, slots.len());
    for (displ, slot) in slots.into_iter().enumerate() {
        env.set_slot(displ, slot);
    }
    (scope, env)
}

/// Builtins also bound at top level without the `__` prefix.
const UNPREFIXED: &[&str] = &[
    "abort",
    "baseNameOf",
    "derivation",
    "dirOf",
    "fetchGit",
    "fetchTarball",
    "fromTOML",
    "import",
    "isNull",
    "map",
    "placeholder",
    "removeAttrs",
    "scopedImport",
    "throw",
    "toString",
];

macro_rules! stub_primop {
    ($fn_name:ident, $builtin:literal) => {
        fn $fn_name(
            _eval: &Evaluator,
            _args: &[ValueRef],
            pos: Option<Position>,
        ) -> Result<ValueRef, EvalError> {
            Err(EvalError {
                message: concat!(
                    "the '",
                    $builtin,
                    "' builtin is not supported by the analyzer"
                )
                .to_string(),
                pos,
            })
        }
    };
}

const PRIMOPS: &[PrimOp] = &[
    PrimOp { name: "abort", arity: 1, func: prim_abort },
    PrimOp { name: "add", arity: 2, func: prim_add },
    PrimOp { name: "all", arity: 2, func: prim_all },
    PrimOp { name: "any", arity: 2, func: prim_any },
    PrimOp { name: "attrNames", arity: 1, func: prim_attr_names },
    PrimOp { name: "attrValues", arity: 1, func: prim_attr_values },
    PrimOp { name: "baseNameOf", arity: 1, func: prim_base_name_of },
    PrimOp { name: "catAttrs", arity: 2, func: prim_cat_attrs },
    PrimOp { name: "compareVersions", arity: 2, func: prim_compare_versions },
    PrimOp { name: "concatLists", arity: 1, func: prim_concat_lists },
    PrimOp { name: "concatStringsSep", arity: 2, func: prim_concat_strings_sep },
    PrimOp { name: "deepSeq", arity: 2, func: prim_deep_seq },
    PrimOp { name: "derivation", arity: 1, func: prim_derivation },
    PrimOp { name: "derivationStrict", arity: 1, func: prim_derivation_strict },
    PrimOp { name: "dirOf", arity: 1, func: prim_dir_of },
    PrimOp { name: "div", arity: 2, func: prim_div },
    PrimOp { name: "elem", arity: 2, func: prim_elem },
    PrimOp { name: "elemAt", arity: 2, func: prim_elem_at },
    PrimOp { name: "fetchGit", arity: 1, func: prim_fetch_git },
    PrimOp { name: "fetchTarball", arity: 1, func: prim_fetch_tarball },
    PrimOp { name: "fetchurl", arity: 1, func: prim_fetchurl },
    PrimOp { name: "filter", arity: 2, func: prim_filter },
    PrimOp { name: "findFile", arity: 2, func: prim_find_file },
    PrimOp { name: "foldl'", arity: 3, func: prim_foldl },
    PrimOp { name: "fromJSON", arity: 1, func: prim_from_json },
    PrimOp { name: "fromTOML", arity: 1, func: prim_from_toml },
    PrimOp { name: "functionArgs", arity: 1, func: prim_function_args },
    PrimOp { name: "genList", arity: 2, func: prim_gen_list },
    PrimOp { name: "getAttr", arity: 2, func: prim_get_attr },
    PrimOp { name: "getEnv", arity: 1, func: prim_get_env },
    PrimOp { name: "hasAttr", arity: 2, func: prim_has_attr },
    PrimOp { name: "hashString", arity: 2, func: prim_hash_string },
    PrimOp { name: "head", arity: 1, func: prim_head },
    PrimOp { name: "import", arity: 1, func: prim_import },
    PrimOp { name: "intersectAttrs", arity: 2, func: prim_intersect_attrs },
    PrimOp { name: "isAttrs", arity: 1, func: prim_is_attrs },
    PrimOp { name: "isBool", arity: 1, func: prim_is_bool },
    PrimOp { name: "isFloat", arity: 1, func: prim_is_float },
    PrimOp { name: "isFunction", arity: 1, func: prim_is_function },
    PrimOp { name: "isInt", arity: 1, func: prim_is_int },
    PrimOp { name: "isList", arity: 1, func: prim_is_list },
    PrimOp { name: "isNull", arity: 1, func: prim_is_null },
    PrimOp { name: "isPath", arity: 1, func: prim_is_path },
    PrimOp { name: "isString", arity: 1, func: prim_is_string },
    PrimOp { name: "length", arity: 1, func: prim_length },
    PrimOp { name: "lessThan", arity: 2, func: prim_less_than },
    PrimOp { name: "listToAttrs", arity: 1, func: prim_list_to_attrs },
    PrimOp { name: "map", arity: 2, func: prim_map },
    PrimOp { name: "mapAttrs", arity: 2, func: prim_map_attrs },
    PrimOp { name: "match", arity: 2, func: prim_match },
    PrimOp { name: "mul", arity: 2, func: prim_mul },
    PrimOp { name: "pathExists", arity: 1, func: prim_path_exists },
    PrimOp { name: "placeholder", arity: 1, func: prim_placeholder },
    PrimOp { name: "readDir", arity: 1, func: prim_read_dir },
    PrimOp { name: "readFile", arity: 1, func: prim_read_file },
    PrimOp { name: "removeAttrs", arity: 2, func: prim_remove_attrs },
    PrimOp { name: "replaceStrings", arity: 3, func: prim_replace_strings },
    PrimOp { name: "scopedImport", arity: 2, func: prim_scoped_import },
    PrimOp { name: "seq", arity: 2, func: prim_seq },
    PrimOp { name: "sort", arity: 2, func: prim_sort },
    PrimOp { name: "split", arity: 2, func: prim_split },
    PrimOp { name: "splitVersion", arity: 1, func: prim_split_version },
    PrimOp { name: "stringLength", arity: 1, func: prim_string_length },
    PrimOp { name: "sub", arity: 2, func: prim_sub },
    PrimOp { name: "substring", arity: 3, func: prim_substring },
    PrimOp { name: "tail", arity: 1, func: prim_tail },
    PrimOp { name: "throw", arity: 1, func: prim_throw },
    PrimOp { name: "toJSON", arity: 1, func: prim_to_json },
    PrimOp { name: "toString", arity: 1, func: prim_to_string },
    PrimOp { name: "tryEval", arity: 1, func: prim_try_eval },
    PrimOp { name: "typeOf", arity: 1, func: prim_type_of },
];

fn current_system() -> String {
    let arch = std::env::consts::ARCH;
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    format!("{arch}-{os}")
}

/// `NIX_PATH` as the list of `{ prefix, path }` sets `__nixPath` holds.
fn nix_path_value(symbols: &SymbolTable) -> ValueRef {
    let mut entries = Vec::new();
    if let Ok(raw) = std::env::var("NIX_PATH") {
        for element in raw.split(':').filter(|e| !e.is_empty()) {
            let (prefix, path) = match element.split_once('=') {
                Some((prefix, path)) => (prefix.to_string(), path.to_string()),
                None => (String::new(), element.to_string()),
            };
            entries.push(value_ref(Value::attrs_from([
                (symbols.intern("prefix"), value_ref(Value::Str(prefix))),
                (symbols.intern("path"), value_ref(Value::Str(path))),
            ])));
        }
    }
    value_ref(Value::List(entries))
}

// ===== Arithmetic =====

fn arith(
    eval: &Evaluator,
    args: &[ValueRef],
    pos: Option<Position>,
    int_op: fn(i64, i64) -> Result<i64, EvalError>,
    float_op: fn(f64, f64) -> f64,
) -> Result<ValueRef, EvalError> {
    eval.force(&args[0])?;
    eval.force(&args[1])?;
    let a = args[0].borrow();
    let b = args[1].borrow();
    match (&*a, &*b) {
        (Value::Int(x), Value::Int(y)) => Ok(value_ref(Value::Int(int_op(*x, *y)?))),
        (Value::Int(x), Value::Float(y)) => Ok(value_ref(Value::Float(float_op(*x as f64, *y)))),
        (Value::Float(x), Value::Int(y)) => Ok(value_ref(Value::Float(float_op(*x, *y as f64)))),
        (Value::Float(x), Value::Float(y)) => Ok(value_ref(Value::Float(float_op(*x, *y)))),
        (other, _) => Err(EvalError {
            message: format!("value is a {} while a number was expected", other.type_name()),
            pos,
        }),
    }
}

fn prim_add(eval: &Evaluator, args: &[ValueRef], pos: Option<Position>) -> Result<ValueRef, EvalError> {
    arith(eval, args, pos, |x, y| Ok(x.wrapping_add(y)), |x, y| x + y)
}

fn prim_sub(eval: &Evaluator, args: &[ValueRef], pos: Option<Position>) -> Result<ValueRef, EvalError> {
    arith(eval, args, pos, |x, y| Ok(x.wrapping_sub(y)), |x, y| x - y)
}

fn prim_mul(eval: &Evaluator, args: &[ValueRef], pos: Option<Position>) -> Result<ValueRef, EvalError> {
    arith(eval, args, pos, |x, y| Ok(x.wrapping_mul(y)), |x, y| x * y)
}

fn prim_div(eval: &Evaluator, args: &[ValueRef], pos: Option<Position>) -> Result<ValueRef, EvalError> {
    arith(
        eval,
        args,
        pos,
        |x, y| {
            if y == 0 {
                Err(EvalError::new("division by zero"))
            } else {
                Ok(x.wrapping_div(y))
            }
        },
        |x, y| x / y,
    )
}

fn prim_less_than(
    eval: &Evaluator,
    args: &[ValueRef],
    pos: Option<Position>,
) -> Result<ValueRef, EvalError> {
    eval.force(&args[0])?;
    eval.force(&args[1])?;
    let a = args[0].borrow();
    let b = args[1].borrow();
    let result = match (&*a, &*b) {
        (Value::Int(x), Value::Int(y)) => *x < *y,
        (Value::Int(x), Value::Float(y)) => (*x as f64) < *y,
        (Value::Float(x), Value::Int(y)) => *x < (*y as f64),
        (Value::Float(x), Value::Float(y)) => *x < *y,
        (Value::Str(x), Value::Str(y)) => x < y,
        (x, y) => {
            return Err(EvalError {
                message: format!(
                    "cannot compare a {} with a {}",
                    x.type_name(),
                    y.type_name()
                ),
                pos,
            });
        }
    };
    Ok(value_ref(Value::Bool(result)))
}

// ===== Control =====

fn prim_abort(eval: &Evaluator, args: &[ValueRef], pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let message = eval.coerce_to_string(&args[0], true)?;
    Err(EvalError {
        message: format!("evaluation aborted with the following error message: '{message}'"),
        pos,
    })
}

fn prim_throw(eval: &Evaluator, args: &[ValueRef], pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let message = eval.coerce_to_string(&args[0], true)?;
    Err(EvalError { message, pos })
}

fn prim_seq(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    eval.force(&args[0])?;
    eval.force(&args[1])?;
    Ok(args[1].clone())
}

fn prim_deep_seq(
    eval: &Evaluator,
    args: &[ValueRef],
    _pos: Option<Position>,
) -> Result<ValueRef, EvalError> {
    deep_force(eval, &args[0], 0)?;
    eval.force(&args[1])?;
    Ok(args[1].clone())
}

fn deep_force(eval: &Evaluator, v: &ValueRef, depth: usize) -> Result<(), EvalError> {
    if depth > 64 {
        return Ok(());
    }
    eval.force(v)?;
    let children: Vec<ValueRef> = match &*v.borrow() {
        Value::List(items) => items.clone(),
        Value::Attrs(set) => set.attrs.values().map(|attr| attr.value.clone()).collect(),
        _ => Vec::new(),
    };
    for child in children {
        deep_force(eval, &child, depth + 1)?;
    }
    Ok(())
}

fn prim_try_eval(
    eval: &Evaluator,
    args: &[ValueRef],
    _pos: Option<Position>,
) -> Result<ValueRef, EvalError> {
    let symbols = eval.symbols();
    let (success, value) = match eval.force(&args[0]) {
        Ok(()) => (true, args[0].clone()),
        Err(_) => (false, value_ref(Value::Bool(false))),
    };
    Ok(value_ref(Value::attrs_from([
        (symbols.intern("success"), value_ref(Value::Bool(success))),
        (symbols.intern("value"), value),
    ])))
}

// ===== Type predicates =====

fn type_predicate(
    eval: &Evaluator,
    args: &[ValueRef],
    check: fn(&Value) -> bool,
) -> Result<ValueRef, EvalError> {
    eval.force(&args[0])?;
    let result = check(&args[0].borrow());
    Ok(value_ref(Value::Bool(result)))
}

fn prim_is_null(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    type_predicate(eval, args, |v| matches!(v, Value::Null))
}

fn prim_is_attrs(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    type_predicate(eval, args, |v| matches!(v, Value::Attrs(_)))
}

fn prim_is_list(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    type_predicate(eval, args, |v| matches!(v, Value::List(_)))
}

fn prim_is_function(
    eval: &Evaluator,
    args: &[ValueRef],
    _pos: Option<Position>,
) -> Result<ValueRef, EvalError> {
    type_predicate(eval, args, |v| {
        matches!(v, Value::Lambda(_) | Value::PrimOp(_) | Value::PrimOpApp { .. })
    })
}

fn prim_is_string(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    type_predicate(eval, args, |v| matches!(v, Value::Str(_)))
}

fn prim_is_int(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    type_predicate(eval, args, |v| matches!(v, Value::Int(_)))
}

fn prim_is_bool(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    type_predicate(eval, args, |v| matches!(v, Value::Bool(_)))
}

fn prim_is_float(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    type_predicate(eval, args, |v| matches!(v, Value::Float(_)))
}

fn prim_is_path(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    type_predicate(eval, args, |v| matches!(v, Value::Path(_)))
}

fn prim_type_of(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    eval.force(&args[0])?;
    let name = args[0].borrow().type_name();
    Ok(value_ref(Value::Str(name.to_string())))
}

// ===== Lists =====

fn prim_length(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let items = eval.force_list(&args[0])?;
    Ok(value_ref(Value::Int(items.len() as i64)))
}

fn prim_head(eval: &Evaluator, args: &[ValueRef], pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let items = eval.force_list(&args[0])?;
    match items.first() {
        Some(v) => {
            eval.force(v)?;
            Ok(v.clone())
        }
        None => Err(EvalError { message: "list index 0 is out of bounds".to_string(), pos }),
    }
}

fn prim_tail(eval: &Evaluator, args: &[ValueRef], pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let items = eval.force_list(&args[0])?;
    if items.is_empty() {
        return Err(EvalError { message: "'tail' called on an empty list".to_string(), pos });
    }
    Ok(value_ref(Value::List(items[1..].to_vec())))
}

fn prim_elem_at(eval: &Evaluator, args: &[ValueRef], pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let items = eval.force_list(&args[0])?;
    let index = eval.force_int(&args[1])?;
    let item = usize::try_from(index)
        .ok()
        .and_then(|i| items.get(i))
        .ok_or(EvalError { message: format!("list index {index} is out of bounds"), pos })?;
    eval.force(item)?;
    Ok(item.clone())
}

fn prim_map(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let items = eval.force_list(&args[1])?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(eval.call(&args[0], item)?);
    }
    Ok(value_ref(Value::List(out)))
}

fn prim_filter(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let items = eval.force_list(&args[1])?;
    let mut out = Vec::new();
    for item in items {
        let keep = eval.call(&args[0], item.clone())?;
        if eval.force_bool(&keep)? {
            out.push(item);
        }
    }
    Ok(value_ref(Value::List(out)))
}

fn prim_elem(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let items = eval.force_list(&args[1])?;
    for item in &items {
        if eval.eq_values(&args[0], item)? {
            return Ok(value_ref(Value::Bool(true)));
        }
    }
    Ok(value_ref(Value::Bool(false)))
}

fn prim_any(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let items = eval.force_list(&args[1])?;
    for item in items {
        let v = eval.call(&args[0], item)?;
        if eval.force_bool(&v)? {
            return Ok(value_ref(Value::Bool(true)));
        }
    }
    Ok(value_ref(Value::Bool(false)))
}

fn prim_all(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let items = eval.force_list(&args[1])?;
    for item in items {
        let v = eval.call(&args[0], item)?;
        if !eval.force_bool(&v)? {
            return Ok(value_ref(Value::Bool(false)));
        }
    }
    Ok(value_ref(Value::Bool(true)))
}

fn prim_foldl(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let items = eval.force_list(&args[2])?;
    let mut acc = args[1].clone();
    for item in items {
        let partial = eval.call(&args[0], acc)?;
        acc = eval.call(&partial, item)?;
        eval.force(&acc)?;
    }
    Ok(acc)
}

fn prim_concat_lists(
    eval: &Evaluator,
    args: &[ValueRef],
    _pos: Option<Position>,
) -> Result<ValueRef, EvalError> {
    let lists = eval.force_list(&args[0])?;
    let mut out = Vec::new();
    for list in lists {
        out.extend(eval.force_list(&list)?);
    }
    Ok(value_ref(Value::List(out)))
}

fn prim_gen_list(eval: &Evaluator, args: &[ValueRef], pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let n = eval.force_int(&args[1])?;
    if n < 0 {
        return Err(EvalError { message: format!("cannot create list of size {n}"), pos });
    }
    let mut out = Vec::with_capacity(n as usize);
    for i in 0..n {
        out.push(eval.call(&args[0], value_ref(Value::Int(i)))?);
    }
    Ok(value_ref(Value::List(out)))
}

fn prim_sort(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let mut items = eval.force_list(&args[1])?;
    // Insertion sort so the comparator's errors can propagate.
    let mut i = 1;
    while i < items.len() {
        let mut j = i;
        while j > 0 {
            let partial = eval.call(&args[0], items[j].clone())?;
            let before = eval.call(&partial, items[j - 1].clone())?;
            if eval.force_bool(&before)? {
                items.swap(j - 1, j);
                j -= 1;
            } else {
                break;
            }
        }
        i += 1;
    }
    Ok(value_ref(Value::List(items)))
}

// ===== Attribute sets =====

fn prim_attr_names(
    eval: &Evaluator,
    args: &[ValueRef],
    _pos: Option<Position>,
) -> Result<ValueRef, EvalError> {
    let set = eval.force_attrs(&args[0])?;
    let symbols = eval.symbols();
    let mut names: Vec<String> = set.attrs.keys().map(|sym| symbols.name(*sym)).collect();
    names.sort();
    Ok(value_ref(Value::List(
        names.into_iter().map(|n| value_ref(Value::Str(n))).collect(),
    )))
}

fn prim_attr_values(
    eval: &Evaluator,
    args: &[ValueRef],
    _pos: Option<Position>,
) -> Result<ValueRef, EvalError> {
    let set = eval.force_attrs(&args[0])?;
    let symbols = eval.symbols();
    let mut entries: Vec<(String, ValueRef)> = set
        .attrs
        .iter()
        .map(|(sym, attr)| (symbols.name(*sym), attr.value.clone()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(value_ref(Value::List(entries.into_iter().map(|(_, v)| v).collect())))
}

fn prim_has_attr(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let name = eval.force_string(&args[0])?;
    let set = eval.force_attrs(&args[1])?;
    let sym = eval.symbols().intern(&name);
    Ok(value_ref(Value::Bool(set.get(sym).is_some())))
}

fn prim_get_attr(eval: &Evaluator, args: &[ValueRef], pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let name = eval.force_string(&args[0])?;
    let set = eval.force_attrs(&args[1])?;
    let sym = eval.symbols().intern(&name);
    match set.get(sym) {
        Some(attr) => {
            eval.force(&attr.value)?;
            Ok(attr.value.clone())
        }
        None => Err(EvalError { message: format!("attribute '{name}' missing"), pos }),
    }
}

fn prim_remove_attrs(
    eval: &Evaluator,
    args: &[ValueRef],
    _pos: Option<Position>,
) -> Result<ValueRef, EvalError> {
    let set = eval.force_attrs(&args[0])?;
    let names = eval.force_list(&args[1])?;
    let mut removed = set;
    for name in names {
        let name = eval.force_string(&name)?;
        removed.attrs.shift_remove(&eval.symbols().intern(&name));
    }
    Ok(value_ref(Value::Attrs(removed)))
}

fn prim_intersect_attrs(
    eval: &Evaluator,
    args: &[ValueRef],
    _pos: Option<Position>,
) -> Result<ValueRef, EvalError> {
    let left = eval.force_attrs(&args[0])?;
    let right = eval.force_attrs(&args[1])?;
    let mut out = AttrSet::default();
    for (sym, attr) in &right.attrs {
        if left.get(*sym).is_some() {
            out.attrs.insert(*sym, attr.clone());
        }
    }
    Ok(value_ref(Value::Attrs(out)))
}

fn prim_list_to_attrs(
    eval: &Evaluator,
    args: &[ValueRef],
    pos: Option<Position>,
) -> Result<ValueRef, EvalError> {
    let items = eval.force_list(&args[0])?;
    let symbols = eval.symbols();
    let name_sym = symbols.intern("name");
    let value_sym = symbols.intern("value");
    let mut out = AttrSet::default();
    for item in items {
        let entry = eval.force_attrs(&item)?;
        let name = entry.get(name_sym).ok_or(EvalError {
            message: "attribute 'name' missing".to_string(),
            pos,
        })?;
        let name = eval.force_string(&name.value)?;
        let value = entry.get(value_sym).ok_or(EvalError {
            message: "attribute 'value' missing".to_string(),
            pos,
        })?;
        let sym = symbols.intern(&name);
        // First entry wins, as listToAttrs specifies.
        out.attrs.entry(sym).or_insert_with(|| value.clone());
    }
    Ok(value_ref(Value::Attrs(out)))
}

fn prim_cat_attrs(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let name = eval.force_string(&args[0])?;
    let sym = eval.symbols().intern(&name);
    let items = eval.force_list(&args[1])?;
    let mut out = Vec::new();
    for item in items {
        let set = eval.force_attrs(&item)?;
        if let Some(attr) = set.get(sym) {
            out.push(attr.value.clone());
        }
    }
    Ok(value_ref(Value::List(out)))
}

fn prim_map_attrs(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let set = eval.force_attrs(&args[1])?;
    let symbols = eval.symbols();
    let mut out = AttrSet::default();
    for (sym, attr) in &set.attrs {
        let name = value_ref(Value::Str(symbols.name(*sym)));
        let partial = eval.call(&args[0], name)?;
        let mapped = eval.call(&partial, attr.value.clone())?;
        out.attrs.insert(*sym, Attr { value: mapped, pos: attr.pos });
    }
    Ok(value_ref(Value::Attrs(out)))
}

fn prim_function_args(
    eval: &Evaluator,
    args: &[ValueRef],
    _pos: Option<Position>,
) -> Result<ValueRef, EvalError> {
    eval.force(&args[0])?;
    let formals = match &*args[0].borrow() {
        Value::Lambda(closure) => match closure.expr.expr() {
            nix_parser::Expr::Lambda(lambda) => lambda
                .formals
                .as_ref()
                .map(|f| {
                    f.formals
                        .iter()
                        .map(|formal| (formal.name, formal.default.is_some()))
                        .collect::<Vec<(Symbol, bool)>>()
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    Ok(value_ref(Value::attrs_from(
        formals
            .into_iter()
            .map(|(sym, has_default)| (sym, value_ref(Value::Bool(has_default)))),
    )))
}

// ===== Strings and paths =====

fn prim_to_string(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    Ok(value_ref(Value::Str(eval.coerce_to_string(&args[0], true)?)))
}

fn prim_string_length(
    eval: &Evaluator,
    args: &[ValueRef],
    _pos: Option<Position>,
) -> Result<ValueRef, EvalError> {
    let s = eval.force_string(&args[0])?;
    Ok(value_ref(Value::Int(s.len() as i64)))
}

fn prim_substring(eval: &Evaluator, args: &[ValueRef], pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let start = eval.force_int(&args[0])?;
    let len = eval.force_int(&args[1])?;
    let s = eval.force_string(&args[2])?;
    if start < 0 {
        return Err(EvalError { message: "negative start position in 'substring'".to_string(), pos });
    }
    let start = (start as usize).min(s.len());
    let end = if len < 0 { s.len() } else { (start + len as usize).min(s.len()) };
    Ok(value_ref(Value::Str(s[start..end].to_string())))
}

fn prim_concat_strings_sep(
    eval: &Evaluator,
    args: &[ValueRef],
    _pos: Option<Position>,
) -> Result<ValueRef, EvalError> {
    let sep = eval.force_string(&args[0])?;
    let items = eval.force_list(&args[1])?;
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        parts.push(eval.coerce_to_string(&item, false)?);
    }
    Ok(value_ref(Value::Str(parts.join(&sep))))
}

fn prim_split_version(
    eval: &Evaluator,
    args: &[ValueRef],
    _pos: Option<Position>,
) -> Result<ValueRef, EvalError> {
    let s = eval.force_string(&args[0])?;
    let parts = s
        .split(['.', '-'])
        .filter(|p| !p.is_empty())
        .map(|p| value_ref(Value::Str(p.to_string())))
        .collect();
    Ok(value_ref(Value::List(parts)))
}

fn prim_compare_versions(
    eval: &Evaluator,
    args: &[ValueRef],
    _pos: Option<Position>,
) -> Result<ValueRef, EvalError> {
    let a = eval.force_string(&args[0])?;
    let b = eval.force_string(&args[1])?;
    let parse = |s: &str| -> Vec<u64> {
        s.split(['.', '-']).filter_map(|p| p.parse().ok()).collect()
    };
    let result = parse(&a).cmp(&parse(&b));
    Ok(value_ref(Value::Int(match result {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    })))
}

fn prim_replace_strings(
    eval: &Evaluator,
    args: &[ValueRef],
    _pos: Option<Position>,
) -> Result<ValueRef, EvalError> {
    let from = eval.force_list(&args[0])?;
    let to = eval.force_list(&args[1])?;
    let mut s = eval.force_string(&args[2])?;
    for (f, t) in from.iter().zip(&to) {
        let f = eval.force_string(f)?;
        let t = eval.force_string(t)?;
        if !f.is_empty() {
            s = s.replace(&f, &t);
        }
    }
    Ok(value_ref(Value::Str(s)))
}

fn prim_base_name_of(
    eval: &Evaluator,
    args: &[ValueRef],
    _pos: Option<Position>,
) -> Result<ValueRef, EvalError> {
    let s = eval.coerce_to_string(&args[0], false)?;
    let base = s.trim_end_matches('/').rsplit('/').next().unwrap_or("").to_string();
    Ok(value_ref(Value::Str(base)))
}

fn prim_dir_of(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    eval.force(&args[0])?;
    let was_path = matches!(&*args[0].borrow(), Value::Path(_));
    let s = eval.coerce_to_string(&args[0], false)?;
    let dir = match s.rfind('/') {
        Some(0) => "/".to_string(),
        Some(index) => s[..index].to_string(),
        None => ".".to_string(),
    };
    Ok(value_ref(if was_path { Value::Path(dir) } else { Value::Str(dir) }))
}

// ===== Files =====

fn prim_import(eval: &Evaluator, args: &[ValueRef], pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let path = eval.coerce_to_string(&args[0], false).map_err(|e| match pos {
        Some(pos) => e.with_pos(pos),
        None => e,
    })?;
    eval.import(&path)
}

fn prim_get_env(eval: &Evaluator, args: &[ValueRef], _pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let name = eval.force_string(&args[0])?;
    Ok(value_ref(Value::Str(std::env::var(name).unwrap_or_default())))
}

fn prim_path_exists(
    eval: &Evaluator,
    args: &[ValueRef],
    _pos: Option<Position>,
) -> Result<ValueRef, EvalError> {
    let path = eval.coerce_to_string(&args[0], false)?;
    Ok(value_ref(Value::Bool(std::path::Path::new(&path).exists())))
}

fn prim_read_file(eval: &Evaluator, args: &[ValueRef], pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let path = eval.coerce_to_string(&args[0], false)?;
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(value_ref(Value::Str(contents))),
        Err(err) => Err(EvalError { message: format!("opening file '{path}': {err}"), pos }),
    }
}

fn prim_read_dir(eval: &Evaluator, args: &[ValueRef], pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let path = eval.coerce_to_string(&args[0], false)?;
    let entries = std::fs::read_dir(&path)
        .map_err(|err| EvalError { message: format!("opening directory '{path}': {err}"), pos })?;
    let symbols = eval.symbols();
    let mut out: Vec<(String, ValueRef)> = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        let kind = match entry.file_type() {
            Ok(t) if t.is_dir() => "directory",
            Ok(t) if t.is_symlink() => "symlink",
            Ok(_) => "regular",
            Err(_) => "unknown",
        };
        out.push((name, value_ref(Value::Str(kind.to_string()))));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(value_ref(Value::attrs_from(
        out.into_iter().map(|(name, v)| (symbols.intern(&name), v)),
    )))
}

fn prim_find_file(eval: &Evaluator, args: &[ValueRef], pos: Option<Position>) -> Result<ValueRef, EvalError> {
    let entries = eval.force_list(&args[0])?;
    let name = eval.force_string(&args[1])?;
    let symbols = eval.symbols();
    let prefix_sym = symbols.intern("prefix");
    let path_sym = symbols.intern("path");
    for entry in entries {
        let set = eval.force_attrs(&entry)?;
        let prefix = match set.get(prefix_sym) {
            Some(attr) => eval.force_string(&attr.value)?,
            None => String::new(),
        };
        let path = match set.get(path_sym) {
            Some(attr) => eval.force_string(&attr.value)?,
            None => continue,
        };
        if prefix == name {
            return Ok(value_ref(Value::Path(path)));
        }
        if prefix.is_empty() {
            let candidate = format!("{}/{}", path.trim_end_matches('/'), name);
            if std::path::Path::new(&candidate).exists() {
                return Ok(value_ref(Value::Path(candidate)));
            }
        }
    }
    Err(EvalError {
        message: format!(
            "file '{name}' was not found in the Nix search path (add it using $NIX_PATH or -I)"
        ),
        pos,
    })
}

fn prim_scoped_import(
    eval: &Evaluator,
    args: &[ValueRef],
    pos: Option<Position>,
) -> Result<ValueRef, EvalError> {
    // The scope argument is ignored; plain import semantics.
    prim_import(eval, &args[1..], pos)
}

// ===== Unsupported builtins kept for their names =====

stub_primop!(prim_derivation, "derivation");
stub_primop!(prim_derivation_strict, "derivationStrict");
stub_primop!(prim_fetch_git, "fetchGit");
stub_primop!(prim_fetch_tarball, "fetchTarball");
stub_primop!(prim_fetchurl, "fetchurl");
stub_primop!(prim_from_json, "fromJSON");
stub_primop!(prim_from_toml, "fromTOML");
stub_primop!(prim_hash_string, "hashString");
stub_primop!(prim_match, "match");
stub_primop!(prim_placeholder, "placeholder");
stub_primop!(prim_split, "split");
stub_primop!(prim_to_json, "toJSON");
