//! End-to-end evaluator behaviour.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::rc::Rc;

use nix_eval::{Evaluator, ExprRef, Value, ValueRef};
use nix_parser::{SymbolTable, parse};
use pretty_assertions::assert_eq;

fn evaluator() -> Evaluator {
    Evaluator::new(Rc::new(SymbolTable::new()))
}

fn eval_source(eval: &Evaluator, source: &str) -> Result<ValueRef, nix_eval::EvalError> {
    let result = parse(source, None, "/", eval.symbols());
    assert_eq!(result.diagnostics, vec![], "unexpected parse errors in {source}");
    let unit = eval.bind_unit(result, None);
    let root = ExprRef { unit: unit.clone(), id: unit.result.root };
    eval.eval(&root, &eval.base_env())
}

fn eval_int(eval: &Evaluator, source: &str) -> i64 {
    let v = eval_source(eval, source).unwrap();
    eval.force_int(&v).unwrap()
}

#[test]
fn arithmetic_follows_precedence() {
    let eval = evaluator();
    assert_eq!(eval_int(&eval, "1 + 2 * 3"), 7);
    assert_eq!(eval_int(&eval, "10 - 4 / 2"), 8);
    assert_eq!(eval_int(&eval, "-3 + 5"), 2);
}

#[test]
fn let_and_selection() {
    let eval = evaluator();
    assert_eq!(eval_int(&eval, "let a = { b = 3; }; in a.b"), 3);
}

#[test]
fn recursive_attrs_see_their_siblings() {
    let eval = evaluator();
    assert_eq!(eval_int(&eval, "rec { a = 1; b = a + 1; }.b"), 2);
}

#[test]
fn with_provides_dynamic_bindings() {
    let eval = evaluator();
    assert_eq!(eval_int(&eval, "with { x = 5; }; x"), 5);
    // Lexical bindings shadow `with`.
    assert_eq!(eval_int(&eval, "let x = 1; in with { x = 2; }; x"), 1);
}

#[test]
fn with_over_null_reports_undefined_variable() {
    let eval = evaluator();
    let err = eval_source(&eval, "with null; x").unwrap_err();
    assert_eq!(err.message, "undefined variable 'x'");
}

#[test]
fn formals_take_defaults_and_actuals() {
    let eval = evaluator();
    assert_eq!(eval_int(&eval, "({ a ? 2, b }: a + b) { b = 3; }"), 5);
    assert_eq!(eval_int(&eval, "({ a ? 2, b }: a + b) { a = 10; b = 3; }"), 13);
}

#[test]
fn unexpected_argument_is_an_error_without_ellipsis() {
    let eval = evaluator();
    let err = eval_source(&eval, "({ a }: a) { a = 1; b = 2; }").unwrap_err();
    assert_eq!(err.message, "function called with unexpected argument 'b'");
    assert_eq!(eval_int(&eval, "({ a, ... }: a) { a = 1; b = 2; }"), 1);
}

#[test]
fn laziness_skips_unasked_siblings() {
    let eval = evaluator();
    assert_eq!(eval_int(&eval, "{ good = 1; bad = abort \"boom\"; }.good"), 1);
}

#[test]
fn select_default_covers_missing_attributes() {
    let eval = evaluator();
    assert_eq!(eval_int(&eval, "{ }.x or 42"), 42);
    assert_eq!(eval_int(&eval, "null.x or 7"), 7);
}

#[test]
fn infinite_recursion_is_detected() {
    let eval = evaluator();
    let err = eval_source(&eval, "let a = a; in a").unwrap_err();
    assert_eq!(err.message, "infinite recursion encountered");
}

#[test]
fn assert_failure_carries_a_position() {
    let eval = evaluator();
    let err = eval_source(&eval, "assert false; 1").unwrap_err();
    assert_eq!(err.message, "assertion failed");
    assert!(err.pos.is_some());
}

#[test]
fn string_interpolation_concatenates() {
    let eval = evaluator();
    let v = eval_source(&eval, "\"a${\"b\"}c\"").unwrap();
    assert_eq!(eval.force_string(&v).unwrap(), "abc");
}

#[test]
fn structural_equality() {
    let eval = evaluator();
    let v = eval_source(&eval, "[ 1 2 ] == [ 1 2 ]").unwrap();
    assert_eq!(eval.force_bool(&v).unwrap(), true);
    let v = eval_source(&eval, "{ a = 1; } == { a = 2; }").unwrap();
    assert_eq!(eval.force_bool(&v).unwrap(), false);
}

#[test]
fn update_prefers_the_right_operand() {
    let eval = evaluator();
    assert_eq!(eval_int(&eval, "({ a = 1; } // { a = 2; }).a"), 2);
}

#[test]
fn builtins_work_through_both_spellings() {
    let eval = evaluator();
    assert_eq!(eval_int(&eval, "builtins.length [ 1 2 3 ]"), 3);
    assert_eq!(eval_int(&eval, "__length [ 1 2 3 ]"), 3);
    let v = eval_source(&eval, "builtins.attrNames { b = 1; a = 2; }").unwrap();
    let names: Vec<String> = eval
        .force_list(&v)
        .unwrap()
        .iter()
        .map(|n| eval.force_string(n).unwrap())
        .collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn unsupported_builtins_error_only_when_applied() {
    let eval = evaluator();
    // Naming it is fine.
    let v = eval_source(&eval, "builtins.fetchTarball").unwrap();
    assert!(matches!(&*v.borrow(), Value::PrimOp(_)));
    // Applying it is not.
    let err = eval_source(&eval, "builtins.fetchTarball { url = \"x\"; }").unwrap_err();
    assert!(err.message.contains("not supported"));
}

#[test]
fn attrs_carry_definition_positions() {
    let eval = evaluator();
    let v = eval_source(&eval, "{ abc = 1; }").unwrap();
    let set = eval.force_attrs(&v).unwrap();
    let attr = set.attrs.values().next().unwrap();
    let pos = attr.pos.unwrap();
    assert_eq!((pos.line, pos.col), (0, 2));
}

#[test]
fn printer_renders_values() {
    let eval = evaluator();
    let v = eval_source(&eval, "{ a = 1; b = \"x\"; }").unwrap();
    assert_eq!(eval.print_value(&v), "{ a = 1; b = \"x\"; }");
    let v = eval_source(&eval, "x: x").unwrap();
    assert_eq!(eval.print_value(&v), "«lambda»");
}

#[test]
fn failed_force_leaves_the_value_retryable() {
    let eval = evaluator();
    let v = eval_source(&eval, "{ bad = 1 + null; }").unwrap();
    let set = eval.force_attrs(&v).unwrap();
    let bad = &set.attrs.values().next().unwrap().value;
    assert!(eval.force(bad).is_err());
    // Still a thunk, not a blackhole: a later query may retry.
    assert!(eval.force(bad).is_err());
}

#[test]
fn try_eval_captures_errors() {
    let eval = evaluator();
    let v = eval_source(&eval, "(builtins.tryEval (throw \"no\")).success").unwrap();
    assert_eq!(eval.force_bool(&v).unwrap(), false);
}
