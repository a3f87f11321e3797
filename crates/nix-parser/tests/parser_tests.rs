//! Behavioural tests for the tolerant parser, the static-env builder, and
//! the cursor-path locator.

#![allow(clippy::unwrap_used, clippy::panic)]

use indexmap::IndexMap;
use nix_lexer::Position;
use nix_parser::{
    Expr, ExprId, ParseResult, StaticScope, SymbolTable, VarResolution, bind_vars, display,
    locate, parse,
};
use pretty_assertions::assert_eq;
use std::rc::Rc;

fn parse_str(symbols: &SymbolTable, source: &str) -> ParseResult {
    parse(source, None, "/base", symbols)
}

fn base_scope(symbols: &SymbolTable, names: &[&str]) -> Rc<StaticScope> {
    let mut vars = IndexMap::new();
    for (displ, name) in names.iter().enumerate() {
        vars.insert(symbols.intern(name), displ);
    }
    StaticScope::with_vars(vars, None)
}

#[test]
fn parses_attrset_with_selection() {
    let symbols = SymbolTable::new();
    let result = parse_str(&symbols, "{apple = 4; banana = 7; }.a");
    assert_eq!(result.diagnostics, vec![]);
    match result.ast.expr(result.root) {
        Expr::Select { path, .. } => assert_eq!(path.len(), 1),
        other => panic!("expected selection at root, got {other:?}"),
    }
}

#[test]
fn duplicate_attr_reports_second_occurrence_and_first_wins() {
    let symbols = SymbolTable::new();
    let result = parse_str(&symbols, "{a = 2; a = 3;}");
    let messages: Vec<_> = result.diagnostics.iter().map(|d| d.message.clone()).collect();
    assert_eq!(messages, vec!["attribute 'a' already defined at (string):1:2"]);
    // The surviving definition is the first one.
    match result.ast.expr(result.root) {
        Expr::Attrs(attrs) => {
            assert_eq!(attrs.attrs.len(), 1);
            let def = attrs.attrs.values().next().unwrap();
            assert_eq!(result.ast.expr(def.expr), &Expr::Int(2));
        }
        other => panic!("expected attrset, got {other:?}"),
    }
}

#[test]
fn duplicate_formal_keeps_the_list() {
    let symbols = SymbolTable::new();
    let result = parse_str(&symbols, "{a, b, a}: a");
    let messages: Vec<_> = result.diagnostics.iter().map(|d| d.message.clone()).collect();
    assert_eq!(messages, vec!["duplicate formal function argument 'a'"]);
    match result.ast.expr(result.root) {
        Expr::Lambda(lambda) => {
            assert_eq!(lambda.formals.as_ref().unwrap().formals.len(), 3);
        }
        other => panic!("expected lambda, got {other:?}"),
    }
}

#[test]
fn broken_operand_recovers_with_placeholder() {
    let symbols = SymbolTable::new();
    let result = parse_str(&symbols, "(2+)");
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].message, "syntax error, unexpected ')'");
    // A root still exists and covers the whole input.
    assert!(result.range(result.root).end >= Position::new(0, 3));
}

#[test]
fn attr_without_value_gets_null_placeholder() {
    let symbols = SymbolTable::new();
    let result = parse_str(&symbols, "{ a = ; }");
    assert!(!result.diagnostics.is_empty());
    match result.ast.expr(result.root) {
        Expr::Attrs(attrs) => {
            let def = attrs.attrs.values().next().unwrap();
            let null = symbols.intern("null");
            assert_eq!(result.ast.expr(def.expr), &Expr::Var(null));
        }
        other => panic!("expected attrset, got {other:?}"),
    }
}

#[test]
fn trailing_dot_synthesises_empty_component() {
    let symbols = SymbolTable::new();
    let result = parse_str(&symbols, "{ x = 1; }.");
    match result.ast.expr(result.root) {
        Expr::Select { path, .. } => {
            assert_eq!(path.len(), 1);
            assert_eq!(path[0].symbol(), Some(symbols.intern("")));
        }
        other => panic!("expected selection, got {other:?}"),
    }
}

#[test]
fn nested_attrpath_definitions_merge() {
    let symbols = SymbolTable::new();
    let result = parse_str(&symbols, "{ a.b = 1; a.c = 2; }");
    assert_eq!(result.diagnostics, vec![]);
    match result.ast.expr(result.root) {
        Expr::Attrs(attrs) => {
            assert_eq!(attrs.attrs.len(), 1);
            let a = attrs.attrs.values().next().unwrap();
            match result.ast.expr(a.expr) {
                Expr::Attrs(inner) => assert_eq!(inner.attrs.len(), 2),
                other => panic!("expected nested attrset, got {other:?}"),
            }
        }
        other => panic!("expected attrset, got {other:?}"),
    }
}

#[test]
fn arithmetic_desugars_to_builtin_calls() {
    let symbols = SymbolTable::new();
    let result = parse_str(&symbols, "1 - 2");
    match result.ast.expr(result.root) {
        Expr::Call { fun, args } => {
            assert_eq!(result.ast.expr(*fun), &Expr::Var(symbols.intern("__sub")));
            assert_eq!(args.len(), 2);
        }
        other => panic!("expected __sub call, got {other:?}"),
    }
}

#[test]
fn search_path_desugars_to_find_file() {
    let symbols = SymbolTable::new();
    let result = parse_str(&symbols, "<nixpkgs>");
    match result.ast.expr(result.root) {
        Expr::Call { fun, args } => {
            assert_eq!(result.ast.expr(*fun), &Expr::Var(symbols.intern("__findFile")));
            assert_eq!(result.ast.expr(args[1]), &Expr::Str("nixpkgs".to_string()));
        }
        other => panic!("expected __findFile call, got {other:?}"),
    }
}

#[test]
fn relative_paths_resolve_against_base() {
    let symbols = SymbolTable::new();
    let result = parse_str(&symbols, "./pkgs/default.nix");
    assert_eq!(
        result.ast.expr(result.root),
        &Expr::Path("/base/pkgs/default.nix".to_string())
    );
}

#[test]
fn every_node_has_a_parent_except_the_root() {
    let symbols = SymbolTable::new();
    let result = parse_str(&symbols, "let a = { b = [ 1 2 ]; }; in a.b");
    let mut reachable = vec![result.root];
    let mut index = 0;
    while index < reachable.len() {
        let id = reachable[index];
        index += 1;
        let mut children = Vec::new();
        result.ast.expr(id).children(&mut children);
        for child in children {
            assert_eq!(result.ast.parent(child), Some(id), "child {child:?} of {id:?}");
            reachable.push(child);
        }
    }
}

#[test]
fn range_monotonicity() {
    let symbols = SymbolTable::new();
    let source = "rec { a = if true then [ ./x 2.5 ] else \"s${toString 1}\"; b = a < 3; }";
    let result = parse_str(&symbols, source);
    let mut stack = vec![result.root];
    while let Some(id) = stack.pop() {
        let mut children = Vec::new();
        result.ast.expr(id).children(&mut children);
        for child in children {
            assert!(
                result.range(id).encloses(result.range(child)),
                "range of {child:?} escapes {id:?}"
            );
            stack.push(child);
        }
    }
}

// ===== Static environments =====

#[test]
fn let_binds_body_and_values() {
    let symbols = SymbolTable::new();
    let result = parse_str(&symbols, "let a = 1; in a");
    let bindings = bind_vars(&result, base_scope(&symbols, &["true", "false", "null"]), &symbols);
    assert_eq!(bindings.diagnostics, vec![]);
    let body = match result.ast.expr(result.root) {
        Expr::Let { body, .. } => *body,
        other => panic!("expected let, got {other:?}"),
    };
    assert_eq!(bindings.var(body), Some(VarResolution::Static { level: 0, displ: 0 }));
}

#[test]
fn undefined_variable_is_a_diagnostic() {
    let symbols = SymbolTable::new();
    let result = parse_str(&symbols, "a");
    let bindings = bind_vars(&result, base_scope(&symbols, &["true"]), &symbols);
    let messages: Vec<_> = bindings.diagnostics.iter().map(|d| d.message.clone()).collect();
    assert_eq!(messages, vec!["undefined variable 'a'"]);
}

#[test]
fn with_suppresses_undefined_variable() {
    let symbols = SymbolTable::new();
    let result = parse_str(&symbols, "with null; x");
    let bindings = bind_vars(&result, base_scope(&symbols, &["null"]), &symbols);
    assert_eq!(bindings.diagnostics, vec![]);
    let body = match result.ast.expr(result.root) {
        Expr::With { body, .. } => *body,
        other => panic!("expected with, got {other:?}"),
    };
    assert_eq!(bindings.var(body), Some(VarResolution::FromWith { level: 0 }));
}

#[test]
fn every_reachable_node_has_a_scope() {
    let symbols = SymbolTable::new();
    let result = parse_str(&symbols, "{ f = x: { inherit x; y = with x; z; }; }");
    let bindings = bind_vars(&result, base_scope(&symbols, &["null"]), &symbols);
    let mut stack = vec![result.root];
    while let Some(id) = stack.pop() {
        assert!(bindings.scope(id).is_some(), "no static env for {id:?}");
        let mut children = Vec::new();
        result.ast.expr(id).children(&mut children);
        stack.extend(children);
    }
}

// ===== Cursor paths =====

fn path_kinds(result: &ParseResult, path: &[ExprId]) -> Vec<&'static str> {
    path.iter()
        .map(|&id| match result.ast.expr(id) {
            Expr::Var(_) => "var",
            Expr::Attrs(_) => "attrs",
            Expr::List(_) => "list",
            Expr::Let { .. } => "let",
            Expr::Lambda(_) => "lambda",
            Expr::Select { .. } => "select",
            _ => "other",
        })
        .collect()
}

#[test]
fn cursor_path_is_innermost_first() {
    let symbols = SymbolTable::new();
    let result = parse_str(&symbols, "rec { a = [  ]; b = 2; }");
    let cursor = locate(&result, Position::new(0, 12));
    assert_eq!(path_kinds(&result, &cursor.path), vec!["list", "attrs"]);
    for pair in cursor.path.windows(2) {
        assert!(result.range(pair[1]).encloses(result.range(pair[0])));
    }
}

#[test]
fn cursor_outside_root_yields_empty_path() {
    let symbols = SymbolTable::new();
    let result = parse_str(&symbols, "{ a = 1; }");
    let cursor = locate(&result, Position::new(5, 0));
    assert_eq!(cursor.path, vec![]);
}

#[test]
fn cursor_on_selection_component_is_recorded() {
    let symbols = SymbolTable::new();
    let result = parse_str(&symbols, "{apple = 4; banana = 7; }.a");
    let cursor = locate(&result, Position::new(0, 27));
    let attr = cursor.attr.expect("attr component under cursor");
    assert_eq!(attr.index, 0);
    assert_eq!(path_kinds(&result, &cursor.path[..1]), vec!["select"]);
}

#[test]
fn cursor_on_inherit_records_the_source() {
    let symbols = SymbolTable::new();
    let source = "let a = { b = 3; }; in { inherit (a) x; }";
    let result = parse_str(&symbols, source);
    let x_col = source.find(" x;").unwrap() as u32 + 1;
    let cursor = locate(&result, Position::new(0, x_col));
    let inherit = cursor.inherit.expect("inherit under cursor");
    assert!(inherit.is_some(), "expected a parenthesised inherit source");
}

#[test]
fn cursor_on_formal_is_recorded() {
    let symbols = SymbolTable::new();
    let result = parse_str(&symbols, "{ a ? 1, b }: a");
    let cursor = locate(&result, Position::new(0, 2));
    let formal = cursor.formal.expect("formal under cursor");
    assert_eq!(formal.index, 0);
}

// ===== Round trips =====

#[test]
fn print_reparse_print_is_stable() {
    let symbols = SymbolTable::new();
    let sources = [
        "{ a = 1; b = { c = true; }; }",
        "let inherit (x) y; in y",
        "x: { a ? 2, ... } @ args: [ x args ]",
        "with { a = 1; }; a ++ [ 2 ] // { } == 3 && ! false",
        "if a -> b then \"s${x}\" else ''ind''",
        "assert 1 < 2; builtins.length [ ]",
    ];
    for source in sources {
        let first = parse_str(&symbols, source);
        assert_eq!(first.diagnostics, vec![], "unexpected errors in {source}");
        let printed = display(&first, &symbols, first.root);
        let second = parse_str(&symbols, &printed);
        assert_eq!(second.diagnostics, vec![], "reparse errors for {printed}");
        let reprinted = display(&second, &symbols, second.root);
        assert_eq!(printed, reprinted, "unstable print for {source}");
    }
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Parsing never panics and always produces a rooted tree with a
        // finite diagnostic list.
        #[test]
        fn parser_totality(source in ".{0,120}") {
            let symbols = SymbolTable::new();
            let result = parse_str(&symbols, &source);
            prop_assert!(result.ast.len() > 0);
            let _ = result.range(result.root);
        }

        // Token fragments of real-looking sources also never panic.
        #[test]
        fn parser_totality_nixish(source in "[a-z{}\\[\\]().;:=\"'$ ]{0,60}") {
            let symbols = SymbolTable::new();
            let result = parse_str(&symbols, &source);
            prop_assert!(result.ast.len() > 0);
        }
    }
}
