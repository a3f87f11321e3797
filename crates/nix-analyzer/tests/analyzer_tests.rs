//! End-to-end analysis scenarios: completion, hover, diagnostics, and the
//! environment invariants, on documents of every supported kind.

#![allow(clippy::unwrap_used, clippy::panic)]

use nix_analyzer::{Analyzer, ContentChange, Document, complete, compute_diagnostics, hover};
use nix_lexer::Position;
use pretty_assertions::assert_eq;

fn doc(source: &str) -> Document {
    Document::new("file:///test.nix".to_string(), source.to_string(), None)
}

fn doc_at(path: &str, source: &str) -> Document {
    Document::new(format!("file://{path}"), source.to_string(), Some(path.to_string()))
}

fn complete_at(analyzer: &Analyzer, document: &Document, line: u32, col: u32) -> Vec<String> {
    let analysis = analyzer.analyze(document, Position::new(line, col));
    complete(analyzer, document, &analysis)
}

/// Assert that `labels` is exactly the base scope plus `extra`.
fn assert_builtins_plus(analyzer: &Analyzer, labels: &[String], extra: &[&str]) {
    for name in ["builtins", "map", "toString", "true", "null"] {
        assert!(labels.iter().any(|l| l == name), "missing builtin {name}: {labels:?}");
    }
    for name in extra {
        assert!(labels.iter().any(|l| l == name), "missing {name}: {labels:?}");
    }
    for label in labels {
        assert!(
            nix_analyzer::completion::is_builtin_label(analyzer, label)
                || extra.contains(&label.as_str()),
            "unexpected label {label}"
        );
    }
}

#[test]
fn selection_completion_lists_attr_keys() {
    let analyzer = Analyzer::new();
    let document = doc("{apple = 4; banana = 7; }.a");
    let labels = complete_at(&analyzer, &document, 0, 27);
    assert_eq!(labels, vec!["apple", "banana"]);
    let diagnostics = compute_diagnostics(&analyzer, &document);
    assert!(
        diagnostics.iter().all(|d| !d.message.starts_with("syntax error")),
        "unexpected parse errors: {diagnostics:?}"
    );
}

#[test]
fn duplicate_attr_completion_empty_with_diagnostic() {
    let analyzer = Analyzer::new();
    let document = doc("{a = 2; a = 3;}");
    let labels = complete_at(&analyzer, &document, 0, 15);
    assert_eq!(labels, Vec::<String>::new());
    let diagnostics = compute_diagnostics(&analyzer, &document);
    assert!(
        diagnostics
            .iter()
            .any(|d| d.message == "attribute 'a' already defined at (string):1:2"),
        "got {diagnostics:?}"
    );
}

#[test]
fn duplicate_formal_completion_includes_formals() {
    let analyzer = Analyzer::new();
    let document = doc("{a, b, a}: a");
    let labels = complete_at(&analyzer, &document, 0, 12);
    assert_builtins_plus(&analyzer, &labels, &["a", "b"]);
    let diagnostics = compute_diagnostics(&analyzer, &document);
    assert!(
        diagnostics
            .iter()
            .any(|d| d.message == "duplicate formal function argument 'a'"),
        "got {diagnostics:?}"
    );
}

#[test]
fn broken_operand_completes_builtins() {
    let analyzer = Analyzer::new();
    let document = doc("(2+)");
    let labels = complete_at(&analyzer, &document, 0, 3);
    assert_builtins_plus(&analyzer, &labels, &[]);
    let diagnostics = compute_diagnostics(&analyzer, &document);
    assert!(
        diagnostics.iter().any(|d| d.message == "syntax error, unexpected ')'"),
        "got {diagnostics:?}"
    );
}

#[test]
fn rec_attrs_are_visible_inside_a_list() {
    let analyzer = Analyzer::new();
    let document = doc("rec { a = [  ]; b = 2; }");
    let labels = complete_at(&analyzer, &document, 0, 12);
    assert_builtins_plus(&analyzer, &labels, &["a", "b"]);
}

#[test]
fn inherit_from_completes_source_attrs() {
    let analyzer = Analyzer::new();
    let source = "let a = { b = 3; }; in { inherit (a) x; }";
    let document = doc(source);
    let x_col = source.find(" x;").unwrap() as u32 + 1;
    let labels = complete_at(&analyzer, &document, 0, x_col);
    assert_eq!(labels, vec!["b"]);
}

#[test]
fn with_null_completes_builtins_without_binding_errors() {
    let analyzer = Analyzer::new();
    let document = doc("with null; x");
    let labels = complete_at(&analyzer, &document, 0, 12);
    assert_builtins_plus(&analyzer, &labels, &[]);
    let analysis = analyzer.analyze(&document, Position::new(0, 12));
    assert_eq!(analysis.unit.bindings.diagnostics, vec![]);
}

#[test]
fn flake_outputs_lambda_receives_synthesised_inputs() {
    let analyzer = Analyzer::new();
    let source = "{\n  inputs = { nixpkgs = { url = \"github:NixOS/nixpkgs\"; }; };\n  outputs = { self, nixpkgs }: { x = nixpkgs.legacyPackages.; };\n}\n";
    let document = doc_at("/ws/flake.nix", source);
    analyzer.refresh_file_info(&document);
    let line = 2;
    let col = source.lines().nth(2).unwrap().find("legacyPackages.").unwrap() as u32
        + "legacyPackages.".len() as u32;
    let labels = complete_at(&analyzer, &document, line, col);
    assert_eq!(
        labels,
        vec!["aarch64-darwin", "aarch64-linux", "x86_64-darwin", "x86_64-linux"]
    );
}

#[test]
fn flake_structure_diagnostics() {
    let analyzer = Analyzer::new();
    let source = "{ description = 42; inputs = { nixpkgs = { }; }; outputs = { self }: { }; foo = 1; }";
    let document = doc_at("/ws/flake.nix", source);
    analyzer.refresh_file_info(&document);
    let diagnostics = compute_diagnostics(&analyzer, &document);
    let messages: Vec<_> = diagnostics.iter().map(|d| d.message.as_str()).collect();
    assert!(messages.contains(&"expected a string"), "got {messages:?}");
    assert!(
        messages.contains(&"input 'nixpkgs' must specify 'url', 'type', or 'follows'"),
        "got {messages:?}"
    );
    assert!(messages.contains(&"unsupported attribute 'foo'"), "got {messages:?}");
}

#[test]
fn flake_root_must_be_an_attrset() {
    let analyzer = Analyzer::new();
    let document = doc_at("/ws/flake.nix", "[ ]");
    analyzer.refresh_file_info(&document);
    let diagnostics = compute_diagnostics(&analyzer, &document);
    assert!(
        diagnostics.iter().any(|d| d.message == "must be an attribute set"),
        "got {diagnostics:?}"
    );
}

#[test]
fn mk_derivation_argument_completes_schema() {
    let analyzer = Analyzer::new();
    let document = doc("{ stdenv }: stdenv.mkDerivation {  }");
    let labels = complete_at(&analyzer, &document, 0, 34);
    for expected in ["pname", "version", "src", "buildInputs", "meta"] {
        assert!(labels.iter().any(|l| l == expected), "missing {expected}: {labels:?}");
    }
}

#[test]
fn hover_selection_shows_value_and_definition() {
    let analyzer = Analyzer::new();
    let source = "let a = { b = 3; }; in a.b";
    let document = doc(source);
    let analysis = analyzer.analyze(&document, Position::new(0, 25));
    let result = hover(&analyzer, &document, &analysis).expect("hover result");
    assert!(result.markdown.contains('3'), "got {}", result.markdown);
    assert_eq!(result.definition, Some(Position::new(0, 10)));
}

#[test]
fn hover_formal_shows_its_default() {
    let analyzer = Analyzer::new();
    let document = doc("{ a ? { b = 1; }, c }: a");
    let analysis = analyzer.analyze(&document, Position::new(0, 2));
    let result = hover(&analyzer, &document, &analysis).expect("hover result");
    assert!(result.markdown.contains("b = 1"), "got {}", result.markdown);
}

#[test]
fn env_slots_cover_static_vars_along_the_path() {
    let analyzer = Analyzer::new();
    let source = "let a = 1; in { f = { x, y ? 2 }: with { z = 3; }; [ x y z a ]; }";
    let document = doc(source);
    let col = source.find("x y z a").unwrap() as u32;
    let analysis = analyzer.analyze(&document, Position::new(0, col));
    let entry = analysis.innermost().unwrap();
    let mut scope = analysis.unit.bindings.scope(entry.expr).cloned();
    let mut env = entry.env.clone();
    while let (Some(s), Some(e)) = (scope.clone(), env.clone()) {
        assert!(
            e.size() >= s.vars.len(),
            "env has {} slots for {} static vars",
            e.size(),
            s.vars.len()
        );
        scope = s.up.clone();
        env = e.up.clone();
    }
    // Both chains bottom out together at the base environment.
    assert!(scope.is_none());
}

#[test]
fn full_replacement_matches_fresh_open() {
    let analyzer = Analyzer::new();
    let mut changed = doc("{ old = 1; }.");
    changed.apply_change(ContentChange {
        range: None,
        text: "{ apple = 4; banana = 7; }.a".to_string(),
    });
    let fresh = doc("{ apple = 4; banana = 7; }.a");
    let from_change = complete_at(&analyzer, &changed, 0, 28);
    let from_open = complete_at(&analyzer, &fresh, 0, 28);
    assert_eq!(from_change, from_open);
    assert_eq!(from_open, vec!["apple", "banana"]);
}

#[test]
fn call_site_argument_reaches_the_lambda_body() {
    let analyzer = Analyzer::new();
    let source = "(arg: arg.) { alpha = 1; beta = 2; }";
    let document = doc(source);
    let labels = complete_at(&analyzer, &document, 0, 10);
    assert_eq!(labels, vec!["alpha", "beta"]);
}

mod package_files {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn write(path: &std::path::Path, text: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn package_file_lambda_receives_the_package_set() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            &root.join("nixpkgs/default.nix"),
            "{ overrides ? { } }: { stdenv = { mkDerivation = x: x; cc = { pname = \"gcc\"; }; }; lib = { }; }",
        );
        write(
            &root.join("nix-analyzer-config.nix"),
            &format!("{{ nixpkgs = {}/nixpkgs; }}", root.display()),
        );
        let pkg_path = root.join("pkgs/hello/default.nix");
        write(&pkg_path, "{ stdenv, lib }: stdenv.");

        let analyzer = Analyzer::new();
        let document = doc_at(&pkg_path.to_string_lossy(), "{ stdenv, lib }: stdenv.");
        analyzer.refresh_file_info(&document);
        let labels = complete_at(&analyzer, &document, 0, 24);
        assert_eq!(labels, vec!["cc", "mkDerivation"]);
    }

    #[test]
    fn missing_package_root_is_a_diagnostic_not_an_abort() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_path = dir.path().join("pkgs/hello/default.nix");
        std::fs::create_dir_all(pkg_path.parent().unwrap()).unwrap();
        std::fs::write(&pkg_path, "{ stdenv }: stdenv").unwrap();

        let analyzer = Analyzer::new();
        let document = doc_at(&pkg_path.to_string_lossy(), "{ stdenv }: stdenv");
        analyzer.refresh_file_info(&document);
        let analysis = analyzer.analyze(&document, Position::new(0, 17));
        assert!(
            analysis.diagnostics.iter().any(|d| d.message.contains("no package root")),
            "got {:?}",
            analysis.diagnostics
        );
    }
}

mod option_trees {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn option_tree_from_config_completes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("nix-analyzer-config.nix"),
            "{ options = { services = { foo = { enable = { _type = \"option\"; description = \"x\"; }; }; }; }; }",
        )
        .unwrap();
        let module_path = root.join("module.nix");
        let source = "{ services = { foo = {  }; }; }";
        fs::write(&module_path, source).unwrap();

        let analyzer = Analyzer::new();
        let document = doc_at(&module_path.to_string_lossy(), source);
        analyzer.refresh_file_info(&document);
        let col = source.find("{  }").unwrap() as u32 + 2;
        let labels = complete_at(&analyzer, &document, 0, col);
        assert_eq!(labels, vec!["enable"]);
    }
}
