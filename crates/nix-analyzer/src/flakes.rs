//! Flake support: synthesised inputs and structural diagnostics.
//!
//! The analyzer does not fetch. Each declared input (plus `self`) is
//! synthesised with the conventional flake output skeleton:
//! `packages`/`legacyPackages`/`devShells` keyed by the standard system
//! names, `lib`, and an `outPath`. That is exactly the shape selection
//! completion needs inside the `outputs` function.

use nix_eval::{Evaluator, ExprRef, Value, ValueRef, value_ref};
use nix_parser::{Expr, Symbol};

use crate::analysis::{Analysis, update_env};
use crate::analyzer::{Analyzer, diagnostic_at};
use crate::diagnostics::Diagnostic;
use crate::document::Document;

/// The systems every synthesised output set is keyed by.
pub const SYSTEMS: &[&str] =
    &["aarch64-darwin", "aarch64-linux", "x86_64-darwin", "x86_64-linux"];

/// Index into the cursor path of the lambda bound to `outputs`, when the
/// document is a flake whose `outputs` attribute lies on the path.
pub fn outputs_lambda_index(
    analyzer: &Analyzer,
    doc: &Document,
    analysis: &Analysis,
) -> Option<usize> {
    if !doc.is_flake() || analysis.entries.len() < 2 {
        return None;
    }
    let root = analysis.entries.last()?;
    let Expr::Attrs(attrs) = analysis.unit.result.ast.expr(root.expr) else {
        return None;
    };
    let outputs = analyzer.symbols().intern("outputs");
    let def = attrs.attrs.get(&outputs)?;
    let below_root = analysis.entries.len() - 2;
    (def.expr == analysis.entries[below_root].expr).then_some(below_root)
}

/// Build the flake-input attr set for a flake document: one entry per
/// declared input plus `self`.
pub fn flake_inputs(analyzer: &Analyzer, doc: &Document) -> Option<ValueRef> {
    let unit = analyzer.unit_for(doc);
    let eval = analyzer.evaluator();
    let Expr::Attrs(root) = unit.result.ast.expr(unit.result.root) else {
        return None;
    };
    let inputs_sym = eval.symbols().intern("inputs");
    let mut names: Vec<Symbol> = vec![eval.symbols().intern("self")];
    if let Some(def) = root.attrs.get(&inputs_sym) {
        if let Expr::Attrs(inputs) = unit.result.ast.expr(def.expr) {
            names.extend(inputs.attrs.keys().copied());
        }
    }
    let entries: Vec<(Symbol, ValueRef)> =
        names.into_iter().map(|sym| (sym, input_skeleton(eval))).collect();
    Some(value_ref(Value::attrs_from(entries)))
}

/// The conventional output skeleton of one input.
fn input_skeleton(eval: &Evaluator) -> ValueRef {
    let symbols = eval.symbols();
    let per_system = || {
        let entries: Vec<(Symbol, ValueRef)> = SYSTEMS
            .iter()
            .map(|system| (symbols.intern(system), value_ref(Value::attrs_from([]))))
            .collect();
        value_ref(Value::attrs_from(entries))
    };
    value_ref(Value::attrs_from([
        (symbols.intern("packages"), per_system()),
        (symbols.intern("legacyPackages"), per_system()),
        (symbols.intern("devShells"), per_system()),
        (symbols.intern("lib"), value_ref(Value::attrs_from([]))),
        (symbols.intern("outPath"), value_ref(Value::Path("/".to_string()))),
    ]))
}

/// Structural checks for a flake document: the root must be an attribute
/// set with the recognised keys, inputs must parse as input descriptors,
/// and `outputs` must be a function.
pub fn structure_diagnostics(
    analyzer: &Analyzer,
    unit: &std::rc::Rc<nix_eval::SourceUnit>,
    out: &mut Vec<Diagnostic>,
) {
    let eval = analyzer.evaluator();
    let root = unit.result.root;
    let Expr::Attrs(attrs) = unit.result.ast.expr(root) else {
        out.push(diagnostic_at(unit, root, "must be an attribute set".to_string()));
        return;
    };

    let symbols = eval.symbols();
    let s_description = symbols.intern("description");
    let s_inputs = symbols.intern("inputs");
    let s_outputs = symbols.intern("outputs");
    let s_nix_config = symbols.intern("nixConfig");
    let base = eval.base_env();

    for (sym, def) in &attrs.attrs {
        let value_env = update_env(eval, unit, root, def.expr, base.clone(), None);
        let def_ref = ExprRef { unit: unit.clone(), id: def.expr };

        if *sym == s_description {
            match eval.eval(&def_ref, &value_env) {
                Ok(v) => {
                    if eval.force(&v).is_ok() && !matches!(&*v.borrow(), Value::Str(_)) {
                        out.push(diagnostic_at(unit, def.expr, "expected a string".to_string()));
                    }
                }
                Err(err) => out.push(diagnostic_at(unit, def.expr, err.message)),
            }
        } else if *sym == s_inputs {
            let Expr::Attrs(inputs) = unit.result.ast.expr(def.expr) else {
                out.push(diagnostic_at(
                    unit,
                    def.expr,
                    "expected an attribute set".to_string(),
                ));
                continue;
            };
            for (input_sym, input_def) in &inputs.attrs {
                let input_env =
                    update_env(eval, unit, def.expr, input_def.expr, value_env.clone(), None);
                let input_ref = ExprRef { unit: unit.clone(), id: input_def.expr };
                match eval.eval(&input_ref, &input_env) {
                    Ok(v) => {
                        if let Err(message) =
                            parse_flake_input(eval, &symbols.name(*input_sym), &v)
                        {
                            out.push(diagnostic_at(unit, input_def.expr, message));
                        }
                    }
                    Err(err) => out.push(diagnostic_at(unit, input_def.expr, err.message)),
                }
            }
        } else if *sym == s_outputs {
            match eval.eval(&def_ref, &value_env) {
                Ok(v) => {
                    let is_function = matches!(
                        &*v.borrow(),
                        Value::Lambda(_) | Value::PrimOp(_) | Value::PrimOpApp { .. }
                    );
                    if !is_function {
                        out.push(diagnostic_at(
                            unit,
                            def.expr,
                            "expected a function".to_string(),
                        ));
                    }
                }
                Err(err) => out.push(diagnostic_at(unit, def.expr, err.message)),
            }
        } else if *sym == s_nix_config {
            // Accepted and ignored.
        } else {
            out.push(diagnostic_at(
                unit,
                def.expr,
                format!("unsupported attribute '{}'", symbols.name(*sym)),
            ));
        }
    }
}

/// Validate one flake input descriptor: a URL string, or an attribute set
/// of recognised keys.
fn parse_flake_input(
    eval: &Evaluator,
    name: &str,
    value: &ValueRef,
) -> Result<(), String> {
    if eval.force(value).is_err() {
        return Err(format!("input '{name}' could not be evaluated"));
    }
    let set = {
        match &*value.borrow() {
            Value::Str(url) => {
                if url.is_empty() {
                    return Err(format!("input '{name}' has an empty url"));
                }
                return Ok(());
            }
            Value::Attrs(set) => set.clone(),
            other => {
                return Err(format!(
                    "flake input is a {} while a set or a string was expected",
                    other.type_name()
                ));
            }
        }
    };

    const STRING_KEYS: &[&str] = &[
        "url", "type", "follows", "owner", "repo", "ref", "rev", "dir", "path", "narHash",
    ];
    let symbols = eval.symbols();
    let mut has_source = false;
    for (sym, attr) in &set.attrs {
        let key = symbols.name(*sym);
        if STRING_KEYS.contains(&key.as_str()) {
            if eval.force_string(&attr.value).is_err() {
                return Err(format!("input attribute '{key}' must be a string"));
            }
            if matches!(key.as_str(), "url" | "type" | "follows" | "path") {
                has_source = true;
            }
        } else if key == "flake" {
            if eval.force_bool(&attr.value).is_err() {
                return Err("input attribute 'flake' must be a Boolean".to_string());
            }
        } else if key == "inputs" {
            if eval.force_attrs(&attr.value).is_err() {
                return Err("input attribute 'inputs' must be a set".to_string());
            }
        } else {
            return Err(format!("unsupported input attribute '{key}'"));
        }
    }
    if !has_source {
        return Err(format!("input '{name}' must specify 'url', 'type', or 'follows'"));
    }
    Ok(())
}
