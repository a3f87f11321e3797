//! Completion.
//!
//! Strategy order, most specific first: inherit sources, selection
//! prefixes, schema vocabularies for attribute sets, then the lexical
//! scope chain. Evaluation errors are swallowed; a failed strategy falls
//! through to the next. The final label list is sorted lexicographically.

use nix_eval::ExprRef;
use nix_parser::Expr;
use tracing::debug;

use crate::analysis::Analysis;
use crate::analyzer::Analyzer;
use crate::document::Document;
use crate::schema;

/// Compute completion labels at the analysed position.
pub fn complete(analyzer: &Analyzer, doc: &Document, analysis: &Analysis) -> Vec<String> {
    let mut labels = complete_inner(analyzer, doc, analysis);
    labels.sort();
    labels.dedup();
    labels
}

fn complete_inner(analyzer: &Analyzer, doc: &Document, analysis: &Analysis) -> Vec<String> {
    let eval = analyzer.evaluator();
    let symbols = analyzer.symbols();

    let Some(innermost) = analysis.innermost() else {
        // Outside the root: offer the base scope.
        debug!("completing with the base scope");
        return base_scope_names(analyzer);
    };

    // `inherit (source) x` completes from the source's attributes.
    if let Some(Some(from)) = analysis.inherit {
        let env = analysis.innermost_env(eval.base_env());
        let from_ref = ExprRef { unit: analysis.unit.clone(), id: from };
        let Ok(v) = eval.eval(&from_ref, &env) else { return Vec::new() };
        let Ok(set) = eval.force_attrs(&v) else { return Vec::new() };
        return set.attrs.keys().map(|sym| symbols.name(*sym)).collect();
    }

    // Selection prefix: evaluate everything before the cursor component.
    if let Some(attr) = analysis.attr {
        if attr.expr == innermost.expr {
            let (base, path) = match analysis.unit.result.ast.expr(innermost.expr) {
                Expr::Select { base, path, .. } | Expr::HasAttr { base, path } => (*base, path),
                _ => return Vec::new(),
            };
            let env = analysis.innermost_env(eval.base_env());
            let base_ref = ExprRef { unit: analysis.unit.clone(), id: base };
            let Ok(mut v) = eval.eval(&base_ref, &env) else { return Vec::new() };
            for component in &path[..attr.index] {
                let Some(sym) = component.symbol() else { return Vec::new() };
                let Ok(set) = eval.force_attrs(&v) else { return Vec::new() };
                match set.get(sym) {
                    Some(found) => v = found.value.clone(),
                    None => return Vec::new(),
                }
            }
            let Ok(set) = eval.force_attrs(&v) else { return Vec::new() };
            return set.attrs.keys().map(|sym| symbols.name(*sym)).collect();
        }
    }

    // An attribute set completes from its schema, when one is recognised.
    if matches!(analysis.unit.result.ast.expr(innermost.expr), Expr::Attrs(_)) {
        if analysis.entries.len() == 1 {
            // A bare top-level attribute set has no expected vocabulary.
            return Vec::new();
        }
        if let Some(found) = schema::get_schema(analyzer, doc, analysis) {
            let items = found.items(eval);
            if !items.is_empty() {
                return items.into_iter().map(|item| item.name).collect();
            }
        }
    }

    // Lexical fallback: every name visible from the innermost node.
    debug!("defaulting to variable completion");
    let mut labels = Vec::new();
    let mut scope = analysis.unit.bindings.scope(innermost.expr).cloned();
    while let Some(current) = scope {
        let at_base = current.up.is_none();
        for sym in current.vars.keys() {
            let name = symbols.name(*sym);
            if at_base && name.starts_with("__") {
                // Top-level double-underscore names stay internal.
                continue;
            }
            if !name.is_empty() {
                labels.push(name);
            }
        }
        scope = current.up.clone();
    }
    labels
}

fn base_scope_names(analyzer: &Analyzer) -> Vec<String> {
    let symbols = analyzer.symbols();
    analyzer
        .evaluator()
        .base_scope()
        .vars
        .keys()
        .map(|sym| symbols.name(*sym))
        .filter(|name| !name.starts_with("__"))
        .collect()
}

/// Whether a label names a base-scope binding; lets tests phrase
/// expectations as "builtins plus these".
pub fn is_builtin_label(analyzer: &Analyzer, label: &str) -> bool {
    let sym = analyzer.symbols().intern(label);
    analyzer.evaluator().base_scope().vars.contains_key(&sym)
}
