//! Hover and go-to-definition.
//!
//! Hover evaluates the selection prefix up to and including the cursor
//! component and renders the forced head as markdown. Attribute values
//! carry their definition positions, which is all go-to-definition needs.
//! Every evaluation error here is swallowed: hover answers or stays
//! silent, it never surfaces errors.

use nix_eval::ExprRef;
use nix_lexer::Position;
use nix_parser::{Expr, display};
use tracing::debug;

use crate::analysis::Analysis;
use crate::analyzer::Analyzer;
use crate::document::Document;

/// A hover answer.
pub struct HoverResult {
    /// Markdown shown to the user.
    pub markdown: String,
    /// Definition position of the hovered value, when one is known.
    pub definition: Option<Position>,
}

fn code_block(text: &str) -> String {
    format!("```nix\n{text}\n```")
}

/// Compute hover information at the analysed position.
pub fn hover(analyzer: &Analyzer, _doc: &Document, analysis: &Analysis) -> Option<HoverResult> {
    let eval = analyzer.evaluator();
    let symbols = analyzer.symbols();

    // A formal shows its default.
    if let Some(formal_cursor) = analysis.formal {
        let Expr::Lambda(lambda) =
            analysis.unit.result.ast.expr(formal_cursor.lambda)
        else {
            return None;
        };
        let formal = &lambda.formals.as_ref()?.formals[formal_cursor.index];
        let markdown = match formal.default {
            Some(default) => {
                code_block(&display(&analysis.unit.result, symbols, default))
            }
            None => code_block(&symbols.name(formal.name)),
        };
        return Some(HoverResult { markdown, definition: None });
    }

    let innermost = analysis.innermost()?;
    let env = analysis.innermost_env(eval.base_env());

    match analysis.unit.result.ast.expr(innermost.expr) {
        Expr::Select { base, path, .. } => {
            let attr = analysis.attr.filter(|attr| attr.expr == innermost.expr)?;
            let base_ref = ExprRef { unit: analysis.unit.clone(), id: *base };
            let mut v = eval.eval(&base_ref, &env).ok()?;
            let mut definition = None;
            for component in &path[..=attr.index.min(path.len() - 1)] {
                let sym = component.symbol()?;
                let set = eval.force_attrs(&v).ok()?;
                let found = set.get(sym)?;
                definition = found.pos;
                v = found.value.clone();
            }
            if let Err(err) = eval.force(&v) {
                debug!(error = %err, "hover prefix failed to force");
            }
            Some(HoverResult { markdown: code_block(&eval.print_value(&v)), definition })
        }
        Expr::Var(_) => {
            let var_ref = ExprRef { unit: analysis.unit.clone(), id: innermost.expr };
            let v = eval.eval(&var_ref, &env).ok()?;
            Some(HoverResult { markdown: code_block(&eval.print_value(&v)), definition: None })
        }
        _ => None,
    }
}
