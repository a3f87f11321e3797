//! Diagnostics assembly.
//!
//! The diagnostic set of a document is the union of parse errors,
//! static-binding errors, and a best-effort evaluation pass. Flake files
//! get structural checks instead of the evaluation pass.

use nix_eval::EvalError;
use nix_lexer::{Position, Range};

use crate::analyzer::Analyzer;
use crate::document::Document;
use crate::flakes;

/// A user-visible diagnostic with a range inside the document.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Human-readable message.
    pub message: String,
    /// Range the message applies to.
    pub range: Range,
}

/// Sentinel whole-document range used for errors without a position.
pub fn whole_document_range() -> Range {
    Range::new(Position::new(0, 0), Position::new(999, 999))
}

/// Convert an evaluation error into a diagnostic, using the sentinel
/// range when the error has no position.
pub fn from_eval_error(err: &EvalError) -> Diagnostic {
    let range = match err.pos {
        Some(pos) => Range::new(pos, Position::new(pos.line, pos.col + 1)),
        None => whole_document_range(),
    };
    Diagnostic { message: err.message.clone(), range }
}

/// Compute the full diagnostic set for a document.
pub fn compute(analyzer: &Analyzer, doc: &Document) -> Vec<Diagnostic> {
    let analysis = analyzer.analyze(doc, Position::new(0, 0));
    let unit = &analysis.unit;

    let mut diagnostics: Vec<Diagnostic> = unit
        .result
        .diagnostics
        .iter()
        .chain(unit.bindings.diagnostics.iter())
        .map(|d| Diagnostic { message: d.message.clone(), range: d.range })
        .collect();
    diagnostics.extend(analysis.diagnostics.iter().cloned());

    if doc.is_flake() {
        flakes::structure_diagnostics(analyzer, unit, &mut diagnostics);
    } else {
        let root_ref = nix_eval::ExprRef { unit: unit.clone(), id: unit.result.root };
        let env = analyzer.evaluator().base_env();
        if let Err(err) = analyzer.evaluator().eval(&root_ref, &env) {
            diagnostics.push(from_eval_error(&err));
        }
    }

    diagnostics
}
