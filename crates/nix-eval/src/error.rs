//! Evaluation errors.

use nix_lexer::Position;

/// An error raised while evaluating. Carries an optional position; errors
/// without one are mapped to a whole-document sentinel range by the
/// diagnostics layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EvalError {
    /// Human-readable message in the strict evaluator's wording.
    pub message: String,
    /// Position of the failing expression, when known.
    pub pos: Option<Position>,
}

impl EvalError {
    /// An error with no position.
    pub fn new(message: impl Into<String>) -> Self {
        EvalError { message: message.into(), pos: None }
    }

    /// An error anchored to a position.
    pub fn at(message: impl Into<String>, pos: Position) -> Self {
        EvalError { message: message.into(), pos: Some(pos) }
    }

    /// Attach a position if the error does not have one yet.
    pub fn with_pos(mut self, pos: Position) -> Self {
        self.pos.get_or_insert(pos);
        self
    }
}
