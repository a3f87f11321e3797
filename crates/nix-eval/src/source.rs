//! Parsed source units.
//!
//! A [`SourceUnit`] bundles a parse result with its variable bindings and
//! is shared by reference counting: thunks capture `ExprRef`s into it, so
//! a unit stays alive as long as any value produced from it.

use std::rc::Rc;

use nix_lexer::{Position, Range};
use nix_parser::{Bindings, Expr, ExprId, ParseResult};

/// One parsed document or imported file.
pub struct SourceUnit {
    /// On-disk path, if the unit came from a file.
    pub path: Option<String>,
    /// The parse result (arena, tokens, diagnostics).
    pub result: ParseResult,
    /// Static scopes and variable resolutions.
    pub bindings: Bindings,
}

impl SourceUnit {
    /// Line/column range of a node.
    pub fn range(&self, id: ExprId) -> Range {
        self.result.range(id)
    }

    /// Start position of a node.
    pub fn pos(&self, id: ExprId) -> Position {
        self.result.range(id).start
    }
}

/// A reference to one expression of one source unit.
#[derive(Clone)]
pub struct ExprRef {
    /// The owning unit.
    pub unit: Rc<SourceUnit>,
    /// The node.
    pub id: ExprId,
}

impl ExprRef {
    /// Re-point at another node of the same unit.
    pub fn at(&self, id: ExprId) -> ExprRef {
        ExprRef { unit: self.unit.clone(), id }
    }

    /// The expression node.
    pub fn expr(&self) -> &Expr {
        self.unit.result.ast.expr(self.id)
    }

    /// The node's range.
    pub fn range(&self) -> Range {
        self.unit.range(self.id)
    }

    /// The node's start position.
    pub fn pos(&self) -> Position {
        self.unit.pos(self.id)
    }
}

impl std::fmt::Debug for ExprRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExprRef({:?} @ {})", self.id, self.range())
    }
}
