//! Error-tolerant Nix parser and static analysis.
//!
//! The parser survives arbitrary mid-edit input while producing the same
//! node shapes a strict parser would: every error becomes a ranged
//! diagnostic, every node gets a token range and a parent link, and the
//! tree is always rooted. On top of the tree this crate builds the two
//! compile-time structures every query needs:
//!
//! - [`bindings::bind_vars`] assigns each node its lexical scope chain and
//!   resolves variable references to `(level, displacement)` slots;
//! - [`cursor::locate`] returns the innermost-to-outermost chain of nodes
//!   covering a position, plus the selection component, formal, or
//!   inherit clause under the cursor.
//!
//! Names are interned in a process-scoped [`SymbolTable`]; the runtime
//! layers share the same symbols so equality stays an id comparison.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod ast;
pub mod bindings;
pub mod cursor;
mod parser;
pub mod print;
mod symbol;

pub use ast::{
    Ast, AttrDef, AttrName, DynamicAttr, Expr, ExprAttrs, ExprId, ExprLambda, Formal, Formals,
    InheritKind, NodeMeta, ParseDiagnostic, ParseResult,
};
pub use bindings::{Bindings, StaticScope, VarResolution, bind_vars};
pub use cursor::{AttrCursor, CursorPath, FormalCursor, locate};
pub use parser::parse;
pub use print::display;
pub use symbol::{Symbol, SymbolTable};
