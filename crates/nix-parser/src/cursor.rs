//! Cursor-path location.
//!
//! Given a parsed document and a target position, produce the chain of
//! expression nodes covering that position, innermost first. The walk is
//! post-order, so children are collected before their parents; an ancestor
//! always covers its descendants' ranges, which yields the required
//! innermost-to-outermost ordering along the chain.
//!
//! Alongside the node chain the locator records which *component* of a
//! selection path the cursor is on, the formal parameter under the cursor,
//! and whether the cursor sits on an `inherit`ed attribute name; the
//! query layer needs all three to pick the right completion strategy.

use nix_lexer::{Position, Range};
use rustc_hash::FxHashSet;

use crate::ast::{AttrName, Expr, ExprId, InheritKind, ParseResult};

/// Which component of a selection/has-attr path the cursor is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrCursor {
    /// The selection (or has-attr) node.
    pub expr: ExprId,
    /// Index of the component under the cursor.
    pub index: usize,
}

/// The formal parameter under the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormalCursor {
    /// The lambda owning the formal list.
    pub lambda: ExprId,
    /// Index into the formal list.
    pub index: usize,
}

/// The inherit clause under the cursor: `None` for `inherit x;`,
/// `Some(expr)` for `inherit (expr) x;`.
pub type InheritCursor = Option<ExprId>;

/// Everything the locator finds at a position.
#[derive(Debug, Default)]
pub struct CursorPath {
    /// Enclosing expressions, innermost (index 0) to outermost (last).
    /// Empty iff the position lies outside the root's range.
    pub path: Vec<ExprId>,
    /// Selection component under the cursor, if any.
    pub attr: Option<AttrCursor>,
    /// Formal parameter under the cursor, if any.
    pub formal: Option<FormalCursor>,
    /// Inherit clause under the cursor, if any.
    pub inherit: Option<InheritCursor>,
}

/// Locate the cursor path for `target`.
pub fn locate(result: &ParseResult, target: Position) -> CursorPath {
    let mut cursor = CursorPath::default();
    let mut seen = FxHashSet::default();
    visit(result, result.root, target, &mut cursor, &mut seen);
    cursor
}

fn visit(
    result: &ParseResult,
    id: ExprId,
    target: Position,
    cursor: &mut CursorPath,
    seen: &mut FxHashSet<ExprId>,
) {
    if !seen.insert(id) {
        return;
    }

    let mut children = Vec::new();
    result.ast.expr(id).children(&mut children);
    for child in children {
        visit(result, child, target, cursor, seen);
    }

    match result.ast.expr(id) {
        Expr::Select { path, .. } | Expr::HasAttr { base: _, path } => {
            record_attr_component(id, path, target, cursor);
        }
        Expr::Lambda(lambda) => {
            if let Some(formals) = &lambda.formals {
                for (index, formal) in formals.formals.iter().enumerate() {
                    if cursor.formal.is_none() && formal.range.touches(target) {
                        cursor.formal = Some(FormalCursor { lambda: id, index });
                    }
                }
            }
        }
        Expr::Attrs(attrs) => record_inherit(attrs, target, cursor),
        Expr::Let { attrs, .. } => record_inherit(attrs, target, cursor),
        _ => {}
    }

    if result.range(id).touches(target) {
        cursor.path.push(id);
    }
}

/// A component's own range starts at its first character, but a cursor
/// sitting right after the separating dot should already select it, so the
/// check extends one column to the left.
fn record_attr_component(
    id: ExprId,
    path: &[AttrName],
    target: Position,
    cursor: &mut CursorPath,
) {
    if cursor.attr.is_some() {
        return;
    }
    for (index, component) in path.iter().enumerate() {
        if let AttrName::Symbol(_, range) = component {
            if widen_left(*range).touches(target) {
                cursor.attr = Some(AttrCursor { expr: id, index });
                return;
            }
        }
    }
}

fn record_inherit(
    attrs: &crate::ast::ExprAttrs,
    target: Position,
    cursor: &mut CursorPath,
) {
    if cursor.inherit.is_some() {
        return;
    }
    for def in attrs.attrs.values() {
        match def.inherit {
            InheritKind::NotInherited => {}
            InheritKind::Plain => {
                if def.name_range.touches(target) {
                    cursor.inherit = Some(None);
                    return;
                }
            }
            InheritKind::From(source) => {
                if def.name_range.touches(target) {
                    cursor.inherit = Some(Some(source));
                    return;
                }
            }
        }
    }
}

fn widen_left(range: Range) -> Range {
    let mut start = range.start;
    start.col = start.col.saturating_sub(1);
    Range::new(start, range.end)
}
