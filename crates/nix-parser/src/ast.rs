//! Arena-backed abstract syntax tree.
//!
//! Nodes live in a flat [`Ast`] arena and refer to each other through
//! [`ExprId`] indices, so parent links are plain non-owning indices and the
//! whole tree dies with its document. Per-node metadata (token range,
//! parent) lives in a side table parallel to the node vector.

use indexmap::IndexMap;
use nix_lexer::{Position, Range, Token, TokenRange};

use crate::symbol::Symbol;

/// Index of an expression node within its document's [`Ast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u32);

impl ExprId {
    /// Dense index into the arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One component of a selection or has-attr path: a static name or an
/// interpolated expression.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrName {
    /// A static component with the source range of its name token.
    Symbol(Symbol, Range),
    /// A dynamic `${...}` component.
    Dynamic(ExprId),
}

impl AttrName {
    /// The static symbol, if this component is static.
    pub fn symbol(&self) -> Option<Symbol> {
        match self {
            AttrName::Symbol(sym, _) => Some(*sym),
            AttrName::Dynamic(_) => None,
        }
    }
}

/// How an attribute entered its attribute set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InheritKind {
    /// Ordinary `name = value;` definition.
    NotInherited,
    /// `inherit name;`: the value expression is a variable reference
    /// bound in the enclosing scope.
    Plain,
    /// `inherit (source) name;`: the value expression is a selection on
    /// the recorded source expression.
    From(ExprId),
}

/// A named attribute definition inside an attribute set or `let`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrDef {
    /// Value expression.
    pub expr: ExprId,
    /// How the attribute was introduced.
    pub inherit: InheritKind,
    /// Position of the attribute name, exposed as the definition position.
    pub pos: Position,
    /// Source range of the attribute name, for cursor location.
    pub name_range: Range,
}

impl AttrDef {
    /// True for `inherit name;` attributes, whose value expressions bind
    /// under the enclosing scope rather than the new one.
    pub fn inherited(&self) -> bool {
        self.inherit == InheritKind::Plain
    }
}

/// A `${name} = value;` attribute whose name is computed.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicAttr {
    /// Name expression.
    pub name_expr: ExprId,
    /// Value expression.
    pub value_expr: ExprId,
    /// Position of the name expression.
    pub pos: Position,
}

/// Body of an attribute set (also reused by `let`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExprAttrs {
    /// Whether the set is `rec { ... }`.
    pub recursive: bool,
    /// Named attributes in declaration order; the order fixes slot indices.
    pub attrs: IndexMap<Symbol, AttrDef>,
    /// Attributes with computed names.
    pub dynamic_attrs: Vec<DynamicAttr>,
}

/// A declared formal parameter of a lambda taking an attribute set.
#[derive(Debug, Clone, PartialEq)]
pub struct Formal {
    /// Parameter name.
    pub name: Symbol,
    /// Default expression after `?`, if any.
    pub default: Option<ExprId>,
    /// Source range of the parameter name.
    pub range: Range,
}

/// The formal parameter list of a lambda.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Formals {
    /// Declared formals in source order.
    pub formals: Vec<Formal>,
    /// Whether the list ends in `...`.
    pub ellipsis: bool,
}

/// A lambda expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprLambda {
    /// The name argument (`x:` or the `@` binding), if any.
    pub arg: Option<Symbol>,
    /// The formal list, if the lambda destructures an attribute set.
    pub formals: Option<Formals>,
    /// Body expression.
    pub body: ExprId,
}

impl ExprLambda {
    /// Whether the lambda has a formal list.
    pub fn has_formals(&self) -> bool {
        self.formals.is_some()
    }

    /// Number of runtime slots the lambda introduces.
    pub fn env_size(&self) -> usize {
        usize::from(self.arg.is_some())
            + self.formals.as_ref().map_or(0, |f| f.formals.len())
    }
}

/// An expression node. Tagged variant matched exhaustively per traversal.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// String literal without interpolation.
    Str(String),
    /// Path literal, resolved against the document base path.
    Path(String),
    /// Variable reference.
    Var(Symbol),
    /// `base.path` or `base.path or default`.
    Select {
        /// Expression being selected from.
        base: ExprId,
        /// Attribute path components.
        path: Vec<AttrName>,
        /// `or` fallback expression.
        default: Option<ExprId>,
    },
    /// `base ? path`.
    HasAttr {
        /// Expression being tested.
        base: ExprId,
        /// Attribute path components.
        path: Vec<AttrName>,
    },
    /// `{ ... }` or `rec { ... }`.
    Attrs(ExprAttrs),
    /// `[ ... ]`.
    List(Vec<ExprId>),
    /// Lambda.
    Lambda(ExprLambda),
    /// Function application, possibly with several curried arguments.
    Call {
        /// Callee expression.
        fun: ExprId,
        /// Argument expressions in application order.
        args: Vec<ExprId>,
    },
    /// `let ... in body`.
    Let {
        /// The bindings.
        attrs: ExprAttrs,
        /// Body expression.
        body: ExprId,
    },
    /// `with attrs; body`.
    With {
        /// The attribute-set expression.
        attrs: ExprId,
        /// Body expression.
        body: ExprId,
    },
    /// `if cond then t else e`.
    If {
        /// Condition.
        cond: ExprId,
        /// Then branch.
        then: ExprId,
        /// Else branch.
        else_: ExprId,
    },
    /// `assert cond; body`.
    Assert {
        /// Condition.
        cond: ExprId,
        /// Body expression.
        body: ExprId,
    },
    /// `!e`.
    OpNot(ExprId),
    /// String/number concatenation: interpolated strings and binary `+`.
    ConcatStrings {
        /// True when the result must be a string (string interpolation).
        force_string: bool,
        /// Parts with the positions of their operators.
        parts: Vec<(Position, ExprId)>,
    },
    /// `==`
    OpEq(ExprId, ExprId),
    /// `!=`
    OpNeq(ExprId, ExprId),
    /// `&&`
    OpAnd(ExprId, ExprId),
    /// `||`
    OpOr(ExprId, ExprId),
    /// `->`
    OpImpl(ExprId, ExprId),
    /// `//`
    OpUpdate(ExprId, ExprId),
    /// `++`
    OpConcatLists(ExprId, ExprId),
    /// `__curPos`.
    Pos,
}

impl Expr {
    /// Append the node's direct children to `out`, in source order.
    pub fn children(&self, out: &mut Vec<ExprId>) {
        match self {
            Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Path(_) | Expr::Var(_)
            | Expr::Pos => {}
            Expr::Select { base, path, default } => {
                out.push(*base);
                for component in path {
                    if let AttrName::Dynamic(e) = component {
                        out.push(*e);
                    }
                }
                if let Some(def) = default {
                    out.push(*def);
                }
            }
            Expr::HasAttr { base, path } => {
                out.push(*base);
                for component in path {
                    if let AttrName::Dynamic(e) = component {
                        out.push(*e);
                    }
                }
            }
            Expr::Attrs(attrs) => attrs_children(attrs, out),
            Expr::List(elems) => out.extend(elems.iter().copied()),
            Expr::Lambda(lambda) => {
                if let Some(formals) = &lambda.formals {
                    for formal in &formals.formals {
                        if let Some(def) = formal.default {
                            out.push(def);
                        }
                    }
                }
                out.push(lambda.body);
            }
            Expr::Call { fun, args } => {
                out.push(*fun);
                out.extend(args.iter().copied());
            }
            Expr::Let { attrs, body } => {
                attrs_children(attrs, out);
                out.push(*body);
            }
            Expr::With { attrs, body } => {
                out.push(*attrs);
                out.push(*body);
            }
            Expr::If { cond, then, else_ } => {
                out.push(*cond);
                out.push(*then);
                out.push(*else_);
            }
            Expr::Assert { cond, body } => {
                out.push(*cond);
                out.push(*body);
            }
            Expr::OpNot(e) => out.push(*e),
            Expr::ConcatStrings { parts, .. } => {
                out.extend(parts.iter().map(|(_, e)| *e));
            }
            Expr::OpEq(a, b)
            | Expr::OpNeq(a, b)
            | Expr::OpAnd(a, b)
            | Expr::OpOr(a, b)
            | Expr::OpImpl(a, b)
            | Expr::OpUpdate(a, b)
            | Expr::OpConcatLists(a, b) => {
                out.push(*a);
                out.push(*b);
            }
        }
    }
}

fn attrs_children(attrs: &ExprAttrs, out: &mut Vec<ExprId>) {
    for def in attrs.attrs.values() {
        out.push(def.expr);
    }
    for dynamic in &attrs.dynamic_attrs {
        out.push(dynamic.name_expr);
        out.push(dynamic.value_expr);
    }
}

/// Per-node metadata stored alongside the arena.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeMeta {
    /// Inclusive token indices covered by the node.
    pub token_range: TokenRange,
    /// Immediate enclosing node, `None` for the root.
    pub parent: Option<ExprId>,
}

/// The expression arena of one parsed document.
#[derive(Debug, Default)]
pub struct Ast {
    exprs: Vec<Expr>,
    meta: Vec<NodeMeta>,
}

impl Ast {
    /// Allocate a node covering the given inclusive token range.
    pub fn alloc(&mut self, expr: Expr, token_range: TokenRange) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        self.meta.push(NodeMeta { token_range, parent: None });
        id
    }

    /// The node behind an id.
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    /// Mutable access, used while the parser is still shaping a node.
    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.index()]
    }

    /// Token range covered by a node.
    pub fn token_range(&self, id: ExprId) -> TokenRange {
        self.meta[id.index()].token_range
    }

    /// Update a node's token range (ranges grow as postfix syntax attaches).
    pub fn set_token_range(&mut self, id: ExprId, token_range: TokenRange) {
        self.meta[id.index()].token_range = token_range;
    }

    /// The node's parent, `None` for the root.
    pub fn parent(&self, id: ExprId) -> Option<ExprId> {
        self.meta[id.index()].parent
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    /// Iterate over all node ids.
    pub fn ids(&self) -> impl Iterator<Item = ExprId> + use<> {
        (0..self.exprs.len() as u32).map(ExprId)
    }

    /// Fill in parent links by walking down from `root`.
    pub fn connect_parents(&mut self, root: ExprId) {
        let mut stack = vec![root];
        let mut children = Vec::new();
        while let Some(id) = stack.pop() {
            children.clear();
            self.expr(id).children(&mut children);
            for &child in &children {
                self.meta[child.index()].parent = Some(id);
                stack.push(child);
            }
        }
    }
}

/// A parse-time diagnostic with a document range.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ParseDiagnostic {
    /// Human-readable message.
    pub message: String,
    /// Range the message refers to.
    pub range: Range,
}

/// Everything the parser produces for one document.
#[derive(Debug)]
pub struct ParseResult {
    /// The node arena.
    pub ast: Ast,
    /// The document's token vector; node token ranges index into it.
    pub tokens: Vec<Token>,
    /// The root node. Always present, even for empty or broken input.
    pub root: ExprId,
    /// Parse diagnostics in source order.
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl ParseResult {
    /// Line/column range covered by a node.
    pub fn range(&self, id: ExprId) -> Range {
        let tr = self.ast.token_range(id);
        let start = self.tokens[tr.start as usize].range.start;
        let end = self.tokens[tr.end as usize].range.end;
        Range::new(start, end)
    }
}
