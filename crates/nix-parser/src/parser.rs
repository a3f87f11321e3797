//! Error-tolerant recursive-descent parser.
//!
//! Mirrors the strict grammar's precedence tower and produces the same node
//! shapes, including its desugarings (`a - b` becomes `__sub a b`, search
//! paths become `__findFile __nixPath "name"`, `+` becomes a
//! concat-strings node). Unlike the strict parser it never fails: missing
//! expressions are replaced by a `null` placeholder, a selection ending in
//! a dot gains an empty trailing component, and each error is recorded as a
//! ranged diagnostic before the parser synchronises on `; } ] in` or end of
//! file and continues.

use nix_lexer::{Position, Range, Token, TokenKind, TokenRange, TokenValue, tokenize};
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::ast::{
    Ast, AttrDef, AttrName, DynamicAttr, Expr, ExprAttrs, ExprId, ExprLambda, Formal, Formals,
    InheritKind, ParseDiagnostic, ParseResult,
};
use crate::symbol::{Symbol, SymbolTable};

/// Parse a document.
///
/// `path` is the on-disk path, if any; it only affects how positions are
/// rendered inside diagnostics (`(string)` otherwise). `base_path` anchors
/// relative path literals.
pub fn parse(
    source: &str,
    path: Option<&str>,
    base_path: &str,
    symbols: &SymbolTable,
) -> ParseResult {
    let tokens = tokenize(source);
    debug!(tokens = tokens.len(), "parsing document");
    let origin = path.unwrap_or("(string)").to_string();
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        ast: Ast::default(),
        diagnostics: Vec::new(),
        symbols,
        origin,
        base_path: base_path.to_string(),
        implicit: FxHashSet::default(),
    };
    let root = parser.parse_expr();
    if !parser.at(TokenKind::Eof) {
        let message = format!(
            "syntax error, unexpected {}, expecting end of file",
            parser.current().kind.describe()
        );
        let range = parser.current().range;
        parser.error(message, range);
    }
    let Parser { mut ast, diagnostics, .. } = parser;
    ast.connect_parents(root);
    ParseResult { ast, tokens, root, diagnostics }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    ast: Ast,
    diagnostics: Vec<ParseDiagnostic>,
    symbols: &'a SymbolTable,
    origin: String,
    base_path: String,
    /// Attrs nodes synthesised for nested `a.b = ...;` paths; later sibling
    /// definitions may merge into them, explicit sets may not.
    implicit: FxHashSet<ExprId>,
}

impl<'a> Parser<'a> {
    // ===== Token plumbing =====

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> TokenKind {
        self.current().kind
    }

    fn lookahead(&self, n: usize) -> TokenKind {
        self.tokens[(self.pos + n).min(self.tokens.len() - 1)].kind
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn bump(&mut self) -> usize {
        let idx = self.pos;
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        idx
    }

    fn accept(&mut self, kind: TokenKind) -> Option<usize> {
        self.at(kind).then(|| self.bump())
    }

    /// Consume `kind` or report `syntax error, unexpected X, expecting Y`.
    fn expect(&mut self, kind: TokenKind) -> bool {
        if self.accept(kind).is_some() {
            return true;
        }
        let message = format!(
            "syntax error, unexpected {}, expecting {}",
            self.kind().describe(),
            kind.describe()
        );
        let range = self.current().range;
        self.error(message, range);
        false
    }

    fn error(&mut self, message: String, range: Range) {
        self.diagnostics.push(ParseDiagnostic { message, range });
    }

    /// Skip ahead to the recovery set: `;`, `}`, `]`, `in`, or end of file.
    fn recover(&mut self) {
        while !matches!(
            self.kind(),
            TokenKind::Semicolon
                | TokenKind::RBrace
                | TokenKind::RBracket
                | TokenKind::In
                | TokenKind::Eof
        ) {
            self.bump();
        }
    }

    fn token_start(&self, idx: usize) -> Position {
        self.tokens[idx].range.start
    }

    /// Allocate a node spanning from token index `start` to the last
    /// consumed token.
    fn mk(&mut self, expr: Expr, start: usize) -> ExprId {
        let end = self.pos.saturating_sub(1).max(start);
        self.ast.alloc(expr, TokenRange::new(start as u32, end as u32))
    }

    /// Allocate a node covering a single already-consumed token.
    fn mk_at(&mut self, expr: Expr, token: usize) -> ExprId {
        self.ast.alloc(expr, TokenRange::new(token as u32, token as u32))
    }

    /// Placeholder for a missing expression: the `null` literal the strict
    /// evaluator exposes as a base-scope variable. Anchored to the last
    /// consumed token so it stays inside its parent's range.
    fn null_placeholder(&mut self) -> ExprId {
        let sym = self.symbols.intern("null");
        let here = self.pos.saturating_sub(1);
        self.ast.alloc(Expr::Var(sym), TokenRange::new(here as u32, here as u32))
    }

    fn intern_token_text(&self, idx: usize) -> Symbol {
        match &self.tokens[idx].value {
            TokenValue::Str { text, .. } => self.symbols.intern(text),
            _ => self.symbols.intern(""),
        }
    }

    // ===== Entry: functions, let, with, assert, if =====

    fn parse_expr(&mut self) -> ExprId {
        self.parse_expr_function()
    }

    fn parse_expr_function(&mut self) -> ExprId {
        match self.kind() {
            TokenKind::Id if self.lookahead(1) == TokenKind::Colon => {
                let start = self.pos;
                let name = self.bump();
                let arg = self.intern_token_text(name);
                self.bump(); // ':'
                let body = self.parse_expr_function();
                self.mk(Expr::Lambda(ExprLambda { arg: Some(arg), formals: None, body }), start)
            }
            TokenKind::Id if self.lookahead(1) == TokenKind::At => {
                // ID '@' '{' formals '}' ':' body
                let start = self.pos;
                let name = self.bump();
                let arg = self.intern_token_text(name);
                self.bump(); // '@'
                let formals = self.parse_formals();
                self.expect(TokenKind::Colon);
                let body = self.parse_expr_function();
                self.mk(
                    Expr::Lambda(ExprLambda { arg: Some(arg), formals: Some(formals), body }),
                    start,
                )
            }
            TokenKind::LBrace if self.lbrace_starts_formals() => {
                let start = self.pos;
                let formals = self.parse_formals();
                let arg = if self.accept(TokenKind::At).is_some() {
                    if self.at(TokenKind::Id) {
                        let name = self.bump();
                        Some(self.intern_token_text(name))
                    } else {
                        self.expect(TokenKind::Id);
                        None
                    }
                } else {
                    None
                };
                self.expect(TokenKind::Colon);
                let body = self.parse_expr_function();
                self.mk(Expr::Lambda(ExprLambda { arg, formals: Some(formals), body }), start)
            }
            TokenKind::Assert => {
                let start = self.bump();
                let cond = self.parse_expr();
                self.expect(TokenKind::Semicolon);
                let body = self.parse_expr_function();
                self.mk(Expr::Assert { cond, body }, start)
            }
            TokenKind::With => {
                let start = self.bump();
                let attrs = self.parse_expr();
                self.expect(TokenKind::Semicolon);
                let body = self.parse_expr_function();
                self.mk(Expr::With { attrs, body }, start)
            }
            TokenKind::Let if self.lookahead(1) != TokenKind::LBrace => {
                let start = self.bump();
                let attrs_id = self.mk_at(Expr::Attrs(ExprAttrs::default()), start);
                self.parse_binds(attrs_id, TokenKind::In);
                self.expect(TokenKind::In);
                let body = self.parse_expr_function();
                let attrs = match self.ast.expr(attrs_id).clone() {
                    Expr::Attrs(attrs) => attrs,
                    _ => ExprAttrs::default(),
                };
                // The bindings node was a staging area; the `let` owns them.
                *self.ast.expr_mut(attrs_id) = Expr::Attrs(ExprAttrs::default());
                self.mk(Expr::Let { attrs, body }, start)
            }
            TokenKind::If => {
                let start = self.bump();
                let cond = self.parse_expr();
                self.expect(TokenKind::Then);
                let then = self.parse_expr();
                self.expect(TokenKind::Else);
                let else_ = self.parse_expr();
                self.mk(Expr::If { cond, then, else_ }, start)
            }
            _ => self.parse_op_impl(),
        }
    }

    /// Decide whether `{` opens a formal list: find the matching `}` by
    /// token counting and check what follows it.
    fn lbrace_starts_formals(&self) -> bool {
        let mut depth = 0usize;
        let mut i = self.pos;
        while i < self.tokens.len() {
            match self.tokens[i].kind {
                TokenKind::LBrace | TokenKind::DollarCurly => depth += 1,
                TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        let after = self
                            .tokens
                            .get(i + 1)
                            .map_or(TokenKind::Eof, |t| t.kind);
                        return matches!(after, TokenKind::Colon | TokenKind::At);
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            i += 1;
        }
        false
    }

    fn parse_formals(&mut self) -> Formals {
        let mut formals = Formals::default();
        let mut seen: FxHashSet<Symbol> = FxHashSet::default();
        self.expect(TokenKind::LBrace);
        loop {
            match self.kind() {
                TokenKind::RBrace | TokenKind::Eof => break,
                TokenKind::Ellipsis => {
                    self.bump();
                    formals.ellipsis = true;
                }
                TokenKind::Id => {
                    let name_tok = self.bump();
                    let name = self.intern_token_text(name_tok);
                    let range = self.tokens[name_tok].range;
                    let default = self
                        .accept(TokenKind::Question)
                        .map(|_| self.parse_expr());
                    if !seen.insert(name) {
                        let message = format!(
                            "duplicate formal function argument '{}'",
                            self.symbols.name(name)
                        );
                        self.error(message, range);
                    }
                    formals.formals.push(Formal { name, default, range });
                }
                _ => {
                    let message = format!(
                        "syntax error, unexpected {}, expecting ID or '...'",
                        self.kind().describe()
                    );
                    let range = self.current().range;
                    self.error(message, range);
                    self.recover();
                    break;
                }
            }
            if self.accept(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RBrace);
        formals
    }

    // ===== Operator tower, loosest binding first =====

    fn parse_op_impl(&mut self) -> ExprId {
        let a = self.parse_op_or();
        if self.accept(TokenKind::Impl).is_some() {
            let b = self.parse_op_impl();
            let start = self.ast.token_range(a).start as usize;
            return self.mk(Expr::OpImpl(a, b), start);
        }
        a
    }

    fn parse_op_or(&mut self) -> ExprId {
        let mut a = self.parse_op_and();
        while self.accept(TokenKind::Or).is_some() {
            let b = self.parse_op_and();
            let start = self.ast.token_range(a).start as usize;
            a = self.mk(Expr::OpOr(a, b), start);
        }
        a
    }

    fn parse_op_and(&mut self) -> ExprId {
        let mut a = self.parse_op_eq();
        while self.accept(TokenKind::And).is_some() {
            let b = self.parse_op_eq();
            let start = self.ast.token_range(a).start as usize;
            a = self.mk(Expr::OpAnd(a, b), start);
        }
        a
    }

    fn parse_op_eq(&mut self) -> ExprId {
        let a = self.parse_op_cmp();
        let op = self.kind();
        if matches!(op, TokenKind::Eq | TokenKind::Neq) {
            self.bump();
            let b = self.parse_op_cmp();
            let start = self.ast.token_range(a).start as usize;
            let expr = if op == TokenKind::Eq { Expr::OpEq(a, b) } else { Expr::OpNeq(a, b) };
            return self.mk(expr, start);
        }
        a
    }

    /// Comparisons desugar to `__lessThan` calls the way the strict parser
    /// desugars them.
    fn parse_op_cmp(&mut self) -> ExprId {
        let a = self.parse_op_update();
        let op = self.kind();
        if !matches!(op, TokenKind::Lt | TokenKind::Gt | TokenKind::Leq | TokenKind::Geq) {
            return a;
        }
        let op_tok = self.bump();
        let b = self.parse_op_update();
        let start = self.ast.token_range(a).start as usize;
        let less_than = self.symbols.intern("__lessThan");
        let fun = self.mk_at(Expr::Var(less_than), op_tok);
        let call = match op {
            TokenKind::Lt => Expr::Call { fun, args: vec![a, b] },
            TokenKind::Gt => Expr::Call { fun, args: vec![b, a] },
            _ => {
                let args = if op == TokenKind::Leq { vec![b, a] } else { vec![a, b] };
                let inner = self.mk(Expr::Call { fun, args }, start);
                Expr::OpNot(inner)
            }
        };
        self.mk(call, start)
    }

    fn parse_op_update(&mut self) -> ExprId {
        let a = self.parse_op_not();
        if self.accept(TokenKind::Update).is_some() {
            let b = self.parse_op_update();
            let start = self.ast.token_range(a).start as usize;
            return self.mk(Expr::OpUpdate(a, b), start);
        }
        a
    }

    fn parse_op_not(&mut self) -> ExprId {
        if let Some(start) = self.accept(TokenKind::Not) {
            let e = self.parse_op_not();
            return self.mk(Expr::OpNot(e), start);
        }
        self.parse_op_add()
    }

    fn parse_op_add(&mut self) -> ExprId {
        let mut a = self.parse_op_mul();
        loop {
            match self.kind() {
                TokenKind::Plus => {
                    self.bump();
                    let a_pos = self.range_of(a).start;
                    let b = self.parse_op_mul();
                    let b_pos = self.range_of(b).start;
                    let start = self.ast.token_range(a).start as usize;
                    a = self.mk(
                        Expr::ConcatStrings {
                            force_string: false,
                            parts: vec![(a_pos, a), (b_pos, b)],
                        },
                        start,
                    );
                }
                TokenKind::Minus => {
                    let op_tok = self.bump();
                    let b = self.parse_op_mul();
                    a = self.desugar_binary_call("__sub", op_tok, a, b);
                }
                _ => return a,
            }
        }
    }

    fn parse_op_mul(&mut self) -> ExprId {
        let mut a = self.parse_op_concat();
        loop {
            match self.kind() {
                TokenKind::Star => {
                    let op_tok = self.bump();
                    let b = self.parse_op_concat();
                    a = self.desugar_binary_call("__mul", op_tok, a, b);
                }
                TokenKind::Slash => {
                    let op_tok = self.bump();
                    let b = self.parse_op_concat();
                    a = self.desugar_binary_call("__div", op_tok, a, b);
                }
                _ => return a,
            }
        }
    }

    fn parse_op_concat(&mut self) -> ExprId {
        let a = self.parse_op_has_attr();
        if self.accept(TokenKind::Concat).is_some() {
            let b = self.parse_op_concat();
            let start = self.ast.token_range(a).start as usize;
            return self.mk(Expr::OpConcatLists(a, b), start);
        }
        a
    }

    fn parse_op_has_attr(&mut self) -> ExprId {
        let a = self.parse_op_neg();
        if self.accept(TokenKind::Question).is_some() {
            let path = self.parse_attrpath();
            let start = self.ast.token_range(a).start as usize;
            return self.mk(Expr::HasAttr { base: a, path }, start);
        }
        a
    }

    fn parse_op_neg(&mut self) -> ExprId {
        if let Some(start) = self.accept(TokenKind::Minus) {
            let e = self.parse_op_neg();
            let zero = self.mk_at(Expr::Int(0), start);
            return self.desugar_binary_call_at("__sub", start, zero, e, start);
        }
        self.parse_expr_app()
    }

    fn desugar_binary_call(&mut self, name: &str, op_tok: usize, a: ExprId, b: ExprId) -> ExprId {
        let start = self.ast.token_range(a).start as usize;
        self.desugar_binary_call_at(name, op_tok, a, b, start)
    }

    fn desugar_binary_call_at(
        &mut self,
        name: &str,
        op_tok: usize,
        a: ExprId,
        b: ExprId,
        start: usize,
    ) -> ExprId {
        let sym = self.symbols.intern(name);
        let fun = self.mk_at(Expr::Var(sym), op_tok);
        self.mk(Expr::Call { fun, args: vec![a, b] }, start)
    }

    // ===== Application and selection =====

    fn parse_expr_app(&mut self) -> ExprId {
        let fun = self.parse_expr_select();
        let mut args = Vec::new();
        while self.can_start_simple() {
            args.push(self.parse_expr_select());
        }
        if args.is_empty() {
            return fun;
        }
        let start = self.ast.token_range(fun).start as usize;
        self.mk(Expr::Call { fun, args }, start)
    }

    fn can_start_simple(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Id
                | TokenKind::Int
                | TokenKind::Float
                | TokenKind::DQuote
                | TokenKind::IndStrOpen
                | TokenKind::Path
                | TokenKind::HomePath
                | TokenKind::SearchPath
                | TokenKind::Uri
                | TokenKind::LParen
                | TokenKind::LBrace
                | TokenKind::LBracket
                | TokenKind::Rec
        )
    }

    fn parse_expr_select(&mut self) -> ExprId {
        let base = self.parse_expr_simple();
        if self.accept(TokenKind::Dot).is_some() {
            let path = self.parse_attrpath();
            let default =
                self.accept(TokenKind::OrKw).map(|_| self.parse_expr_select());
            let start = self.ast.token_range(base).start as usize;
            return self.mk(Expr::Select { base, path, default }, start);
        }
        if self.at(TokenKind::OrKw) {
            // Backwards compatibility: `or` used as an application argument.
            let or_tok = self.bump();
            let sym = self.symbols.intern("or");
            let arg = self.mk_at(Expr::Var(sym), or_tok);
            let start = self.ast.token_range(base).start as usize;
            return self.mk(Expr::Call { fun: base, args: vec![arg] }, start);
        }
        base
    }

    /// Attribute path after `.`, `?`, or inside a binding. A path that
    /// ends in a dot gets an empty trailing component so completion can
    /// identify the spot.
    fn parse_attrpath(&mut self) -> Vec<AttrName> {
        let mut path = Vec::new();
        loop {
            match self.kind() {
                TokenKind::Id | TokenKind::OrKw => {
                    let tok = self.bump();
                    let sym = if self.tokens[tok].kind == TokenKind::OrKw {
                        self.symbols.intern("or")
                    } else {
                        self.intern_token_text(tok)
                    };
                    path.push(AttrName::Symbol(sym, self.tokens[tok].range));
                }
                TokenKind::DQuote => {
                    let string = self.parse_string();
                    match self.ast.expr(string) {
                        Expr::Str(text) => {
                            let sym = self.symbols.intern(text);
                            let range = self.range_of(string);
                            path.push(AttrName::Symbol(sym, range));
                        }
                        _ => path.push(AttrName::Dynamic(string)),
                    }
                }
                TokenKind::DollarCurly => {
                    self.bump();
                    let e = self.parse_expr();
                    self.expect(TokenKind::RBrace);
                    path.push(AttrName::Dynamic(e));
                }
                _ => {
                    // Trailing dot: synthesise an empty component there.
                    let here = self.current().range.start;
                    let message = format!(
                        "syntax error, unexpected {}, expecting ID",
                        self.kind().describe()
                    );
                    self.error(message, self.current().range);
                    let sym = self.symbols.intern("");
                    path.push(AttrName::Symbol(sym, Range::new(here, here)));
                    return path;
                }
            }
            if self.accept(TokenKind::Dot).is_none() {
                return path;
            }
        }
    }

    // ===== Simple expressions =====

    fn parse_expr_simple(&mut self) -> ExprId {
        match self.kind() {
            TokenKind::Id => {
                let tok = self.bump();
                let sym = self.intern_token_text(tok);
                self.mk_at(Expr::Var(sym), tok)
            }
            TokenKind::Int => {
                let tok = self.bump();
                let n = match self.tokens[tok].value {
                    TokenValue::Int(n) => n,
                    _ => 0,
                };
                self.mk_at(Expr::Int(n), tok)
            }
            TokenKind::Float => {
                let tok = self.bump();
                let f = match self.tokens[tok].value {
                    TokenValue::Float(f) => f,
                    _ => 0.0,
                };
                self.mk_at(Expr::Float(f), tok)
            }
            TokenKind::DQuote => self.parse_string(),
            TokenKind::IndStrOpen => self.parse_ind_string(),
            TokenKind::Path | TokenKind::HomePath => {
                let tok = self.bump();
                let text = match &self.tokens[tok].value {
                    TokenValue::Path(p) => p.clone(),
                    _ => String::new(),
                };
                let resolved = self.resolve_path(&text);
                self.mk_at(Expr::Path(resolved), tok)
            }
            TokenKind::SearchPath => {
                // `<name>` desugars to `__findFile __nixPath "name"`.
                let tok = self.bump();
                let text = match &self.tokens[tok].value {
                    TokenValue::Path(p) => p.clone(),
                    _ => String::new(),
                };
                let name = text.trim_start_matches('<').trim_end_matches('>').to_string();
                let find_file = self.symbols.intern("__findFile");
                let nix_path = self.symbols.intern("__nixPath");
                let fun = self.mk_at(Expr::Var(find_file), tok);
                let path_var = self.mk_at(Expr::Var(nix_path), tok);
                let name_str = self.mk_at(Expr::Str(name), tok);
                self.mk_at(Expr::Call { fun, args: vec![path_var, name_str] }, tok)
            }
            TokenKind::Uri => {
                let tok = self.bump();
                let text = match &self.tokens[tok].value {
                    TokenValue::Path(p) => p.clone(),
                    _ => String::new(),
                };
                self.mk_at(Expr::Str(text), tok)
            }
            TokenKind::LParen => {
                self.bump();
                let e = self.parse_expr();
                self.expect(TokenKind::RParen);
                e
            }
            TokenKind::LBracket => {
                let start = self.bump();
                let mut elems = Vec::new();
                while self.can_start_simple() {
                    elems.push(self.parse_expr_select());
                }
                self.expect(TokenKind::RBracket);
                self.mk(Expr::List(elems), start)
            }
            TokenKind::Rec => {
                let start = self.bump();
                self.expect(TokenKind::LBrace);
                let id = self.mk_at(
                    Expr::Attrs(ExprAttrs { recursive: true, ..ExprAttrs::default() }),
                    start,
                );
                self.parse_binds(id, TokenKind::RBrace);
                self.expect(TokenKind::RBrace);
                let end = self.pos.saturating_sub(1).max(start);
                self.ast.set_token_range(id, TokenRange::new(start as u32, end as u32));
                id
            }
            TokenKind::LBrace => {
                let start = self.bump();
                let id = self.mk_at(Expr::Attrs(ExprAttrs::default()), start);
                self.parse_binds(id, TokenKind::RBrace);
                self.expect(TokenKind::RBrace);
                let end = self.pos.saturating_sub(1).max(start);
                self.ast.set_token_range(id, TokenRange::new(start as u32, end as u32));
                id
            }
            _ => {
                let message =
                    format!("syntax error, unexpected {}", self.kind().describe());
                let range = self.current().range;
                self.error(message, range);
                self.null_placeholder()
            }
        }
    }

    // ===== Bindings (attribute sets and let) =====

    /// Parse `name = value;` and `inherit` clauses into the attrs node
    /// `container` until `terminator` (or end of file).
    fn parse_binds(&mut self, container: ExprId, terminator: TokenKind) {
        loop {
            if self.at(terminator) || self.at(TokenKind::Eof) {
                return;
            }
            let before = self.pos;
            if self.at(TokenKind::Inherit) {
                self.parse_inherit(container);
            } else if matches!(
                self.kind(),
                TokenKind::Id | TokenKind::OrKw | TokenKind::DQuote | TokenKind::DollarCurly
            ) {
                self.parse_bind(container);
            } else {
                let message = format!(
                    "syntax error, unexpected {}, expecting {} or attribute",
                    self.kind().describe(),
                    terminator.describe()
                );
                let range = self.current().range;
                self.error(message, range);
                self.recover();
                self.accept(TokenKind::Semicolon);
            }
            // Guarantee progress on arbitrarily broken input.
            if self.pos == before {
                self.bump();
            }
        }
    }

    fn parse_inherit(&mut self, container: ExprId) {
        self.bump(); // inherit
        let from = if self.accept(TokenKind::LParen).is_some() {
            let e = self.parse_expr();
            self.expect(TokenKind::RParen);
            Some(e)
        } else {
            None
        };
        while matches!(self.kind(), TokenKind::Id | TokenKind::OrKw | TokenKind::DQuote) {
            let (sym, range) = match self.kind() {
                TokenKind::DQuote => {
                    let string = self.parse_string();
                    let range = self.range_of(string);
                    let static_name = match self.ast.expr(string) {
                        Expr::Str(text) => Some(self.symbols.intern(text)),
                        _ => None,
                    };
                    match static_name {
                        Some(sym) => (sym, range),
                        None => {
                            self.error(
                                "dynamic attributes not allowed in inherit".to_string(),
                                range,
                            );
                            continue;
                        }
                    }
                }
                _ => {
                    let tok = self.bump();
                    let sym = if self.tokens[tok].kind == TokenKind::OrKw {
                        self.symbols.intern("or")
                    } else {
                        self.intern_token_text(tok)
                    };
                    (sym, self.tokens[tok].range)
                }
            };
            let (expr, kind) = match from {
                Some(source) => {
                    let select = self.mk(
                        Expr::Select {
                            base: source,
                            path: vec![AttrName::Symbol(sym, range)],
                            default: None,
                        },
                        self.ast.token_range(source).start as usize,
                    );
                    (select, InheritKind::From(source))
                }
                None => {
                    let var = self.mk(Expr::Var(sym), self.pos.saturating_sub(1));
                    (var, InheritKind::Plain)
                }
            };
            let def = AttrDef { expr, inherit: kind, pos: range.start, name_range: range };
            self.insert_attr(container, sym, def, range);
        }
        self.expect(TokenKind::Semicolon);
    }

    fn parse_bind(&mut self, container: ExprId) {
        let path = self.parse_attrpath();
        self.expect(TokenKind::Assign);
        let value = self.parse_expr();
        self.expect(TokenKind::Semicolon);
        self.add_attr(container, &path, value);
    }

    /// Insert a possibly nested attribute path, merging into implicitly
    /// created nested sets and reporting duplicates (first wins).
    fn add_attr(&mut self, container: ExprId, path: &[AttrName], value: ExprId) {
        let (head, rest) = match path.split_first() {
            Some(split) => split,
            None => return,
        };
        match head {
            AttrName::Dynamic(name_expr) => {
                let value_expr = if rest.is_empty() {
                    value
                } else {
                    let nested = self.implicit_attrs(value);
                    self.add_attr(nested, rest, value);
                    self.widen_token_range(nested, value);
                    nested
                };
                let pos = self.range_of(*name_expr).start;
                self.with_attrs(container, |_, attrs| {
                    attrs.dynamic_attrs.push(DynamicAttr {
                        name_expr: *name_expr,
                        value_expr,
                        pos,
                    });
                });
            }
            AttrName::Symbol(sym, range) => {
                if rest.is_empty() {
                    let def = AttrDef {
                        expr: value,
                        inherit: InheritKind::NotInherited,
                        pos: range.start,
                        name_range: *range,
                    };
                    self.insert_attr(container, *sym, def, *range);
                    return;
                }
                let existing = self.with_attrs(container, |_, attrs| {
                    attrs.attrs.get(sym).map(|def| def.expr)
                });
                let nested = match existing {
                    Some(expr) if self.is_implicit_attrs(expr) => expr,
                    Some(_) => {
                        self.duplicate_attr_error(container, *sym, *range);
                        return;
                    }
                    None => {
                        let nested = self.implicit_attrs(value);
                        let def = AttrDef {
                            expr: nested,
                            inherit: InheritKind::NotInherited,
                            pos: range.start,
                            name_range: *range,
                        };
                        self.with_attrs(container, |_, attrs| {
                            attrs.attrs.insert(*sym, def);
                        });
                        nested
                    }
                };
                self.add_attr(nested, rest, value);
                self.widen_token_range(nested, value);
            }
        }
    }

    fn insert_attr(&mut self, container: ExprId, sym: Symbol, def: AttrDef, range: Range) {
        let duplicate = self.with_attrs(container, |_, attrs| {
            if attrs.attrs.contains_key(&sym) {
                true
            } else {
                attrs.attrs.insert(sym, def);
                false
            }
        });
        if duplicate {
            self.duplicate_attr_error(container, sym, range);
        }
    }

    fn duplicate_attr_error(&mut self, container: ExprId, sym: Symbol, range: Range) {
        let first_pos = self.with_attrs(container, |_, attrs| {
            attrs.attrs.get(&sym).map(|def| def.pos)
        });
        let at = first_pos
            .map(|pos| pos.display_one_based(&self.origin))
            .unwrap_or_else(|| "(unknown)".to_string());
        let message =
            format!("attribute '{}' already defined at {}", self.symbols.name(sym), at);
        self.error(message, range);
    }

    /// Empty attrs node synthesised for `a.b = ...;` paths, spanning its
    /// nested value. Later definitions of sibling leaves merge into it.
    fn implicit_attrs(&mut self, value: ExprId) -> ExprId {
        let range = self.ast.token_range(value);
        let id = self
            .ast
            .alloc(Expr::Attrs(ExprAttrs::default()), TokenRange::new(range.start, range.end));
        self.implicit.insert(id);
        id
    }

    fn is_implicit_attrs(&self, id: ExprId) -> bool {
        self.implicit.contains(&id)
    }

    /// Grow a node's token range to cover `child`, keeping range
    /// monotonicity when sibling definitions merge into an implicit set.
    fn widen_token_range(&mut self, id: ExprId, child: ExprId) {
        let own = self.ast.token_range(id);
        let other = self.ast.token_range(child);
        self.ast.set_token_range(
            id,
            TokenRange::new(own.start.min(other.start), own.end.max(other.end)),
        );
    }

    /// Run `f` with mutable access to the attrs body of `container`.
    fn with_attrs<R>(
        &mut self,
        container: ExprId,
        f: impl FnOnce(&mut Self, &mut ExprAttrs) -> R,
    ) -> R {
        let mut taken = match self.ast.expr_mut(container) {
            Expr::Attrs(attrs) => std::mem::take(attrs),
            _ => ExprAttrs::default(),
        };
        let result = f(self, &mut taken);
        if let Expr::Attrs(attrs) = self.ast.expr_mut(container) {
            *attrs = taken;
        }
        result
    }

    // ===== Strings =====

    fn parse_string(&mut self) -> ExprId {
        let start = self.bump(); // '"'
        let mut parts: Vec<(Position, StringPart)> = Vec::new();
        loop {
            match self.kind() {
                TokenKind::Str => {
                    let tok = self.bump();
                    if let TokenValue::Str { text, .. } = &self.tokens[tok].value {
                        parts.push((self.token_start(tok), StringPart::Literal(text.clone(), tok)));
                    }
                }
                TokenKind::DollarCurly => {
                    self.bump();
                    let e = self.parse_expr();
                    self.expect(TokenKind::RBrace);
                    parts.push((self.range_of(e).start, StringPart::Interp(e)));
                }
                TokenKind::DQuote => {
                    self.bump();
                    break;
                }
                _ => {
                    self.expect(TokenKind::DQuote);
                    break;
                }
            }
        }
        self.finish_string(parts, start, true)
    }

    fn parse_ind_string(&mut self) -> ExprId {
        let start = self.bump(); // "''"
        let mut parts: Vec<(Position, StringPart)> = Vec::new();
        loop {
            match self.kind() {
                TokenKind::IndStr => {
                    let tok = self.bump();
                    if let TokenValue::Str { text, .. } = &self.tokens[tok].value {
                        parts.push((self.token_start(tok), StringPart::Literal(text.clone(), tok)));
                    }
                }
                TokenKind::DollarCurly => {
                    self.bump();
                    let e = self.parse_expr();
                    self.expect(TokenKind::RBrace);
                    parts.push((self.range_of(e).start, StringPart::Interp(e)));
                }
                TokenKind::IndStrClose => {
                    self.bump();
                    break;
                }
                _ => {
                    self.expect(TokenKind::IndStrClose);
                    break;
                }
            }
        }
        strip_indentation(&mut parts);
        self.finish_string(parts, start, true)
    }

    fn finish_string(
        &mut self,
        parts: Vec<(Position, StringPart)>,
        start: usize,
        force_string: bool,
    ) -> ExprId {
        if parts.is_empty() {
            return self.mk(Expr::Str(String::new()), start);
        }
        if parts.len() == 1 {
            if let (_, StringPart::Literal(text, _)) = &parts[0] {
                let text = text.clone();
                return self.mk(Expr::Str(text), start);
            }
        }
        let mut expr_parts = Vec::with_capacity(parts.len());
        for (pos, part) in parts {
            let id = match part {
                StringPart::Literal(text, tok) => self.mk_at(Expr::Str(text), tok),
                StringPart::Interp(e) => e,
            };
            expr_parts.push((pos, id));
        }
        self.mk(Expr::ConcatStrings { force_string, parts: expr_parts }, start)
    }

    // ===== Paths =====

    fn resolve_path(&self, text: &str) -> String {
        if let Some(rest) = text.strip_prefix("~/") {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            return canonicalize_lexically(&format!("{home}/{rest}"));
        }
        if text.starts_with('/') {
            return canonicalize_lexically(text);
        }
        canonicalize_lexically(&format!("{}/{}", self.base_path, text))
    }

    fn range_of(&self, id: ExprId) -> Range {
        let tr = self.ast.token_range(id);
        let start = self.tokens[tr.start as usize].range.start;
        let end = self.tokens[tr.end as usize].range.end;
        Range::new(start, end)
    }
}

enum StringPart {
    Literal(String, usize),
    Interp(ExprId),
}

/// Lexical `..`/`.` resolution; never touches the filesystem.
fn canonicalize_lexically(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    format!("/{}", out.join("/"))
}

/// Strip the common indentation of an indented string, the way the strict
/// parser does before constructing the node.
fn strip_indentation(parts: &mut [(Position, StringPart)]) {
    // Pass 1: find the minimum indentation over lines that have content.
    let mut min_indent = usize::MAX;
    let mut cur_indent = 0usize;
    let mut at_start_of_line = true;
    for (_, part) in parts.iter() {
        match part {
            StringPart::Interp(_) => {
                if at_start_of_line {
                    at_start_of_line = false;
                    min_indent = min_indent.min(cur_indent);
                }
            }
            StringPart::Literal(text, _) => {
                for ch in text.chars() {
                    if at_start_of_line {
                        match ch {
                            ' ' => cur_indent += 1,
                            '\n' => cur_indent = 0,
                            _ => {
                                at_start_of_line = false;
                                min_indent = min_indent.min(cur_indent);
                            }
                        }
                    } else if ch == '\n' {
                        at_start_of_line = true;
                        cur_indent = 0;
                    }
                }
            }
        }
    }
    if min_indent == usize::MAX {
        min_indent = 0;
    }

    // Pass 2: drop that indentation from every line.
    let mut at_start_of_line = true;
    let mut skipped = 0usize;
    let count = parts.len();
    for (index, (_, part)) in parts.iter_mut().enumerate() {
        match part {
            StringPart::Interp(_) => {
                at_start_of_line = false;
                skipped = 0;
            }
            StringPart::Literal(text, _) => {
                let mut out = String::with_capacity(text.len());
                for ch in text.chars() {
                    if at_start_of_line {
                        if ch == ' ' && skipped < min_indent {
                            skipped += 1;
                            continue;
                        }
                        if ch == '\n' {
                            out.push(ch);
                            skipped = 0;
                            continue;
                        }
                        at_start_of_line = false;
                        out.push(ch);
                    } else {
                        if ch == '\n' {
                            at_start_of_line = true;
                            skipped = 0;
                        }
                        out.push(ch);
                    }
                }
                // Drop trailing spaces of the final line when it is blank.
                if index + 1 == count {
                    if let Some(last_newline) = out.rfind('\n') {
                        if out[last_newline + 1..].chars().all(|c| c == ' ') {
                            out.truncate(last_newline + 1);
                        }
                    }
                }
                *text = out;
            }
        }
    }
}
