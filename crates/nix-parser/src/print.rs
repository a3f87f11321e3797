//! AST printing in the strict evaluator's `show` format.
//!
//! The output is valid source: parsing a printed tree yields a
//! structurally identical tree, which the round-trip tests rely on.

use crate::ast::{AttrName, Expr, ExprId, ParseResult};
use crate::symbol::SymbolTable;

/// Render a node as source text.
pub fn display(result: &ParseResult, symbols: &SymbolTable, id: ExprId) -> String {
    let mut out = String::new();
    write_expr(result, symbols, id, &mut out);
    out
}

fn write_expr(result: &ParseResult, symbols: &SymbolTable, id: ExprId, out: &mut String) {
    let write = |id: ExprId, out: &mut String| write_expr(result, symbols, id, out);
    match result.ast.expr(id) {
        Expr::Int(n) => out.push_str(&n.to_string()),
        Expr::Float(f) => out.push_str(&f.to_string()),
        Expr::Str(s) => write_string_literal(s, out),
        Expr::Path(p) => out.push_str(p),
        Expr::Var(sym) => out.push_str(&symbols.name(*sym)),
        Expr::Select { base, path, default } => {
            out.push('(');
            write(*base, out);
            out.push('.');
            write_attrpath(result, symbols, path, out);
            if let Some(default) = default {
                out.push_str(" or ");
                write(*default, out);
            }
            out.push(')');
        }
        Expr::HasAttr { base, path } => {
            out.push('(');
            write(*base, out);
            out.push_str(" ? ");
            write_attrpath(result, symbols, path, out);
            out.push(')');
        }
        Expr::Attrs(attrs) => {
            if attrs.recursive {
                out.push_str("rec ");
            }
            out.push_str("{ ");
            for (sym, def) in &attrs.attrs {
                if def.inherited() {
                    out.push_str("inherit ");
                    out.push_str(&symbols.name(*sym));
                    out.push_str("; ");
                } else {
                    out.push_str(&symbols.name(*sym));
                    out.push_str(" = ");
                    write(def.expr, out);
                    out.push_str("; ");
                }
            }
            for dynamic in &attrs.dynamic_attrs {
                out.push_str("${");
                write(dynamic.name_expr, out);
                out.push_str("} = ");
                write(dynamic.value_expr, out);
                out.push_str("; ");
            }
            out.push('}');
        }
        Expr::List(elems) => {
            out.push_str("[ ");
            for elem in elems {
                write(*elem, out);
                out.push(' ');
            }
            out.push(']');
        }
        Expr::Lambda(lambda) => {
            out.push('(');
            if let Some(formals) = &lambda.formals {
                out.push_str("{ ");
                let mut first = true;
                for formal in &formals.formals {
                    if !first {
                        out.push_str(", ");
                    }
                    first = false;
                    out.push_str(&symbols.name(formal.name));
                    if let Some(default) = formal.default {
                        out.push_str(" ? ");
                        write(default, out);
                    }
                }
                if formals.ellipsis {
                    if !first {
                        out.push_str(", ");
                    }
                    out.push_str("...");
                }
                out.push_str(" }");
                if let Some(arg) = lambda.arg {
                    out.push_str(" @ ");
                    out.push_str(&symbols.name(arg));
                }
            } else if let Some(arg) = lambda.arg {
                out.push_str(&symbols.name(arg));
            }
            out.push_str(": ");
            write(lambda.body, out);
            out.push(')');
        }
        Expr::Call { fun, args } => {
            out.push('(');
            write(*fun, out);
            for arg in args {
                out.push(' ');
                write(*arg, out);
            }
            out.push(')');
        }
        Expr::Let { attrs, body } => {
            out.push_str("(let ");
            for (sym, def) in &attrs.attrs {
                if def.inherited() {
                    out.push_str("inherit ");
                    out.push_str(&symbols.name(*sym));
                    out.push_str("; ");
                } else {
                    out.push_str(&symbols.name(*sym));
                    out.push_str(" = ");
                    write(def.expr, out);
                    out.push_str("; ");
                }
            }
            out.push_str("in ");
            write(*body, out);
            out.push(')');
        }
        Expr::With { attrs, body } => {
            out.push_str("(with ");
            write(*attrs, out);
            out.push_str("; ");
            write(*body, out);
            out.push(')');
        }
        Expr::If { cond, then, else_ } => {
            out.push_str("(if ");
            write(*cond, out);
            out.push_str(" then ");
            write(*then, out);
            out.push_str(" else ");
            write(*else_, out);
            out.push(')');
        }
        Expr::Assert { cond, body } => {
            out.push_str("(assert ");
            write(*cond, out);
            out.push_str("; ");
            write(*body, out);
            out.push(')');
        }
        Expr::OpNot(e) => {
            out.push_str("(! ");
            write(*e, out);
            out.push(')');
        }
        Expr::ConcatStrings { parts, .. } => {
            out.push('(');
            let mut first = true;
            for (_, part) in parts {
                if !first {
                    out.push_str(" + ");
                }
                first = false;
                write(*part, out);
            }
            out.push(')');
        }
        Expr::OpEq(a, b) => write_binary(result, symbols, *a, "==", *b, out),
        Expr::OpNeq(a, b) => write_binary(result, symbols, *a, "!=", *b, out),
        Expr::OpAnd(a, b) => write_binary(result, symbols, *a, "&&", *b, out),
        Expr::OpOr(a, b) => write_binary(result, symbols, *a, "||", *b, out),
        Expr::OpImpl(a, b) => write_binary(result, symbols, *a, "->", *b, out),
        Expr::OpUpdate(a, b) => write_binary(result, symbols, *a, "//", *b, out),
        Expr::OpConcatLists(a, b) => write_binary(result, symbols, *a, "++", *b, out),
        Expr::Pos => out.push_str("__curPos"),
    }
}

fn write_binary(
    result: &ParseResult,
    symbols: &SymbolTable,
    a: ExprId,
    op: &str,
    b: ExprId,
    out: &mut String,
) {
    out.push('(');
    write_expr(result, symbols, a, out);
    out.push(' ');
    out.push_str(op);
    out.push(' ');
    write_expr(result, symbols, b, out);
    out.push(')');
}

fn write_attrpath(
    result: &ParseResult,
    symbols: &SymbolTable,
    path: &[AttrName],
    out: &mut String,
) {
    let mut first = true;
    for component in path {
        if !first {
            out.push('.');
        }
        first = false;
        match component {
            AttrName::Symbol(sym, _) => out.push_str(&symbols.name(*sym)),
            AttrName::Dynamic(e) => {
                out.push_str("${");
                write_expr(result, symbols, *e, out);
                out.push('}');
            }
        }
    }
}

/// Quote a string the way the strict printer does.
pub fn write_string_literal(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' => out.push_str("\\$"),
            other => out.push(other),
        }
    }
    out.push('"');
}
