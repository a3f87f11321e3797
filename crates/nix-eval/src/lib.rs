//! Best-effort lazy evaluator for the Nix expression language.
//!
//! This crate is the runtime half of the analyzer: values, environments,
//! thunks, and an evaluator that forces exactly what a query asks for. It
//! differs from a strict evaluator in one deliberate way: every operation
//! returns a `Result` and no call can terminate the process, because the
//! callers evaluate broken, half-typed documents all day.
//!
//! The [`Evaluator`] is constructed once, owns the base environment and the
//! import cache, and lives for the whole server process; forced values
//! survive across queries by design.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod builtins;
mod env;
mod error;
mod eval;
mod source;
mod value;

pub use env::Env;
pub use error::EvalError;
pub use eval::{Evaluator, format_float};
pub use source::{ExprRef, SourceUnit};
pub use value::{Attr, AttrSet, Closure, PrimOp, Value, ValueRef, value_ref};
