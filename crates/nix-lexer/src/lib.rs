//! Tokenizer for the Nix expression language.
//!
//! This crate provides the leaf layer of the analyzer: zero-based
//! [`Position`]/[`Range`] types shared by every other crate, the closed
//! [`TokenKind`] vocabulary, and a mode-tracking [`Tokenizer`] that turns
//! source text into a finite token vector.
//!
//! The tokenizer is built for mid-edit input: it never fails and never
//! stops early. Unknown bytes become [`TokenKind::Error`] tokens, an
//! unterminated string simply runs into `Eof`, and every token carries a
//! byte-accurate range so diagnostics and the cursor-path locator can map
//! back to the document.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod lexer;
mod position;
mod token;

pub use lexer::{Tokenizer, tokenize};
pub use position::{Position, Range};
pub use token::{Token, TokenKind, TokenRange, TokenValue};
