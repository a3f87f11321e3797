//! JSON-RPC protocol types, error codes, and capabilities for nix-lsp.
//!
//! This crate isolates protocol types from the server runtime so they can
//! be shared across binaries and tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod capabilities;
mod jsonrpc;
pub mod methods;

pub use jsonrpc::*;
