//! Semantic analysis engine for the Nix language server.
//!
//! The pipeline behind every query: parse the document (lazily, tolerant
//! of broken input), locate the cursor path, build the static and dynamic
//! environments along it, infer lambda arguments from the file kind, then
//! run the query-specific resolver: completion, hover, definition, or
//! diagnostics.
//!
//! The [`Analyzer`] owns the process-wide evaluator and caches (package
//! set, imports); [`DocumentStore`] owns the open documents and their
//! parse state.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod analysis;
mod analyzer;
pub mod completion;
pub mod config;
pub mod diagnostics;
mod document;
pub mod flakes;
pub mod hover;
pub mod schema;
mod store;

pub use analysis::{Analysis, PathEntry, update_env};
pub use analyzer::Analyzer;
pub use completion::complete;
pub use diagnostics::{Diagnostic, compute as compute_diagnostics, whole_document_range};
pub use document::{ContentChange, Document, FileInfo, FileType};
pub use hover::{HoverResult, hover};
pub use store::{DocumentStore, uri_to_path};
