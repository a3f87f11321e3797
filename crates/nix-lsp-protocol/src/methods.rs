//! LSP method name constants.
//!
//! Centralised so dispatch, capability registration, and tests agree on
//! the exact strings.

/// `initialize` request.
pub const INITIALIZE: &str = "initialize";
/// `initialized` notification.
pub const INITIALIZED: &str = "initialized";
/// `shutdown` request.
pub const SHUTDOWN: &str = "shutdown";
/// `exit` notification.
pub const EXIT: &str = "exit";

/// Document opened.
pub const TEXT_DOCUMENT_DID_OPEN: &str = "textDocument/didOpen";
/// Document changed.
pub const TEXT_DOCUMENT_DID_CHANGE: &str = "textDocument/didChange";
/// Document saved.
pub const TEXT_DOCUMENT_DID_SAVE: &str = "textDocument/didSave";
/// Document closed.
pub const TEXT_DOCUMENT_DID_CLOSE: &str = "textDocument/didClose";

/// Hover request.
pub const TEXT_DOCUMENT_HOVER: &str = "textDocument/hover";
/// Go-to-definition request.
pub const TEXT_DOCUMENT_DEFINITION: &str = "textDocument/definition";
/// Completion request.
pub const TEXT_DOCUMENT_COMPLETION: &str = "textDocument/completion";
/// Pull-diagnostics request.
pub const TEXT_DOCUMENT_DIAGNOSTIC: &str = "textDocument/diagnostic";
/// Whole-document formatting request.
pub const TEXT_DOCUMENT_FORMATTING: &str = "textDocument/formatting";
