//! nix-lsp runtime: transport, dispatch, and formatter integration.
//!
//! The server reads Content-Length framed JSON-RPC messages from stdin,
//! completes each one before reading the next, and writes responses to
//! stdout. All language smarts live in the `nix-analyzer` engine; this
//! crate only owns the wiring.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod convert;
pub mod formatting;
pub mod server;
pub mod transport;

pub use server::{LspServer, Outcome};

/// Run the LSP server in stdio mode.
///
/// # Errors
///
/// Returns an error only for I/O failures on the transport; protocol
/// errors are handled per message and never end the loop.
pub fn run_stdio() -> anyhow::Result<()> {
    let mut server = LspServer::new();
    server.run()?;
    Ok(())
}
