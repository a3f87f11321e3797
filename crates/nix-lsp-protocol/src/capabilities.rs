//! Server capabilities advertised at `initialize`.
//!
//! Single source of truth for what the server claims to support; the
//! dispatch table and the tests both check against this payload.

use serde_json::{Value, json};

/// The `initialize` result: capabilities plus server info.
pub fn initialize_result() -> Value {
    json!({
        "capabilities": server_capabilities(),
        "serverInfo": {
            "name": "nix-lsp",
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// The capabilities object itself.
pub fn server_capabilities() -> Value {
    json!({
        // 2 = incremental sync
        "textDocumentSync": 2,
        "hoverProvider": true,
        "definitionProvider": true,
        "completionProvider": {
            "triggerCharacters": ["."],
        },
        "diagnosticProvider": {
            "interFileDependencies": false,
            "workspaceDiagnostics": false,
        },
        "documentFormattingProvider": true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_is_incremental() {
        assert_eq!(server_capabilities()["textDocumentSync"], 2);
    }

    #[test]
    fn completion_triggers_on_dot() {
        assert_eq!(
            server_capabilities()["completionProvider"]["triggerCharacters"][0],
            "."
        );
    }
}
