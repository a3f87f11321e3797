//! Server dispatch tests: lifecycle, queries, and the wire shapes,
//! driven through `LspServer::handle` without a transport.

#![allow(clippy::unwrap_used, clippy::panic)]

use nix_lsp::{LspServer, Outcome};
use nix_lsp_protocol::{JsonRpcRequest, JsonRpcResponse};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
    JsonRpcRequest {
        _jsonrpc: "2.0".to_string(),
        id: Some(id.into()),
        method: method.to_string(),
        params: Some(params),
    }
}

fn notification(method: &str, params: Value) -> JsonRpcRequest {
    JsonRpcRequest {
        _jsonrpc: "2.0".to_string(),
        id: None,
        method: method.to_string(),
        params: Some(params),
    }
}

fn reply(outcome: Outcome) -> JsonRpcResponse {
    match outcome {
        Outcome::Reply(response) => response,
        Outcome::Silent => panic!("expected a reply, got silence"),
        Outcome::Exit => panic!("expected a reply, got exit"),
    }
}

fn open(server: &mut LspServer, uri: &str, text: &str) {
    let outcome = server.handle(notification(
        "textDocument/didOpen",
        json!({ "textDocument": { "uri": uri, "text": text } }),
    ));
    assert!(matches!(outcome, Outcome::Silent));
}

fn completion_labels(server: &mut LspServer, uri: &str, line: u32, character: u32) -> Vec<String> {
    let response = reply(server.handle(request(
        1,
        "textDocument/completion",
        json!({
            "textDocument": { "uri": uri },
            "position": { "line": line, "character": character },
        }),
    )));
    response.result.unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["label"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn initialize_advertises_the_capability_set() {
    let mut server = LspServer::new();
    let response = reply(server.handle(request(1, "initialize", json!({}))));
    let capabilities = &response.result.unwrap()["capabilities"];
    assert_eq!(capabilities["textDocumentSync"], 2);
    assert_eq!(capabilities["hoverProvider"], true);
    assert_eq!(capabilities["definitionProvider"], true);
    assert_eq!(capabilities["completionProvider"]["triggerCharacters"][0], ".");
    assert_eq!(capabilities["diagnosticProvider"]["interFileDependencies"], false);
    assert_eq!(capabilities["documentFormattingProvider"], true);
}

#[test]
fn shutdown_replies_null_and_exit_terminates() {
    let mut server = LspServer::new();
    let response = reply(server.handle(request(1, "shutdown", json!({}))));
    assert_eq!(response.result, Some(Value::Null));
    assert!(matches!(
        server.handle(notification("exit", json!({}))),
        Outcome::Exit
    ));
}

#[test]
fn unknown_requests_get_method_not_found() {
    let mut server = LspServer::new();
    let response = reply(server.handle(request(1, "textDocument/rename", json!({}))));
    assert_eq!(response.error.unwrap().code, -32601);
}

#[test]
fn unknown_notifications_are_ignored() {
    let mut server = LspServer::new();
    assert!(matches!(
        server.handle(notification("$/cancelRequest", json!({}))),
        Outcome::Silent
    ));
}

#[test]
fn queries_against_absent_documents_return_null() {
    let mut server = LspServer::new();
    let response = reply(server.handle(request(
        1,
        "textDocument/hover",
        json!({
            "textDocument": { "uri": "file:///absent.nix" },
            "position": { "line": 0, "character": 0 },
        }),
    )));
    assert_eq!(response.result, Some(Value::Null));
}

#[test]
fn completion_over_the_wire_is_sorted_by_label() {
    let mut server = LspServer::new();
    open(&mut server, "file:///t.nix", "{banana = 7; apple = 4; }.a");
    let labels = completion_labels(&mut server, "file:///t.nix", 0, 27);
    assert_eq!(labels, vec!["apple", "banana"]);
}

#[test]
fn full_replacement_change_matches_fresh_open() {
    let mut server = LspServer::new();
    open(&mut server, "file:///a.nix", "{ old = 1; }.");
    let outcome = server.handle(notification(
        "textDocument/didChange",
        json!({
            "textDocument": { "uri": "file:///a.nix" },
            "contentChanges": [ { "text": "{ apple = 4; banana = 7; }.a" } ],
        }),
    ));
    assert!(matches!(outcome, Outcome::Silent));
    let changed = completion_labels(&mut server, "file:///a.nix", 0, 28);

    let mut fresh_server = LspServer::new();
    open(&mut fresh_server, "file:///b.nix", "{ apple = 4; banana = 7; }.a");
    let fresh = completion_labels(&mut fresh_server, "file:///b.nix", 0, 28);

    assert_eq!(changed, fresh);
    assert_eq!(changed, vec!["apple", "banana"]);
}

#[test]
fn incremental_change_applies_in_order() {
    let mut server = LspServer::new();
    open(&mut server, "file:///i.nix", "{ aa = 1; }.a");
    let outcome = server.handle(notification(
        "textDocument/didChange",
        json!({
            "textDocument": { "uri": "file:///i.nix" },
            "contentChanges": [
                {
                    "range": {
                        "start": { "line": 0, "character": 2 },
                        "end": { "line": 0, "character": 4 },
                    },
                    "text": "bb",
                },
            ],
        }),
    ));
    assert!(matches!(outcome, Outcome::Silent));
    let labels = completion_labels(&mut server, "file:///i.nix", 0, 13);
    assert_eq!(labels, vec!["bb"]);
}

#[test]
fn diagnostics_report_is_full_with_ranged_items() {
    let mut server = LspServer::new();
    open(&mut server, "file:///d.nix", "{a = 2; a = 3;}");
    let response = reply(server.handle(request(
        3,
        "textDocument/diagnostic",
        json!({ "textDocument": { "uri": "file:///d.nix" } }),
    )));
    let result = response.result.unwrap();
    assert_eq!(result["kind"], "full");
    let items = result["items"].as_array().unwrap();
    assert!(
        items
            .iter()
            .any(|item| item["message"].as_str().unwrap().contains("already defined")),
        "got {items:?}"
    );
    for item in items {
        assert!(item["range"]["start"]["line"].is_u64(), "got {item:?}");
    }
}

#[test]
fn definition_returns_a_location() {
    let mut server = LspServer::new();
    open(&mut server, "file:///def.nix", "let a = { b = 3; }; in a.b");
    let response = reply(server.handle(request(
        4,
        "textDocument/definition",
        json!({
            "textDocument": { "uri": "file:///def.nix" },
            "position": { "line": 0, "character": 25 },
        }),
    )));
    let result = response.result.unwrap();
    assert_eq!(result["uri"], "file:///def.nix");
    assert_eq!(result["range"]["start"]["character"], 10);
}

#[test]
fn hover_returns_markdown() {
    let mut server = LspServer::new();
    open(&mut server, "file:///h.nix", "let a = { b = 3; }; in a.b");
    let response = reply(server.handle(request(
        5,
        "textDocument/hover",
        json!({
            "textDocument": { "uri": "file:///h.nix" },
            "position": { "line": 0, "character": 25 },
        }),
    )));
    let result = response.result.unwrap();
    assert_eq!(result["contents"]["kind"], "markdown");
    assert!(result["contents"]["value"].as_str().unwrap().contains('3'));
}

mod formatting {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn open_with_config(formatter: &str, source: &str) -> (LspServer, String, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("nix-analyzer-config.nix"),
            format!("{{ formatter = [ \"{formatter}\" ]; }}"),
        )
        .unwrap();
        let doc_path = dir.path().join("doc.nix");
        fs::write(&doc_path, source).unwrap();
        let uri = format!("file://{}", doc_path.display());
        let mut server = LspServer::new();
        open(&mut server, &uri, source);
        (server, uri, dir)
    }

    #[test]
    fn formatting_returns_one_whole_document_edit() {
        let (mut server, uri, _dir) = open_with_config("cat", "{ a = 1; }\n");
        let response = reply(server.handle(request(
            6,
            "textDocument/formatting",
            json!({ "textDocument": { "uri": uri } }),
        )));
        let edits = response.result.unwrap();
        let edits = edits.as_array().unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0]["newText"], "{ a = 1; }\n");
        assert_eq!(edits[0]["range"]["start"]["line"], 0);
    }

    #[test]
    fn failing_formatter_yields_null() {
        let (mut server, uri, _dir) = open_with_config("false", "{ broken\n");
        let response = reply(server.handle(request(
            7,
            "textDocument/formatting",
            json!({ "textDocument": { "uri": uri } }),
        )));
        assert_eq!(response.result, Some(Value::Null));
    }
}
