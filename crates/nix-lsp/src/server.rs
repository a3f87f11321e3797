//! The server: document lifecycle, request dispatch, and the stdio loop.
//!
//! Single-threaded cooperative dispatch: one message is read, handled to
//! completion, and answered before the next is read. The evaluator and
//! the document table are only ever touched from this loop, so there are
//! no locks anywhere.

use std::io::{self, BufReader};

use nix_analyzer::{
    Analyzer, ContentChange, DocumentStore, complete, compute_diagnostics, config, hover,
};
use nix_lexer::{Position, Range};
use nix_lsp_protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, capabilities, methods};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::convert::{WirePosition, WireRange, whole_document_wire_range};
use crate::formatting::{DEFAULT_FORMATTER, run_formatter};
use crate::transport::{Frame, read_message, write_message};

/// What the dispatcher decided about one message.
pub enum Outcome {
    /// Send this response.
    Reply(JsonRpcResponse),
    /// Notification handled; nothing to send.
    Silent,
    /// `exit` received; terminate the loop.
    Exit,
}

/// The language server.
pub struct LspServer {
    analyzer: Analyzer,
    store: DocumentStore,
}

impl Default for LspServer {
    fn default() -> Self {
        LspServer::new()
    }
}

// ===== Wire parameter shapes =====

#[derive(Deserialize)]
struct TextDocumentIdentifier {
    uri: String,
}

#[derive(Deserialize)]
struct TextDocumentItem {
    uri: String,
    text: String,
}

#[derive(Deserialize)]
struct DidOpenParams {
    #[serde(rename = "textDocument")]
    text_document: TextDocumentItem,
}

#[derive(Deserialize)]
struct WireContentChange {
    #[serde(default)]
    range: Option<WireRange>,
    text: String,
}

#[derive(Deserialize)]
struct DidChangeParams {
    #[serde(rename = "textDocument")]
    text_document: TextDocumentIdentifier,
    #[serde(rename = "contentChanges")]
    content_changes: Vec<WireContentChange>,
}

#[derive(Deserialize)]
struct DocumentParams {
    #[serde(rename = "textDocument")]
    text_document: TextDocumentIdentifier,
}

#[derive(Deserialize)]
struct PositionParams {
    #[serde(rename = "textDocument")]
    text_document: TextDocumentIdentifier,
    position: WirePosition,
}

impl LspServer {
    /// Create a server with a fresh analyzer.
    pub fn new() -> Self {
        LspServer { analyzer: Analyzer::new(), store: DocumentStore::new() }
    }

    /// Run the stdio loop until `exit` or EOF.
    pub fn run(&mut self) -> io::Result<()> {
        let stdin = io::stdin();
        let mut reader = BufReader::new(stdin.lock());
        let stdout = io::stdout();
        info!("nix-lsp listening on stdio");

        loop {
            match read_message(&mut reader)? {
                Frame::Eof => return Ok(()),
                Frame::Invalid => continue,
                Frame::Message(request) => {
                    debug!(method = %request.method, "<-- message");
                    match self.handle(request) {
                        Outcome::Silent => {}
                        Outcome::Exit => return Ok(()),
                        Outcome::Reply(response) => {
                            let mut out = stdout.lock();
                            write_message(&mut out, &response)?;
                        }
                    }
                }
            }
        }
    }

    /// Dispatch one message. Public so tests can drive the server without
    /// a transport.
    pub fn handle(&mut self, request: JsonRpcRequest) -> Outcome {
        let method = request.method.clone();
        match method.as_str() {
            methods::INITIALIZE => {
                Outcome::Reply(JsonRpcResponse::success(
                    request.id,
                    capabilities::initialize_result(),
                ))
            }
            methods::INITIALIZED => Outcome::Silent,
            methods::SHUTDOWN => Outcome::Reply(JsonRpcResponse::null(request.id)),
            methods::EXIT => Outcome::Exit,

            methods::TEXT_DOCUMENT_DID_OPEN => {
                if let Some(params) = parse_params::<DidOpenParams>(&request) {
                    let uri = params.text_document.uri;
                    let path = uri_to_path(&uri);
                    let doc = self.store.open(&uri, params.text_document.text, path);
                    self.analyzer.refresh_file_info(doc);
                }
                Outcome::Silent
            }
            methods::TEXT_DOCUMENT_DID_CHANGE => {
                if let Some(params) = parse_params::<DidChangeParams>(&request) {
                    let changes = params
                        .content_changes
                        .into_iter()
                        .map(|change| ContentChange {
                            range: change.range.map(Range::from),
                            text: change.text,
                        })
                        .collect();
                    self.store.change(&params.text_document.uri, changes);
                }
                Outcome::Silent
            }
            methods::TEXT_DOCUMENT_DID_SAVE => {
                if let Some(params) = parse_params::<DocumentParams>(&request) {
                    if let Some(doc) = self.store.get(&params.text_document.uri) {
                        self.analyzer.refresh_file_info(doc);
                    }
                }
                Outcome::Silent
            }
            methods::TEXT_DOCUMENT_DID_CLOSE => {
                if let Some(params) = parse_params::<DocumentParams>(&request) {
                    self.store.close(&params.text_document.uri);
                }
                Outcome::Silent
            }

            methods::TEXT_DOCUMENT_HOVER => self.on_hover(request),
            methods::TEXT_DOCUMENT_DEFINITION => self.on_definition(request),
            methods::TEXT_DOCUMENT_COMPLETION => self.on_completion(request),
            methods::TEXT_DOCUMENT_DIAGNOSTIC => self.on_diagnostic(request),
            methods::TEXT_DOCUMENT_FORMATTING => self.on_formatting(request),

            _ if request.is_notification() => Outcome::Silent,
            other => Outcome::Reply(JsonRpcResponse::error(
                request.id.clone(),
                JsonRpcError::method_not_found(other),
            )),
        }
    }

    // ===== Queries =====

    fn on_hover(&mut self, request: JsonRpcRequest) -> Outcome {
        let id = request.id.clone();
        let Some(params) = parse_params::<PositionParams>(&request) else {
            return invalid_params(id);
        };
        let Some(doc) = self.store.get(&params.text_document.uri) else {
            return Outcome::Reply(JsonRpcResponse::null(id));
        };
        let analysis = self.analyzer.analyze(doc, Position::from(params.position));
        match hover(&self.analyzer, doc, &analysis) {
            Some(result) => Outcome::Reply(JsonRpcResponse::success(
                id,
                json!({
                    "contents": { "kind": "markdown", "value": result.markdown },
                }),
            )),
            None => Outcome::Reply(JsonRpcResponse::null(id)),
        }
    }

    fn on_definition(&mut self, request: JsonRpcRequest) -> Outcome {
        let id = request.id.clone();
        let Some(params) = parse_params::<PositionParams>(&request) else {
            return invalid_params(id);
        };
        let Some(doc) = self.store.get(&params.text_document.uri) else {
            return Outcome::Reply(JsonRpcResponse::null(id));
        };
        let analysis = self.analyzer.analyze(doc, Position::from(params.position));
        let definition = hover(&self.analyzer, doc, &analysis).and_then(|r| r.definition);
        match definition {
            Some(pos) => {
                let wire = WirePosition::from(pos);
                Outcome::Reply(JsonRpcResponse::success(
                    id,
                    json!({
                        "uri": params.text_document.uri,
                        "range": { "start": wire, "end": wire },
                    }),
                ))
            }
            None => Outcome::Reply(JsonRpcResponse::null(id)),
        }
    }

    fn on_completion(&mut self, request: JsonRpcRequest) -> Outcome {
        let id = request.id.clone();
        let Some(params) = parse_params::<PositionParams>(&request) else {
            return invalid_params(id);
        };
        let Some(doc) = self.store.get(&params.text_document.uri) else {
            return Outcome::Reply(JsonRpcResponse::null(id));
        };
        let analysis = self.analyzer.analyze(doc, Position::from(params.position));
        let labels = complete(&self.analyzer, doc, &analysis);
        let items: Vec<Value> = labels.into_iter().map(|label| json!({ "label": label })).collect();
        Outcome::Reply(JsonRpcResponse::success(id, Value::Array(items)))
    }

    fn on_diagnostic(&mut self, request: JsonRpcRequest) -> Outcome {
        let id = request.id.clone();
        let Some(params) = parse_params::<DocumentParams>(&request) else {
            return invalid_params(id);
        };
        let Some(doc) = self.store.get(&params.text_document.uri) else {
            return Outcome::Reply(JsonRpcResponse::null(id));
        };
        let diagnostics = compute_diagnostics(&self.analyzer, doc);
        let items: Vec<Value> = diagnostics
            .into_iter()
            .map(|d| {
                json!({
                    "range": WireRange::from(d.range),
                    "message": d.message,
                })
            })
            .collect();
        Outcome::Reply(JsonRpcResponse::success(
            id,
            json!({ "kind": "full", "items": items }),
        ))
    }

    fn on_formatting(&mut self, request: JsonRpcRequest) -> Outcome {
        let id = request.id.clone();
        let Some(params) = parse_params::<DocumentParams>(&request) else {
            return invalid_params(id);
        };
        let Some(doc) = self.store.get(&params.text_document.uri) else {
            return Outcome::Reply(JsonRpcResponse::null(id));
        };
        let argv = {
            let info = doc.file_info.borrow();
            config::get_string_list(self.analyzer.evaluator(), &info.config, "formatter")
                .unwrap_or_else(|| DEFAULT_FORMATTER.iter().map(|s| s.to_string()).collect())
        };
        match run_formatter(doc.source(), &argv) {
            Some(new_text) => Outcome::Reply(JsonRpcResponse::success(
                id,
                json!([{ "range": whole_document_wire_range(), "newText": new_text }]),
            )),
            None => Outcome::Reply(JsonRpcResponse::null(id)),
        }
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(request: &JsonRpcRequest) -> Option<T> {
    let params = request.params.clone()?;
    serde_json::from_value(params).ok()
}

fn invalid_params(id: Option<Value>) -> Outcome {
    Outcome::Reply(JsonRpcResponse::error(
        id,
        JsonRpcError::invalid_params("missing or malformed parameters"),
    ))
}

/// Map a `file://` URI to a filesystem path, percent-decoding included.
fn uri_to_path(uri: &str) -> Option<String> {
    let parsed = url::Url::parse(uri).ok()?;
    if parsed.scheme() != "file" {
        return None;
    }
    parsed
        .to_file_path()
        .ok()
        .map(|path| path.to_string_lossy().into_owned())
}
