//! Message framing for the LSP base protocol.
//!
//! Content-Length framed JSON: headers terminated by CRLF CRLF, then a
//! body of exactly that many bytes. `Content-Type` is tolerated and
//! ignored. A malformed frame aborts the current message, never the loop.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};

use nix_lsp_protocol::{JsonRpcRequest, JsonRpcResponse};
use tracing::warn;

/// Result of reading one frame.
#[derive(Debug)]
pub enum Frame {
    /// A well-formed message.
    Message(JsonRpcRequest),
    /// A malformed frame; fatal for this message only, the loop continues.
    Invalid,
    /// End of input.
    Eof,
}

/// Read one framed message.
///
/// A malformed frame (missing Content-Length, bad JSON) yields
/// [`Frame::Invalid`] so the caller can keep the loop alive. Returns
/// `Err` only on I/O errors.
pub fn read_message<R: BufRead>(reader: &mut R) -> io::Result<Frame> {
    let mut headers = HashMap::new();

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(Frame::Eof);
        }
        let line = line.trim_end();
        if line.is_empty() {
            break; // End of headers
        }
        if let Some((key, value)) = line.split_once(": ") {
            headers.insert(key.to_string(), value.to_string());
        }
    }

    let Some(length) = headers.get("Content-Length").and_then(|v| v.parse::<usize>().ok())
    else {
        warn!("frame without a usable Content-Length header");
        return Ok(Frame::Invalid);
    };

    let mut content = vec![0u8; length];
    let mut read = 0;
    while read < length {
        match reader.read(&mut content[read..])? {
            0 => return Ok(Frame::Eof), // Unexpected EOF
            n => read += n,
        }
    }

    match serde_json::from_slice(&content) {
        Ok(request) => Ok(Frame::Message(request)),
        Err(err) => {
            warn!(error = %err, "dropping malformed frame");
            Ok(Frame::Invalid)
        }
    }
}

/// Write one framed response.
pub fn write_message<W: Write>(writer: &mut W, response: &JsonRpcResponse) -> io::Result<()> {
    let content = serde_json::to_string(response)?;
    write!(writer, "Content-Length: {}\r\n\r\n{}", content.len(), content)?;
    writer.flush()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame(body: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
    }

    #[test]
    fn reads_a_framed_request() {
        let bytes = frame(r#"{"jsonrpc":"2.0","id":1,"method":"shutdown"}"#);
        let mut reader = io::Cursor::new(bytes);
        match read_message(&mut reader).unwrap() {
            Frame::Message(request) => assert_eq!(request.method, "shutdown"),
            other => panic!("expected a message, got {other:?}"),
        }
    }

    #[test]
    fn tolerates_content_type_headers() {
        let body = r#"{"jsonrpc":"2.0","method":"exit"}"#;
        let bytes = format!(
            "Content-Length: {}\r\nContent-Type: application/vscode-jsonrpc; charset=utf-8\r\n\r\n{}",
            body.len(),
            body
        );
        let mut reader = io::Cursor::new(bytes.into_bytes());
        match read_message(&mut reader).unwrap() {
            Frame::Message(request) => assert_eq!(request.method, "exit"),
            other => panic!("expected a message, got {other:?}"),
        }
    }

    #[test]
    fn malformed_json_is_invalid_not_eof() {
        let bytes = frame("{not json");
        let mut reader = io::Cursor::new(bytes);
        assert!(matches!(read_message(&mut reader).unwrap(), Frame::Invalid));
    }

    #[test]
    fn empty_input_is_eof() {
        let mut reader = io::Cursor::new(Vec::new());
        assert!(matches!(read_message(&mut reader).unwrap(), Frame::Eof));
    }

    #[test]
    fn write_read_round_trip() {
        let response = JsonRpcResponse::null(Some(7.into()));
        let mut bytes = Vec::new();
        write_message(&mut bytes, &response).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("Content-Length: "), "got {text}");
        assert!(text.contains(r#""id":7"#), "got {text}");
    }
}
