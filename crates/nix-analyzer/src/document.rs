//! Open documents.
//!
//! A document holds its source in a rope for O(log n) incremental edits
//! plus a cached string for the tokenizer, and derives its parse state
//! lazily: the first query parses, `didChange` invalidates. Everything the
//! parser produced dies with the document; only forced values, which live
//! in the evaluator, survive it.

use std::cell::RefCell;
use std::rc::Rc;

use nix_eval::ValueRef;
use nix_lexer::{Position, Range};
use ropey::Rope;

/// How a document is treated by lambda-argument inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileType {
    /// No special handling.
    #[default]
    None,
    /// A package definition; its top-level lambda receives the package set.
    Package,
    /// A `flake.nix`; its `outputs` lambda receives the flake inputs.
    Flake,
}

/// Per-file state that survives across requests.
#[derive(Default)]
pub struct FileInfo {
    /// Synthesised flake-input attr set, for flake files.
    pub flake_inputs: Option<ValueRef>,
    /// Detected file type.
    pub file_type: FileType,
    /// Configuration values discovered for this document, most specific
    /// first.
    pub config: Vec<ValueRef>,
}

/// A single content change from `textDocument/didChange`. A missing range
/// replaces the whole document.
#[derive(Debug, Clone)]
pub struct ContentChange {
    /// Replaced range, if incremental.
    pub range: Option<Range>,
    /// Replacement text.
    pub text: String,
}

/// An open document and its lazily derived parse state.
pub struct Document {
    /// The `file://` URI the client used.
    pub uri: String,
    /// On-disk path, if the URI mapped to one.
    pub path: Option<String>,
    /// Directory that anchors relative path literals.
    pub base_path: String,
    rope: Rope,
    text: String,
    unit: RefCell<Option<Rc<nix_eval::SourceUnit>>>,
    /// File-kind caches refreshed on open and save.
    pub file_info: RefCell<FileInfo>,
}

impl Document {
    /// Create a document from its initial text.
    pub fn new(uri: String, text: String, path: Option<String>) -> Self {
        let base_path = path
            .as_deref()
            .and_then(|p| std::path::Path::new(p).parent())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string());
        Document {
            uri,
            path,
            base_path,
            rope: Rope::from_str(&text),
            text,
            unit: RefCell::new(None),
            file_info: RefCell::new(FileInfo::default()),
        }
    }

    /// Current source text.
    pub fn source(&self) -> &str {
        &self.text
    }

    /// Apply one content change and invalidate the parse state.
    pub fn apply_change(&mut self, change: ContentChange) {
        match change.range {
            None => {
                self.rope = Rope::from_str(&change.text);
            }
            Some(range) => {
                let start = self.position_to_char(range.start);
                let end = self.position_to_char(range.end).max(start);
                self.rope.remove(start..end);
                self.rope.insert(start, &change.text);
            }
        }
        self.text = self.rope.to_string();
        *self.unit.borrow_mut() = None;
    }

    fn position_to_char(&self, pos: Position) -> usize {
        let line = (pos.line as usize).min(self.rope.len_lines().saturating_sub(1));
        let line_start = self.rope.line_to_char(line);
        let line_len = self.rope.line(line).len_chars();
        (line_start + (pos.col as usize).min(line_len)).min(self.rope.len_chars())
    }

    /// The cached parse state, if the document has been parsed since the
    /// last change.
    pub fn cached_unit(&self) -> Option<Rc<nix_eval::SourceUnit>> {
        self.unit.borrow().clone()
    }

    /// Store the parse state produced by the analyzer.
    pub fn cache_unit(&self, unit: Rc<nix_eval::SourceUnit>) {
        *self.unit.borrow_mut() = Some(unit);
    }

    /// Whether this document is a flake file.
    pub fn is_flake(&self) -> bool {
        self.path.as_deref().is_some_and(|p| p.ends_with("/flake.nix"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn full_replacement() {
        let mut doc = Document::new("file:///x.nix".into(), "{ }".into(), None);
        doc.apply_change(ContentChange { range: None, text: "{ a = 1; }".into() });
        assert_eq!(doc.source(), "{ a = 1; }");
    }

    #[test]
    fn ranged_replacement() {
        let mut doc = Document::new("file:///x.nix".into(), "let a = 1; in a".into(), None);
        doc.apply_change(ContentChange {
            range: Some(Range::new(Position::new(0, 8), Position::new(0, 9))),
            text: "42".into(),
        });
        assert_eq!(doc.source(), "let a = 42; in a");
    }

    #[test]
    fn multi_line_edit() {
        let mut doc = Document::new("file:///x.nix".into(), "{\n  a = 1;\n}".into(), None);
        doc.apply_change(ContentChange {
            range: Some(Range::new(Position::new(1, 6), Position::new(1, 7))),
            text: "2".into(),
        });
        assert_eq!(doc.source(), "{\n  a = 2;\n}");
    }

    #[test]
    fn change_invalidates_parse_cache() {
        let mut doc = Document::new("file:///x.nix".into(), "{ }".into(), None);
        assert!(doc.cached_unit().is_none());
        doc.apply_change(ContentChange { range: None, text: "{ a = 1; }".into() });
        assert!(doc.cached_unit().is_none());
    }

    #[test]
    fn flake_detection_uses_the_path() {
        let doc = Document::new(
            "file:///w/flake.nix".into(),
            "{ }".into(),
            Some("/w/flake.nix".into()),
        );
        assert!(doc.is_flake());
    }
}
