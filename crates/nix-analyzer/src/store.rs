//! The open-document table.

use rustc_hash::FxHashMap;

use crate::document::{ContentChange, Document};

/// Documents keyed by URI. Lifecycle: `didOpen` creates, `didChange`
/// mutates, `didClose` removes; queries against unknown URIs get `None`.
#[derive(Default)]
pub struct DocumentStore {
    docs: FxHashMap<String, Document>,
}

impl DocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        DocumentStore::default()
    }

    /// Create (or replace) a document from `didOpen`. `path` is the
    /// filesystem path the URI mapped to, when it did.
    pub fn open(&mut self, uri: &str, text: String, path: Option<String>) -> &Document {
        let doc = Document::new(uri.to_string(), text, path);
        self.docs.insert(uri.to_string(), doc);
        &self.docs[uri]
    }

    /// Apply `didChange` content changes in arrival order.
    pub fn change(&mut self, uri: &str, changes: Vec<ContentChange>) -> Option<&Document> {
        let doc = self.docs.get_mut(uri)?;
        for change in changes {
            doc.apply_change(change);
        }
        Some(&self.docs[uri])
    }

    /// Remove a document on `didClose`.
    pub fn close(&mut self, uri: &str) {
        self.docs.remove(uri);
    }

    /// Look up an open document.
    pub fn get(&self, uri: &str) -> Option<&Document> {
        self.docs.get(uri)
    }
}

/// Map a `file://` URI to a filesystem path.
pub fn uri_to_path(uri: &str) -> Option<String> {
    uri.strip_prefix("file://").map(|path| path.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lifecycle() {
        let mut store = DocumentStore::new();
        store.open("file:///a.nix", "{ }".to_string(), uri_to_path("file:///a.nix"));
        assert!(store.get("file:///a.nix").is_some());
        store
            .change("file:///a.nix", vec![ContentChange { range: None, text: "1".into() }])
            .unwrap();
        assert_eq!(store.get("file:///a.nix").unwrap().source(), "1");
        store.close("file:///a.nix");
        assert!(store.get("file:///a.nix").is_none());
    }

    #[test]
    fn queries_against_absent_documents_return_none() {
        let mut store = DocumentStore::new();
        assert!(store.get("file:///nope.nix").is_none());
        assert!(store.change("file:///nope.nix", vec![]).is_none());
    }
}
