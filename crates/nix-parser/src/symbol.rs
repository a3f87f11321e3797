//! Interned symbols.
//!
//! Attribute and variable names are interned once per process; equality is
//! identity comparison of the interned ids. The table uses interior
//! mutability because the whole engine runs on one thread.

use std::cell::RefCell;

use rustc_hash::FxHashMap;

/// An interned name. Copyable; ordering follows interning order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    /// Raw id, usable as a dense index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Process-scoped symbol interner.
#[derive(Default)]
pub struct SymbolTable {
    inner: RefCell<SymbolTableInner>,
}

#[derive(Default)]
struct SymbolTableInner {
    by_name: FxHashMap<String, Symbol>,
    names: Vec<String>,
}

impl SymbolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Intern a name, returning the existing symbol if already known.
    pub fn intern(&self, name: &str) -> Symbol {
        let mut inner = self.inner.borrow_mut();
        if let Some(&sym) = inner.by_name.get(name) {
            return sym;
        }
        let sym = Symbol(inner.names.len() as u32);
        inner.names.push(name.to_string());
        inner.by_name.insert(name.to_string(), sym);
        sym
    }

    /// Resolve a symbol back to its name.
    pub fn name(&self, sym: Symbol) -> String {
        self.inner.borrow().names[sym.index()].clone()
    }

    /// Number of interned symbols.
    pub fn len(&self) -> usize {
        self.inner.borrow().names.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn interning_is_idempotent() {
        let table = SymbolTable::new();
        let a = table.intern("foo");
        let b = table.intern("foo");
        let c = table.intern("bar");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.name(a), "foo");
        assert_eq!(table.name(c), "bar");
    }
}
