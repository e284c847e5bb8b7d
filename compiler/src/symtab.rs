//! Symbol table: spec.md §4.2 "Symbol resolution".
//!
//! A stack of scopes, innermost last. Lookup walks from the innermost
//! scope outward, matching C's block-scoping rules; `struct`/`union`/`enum`
//! tags and `typedef` names share the ordinary-identifier scope stack but
//! are kept in a parallel map so `struct Foo` and a variable named `Foo`
//! never collide.

use crate::types::TypeId;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub enum Symbol {
    /// A local variable, its frame slot resolved later during codegen.
    Local { ty: TypeId },
    Global { ty: TypeId },
    Function { ty: TypeId, is_variadic: bool },
    EnumConstant { value: i64 },
    Typedef { ty: TypeId },
}

#[derive(Default)]
struct Scope {
    symbols: HashMap<String, Symbol>,
    tags: HashMap<String, TypeId>,
}

pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable { scopes: vec![Scope::default()] }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
        assert!(!self.scopes.is_empty(), "popped the file scope");
    }

    pub fn declare(&mut self, name: impl Into<String>, sym: Symbol) {
        self.scopes.last_mut().unwrap().symbols.insert(name.into(), sym);
    }

    pub fn declare_tag(&mut self, name: impl Into<String>, ty: TypeId) {
        self.scopes.last_mut().unwrap().tags.insert(name.into(), ty);
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|s| s.symbols.get(name))
    }

    pub fn lookup_tag(&self, name: &str) -> Option<TypeId> {
        self.scopes.iter().rev().find_map(|s| s.tags.get(name).copied())
    }

    /// True if `name` is a `typedef` visible from the current scope - the
    /// parser needs this to disambiguate `(T)` as a cast vs a parenthesized
    /// expression (spec.md §4.2 "typedef-name feedback into the lexer").
    pub fn is_typedef(&self, name: &str) -> bool {
        matches!(self.lookup(name), Some(Symbol::Typedef { .. }))
    }

    pub fn at_file_scope(&self) -> bool {
        self.scopes.len() == 1
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeTable;

    #[test]
    fn inner_scope_shadows_outer() {
        let types = TypeTable::new();
        let mut tab = SymbolTable::new();
        tab.declare("x", Symbol::Global { ty: types.int() });
        tab.push_scope();
        tab.declare("x", Symbol::Local { ty: types.int() });
        assert!(matches!(tab.lookup("x"), Some(Symbol::Local { .. })));
        tab.pop_scope();
        assert!(matches!(tab.lookup("x"), Some(Symbol::Global { .. })));
    }

    #[test]
    fn typedef_lookup() {
        let types = TypeTable::new();
        let mut tab = SymbolTable::new();
        tab.declare("myint", Symbol::Typedef { ty: types.int() });
        assert!(tab.is_typedef("myint"));
        assert!(!tab.is_typedef("notdefined"));
    }
}
