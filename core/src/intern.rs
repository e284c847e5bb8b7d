//! A generic structural interner.
//!
//! Used by `cc::types` to intern `Type` nodes: two types are `==` iff they
//! were interned to the same id, so callers can compare types with an
//! integer comparison instead of a recursive structural walk.

use std::collections::HashMap;
use std::hash::Hash;

/// An opaque handle into an [`Interner`]. Cheap to copy, compare, and hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InternId(u32);

impl InternId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Interns values of type `T`, handing back a stable [`InternId`] for each
/// distinct value. Re-interning an equal value returns the id already
/// assigned to it.
///
/// `T` is expected to be a small, cheaply-hashable structural key (for
/// `cc`, a flattened description of a [`crate`]-external `Type` node: kind
/// discriminant plus child ids). Recursive types (a struct containing a
/// pointer to itself) are representable because children are referenced by
/// `InternId`, not by value.
#[derive(Debug, Default)]
pub struct Interner<T: Eq + Hash + Clone> {
    keys: Vec<T>,
    index: HashMap<T, InternId>,
}

impl<T: Eq + Hash + Clone> Interner<T> {
    pub fn new() -> Self {
        Interner {
            keys: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Intern `key`, returning its (possibly freshly assigned) id.
    pub fn intern(&mut self, key: T) -> InternId {
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = InternId(self.keys.len() as u32);
        self.keys.push(key.clone());
        self.index.insert(key, id);
        id
    }

    pub fn get(&self, id: InternId) -> &T {
        &self.keys[id.index()]
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_same_value_returns_same_id() {
        let mut interner: Interner<String> = Interner::new();
        let a = interner.intern("int".to_string());
        let b = interner.intern("int".to_string());
        let c = interner.intern("float".to_string());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn get_round_trips() {
        let mut interner: Interner<i32> = Interner::new();
        let id = interner.intern(42);
        assert_eq!(*interner.get(id), 42);
    }
}
