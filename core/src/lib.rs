//! cc-core: arena allocation and interning primitives
//!
//! Shared by the `cc` compiler's type table, AST, and IR. [`Interner`] holds
//! every interned value in a single growable `Vec`, keyed by a `HashMap` for
//! dedup lookup; nothing in it is freed individually, and the whole table is
//! dropped en masse when the compiler process exits (see spec.md §5,
//! "Concurrency & resource model").
//!
//! # Modules
//!
//! - `intern`: a generic interning table keyed by structural equality, so
//!   that equality on an interned id is pointer-cheap (`Type` equality in
//!   particular: two `Type`s are equal iff they share an id).

pub mod intern;

pub use intern::{InternId, Interner};
