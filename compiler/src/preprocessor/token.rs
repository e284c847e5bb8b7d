//! The preprocessor token: spec.md §3 "Token".

use crate::pos::SourcePos;
use std::collections::HashSet;

/// Fixed enumeration of token kinds, spanning both preprocessor punctuators
/// and post-preprocessing operator tokens (the parser consumes the same
/// `Token` type the preprocessor produces - spec.md §4.2 "The parser
/// consumes directiver-filtered tokens").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    StringLit,
    CharLit,
    /// `<...>` or `"..."` header-name, only produced while the tokenizer is
    /// in "header mode" for an `#include` argument (spec.md §4.1).
    HeaderName,
    Punct,
    /// Introduces a directive line: `#` as the first non-whitespace token
    /// of a line.
    Hash,
    Eof,
}

/// A token is value-like and freely copied (spec.md §3): `Token` derives
/// `Clone` and callers pass it by value through the expander's pushback
/// queues.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: SourcePos,
    pub text: String,
    pub first_of_line: bool,
    pub whitespace_before: bool,
    /// The "painted blue" hide set (spec.md §4.1, §9): macro names that
    /// must not be re-expanded starting from this specific token, scoped
    /// per-token rather than globally per-identifier (spec.md §5's
    /// "shared-state subtlety").
    pub hide_set: HideSet,
}

impl Token {
    pub fn new(kind: TokenKind, pos: SourcePos, text: impl Into<String>) -> Self {
        Token {
            kind,
            pos,
            text: text.into(),
            first_of_line: false,
            whitespace_before: false,
            hide_set: HideSet::new(),
        }
    }

    pub fn eof(pos: SourcePos) -> Self {
        Token::new(TokenKind::Eof, pos, "")
    }

    pub fn is(&self, kind: TokenKind, text: &str) -> bool {
        self.kind == kind && self.text == text
    }

    pub fn is_punct(&self, text: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == text
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

/// A per-token set of macro names currently "painted blue" for this token's
/// descendants. Cheap to clone (shares storage via `Rc` would be an
/// optimization; plain `HashSet` is clear and the sets involved are small).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HideSet(HashSet<String>);

impl HideSet {
    pub fn new() -> Self {
        HideSet(HashSet::new())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn union_with(&self, other: &HideSet) -> HideSet {
        let mut set = self.0.clone();
        set.extend(other.0.iter().cloned());
        HideSet(set)
    }

    pub fn with_added(&self, name: &str) -> HideSet {
        let mut set = self.0.clone();
        set.insert(name.to_string());
        HideSet(set)
    }
}
