//! The parser: spec.md §4.2.
//!
//! A hand-written recursive-descent parser over the preprocessor's token
//! stream, mirroring the teacher's `parser.rs` shape (a `Parser` struct
//! holding one token of lookahead plus the tables it threads through
//! everything it builds) but driving C's grammar instead. Expressions are
//! parsed with the [`crate::precedence`] table shared with `#if` (spec.md
//! §9); declarations resolve type syntax into `TypeId`s as they go, so by
//! the time a function body reaches `ir::lower` every name already maps to
//! a `TypeId` or a `Symbol`.

pub mod decl;
pub mod expr;
pub mod stmt;

use crate::ast::TranslationUnit;
use crate::diag::{Diagnostic, Result};
use crate::preprocessor::token::{Token, TokenKind};
use crate::preprocessor::Preprocessor;
use crate::symtab::SymbolTable;
use crate::types::TypeTable;

pub struct Parser<'a> {
    pp: Preprocessor<'a>,
    current: Token,
    /// One extra token of lookahead beyond `current`, filled lazily by
    /// [`Self::peek2`]. Needed only to disambiguate a label
    /// (`identifier ':'`) from an expression statement starting with the
    /// same identifier (spec.md §4.2's grammar is otherwise LL(1)).
    lookahead: Option<Token>,
    pub types: TypeTable,
    pub symtab: SymbolTable,
}

impl<'a> Parser<'a> {
    pub fn new(mut pp: Preprocessor<'a>) -> Result<Self> {
        let current = pp.next_token()?;
        Ok(Parser { pp, current, lookahead: None, types: TypeTable::new(), symtab: SymbolTable::new() })
    }

    pub(crate) fn peek(&self) -> &Token {
        &self.current
    }

    /// The token after `current`, fetched from the preprocessor on first
    /// use and cached so a later `bump` can hand it back out as `current`
    /// without re-reading the stream.
    pub(crate) fn peek2(&mut self) -> Result<&Token> {
        if self.lookahead.is_none() {
            self.lookahead = Some(self.pp.next_token()?);
        }
        Ok(self.lookahead.as_ref().unwrap())
    }

    pub(crate) fn bump(&mut self) -> Result<Token> {
        let next = match self.lookahead.take() {
            Some(tok) => tok,
            None => self.pp.next_token()?,
        };
        Ok(std::mem::replace(&mut self.current, next))
    }

    pub(crate) fn at_eof(&self) -> bool {
        self.current.is_eof()
    }

    pub(crate) fn at_punct(&self, text: &str) -> bool {
        self.current.is_punct(text)
    }

    pub(crate) fn at_ident(&self, text: &str) -> bool {
        self.current.kind == TokenKind::Ident && self.current.text == text
    }

    pub(crate) fn expect_punct(&mut self, text: &str) -> Result<Token> {
        if self.current.is_punct(text) {
            self.bump()
        } else {
            Err(Diagnostic::parse(self.current.pos.clone(), format!("expected '{text}', found '{}'", self.current.text)))
        }
    }

    pub(crate) fn expect_ident(&mut self) -> Result<Token> {
        if self.current.kind == TokenKind::Ident {
            self.bump()
        } else {
            Err(Diagnostic::parse(self.current.pos.clone(), format!("expected an identifier, found '{}'", self.current.text)))
        }
    }

    pub fn parse_translation_unit(&mut self) -> Result<TranslationUnit> {
        let mut unit = TranslationUnit::default();
        while !self.at_eof() {
            decl::parse_external_decl(self, &mut unit)?;
        }
        Ok(unit)
    }
}
