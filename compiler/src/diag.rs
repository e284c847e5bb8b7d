//! Diagnostics: the error taxonomy of spec.md §7, generalized from the
//! teacher's `codegen::error::CodeGenError` pattern (a hand-rolled enum with
//! `Display`/`std::error::Error` and `From` impls) across every compiler
//! stage instead of just code generation.
//!
//! Policy (spec.md §7): errors surface immediately with a source position;
//! this compiler does not attempt to recover across statements. Every
//! fallible stage returns `Result<T, Diagnostic>` and the driver stops at
//! the first error.

use crate::pos::SourcePos;
use std::fmt;

/// One diagnostic, tagged by the taxonomy class it belongs to.
#[derive(Debug, Clone)]
pub enum Diagnostic {
    /// Unterminated string/char, illegal character, bad escape, malformed UCN.
    Lexical { pos: SourcePos, message: String },
    /// Unknown directive, malformed macro definition, division-by-zero in
    /// `#if`, include file not found, `#error` invocation.
    Preprocessor { pos: SourcePos, message: String },
    /// Token mismatch, unknown identifier, invalid type specifier combination.
    Parse { pos: SourcePos, message: String },
    /// Incompatible operand types, incompatible pointer conditional arms,
    /// pointer arithmetic on a non-pointer, assignment to a non-lvalue.
    Semantic { pos: SourcePos, message: String },
    /// Reached-unimplemented path or invariant violation. Not a source-level
    /// error: a bug in this compiler.
    Ice { pos: SourcePos, message: String },
}

impl Diagnostic {
    pub fn lexical(pos: SourcePos, message: impl Into<String>) -> Self {
        Diagnostic::Lexical { pos, message: message.into() }
    }

    pub fn preprocessor(pos: SourcePos, message: impl Into<String>) -> Self {
        Diagnostic::Preprocessor { pos, message: message.into() }
    }

    pub fn parse(pos: SourcePos, message: impl Into<String>) -> Self {
        Diagnostic::Parse { pos, message: message.into() }
    }

    pub fn semantic(pos: SourcePos, message: impl Into<String>) -> Self {
        Diagnostic::Semantic { pos, message: message.into() }
    }

    pub fn ice(pos: SourcePos, message: impl Into<String>) -> Self {
        Diagnostic::Ice { pos, message: message.into() }
    }

    pub fn pos(&self) -> &SourcePos {
        match self {
            Diagnostic::Lexical { pos, .. }
            | Diagnostic::Preprocessor { pos, .. }
            | Diagnostic::Parse { pos, .. }
            | Diagnostic::Semantic { pos, .. }
            | Diagnostic::Ice { pos, .. } => pos,
        }
    }

    fn class(&self) -> &'static str {
        match self {
            Diagnostic::Lexical { .. } => "lexical error",
            Diagnostic::Preprocessor { .. } => "preprocessor error",
            Diagnostic::Parse { .. } => "parse error",
            Diagnostic::Semantic { .. } => "semantic error",
            Diagnostic::Ice { .. } => "internal compiler error",
        }
    }

    fn message(&self) -> &str {
        match self {
            Diagnostic::Lexical { message, .. }
            | Diagnostic::Preprocessor { message, .. }
            | Diagnostic::Parse { message, .. }
            | Diagnostic::Semantic { message, .. }
            | Diagnostic::Ice { message, .. } => message,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.pos(), self.class(), self.message())
    }
}

impl std::error::Error for Diagnostic {}

impl From<std::fmt::Error> for Diagnostic {
    fn from(e: std::fmt::Error) -> Self {
        Diagnostic::Ice {
            pos: SourcePos::synthetic(),
            message: format!("formatting error: {e}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Diagnostic>;
