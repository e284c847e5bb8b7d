//! Source positions.
//!
//! Generalizes the teacher's `ast::SourceLocation` (a single-file, line-only
//! position) to the path/line/column triple spec.md §3 requires of every
//! [`crate::preprocessor::token::Token`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A position in a source file: path, 1-indexed line, 1-indexed column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourcePos {
    pub path: Rc<PathBuf>,
    pub line: u32,
    pub col: u32,
}

impl SourcePos {
    pub fn new(path: Rc<PathBuf>, line: u32, col: u32) -> Self {
        SourcePos { path, line, col }
    }

    /// A placeholder position for synthesized tokens (e.g. macro-expansion
    /// artifacts, builtin declarations) that don't trace back to real text.
    pub fn synthetic() -> Self {
        SourcePos {
            path: Rc::new(PathBuf::from("<synthetic>")),
            line: 0,
            col: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path.display(), self.line, self.col)
    }
}
