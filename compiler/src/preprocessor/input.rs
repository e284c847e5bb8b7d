//! Include/input handling: spec.md §4.1 "Include/input".
//!
//! `input_open` searches the directory of the including file (unless the
//! include is a `system` one, in which case only the system search path is
//! consulted), then the appropriate configured search path. A push-down
//! stack of `Input`s supports `#include` nesting; the tokenizer always
//! reads from the input on top of the stack.

use crate::config::CompilerConfig;
use crate::diag::{Diagnostic, Result};
use crate::pos::SourcePos;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// One pushed input file: its contents plus a cursor into them.
pub struct Input {
    pub path: Rc<PathBuf>,
    pub bytes: Vec<u8>,
    pub offset: usize,
    pub line: u32,
    pub col: u32,
}

impl Input {
    pub fn new(path: PathBuf, bytes: Vec<u8>) -> Self {
        Input { path: Rc::new(path), bytes, offset: 0, line: 1, col: 1 }
    }

    pub fn pos(&self) -> SourcePos {
        SourcePos::new(self.path.clone(), self.line, self.col)
    }

    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.offset).copied()
    }

    pub fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.offset + ahead).copied()
    }

    pub fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.offset += 1;
        if byte == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(byte)
    }

    pub fn at_eof(&self) -> bool {
        self.offset >= self.bytes.len()
    }
}

/// Open an include target, searching the paths spec.md §4.1 describes.
///
/// - `system`: consult only `config.system_include_paths`.
/// - otherwise: first the directory containing `parent` (if any), then
///   `config.user_include_paths`.
pub fn input_open(
    config: &CompilerConfig,
    parent: Option<&Path>,
    target: &str,
    system: bool,
    at: &SourcePos,
) -> Result<Input> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if !system {
        if let Some(parent) = parent {
            if let Some(dir) = parent.parent() {
                candidates.push(dir.join(target));
            }
        }
        for dir in &config.user_include_paths {
            candidates.push(dir.join(target));
        }
    } else {
        for dir in &config.system_include_paths {
            candidates.push(dir.join(target));
        }
    }

    // A bare absolute path is tried directly too, so tests can point
    // straight at a fixture file without populating a search path.
    let direct = PathBuf::from(target);
    if direct.is_absolute() {
        candidates.insert(0, direct);
    }

    for candidate in &candidates {
        if let Ok(bytes) = fs::read(candidate) {
            return Ok(Input::new(candidate.clone(), bytes));
        }
    }

    Err(Diagnostic::preprocessor(
        at.clone(),
        format!("'{target}' file not found (searched {} path(s))", candidates.len()),
    ))
}

/// A push-down stack of `Input`s. `#include` pushes; EOF on the current
/// input pops until the stack is empty (end of translation unit) or a
/// pending include resumes at its caller.
#[derive(Default)]
pub struct InputStack {
    stack: Vec<Input>,
}

impl InputStack {
    pub fn new() -> Self {
        InputStack { stack: Vec::new() }
    }

    pub fn push(&mut self, input: Input) {
        self.stack.push(input);
    }

    pub fn top(&mut self) -> Option<&mut Input> {
        self.stack.last_mut()
    }

    pub fn top_path(&self) -> Option<Rc<PathBuf>> {
        self.stack.last().map(|i| i.path.clone())
    }

    pub fn pop(&mut self) -> Option<Input> {
        self.stack.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}
