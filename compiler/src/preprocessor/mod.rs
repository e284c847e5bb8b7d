//! The preprocessor: spec.md §4.1.
//!
//! Pull-based, like the teacher's parser consumes tokens one at a time:
//! [`Preprocessor::next_token`] returns the next fully macro-expanded,
//! directive-filtered token, reading from the underlying file stack and
//! mutating the macro table / conditional-inclusion stack as directives are
//! encountered. The parser never sees raw source text or `#`-lines.

pub mod condexpr;
pub mod directives;
pub mod expand;
pub mod input;
pub mod lexer;
pub mod macros;
pub mod token;

use crate::config::CompilerConfig;
use crate::diag::{Diagnostic, Result};
use crate::pos::SourcePos;
use input::{input_open, InputStack};
use lexer::Lexer;
use macros::MacroTable;
use std::collections::VecDeque;
use token::{Token, TokenKind};

/// One frame of the conditional-inclusion stack (spec.md §4.1 `if`/`elif`/
/// `else`/`endif`).
pub(crate) struct CondFrame {
    /// Whether tokens under this frame (and all its descendants) should be
    /// emitted - the product of this frame's own condition and its
    /// parent's `active`.
    pub active: bool,
    /// Whether *this* frame's condition was true (used by `#elif` to
    /// compute its own active-ness independent of the parent).
    pub taking: bool,
    /// Whether any branch in this `if`/`elif*`/`else` chain has been taken
    /// yet - an `#elif` or `#else` after a taken branch is always inactive.
    pub taken_ever: bool,
    pub active_parent: bool,
    pub has_else: bool,
}

pub struct Preprocessor<'a> {
    config: &'a CompilerConfig,
    inputs: InputStack,
    pub(crate) macros: MacroTable,
    pub(crate) cond_stack: Vec<CondFrame>,
    queue: VecDeque<Token>,
}

impl<'a> Preprocessor<'a> {
    pub fn new(config: &'a CompilerConfig) -> Result<Self> {
        let at = SourcePos::synthetic();
        let input = input_open(config, None, &config.input.to_string_lossy(), false, &at)
            .or_else(|_| {
                std::fs::read(&config.input)
                    .map(|bytes| input::Input::new(config.input.clone(), bytes))
                    .map_err(|e| Diagnostic::preprocessor(at.clone(), format!("cannot open '{}': {e}", config.input.display())))
            })?;
        let mut inputs = InputStack::new();
        inputs.push(input);

        let mut macros = MacroTable::new();
        for predef in &config.defines {
            let body_text = predef.value.clone().unwrap_or_else(|| "1".to_string());
            let body = tokenize_snippet(&body_text);
            macros
                .define(macros::MacroDef::object_like(predef.name.clone(), body))
                .map_err(|e| Diagnostic::preprocessor(at.clone(), e))?;
        }
        for name in &config.undefines {
            macros.undef(name);
        }

        Ok(Preprocessor { config, inputs, macros, cond_stack: Vec::new(), queue: VecDeque::new() })
    }

    fn active(&self) -> bool {
        self.cond_stack.last().map(|f| f.active).unwrap_or(true)
    }

    /// Next unexpanded token: pops the pushback queue first, otherwise reads
    /// straight from the lexer with no directive interception. Used while
    /// scanning a directive line and while collecting macro-call arguments
    /// (both contexts where the raw token sequence, not its macro
    /// expansion, matters).
    pub(crate) fn raw_token(&mut self) -> Result<Token> {
        if let Some(tok) = self.queue.pop_front() {
            return Ok(tok);
        }
        Lexer::new(&mut self.inputs).next_token()
    }

    pub(crate) fn push_front(&mut self, tok: Token) {
        self.queue.push_front(tok);
    }

    /// Like [`Self::raw_token`], but lexes in header-name mode so a
    /// `<...>`/`"..."` argument to `#include` comes back as one
    /// `HeaderName` token instead of being tokenized as punctuators and a
    /// string literal.
    pub(crate) fn raw_header_token(&mut self) -> Result<Token> {
        if let Some(tok) = self.queue.pop_front() {
            return Ok(tok);
        }
        let mut lexer = Lexer::new(&mut self.inputs);
        lexer.header_mode = true;
        lexer.next_token()
    }

    pub(crate) fn current_path(&self) -> Option<std::path::PathBuf> {
        self.inputs.top_path().map(|p| (*p).clone())
    }

    pub(crate) fn open_include(&mut self, target: &str, system: bool, at: &SourcePos) -> Result<()> {
        let parent = self.current_path();
        let input = input_open(self.config, parent.as_deref(), target, system, at)?;
        self.inputs.push(input);
        Ok(())
    }

    /// Fill `self.queue` with exactly one active, directive-filtered raw
    /// token, or leave it empty if the translation unit is exhausted.
    fn pump(&mut self) -> Result<()> {
        loop {
            let tok = { Lexer::new(&mut self.inputs).next_token()? };
            if tok.is_eof() {
                return Ok(());
            }
            if tok.kind == TokenKind::Hash && tok.first_of_line {
                directives::process_directive(self, tok.pos.clone())?;
                continue;
            }
            if !self.active() {
                continue;
            }
            self.queue.push_back(tok);
            return Ok(());
        }
    }

    /// The next fully macro-expanded token (spec.md §4.1 "Expander").
    pub fn next_token(&mut self) -> Result<Token> {
        loop {
            if self.queue.is_empty() {
                self.pump()?;
                if self.queue.is_empty() {
                    return Ok(Token::eof(SourcePos::synthetic()));
                }
            }
            let tok = self.queue.pop_front().unwrap();
            if tok.kind != TokenKind::Ident || tok.hide_set.contains(&tok.text) {
                return Ok(tok);
            }
            let Some(def) = self.macros.get(&tok.text).cloned() else {
                return Ok(tok);
            };

            if def.is_function_like {
                let next = self.raw_token()?;
                let is_call = next.kind == TokenKind::Punct && next.text == "(";
                if !is_call {
                    self.push_front(next);
                    return Ok(tok);
                }
                let args = self.collect_macro_args(&def)?;
                let hide_set = tok.hide_set.with_added(&tok.text);
                let expansion = expand::substitute(&def, &args, &hide_set, |arg| self.expand_token_slice(arg))?;
                for t in expansion.into_iter().rev() {
                    self.push_front(t);
                }
            } else {
                let hide_set = tok.hide_set.with_added(&tok.text);
                let expansion = expand::substitute(&def, &[], &hide_set, |arg| self.expand_token_slice(arg))?;
                for t in expansion.into_iter().rev() {
                    self.push_front(t);
                }
            }
        }
    }

    /// Fully macro-expand a standalone slice of tokens (a macro argument)
    /// in isolation, independent of the surrounding stream state.
    fn expand_token_slice(&self, tokens: &[Token]) -> Result<Vec<Token>> {
        // Argument expansion only ever needs the macro table (arguments
        // cannot contain directives or further input-stack operations), so
        // a throwaway sub-preprocessor fed purely from the token slice
        // suffices and keeps this independent of the live input stack.
        let mut sub = TokenSliceExpander { macros: &self.macros, queue: tokens.iter().cloned().collect() };
        sub.expand_all()
    }

    /// Parse the comma-separated, parenthesis-nested argument lists for a
    /// function-like macro call whose opening `(` has already been
    /// consumed (spec.md §4.1 "parse comma-separated argument token-lists
    /// respecting nested parentheses").
    fn collect_macro_args(&mut self, def: &macros::MacroDef) -> Result<Vec<Vec<Token>>> {
        let expected = def.params.len() + if def.is_variadic { 1 } else { 0 };
        let mut args: Vec<Vec<Token>> = vec![Vec::new()];
        let mut depth = 0i32;

        // A macro with zero parameters still accepts `()`  with nothing
        // between - don't record a spurious empty argument for it.
        if expected == 0 {
            let tok = self.raw_token()?;
            if !(tok.kind == TokenKind::Punct && tok.text == ")") {
                return Err(Diagnostic::preprocessor(tok.pos, format!("'{}' expects no arguments", def.name)));
            }
            return Ok(Vec::new());
        }

        loop {
            let tok = self.raw_token()?;
            if tok.is_eof() {
                return Err(Diagnostic::preprocessor(tok.pos, format!("unterminated call to macro '{}'", def.name)));
            }
            match () {
                _ if tok.is_punct("(") => {
                    depth += 1;
                    args.last_mut().unwrap().push(tok);
                }
                _ if tok.is_punct(")") && depth == 0 => break,
                _ if tok.is_punct(")") => {
                    depth -= 1;
                    args.last_mut().unwrap().push(tok);
                }
                _ if tok.is_punct(",") && depth == 0 && args.len() < expected => {
                    args.push(Vec::new());
                }
                _ => {
                    args.last_mut().unwrap().push(tok);
                }
            }
        }

        // For a variadic macro, any commas beyond the named parameters
        // were already folded into the last (vararg) slot above once
        // `args.len() == expected`; reinsert the separating commas that
        // were swallowed by the `args.len() < expected` guard.
        Ok(args)
    }

    pub fn is_at_line_start(tok: &Token) -> bool {
        tok.first_of_line
    }
}

/// A minimal, self-contained macro expander over a fixed token slice, used
/// to expand a macro argument before it is spliced into a surrounding
/// macro body (spec.md: "Each expansion marks the expanded identifier as
/// in-use for the duration of that token's descendant expansions").
struct TokenSliceExpander<'a> {
    macros: &'a MacroTable,
    queue: VecDeque<Token>,
}

impl TokenSliceExpander<'_> {
    fn expand_all(&mut self) -> Result<Vec<Token>> {
        let mut out = Vec::new();
        while let Some(tok) = self.queue.pop_front() {
            if tok.kind != TokenKind::Ident || tok.hide_set.contains(&tok.text) {
                out.push(tok);
                continue;
            }
            let Some(def) = self.macros.get(&tok.text).cloned() else {
                out.push(tok);
                continue;
            };
            if def.is_function_like {
                let next = self.queue.pop_front();
                match next {
                    Some(n) if n.is_punct("(") => {
                        let args = self.collect_args_from_queue(&def)?;
                        let hide_set = tok.hide_set.with_added(&tok.text);
                        let expansion = expand::substitute(&def, &args, &hide_set, |a| {
                            let mut nested = TokenSliceExpander { macros: self.macros, queue: a.iter().cloned().collect() };
                            nested.expand_all()
                        })?;
                        for t in expansion.into_iter().rev() {
                            self.queue.push_front(t);
                        }
                    }
                    Some(n) => {
                        self.queue.push_front(n);
                        out.push(tok);
                    }
                    None => out.push(tok),
                }
            } else {
                let hide_set = tok.hide_set.with_added(&tok.text);
                let expansion = expand::substitute(&def, &[], &hide_set, |a| {
                    let mut nested = TokenSliceExpander { macros: self.macros, queue: a.iter().cloned().collect() };
                    nested.expand_all()
                })?;
                for t in expansion.into_iter().rev() {
                    self.queue.push_front(t);
                }
            }
        }
        Ok(out)
    }

    fn collect_args_from_queue(&mut self, def: &macros::MacroDef) -> Result<Vec<Vec<Token>>> {
        let expected = def.params.len() + if def.is_variadic { 1 } else { 0 };
        let mut args: Vec<Vec<Token>> = vec![Vec::new()];
        let mut depth = 0i32;
        if expected == 0 {
            self.queue.pop_front(); // the closing ')'
            return Ok(Vec::new());
        }
        loop {
            let Some(tok) = self.queue.pop_front() else {
                return Err(Diagnostic::preprocessor(SourcePos::synthetic(), format!("unterminated call to macro '{}'", def.name)));
            };
            if tok.is_punct("(") {
                depth += 1;
                args.last_mut().unwrap().push(tok);
            } else if tok.is_punct(")") && depth == 0 {
                break;
            } else if tok.is_punct(")") {
                depth -= 1;
                args.last_mut().unwrap().push(tok);
            } else if tok.is_punct(",") && depth == 0 && args.len() < expected {
                args.push(Vec::new());
            } else {
                args.last_mut().unwrap().push(tok);
            }
        }
        Ok(args)
    }
}

/// Tokenize a short in-memory snippet (used for `-D NAME=VAL` bodies, which
/// never span files or need include handling).
fn tokenize_snippet(text: &str) -> Vec<Token> {
    let mut inputs = InputStack::new();
    inputs.push(input::Input::new("<command-line>".into(), text.as_bytes().to_vec()));
    let mut lexer = Lexer::new(&mut inputs);
    let mut out = Vec::new();
    while let Ok(tok) = lexer.next_token() {
        if tok.is_eof() {
            break;
        }
        out.push(tok);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use std::io::Write;

    fn preprocess_source(src: &str) -> Vec<Token> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(src.as_bytes()).unwrap();
        let config = CompilerConfig::new(file.path().to_path_buf());
        let mut pp = Preprocessor::new(&config).unwrap();
        let mut out = Vec::new();
        loop {
            let tok = pp.next_token().unwrap();
            if tok.is_eof() {
                break;
            }
            out.push(tok);
        }
        out
    }

    #[test]
    fn object_like_macro_expands() {
        let toks = preprocess_source("#define N 42\nint x = N;");
        let texts: Vec<_> = toks.iter().map(|t| t.text.as_str()).collect();
        assert!(texts.contains(&"42"));
        assert!(!texts.contains(&"N"));
    }

    #[test]
    fn function_like_macro_with_parenthesized_argument() {
        // spec.md §8 scenario 2
        let toks = preprocess_source("#define SQ(x) ((x)*(x))\nint main(){return SQ(3+1);}");
        let texts: Vec<_> = toks.iter().map(|t| t.text.as_str()).collect();
        let joined = texts.join(" ");
        assert!(joined.contains("( ( 3 + 1 ) * ( 3 + 1 ) )"));
    }

    #[test]
    fn conditional_inclusion_skips_false_branch() {
        let toks = preprocess_source("#if 0\nint dead;\n#else\nint alive;\n#endif\n");
        let texts: Vec<_> = toks.iter().map(|t| t.text.as_str()).collect();
        assert!(texts.contains(&"alive"));
        assert!(!texts.contains(&"dead"));
    }

    #[test]
    fn macro_idempotence_on_reprocessed_output() {
        // spec.md §8 "Macro idempotence"
        let first = preprocess_source("#define N 42\nint x = N;");
        let rendered: String = first
            .iter()
            .map(|t| if t.whitespace_before { format!(" {}", t.text) } else { t.text.clone() })
            .collect();
        let second = preprocess_source(&rendered);
        let texts_a: Vec<_> = first.iter().map(|t| t.text.as_str()).collect();
        let texts_b: Vec<_> = second.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts_a, texts_b);
    }
}
