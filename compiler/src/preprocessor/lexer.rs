//! The tokenizer: spec.md §4.1 "Tokenizer".
//!
//! Byte stream to preprocessor tokens. Recognizes identifiers (allowing
//! `\uXXXX`/`\UXXXXXXXX` universal character names and raw UTF-8),
//! pp-numbers, string/character literals with `L`/`u`/`U`/`u8` prefixes,
//! and punctuators by longest match over a fixed table (three-, then two-,
//! then one-character forms). Maintains `first_of_line` and
//! `whitespace_before`. Trigraphs/digraphs are not required (spec.md).

use super::input::{Input, InputStack};
use super::token::{Token, TokenKind};
use crate::diag::{Diagnostic, Result};
use crate::pos::SourcePos;

/// Three-, two-, then one-character punctuators, in the longest-match order
/// spec.md requires.
const PUNCT3: &[&str] = &["...", "<<=", ">>="];
const PUNCT2: &[&str] = &[
    "->", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "+=", "-=", "*=", "/=",
    "%=", "&=", "^=", "|=", "##",
];
const PUNCT1: &str = "[](){}.&*+-~!/%<>^|?:;=,#";

pub struct Lexer<'a> {
    inputs: &'a mut InputStack,
    /// When set, `<...>` is recognized as a single `HeaderName` token
    /// (spec.md §4.1 directive handling of `#include`'s argument).
    pub header_mode: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(inputs: &'a mut InputStack) -> Self {
        Lexer { inputs, header_mode: false }
    }

    /// Produce the next raw token, popping exhausted inputs off the stack
    /// (an `#include` nesting pop, per spec.md §4.1) until one yields a
    /// token or the whole stack is empty (`Eof`).
    pub fn next_token(&mut self) -> Result<Token> {
        let mut first_of_line = false;
        let mut whitespace_before = false;

        loop {
            let Some(input) = self.inputs.top() else {
                return Ok(Token::eof(SourcePos::synthetic()));
            };

            if input.at_eof() {
                self.inputs.pop();
                first_of_line = true; // resuming the includer starts a fresh line context
                continue;
            }

            if input.col == 1 {
                first_of_line = true;
            }

            match skip_whitespace_and_comments(input)? {
                Skipped::None => {}
                Skipped::Space => {
                    whitespace_before = true;
                    continue;
                }
                Skipped::Newline => {
                    first_of_line = true;
                    whitespace_before = true;
                    continue;
                }
            }

            if input.at_eof() {
                continue;
            }

            let pos = input.pos();
            let c = input.peek().unwrap();

            if self.header_mode && (c == b'<' || c == b'"') {
                let text = lex_header_name(input)?;
                return Ok(finish(TokenKind::HeaderName, pos, text, first_of_line, whitespace_before));
            }

            if c == b'#' {
                input.bump();
                return Ok(finish(TokenKind::Hash, pos, "#", first_of_line, whitespace_before));
            }

            if is_ident_start(c) || c == b'\\' {
                let text = lex_ident(input)?;
                return Ok(finish(TokenKind::Ident, pos, text, first_of_line, whitespace_before));
            }

            if c.is_ascii_digit() || (c == b'.' && input.peek_at(1).is_some_and(|n| n.is_ascii_digit())) {
                let text = lex_pp_number(input);
                return Ok(finish(TokenKind::Number, pos, text, first_of_line, whitespace_before));
            }

            if c == b'"' || (is_string_prefix(input) && input_string_quote(input) == Some(b'"')) {
                let text = lex_quoted(input, b'"')?;
                return Ok(finish(TokenKind::StringLit, pos, text, first_of_line, whitespace_before));
            }

            if c == b'\'' || (is_string_prefix(input) && input_string_quote(input) == Some(b'\'')) {
                let text = lex_quoted(input, b'\'')?;
                return Ok(finish(TokenKind::CharLit, pos, text, first_of_line, whitespace_before));
            }

            if let Some(text) = lex_punct(input) {
                return Ok(finish(TokenKind::Punct, pos, text, first_of_line, whitespace_before));
            }

            return Err(Diagnostic::lexical(pos, format!("illegal character '{}'", c as char)));
        }
    }
}

enum Skipped {
    None,
    Space,
    Newline,
}

fn skip_whitespace_and_comments(input: &mut Input) -> Result<Skipped> {
    match input.peek() {
        Some(b' ') | Some(b'\t') | Some(b'\r') => {
            input.bump();
            Ok(Skipped::Space)
        }
        Some(b'\n') => {
            input.bump();
            Ok(Skipped::Newline)
        }
        Some(b'/') if input.peek_at(1) == Some(b'/') => {
            while input.peek().is_some() && input.peek() != Some(b'\n') {
                input.bump();
            }
            Ok(Skipped::Space)
        }
        Some(b'/') if input.peek_at(1) == Some(b'*') => {
            let start = input.pos();
            input.bump();
            input.bump();
            loop {
                match input.peek() {
                    None => return Err(Diagnostic::lexical(start, "unterminated block comment")),
                    Some(b'*') if input.peek_at(1) == Some(b'/') => {
                        input.bump();
                        input.bump();
                        break;
                    }
                    _ => {
                        input.bump();
                    }
                }
            }
            Ok(Skipped::Space)
        }
        // A backslash-newline line splice is whitespace, not a token.
        Some(b'\\') if input.peek_at(1) == Some(b'\n') => {
            input.bump();
            input.bump();
            Ok(Skipped::Space)
        }
        _ => Ok(Skipped::None),
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c >= 0x80
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c >= 0x80
}

/// Identifiers allow `\uXXXX`/`\UXXXXXXXX` universal character names
/// in addition to raw UTF-8 bytes (spec.md §4.1, §8 scenario 6).
fn lex_ident(input: &mut Input) -> Result<String> {
    let mut out = String::new();
    loop {
        match input.peek() {
            Some(b'\\') if matches!(input.peek_at(1), Some(b'u') | Some(b'U')) => {
                let pos = input.pos();
                input.bump(); // backslash
                let is_long = input.peek() == Some(b'U');
                input.bump(); // u or U
                let digits = if is_long { 8 } else { 4 };
                let mut value: u32 = 0;
                for _ in 0..digits {
                    let d = input.peek().ok_or_else(|| Diagnostic::lexical(pos.clone(), "truncated universal character name"))?;
                    let digit = (d as char).to_digit(16).ok_or_else(|| Diagnostic::lexical(pos.clone(), "malformed universal character name"))?;
                    value = value * 16 + digit;
                    input.bump();
                }
                let ch = char::from_u32(value)
                    .ok_or_else(|| Diagnostic::lexical(pos.clone(), "universal character name is not a valid code point"))?;
                out.push(ch);
            }
            Some(c) if is_ident_continue(c) => {
                if c < 0x80 {
                    out.push(c as char);
                    input.bump();
                } else {
                    // Raw UTF-8 multi-byte sequence: copy the full
                    // sequence through as-is.
                    let start = input.offset;
                    let len = utf8_len(c);
                    for _ in 0..len {
                        input.bump();
                    }
                    if let Ok(s) = std::str::from_utf8(&input.bytes[start..input.offset]) {
                        out.push_str(s);
                    }
                }
            }
            _ => break,
        }
    }
    Ok(out)
}

fn utf8_len(lead: u8) -> usize {
    if lead & 0xE0 == 0xC0 {
        2
    } else if lead & 0xF0 == 0xE0 {
        3
    } else if lead & 0xF8 == 0xF0 {
        4
    } else {
        1
    }
}

/// pp-number: digit, or `.` digit, followed by any run of identifier
/// characters, `.`, or a sign immediately after `e`/`E`/`p`/`P` (exponent).
fn lex_pp_number(input: &mut Input) -> String {
    let mut out = String::new();
    loop {
        match input.peek() {
            Some(c) if c.is_ascii_digit() || is_ident_continue(c) || c == b'.' => {
                out.push(c as char);
                input.bump();
                if matches!(c, b'e' | b'E' | b'p' | b'P') {
                    if let Some(sign @ (b'+' | b'-')) = input.peek() {
                        out.push(sign as char);
                        input.bump();
                    }
                }
            }
            _ => break,
        }
    }
    out
}

fn is_string_prefix(input: &Input) -> bool {
    let rest = &input.bytes[input.offset..];
    rest.starts_with(b"u8") || rest.starts_with(b"u") || rest.starts_with(b"U") || rest.starts_with(b"L")
}

fn input_string_quote(input: &Input) -> Option<u8> {
    let rest = &input.bytes[input.offset..];
    let skip = if rest.starts_with(b"u8") {
        2
    } else if rest.starts_with(b"u") || rest.starts_with(b"U") || rest.starts_with(b"L") {
        1
    } else {
        0
    };
    rest.get(skip).copied().filter(|&b| b == b'"' || b == b'\'')
}

fn lex_quoted(input: &mut Input, quote: u8) -> Result<String> {
    let start = input.pos();
    let mut out = String::new();
    // prefix, if any
    while input.peek().is_some() && input.peek() != Some(quote) {
        if matches!(input.peek(), Some(b'u') | Some(b'U') | Some(b'L')) && out.is_empty() {
            out.push(input.peek().unwrap() as char);
            input.bump();
            if input.peek() == Some(b'8') {
                out.push('8');
                input.bump();
            }
            continue;
        }
        break;
    }
    out.push(quote as char);
    input.bump();
    loop {
        match input.peek() {
            None | Some(b'\n') => {
                return Err(Diagnostic::lexical(start, "unterminated string or character literal"));
            }
            Some(b'\\') => {
                out.push('\\');
                input.bump();
                match input.peek() {
                    Some(c) => {
                        out.push(c as char);
                        input.bump();
                    }
                    None => return Err(Diagnostic::lexical(start, "bad escape at end of file")),
                }
            }
            Some(c) if c == quote => {
                out.push(quote as char);
                input.bump();
                break;
            }
            Some(c) => {
                out.push(c as char);
                input.bump();
            }
        }
    }
    Ok(out)
}

/// `<...>` or `"..."` header-name token, valid only in header mode.
fn lex_header_name(input: &mut Input) -> Result<String> {
    let start = input.pos();
    let (open, close) = if input.peek() == Some(b'<') { (b'<', b'>') } else { (b'"', b'"') };
    let mut out = String::new();
    out.push(open as char);
    input.bump();
    loop {
        match input.peek() {
            None | Some(b'\n') => return Err(Diagnostic::lexical(start, "unterminated header name")),
            Some(c) if c == close => {
                out.push(close as char);
                input.bump();
                break;
            }
            Some(c) => {
                out.push(c as char);
                input.bump();
            }
        }
    }
    Ok(out)
}

fn lex_punct(input: &mut Input) -> Option<String> {
    for &p in PUNCT3 {
        if matches_ahead(input, p) {
            for _ in 0..p.len() {
                input.bump();
            }
            return Some(p.to_string());
        }
    }
    for &p in PUNCT2 {
        if matches_ahead(input, p) {
            for _ in 0..p.len() {
                input.bump();
            }
            return Some(p.to_string());
        }
    }
    let c = input.peek()?;
    if PUNCT1.as_bytes().contains(&c) {
        input.bump();
        Some((c as char).to_string())
    } else {
        None
    }
}

fn matches_ahead(input: &Input, s: &str) -> bool {
    let bytes = s.as_bytes();
    (0..bytes.len()).all(|i| input.peek_at(i) == Some(bytes[i]))
}

fn finish(kind: TokenKind, pos: SourcePos, text: impl Into<String>, first_of_line: bool, whitespace_before: bool) -> Token {
    let mut token = Token::new(kind, pos, text);
    token.first_of_line = first_of_line;
    token.whitespace_before = whitespace_before;
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessor::input::Input;

    fn tokenize(src: &str) -> Vec<Token> {
        let mut inputs = InputStack::new();
        inputs.push(Input::new("<test>".into(), src.as_bytes().to_vec()));
        let mut lexer = Lexer::new(&mut inputs);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token().unwrap();
            if tok.is_eof() {
                break;
            }
            out.push(tok);
        }
        out
    }

    #[test]
    fn tokenizes_simple_expression() {
        let toks = tokenize("1+2*3");
        let texts: Vec<&str> = toks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["1", "+", "2", "*", "3"]);
    }

    #[test]
    fn longest_match_punctuators() {
        let toks = tokenize("a<<=b");
        assert_eq!(toks[1].text, "<<=");
    }

    #[test]
    fn universal_character_name_in_identifier() {
        let toks = tokenize("func\\u1234h");
        assert_eq!(toks[0].kind, TokenKind::Ident);
        assert_eq!(toks[0].text, "func\u{1234}h");
    }

    #[test]
    fn first_of_line_tracks_directive_lines() {
        let toks = tokenize("a\n#define X 1");
        let hash = toks.iter().find(|t| t.kind == TokenKind::Hash).unwrap();
        assert!(hash.first_of_line);
    }
}
