//! `#if`/`#elif` constant-expression evaluation: spec.md §4.1.
//!
//! Shares [`crate::precedence`] with the main expression parser (spec.md
//! §9 "Pratt precedence table"), the way
//! `examples/original_source/src/preprocessor/directives.c` shares
//! `precedence.h` between its directive handling and its expression
//! parser. `defined NAME` / `defined(NAME)` is special-cased against the
//! *unexpanded* token stream before the rest of the line is macro-expanded
//! (C11 §6.10.1p1); any identifier still standing after expansion
//! evaluates to `0`. `&&`, `||` and `?:` short-circuit, so a guard like
//! `#if defined(N) && 10 / N > 1` never divides by a zero `N`.

use super::directives::collect_rest_of_line;
use super::token::{Token, TokenKind};
use super::Preprocessor;
use crate::diag::{Diagnostic, Result};
use crate::pos::SourcePos;
use crate::precedence::{infix_binding_power, is_unary_prefix, PREFIX_PREC};

/// A small parsed form of the condition, kept unevaluated until
/// [`eval`] walks it so `&&`/`||`/`?:` can skip the branch they don't need.
enum Node {
    Lit(i64),
    Unary(String, Box<Node>),
    Binary(String, Box<Node>, Box<Node>),
    Ternary(Box<Node>, Box<Node>, Box<Node>),
}

pub(crate) fn eval_condition(pp: &mut Preprocessor) -> Result<i64> {
    let raw = collect_rest_of_line(pp)?;
    let line_pos = raw.first().map(|t| t.pos.clone()).unwrap_or_else(SourcePos::synthetic);
    let substituted = replace_defined(pp, raw)?;
    let expanded = pp.expand_token_slice(&substituted)?;
    let tokens = zero_fill_remaining_idents(expanded);

    if tokens.is_empty() {
        return Err(Diagnostic::preprocessor(line_pos, "#if with no expression"));
    }
    let mut parser = CondParser { tokens: &tokens, pos: 0 };
    let node = parser.parse_expr(0)?;
    if parser.pos != tokens.len() {
        let at = tokens[parser.pos].pos.clone();
        return Err(Diagnostic::preprocessor(at, "unexpected token in #if expression"));
    }
    eval(&node)
}

/// Replace every `defined NAME` / `defined(NAME)` occurrence with a literal
/// `1`/`0`, scanning left to right over the *unexpanded* line (so a macro
/// that happens to expand to `defined` never participates - C11 leaves
/// this undefined but every real preprocessor special-cases it this way).
fn replace_defined(pp: &Preprocessor, tokens: Vec<Token>) -> Result<Vec<Token>> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i].kind == TokenKind::Ident && tokens[i].text == "defined" {
            let pos = tokens[i].pos.clone();
            let (name, consumed) = if tokens.get(i + 1).is_some_and(|t| t.is_punct("(")) {
                let name_tok = tokens.get(i + 2).ok_or_else(|| Diagnostic::preprocessor(pos.clone(), "expected identifier after 'defined('"))?;
                if name_tok.kind != TokenKind::Ident {
                    return Err(Diagnostic::preprocessor(name_tok.pos.clone(), "expected identifier after 'defined('"));
                }
                let close = tokens.get(i + 3).ok_or_else(|| Diagnostic::preprocessor(pos.clone(), "expected ')' after 'defined('"))?;
                if !close.is_punct(")") {
                    return Err(Diagnostic::preprocessor(close.pos.clone(), "expected ')' after 'defined(NAME'"));
                }
                (name_tok.text.clone(), 4)
            } else {
                let name_tok = tokens.get(i + 1).ok_or_else(|| Diagnostic::preprocessor(pos.clone(), "expected identifier after 'defined'"))?;
                if name_tok.kind != TokenKind::Ident {
                    return Err(Diagnostic::preprocessor(name_tok.pos.clone(), "expected identifier after 'defined'"));
                }
                (name_tok.text.clone(), 2)
            };
            let value = if pp.macros.contains(&name) { "1" } else { "0" };
            out.push(Token::new(TokenKind::Number, pos, value));
            i += consumed;
            continue;
        }
        out.push(tokens[i].clone());
        i += 1;
    }
    Ok(out)
}

/// Any identifier surviving macro expansion (an undeclared name, or a
/// keyword this compiler doesn't treat specially in constant expressions)
/// is replaced with the literal `0`, per C11 §6.10.1p4.
fn zero_fill_remaining_idents(tokens: Vec<Token>) -> Vec<Token> {
    tokens
        .into_iter()
        .map(|t| if t.kind == TokenKind::Ident { Token::new(TokenKind::Number, t.pos, "0") } else { t })
        .collect()
}

struct CondParser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> CondParser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        self.pos += 1;
        tok
    }

    fn parse_expr(&mut self, min_prec: u8) -> Result<Node> {
        let mut lhs = self.parse_unary()?;
        loop {
            let Some(tok) = self.peek() else { break };
            if tok.kind != TokenKind::Punct {
                break;
            }
            if tok.text == ":" {
                break;
            }
            let Some((prec, right_assoc)) = infix_binding_power(&tok.text) else { break };
            if prec < min_prec {
                break;
            }

            if tok.text == "?" {
                self.bump();
                let then_branch = self.parse_expr(2)?;
                let colon = self.bump();
                if !colon.is_punct(":") {
                    return Err(Diagnostic::preprocessor(colon.pos, "expected ':' in '?:' expression"));
                }
                let else_branch = self.parse_expr(prec)?;
                lhs = Node::Ternary(Box::new(lhs), Box::new(then_branch), Box::new(else_branch));
                continue;
            }

            let op = self.bump().text;
            let next_min = if right_assoc { prec } else { prec + 1 };
            let rhs = self.parse_expr(next_min)?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Node> {
        if let Some(tok) = self.peek() {
            if tok.kind == TokenKind::Punct && is_unary_prefix(&tok.text) && tok.text != "*" && tok.text != "&" {
                let op = self.bump().text;
                let operand = self.parse_expr(PREFIX_PREC)?;
                return Ok(Node::Unary(op, Box::new(operand)));
            }
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Node> {
        let Some(tok) = self.peek().cloned() else {
            return Err(Diagnostic::preprocessor(SourcePos::synthetic(), "unexpected end of #if expression"));
        };
        match tok.kind {
            TokenKind::Number => {
                self.bump();
                Ok(Node::Lit(parse_int_literal(&tok)?))
            }
            TokenKind::CharLit => {
                self.bump();
                Ok(Node::Lit(parse_char_literal(&tok)?))
            }
            TokenKind::Punct if tok.text == "(" => {
                self.bump();
                let inner = self.parse_expr(0)?;
                let close = self.bump();
                if !close.is_punct(")") {
                    return Err(Diagnostic::preprocessor(close.pos, "expected ')'"));
                }
                Ok(inner)
            }
            _ => Err(Diagnostic::preprocessor(tok.pos.clone(), format!("unexpected token '{}' in #if expression", tok.text))),
        }
    }
}

fn eval(node: &Node) -> Result<i64> {
    match node {
        Node::Lit(v) => Ok(*v),
        Node::Unary(op, inner) => {
            let v = eval(inner)?;
            Ok(match op.as_str() {
                "+" => v,
                "-" => v.wrapping_neg(),
                "!" => (v == 0) as i64,
                "~" => !v,
                _ => v,
            })
        }
        Node::Ternary(cond, then_branch, else_branch) => {
            if eval(cond)? != 0 {
                eval(then_branch)
            } else {
                eval(else_branch)
            }
        }
        Node::Binary(op, lhs, rhs) => {
            if op == "&&" {
                return Ok(if eval(lhs)? == 0 { 0 } else { (eval(rhs)? != 0) as i64 });
            }
            if op == "||" {
                return Ok(if eval(lhs)? != 0 { 1 } else { (eval(rhs)? != 0) as i64 });
            }
            let l = eval(lhs)?;
            let r = eval(rhs)?;
            Ok(match op.as_str() {
                "+" => l.wrapping_add(r),
                "-" => l.wrapping_sub(r),
                "*" => l.wrapping_mul(r),
                "/" => {
                    if r == 0 {
                        return Err(Diagnostic::preprocessor(SourcePos::synthetic(), "division by zero in #if expression"));
                    }
                    l.wrapping_div(r)
                }
                "%" => {
                    if r == 0 {
                        return Err(Diagnostic::preprocessor(SourcePos::synthetic(), "division by zero in #if expression"));
                    }
                    l.wrapping_rem(r)
                }
                "<<" => l.wrapping_shl(r as u32),
                ">>" => l.wrapping_shr(r as u32),
                "<" => (l < r) as i64,
                ">" => (l > r) as i64,
                "<=" => (l <= r) as i64,
                ">=" => (l >= r) as i64,
                "==" => (l == r) as i64,
                "!=" => (l != r) as i64,
                "&" => l & r,
                "^" => l ^ r,
                "|" => l | r,
                "," => r,
                other => return Err(Diagnostic::preprocessor(SourcePos::synthetic(), format!("operator '{other}' is not valid in a #if expression"))),
            })
        }
    }
}

fn parse_int_literal(tok: &Token) -> Result<i64> {
    let text = tok.text.trim_end_matches(|c| matches!(c, 'u' | 'U' | 'l' | 'L'));
    let value = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else if text.len() > 1 && text.starts_with('0') {
        i64::from_str_radix(&text[1..], 8)
    } else {
        text.parse::<i64>()
    };
    value.map_err(|e| Diagnostic::preprocessor(tok.pos.clone(), format!("invalid integer constant '{}': {e}", tok.text)))
}

fn parse_char_literal(tok: &Token) -> Result<i64> {
    let inner = tok.text.trim_matches(|c| matches!(c, '\'' | 'L' | 'u' | 'U'));
    let mut chars = inner.chars();
    let value = match chars.next() {
        Some('\\') => match chars.next() {
            Some('n') => b'\n' as i64,
            Some('t') => b'\t' as i64,
            Some('r') => b'\r' as i64,
            Some('0') => 0,
            Some('\\') => b'\\' as i64,
            Some('\'') => b'\'' as i64,
            Some('"') => b'"' as i64,
            Some(other) => other as i64,
            None => return Err(Diagnostic::preprocessor(tok.pos.clone(), "truncated escape in character constant")),
        },
        Some(c) => c as i64,
        None => return Err(Diagnostic::preprocessor(tok.pos.clone(), "empty character constant")),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(kind: TokenKind, text: &str) -> Token {
        Token::new(kind, SourcePos::synthetic(), text)
    }

    fn eval_tokens(tokens: Vec<Token>) -> i64 {
        let tokens = zero_fill_remaining_idents(tokens);
        let mut parser = CondParser { tokens: &tokens, pos: 0 };
        let node = parser.parse_expr(0).unwrap();
        eval(&node).unwrap()
    }

    #[test]
    fn arithmetic_precedence() {
        // 1 + 2 * 3 == 7 (spec.md §8 scenario 1, reused for #if)
        let out = eval_tokens(vec![tok(TokenKind::Number, "1"), tok(TokenKind::Punct, "+"), tok(TokenKind::Number, "2"), tok(TokenKind::Punct, "*"), tok(TokenKind::Number, "3")]);
        assert_eq!(out, 7);
    }

    #[test]
    fn ternary_and_comparison() {
        let out = eval_tokens(vec![
            tok(TokenKind::Number, "1"), tok(TokenKind::Punct, "<"), tok(TokenKind::Number, "2"),
            tok(TokenKind::Punct, "?"), tok(TokenKind::Number, "10"), tok(TokenKind::Punct, ":"), tok(TokenKind::Number, "20"),
        ]);
        assert_eq!(out, 10);
    }

    #[test]
    fn logical_and_short_circuits_division_by_zero() {
        let out = eval_tokens(vec![
            tok(TokenKind::Number, "0"), tok(TokenKind::Punct, "&&"),
            tok(TokenKind::Number, "1"), tok(TokenKind::Punct, "/"), tok(TokenKind::Number, "0"),
        ]);
        assert_eq!(out, 0);
    }

    #[test]
    fn hex_and_octal_literals() {
        assert_eq!(parse_int_literal(&tok(TokenKind::Number, "0x1F")).unwrap(), 31);
        assert_eq!(parse_int_literal(&tok(TokenKind::Number, "010")).unwrap(), 8);
        assert_eq!(parse_int_literal(&tok(TokenKind::Number, "42UL")).unwrap(), 42);
    }

    #[test]
    fn char_literal_and_escape() {
        assert_eq!(parse_char_literal(&tok(TokenKind::CharLit, "'a'")).unwrap(), b'a' as i64);
        assert_eq!(parse_char_literal(&tok(TokenKind::CharLit, "'\\n'")).unwrap(), b'\n' as i64);
    }
}
