//! Macro expansion: spec.md §4.1 "Expander".
//!
//! Expands a stream of unexpanded tokens into a stream of expanded tokens.
//! Object-like macros substitute body tokens; function-like macros require
//! an immediately following `(` (whitespace allowed) and parse
//! comma-separated argument token-lists respecting nested parentheses; a
//! variadic parameter binds the rest as `__VA_ARGS__`. Stringification
//! (`#x`) and token concatenation (`##`) operate on the *unexpanded*
//! argument tokens; every other parameter occurrence is substituted with
//! its macro-expanded form.
//!
//! Hygiene (spec.md §9, §5): each expansion marks the expanded identifier
//! as "in use" for the duration of that token's descendants via
//! [`super::token::HideSet`], scoped per-token rather than per-identifier
//! globally - this is what lets a macro body safely mention its own name
//! again after being used once elsewhere.

use super::macros::MacroDef;
use super::token::{HideSet, Token, TokenKind};
use crate::diag::{Diagnostic, Result};

const VA_ARGS: &str = "__VA_ARGS__";

/// Build the expansion of `def` given its already-collected (unexpanded)
/// argument token lists, tagging every produced token with `hide_set`.
pub fn substitute(def: &MacroDef, args: &[Vec<Token>], hide_set: &HideSet, expand_arg: impl Fn(&[Token]) -> Result<Vec<Token>>) -> Result<Vec<Token>> {
    let mut out: Vec<Token> = Vec::new();
    let body = &def.body;
    let mut i = 0;
    while i < body.len() {
        let tok = &body[i];

        // `# param` -> stringize the parameter's unexpanded argument.
        if def.is_function_like && tok.is_punct("#") && i + 1 < body.len() {
            if let Some(arg) = lookup_arg(def, &body[i + 1].text, args) {
                let text = stringize(arg);
                out.push(retagged(Token::new(TokenKind::StringLit, tok.pos.clone(), text), hide_set));
                i += 2;
                continue;
            }
        }

        // `lhs ## rhs`: paste the textual forms of whatever `lhs`/`rhs`
        // resolve to (parameter -> unexpanded argument text; anything else
        // -> its own text), forming one new token.
        if tok.is_punct("##") {
            // The left operand was already pushed to `out`; pop and
            // re-paste it against the right operand.
            let left = out.pop().ok_or_else(|| Diagnostic::preprocessor(tok.pos.clone(), "'##' cannot appear at the start of macro expansion"))?;
            i += 1;
            if i >= body.len() {
                return Err(Diagnostic::preprocessor(tok.pos.clone(), "'##' cannot appear at the end of macro expansion"));
            }
            let right_tok = &body[i];
            let right_text = if let Some(arg) = lookup_arg(def, &right_tok.text, args) {
                arg.iter().map(|t| t.text.as_str()).collect::<String>()
            } else {
                right_tok.text.clone()
            };
            let pasted_text = format!("{}{}", left.text, right_text);
            out.push(retagged(paste_token(&left, &pasted_text), hide_set));
            i += 1;
            continue;
        }

        if def.is_function_like || !def.params.is_empty() {
            if let Some(arg) = lookup_arg(def, &tok.text, args) {
                // Substituted unless it's about to be pasted (checked above
                // for the right-hand operand; here we check lookahead for
                // `param ##`).
                if body.get(i + 1).is_some_and(|n| n.is_punct("##")) {
                    out.extend(arg.iter().cloned().map(|t| retagged(t, hide_set)));
                } else {
                    let expanded = expand_arg(arg)?;
                    out.extend(expanded.into_iter().map(|t| retagged(t, hide_set)));
                }
                i += 1;
                continue;
            }
        }

        out.push(retagged(tok.clone(), hide_set));
        i += 1;
    }
    Ok(out)
}

fn lookup_arg<'a>(def: &MacroDef, name: &str, args: &'a [Vec<Token>]) -> Option<&'a [Token]> {
    if name == VA_ARGS && def.is_variadic {
        return args.get(def.params.len()).map(|v| v.as_slice());
    }
    def.params.iter().position(|p| p == name).and_then(|idx| args.get(idx)).map(|v| v.as_slice())
}

fn stringize(arg: &[Token]) -> String {
    let mut s = String::from("\"");
    for (idx, tok) in arg.iter().enumerate() {
        if idx > 0 && tok.whitespace_before {
            s.push(' ');
        }
        if tok.kind == TokenKind::StringLit || tok.kind == TokenKind::CharLit {
            for c in tok.text.chars() {
                if c == '"' || c == '\\' {
                    s.push('\\');
                }
                s.push(c);
            }
        } else {
            s.push_str(&tok.text);
        }
    }
    s.push('"');
    s
}

fn paste_token(template: &Token, text: &str) -> Token {
    let kind = classify_pasted(text);
    let mut tok = Token::new(kind, template.pos.clone(), text);
    tok.whitespace_before = template.whitespace_before;
    tok
}

fn classify_pasted(text: &str) -> TokenKind {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => TokenKind::Number,
        Some(c) if c.is_alphabetic() || c == '_' => TokenKind::Ident,
        _ => TokenKind::Punct,
    }
}

fn retagged(mut tok: Token, hide_set: &HideSet) -> Token {
    tok.hide_set = tok.hide_set.union_with(hide_set);
    tok.first_of_line = false;
    tok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pos::SourcePos;

    fn ident(text: &str) -> Token {
        Token::new(TokenKind::Ident, SourcePos::synthetic(), text)
    }
    fn punct(text: &str) -> Token {
        Token::new(TokenKind::Punct, SourcePos::synthetic(), text)
    }
    fn num(text: &str) -> Token {
        Token::new(TokenKind::Number, SourcePos::synthetic(), text)
    }

    #[test]
    fn object_like_substitution() {
        let def = MacroDef::object_like("FOO", vec![num("1"), punct("+"), num("2")]);
        let out = substitute(&def, &[], &HideSet::new(), |a| Ok(a.to_vec())).unwrap();
        let texts: Vec<_> = out.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["1", "+", "2"]);
    }

    #[test]
    fn function_like_substitution_parenthesizes_argument_correctly() {
        // #define SQ(x) ((x)*(x))  with argument `3+1` (spec.md §8 scenario 2)
        let def = MacroDef {
            name: "SQ".to_string(),
            params: vec!["x".to_string()],
            is_function_like: true,
            is_variadic: false,
            body: vec![
                punct("("), punct("("), ident("x"), punct(")"), punct("*"), punct("("), ident("x"), punct(")"), punct(")"),
            ],
        };
        let args = vec![vec![num("3"), punct("+"), num("1")]];
        let out = substitute(&def, &args, &HideSet::new(), |a| Ok(a.to_vec())).unwrap();
        let texts: Vec<_> = out.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["(", "(", "3", "+", "1", ")", "*", "(", "3", "+", "1", ")", ")"]);
    }

    #[test]
    fn stringize_and_paste() {
        let def = MacroDef {
            name: "M".to_string(),
            params: vec!["a".to_string(), "b".to_string()],
            is_function_like: true,
            is_variadic: false,
            body: vec![punct("#"), ident("a"), ident("a"), punct("##"), ident("b")],
        };
        let args = vec![vec![ident("hello")], vec![ident("world")]];
        let out = substitute(&def, &args, &HideSet::new(), |a| Ok(a.to_vec())).unwrap();
        assert_eq!(out[0].text, "\"hello\"");
        assert_eq!(out[1].text, "helloworld");
    }
}
