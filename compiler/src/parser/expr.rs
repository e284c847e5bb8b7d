//! Expression parsing: spec.md §4.2, driven by the shared
//! [`crate::precedence`] table (spec.md §9) exactly as
//! `preprocessor::condexpr` drives `#if` evaluation from the same table.
//! Cast-vs-parenthesized-expression and compound-literal disambiguation
//! both hinge on [`decl::at_decl_start`] peeking at the token right after
//! `(` (spec.md §4.2 "typedef-name feedback into the lexer").

use super::{decl, Parser};
use crate::ast::{BinOp, Expr, SizeofArg, UnOp};
use crate::diag::{Diagnostic, Result};
use crate::pos::SourcePos;
use crate::precedence::infix_binding_power;
use crate::preprocessor::token::TokenKind;
use crate::types::{Constant, SimpleKind, TypeId};

/// A full expression, comma operator included (spec.md's `expression`).
pub(crate) fn parse_expr(p: &mut Parser) -> Result<Expr> {
    parse_bp(p, 1)
}

/// An assignment-expression: a full expression with no top-level comma
/// (used for call arguments, initializers, `for` clauses).
pub(crate) fn parse_assignment(p: &mut Parser) -> Result<Expr> {
    parse_bp(p, 2)
}

fn parse_bp(p: &mut Parser, min_prec: u8) -> Result<Expr> {
    let mut lhs = parse_unary(p)?;
    loop {
        let tok = p.peek();
        if tok.kind != TokenKind::Punct {
            break;
        }
        let text = tok.text.clone();
        let pos = tok.pos.clone();
        let Some((prec, right_assoc)) = infix_binding_power(&text) else { break };
        if prec < min_prec {
            break;
        }

        if text == "?" {
            p.bump()?;
            let then_branch = parse_bp(p, 1)?;
            p.expect_punct(":")?;
            let else_branch = parse_bp(p, prec)?;
            lhs = Expr::Cond { cond: Box::new(lhs), then_branch: Box::new(then_branch), else_branch: Box::new(else_branch), pos };
            continue;
        }
        if text == "," {
            p.bump()?;
            let rhs = parse_bp(p, prec + 1)?;
            lhs = Expr::Comma { lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
            continue;
        }
        if let Some(op) = assign_op(&text) {
            p.bump()?;
            let rhs = parse_bp(p, prec)?;
            lhs = Expr::Assign { op, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
            continue;
        }

        p.bump()?;
        let next_min = if right_assoc { prec } else { prec + 1 };
        let rhs = parse_bp(p, next_min)?;
        let op = binop(&text).ok_or_else(|| Diagnostic::ice(pos.clone(), format!("'{text}' has a precedence entry but no BinOp mapping")))?;
        lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), pos };
    }
    Ok(lhs)
}

fn assign_op(text: &str) -> Option<Option<BinOp>> {
    Some(match text {
        "=" => None,
        "+=" => Some(BinOp::Add),
        "-=" => Some(BinOp::Sub),
        "*=" => Some(BinOp::Mul),
        "/=" => Some(BinOp::Div),
        "%=" => Some(BinOp::Mod),
        "&=" => Some(BinOp::BitAnd),
        "|=" => Some(BinOp::BitOr),
        "^=" => Some(BinOp::BitXor),
        "<<=" => Some(BinOp::Shl),
        ">>=" => Some(BinOp::Shr),
        _ => return None,
    })
}

fn binop(text: &str) -> Option<BinOp> {
    Some(match text {
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" => BinOp::Mul,
        "/" => BinOp::Div,
        "%" => BinOp::Mod,
        "<<" => BinOp::Shl,
        ">>" => BinOp::Shr,
        "<" => BinOp::Lt,
        ">" => BinOp::Gt,
        "<=" => BinOp::Le,
        ">=" => BinOp::Ge,
        "==" => BinOp::Eq,
        "!=" => BinOp::Ne,
        "&" => BinOp::BitAnd,
        "^" => BinOp::BitXor,
        "|" => BinOp::BitOr,
        "&&" => BinOp::LogAnd,
        "||" => BinOp::LogOr,
        _ => return None,
    })
}

const BUILTIN_VA: &[&str] = &["va_start", "va_arg", "va_end", "va_copy"];

fn parse_unary(p: &mut Parser) -> Result<Expr> {
    let pos = p.peek().pos.clone();

    if p.at_punct("++") {
        p.bump()?;
        let operand = parse_unary(p)?;
        return Ok(Expr::Unary { op: UnOp::PreInc, operand: Box::new(operand), pos });
    }
    if p.at_punct("--") {
        p.bump()?;
        let operand = parse_unary(p)?;
        return Ok(Expr::Unary { op: UnOp::PreDec, operand: Box::new(operand), pos });
    }
    if p.at_ident("sizeof") {
        p.bump()?;
        if p.at_punct("(") {
            p.bump()?;
            if decl::at_decl_start(p) {
                let spec = decl::parse_decl_specifiers(p)?;
                let ty = parse_abstract_type(p, spec.ty_base)?;
                p.expect_punct(")")?;
                return Ok(Expr::Sizeof { arg: SizeofArg::Type(ty), pos });
            }
            let inner = parse_expr(p)?;
            p.expect_punct(")")?;
            let inner = apply_postfix(p, inner)?;
            return Ok(Expr::Sizeof { arg: SizeofArg::Expr(Box::new(inner)), pos });
        }
        let operand = parse_unary(p)?;
        return Ok(Expr::Sizeof { arg: SizeofArg::Expr(Box::new(operand)), pos });
    }
    if p.peek().kind == TokenKind::Punct {
        let text = p.peek().text.clone();
        let op = match text.as_str() {
            "+" => Some(UnOp::Plus),
            "-" => Some(UnOp::Neg),
            "!" => Some(UnOp::Not),
            "~" => Some(UnOp::BitNot),
            "*" => Some(UnOp::Deref),
            "&" => Some(UnOp::Addr),
            _ => None,
        };
        if let Some(op) = op {
            p.bump()?;
            let operand = parse_unary(p)?;
            return Ok(Expr::Unary { op, operand: Box::new(operand), pos });
        }
    }
    if p.at_punct("(") {
        p.bump()?;
        if decl::at_decl_start(p) {
            let spec = decl::parse_decl_specifiers(p)?;
            let ty = parse_abstract_type(p, spec.ty_base)?;
            p.expect_punct(")")?;
            if p.at_punct("{") {
                let init = decl::parse_initializer(p)?;
                let e = Expr::CompoundLiteral { ty, init, pos };
                return apply_postfix(p, e);
            }
            let operand = parse_unary(p)?;
            return Ok(Expr::Cast { ty, expr: Box::new(operand), pos });
        }
        let inner = parse_expr(p)?;
        p.expect_punct(")")?;
        return apply_postfix(p, inner);
    }

    parse_primary(p)
}

/// `*`-only abstract declarator suffix, for the type-names that appear in
/// casts, `sizeof(T)` and `va_arg(ap, T)` (spec.md §4.2's narrower
/// "type-name" production - no array/function abstract declarators).
fn parse_abstract_type(p: &mut Parser, base: TypeId) -> Result<TypeId> {
    let mut ty = base;
    while p.at_punct("*") {
        p.bump()?;
        ty = p.types.pointer_to(ty);
    }
    Ok(ty)
}

fn parse_primary(p: &mut Parser) -> Result<Expr> {
    let tok = p.peek().clone();
    match tok.kind {
        TokenKind::Number => {
            p.bump()?;
            parse_number(p, &tok)
        }
        TokenKind::CharLit => {
            p.bump()?;
            parse_char(p, &tok)
        }
        TokenKind::StringLit => {
            p.bump()?;
            Ok(Expr::StringLit { bytes: decode_string(&tok.text), pos: tok.pos })
        }
        TokenKind::Ident if BUILTIN_VA.contains(&tok.text.as_str()) => parse_va_builtin(p, &tok),
        TokenKind::Ident => {
            p.bump()?;
            apply_postfix(p, Expr::Ident { name: tok.text, pos: tok.pos })
        }
        _ => Err(Diagnostic::parse(tok.pos.clone(), format!("unexpected token '{}' in expression", tok.text))),
    }
}

fn parse_va_builtin(p: &mut Parser, tok: &crate::preprocessor::token::Token) -> Result<Expr> {
    let pos = tok.pos.clone();
    p.bump()?;
    p.expect_punct("(")?;
    let expr = match tok.text.as_str() {
        "va_start" => {
            let ap = parse_assignment(p)?;
            p.expect_punct(",")?;
            let last_named = p.expect_ident()?.text;
            Expr::VaStart { ap: Box::new(ap), last_named, pos }
        }
        "va_end" => {
            let ap = parse_assignment(p)?;
            Expr::VaEnd { ap: Box::new(ap), pos }
        }
        "va_copy" => {
            let dst = parse_assignment(p)?;
            p.expect_punct(",")?;
            let src = parse_assignment(p)?;
            Expr::VaCopy { dst: Box::new(dst), src: Box::new(src), pos }
        }
        "va_arg" => {
            let ap = parse_assignment(p)?;
            p.expect_punct(",")?;
            let spec = decl::parse_decl_specifiers(p)?;
            let ty = parse_abstract_type(p, spec.ty_base)?;
            Expr::VaArg { ap: Box::new(ap), ty, pos }
        }
        _ => unreachable!("BUILTIN_VA filtered to these four names"),
    };
    p.expect_punct(")")?;
    Ok(expr)
}

fn apply_postfix(p: &mut Parser, mut e: Expr) -> Result<Expr> {
    loop {
        let pos = p.peek().pos.clone();
        if p.at_punct("[") {
            p.bump()?;
            let index = parse_expr(p)?;
            p.expect_punct("]")?;
            e = Expr::Index { base: Box::new(e), index: Box::new(index), pos };
            continue;
        }
        if p.at_punct("(") {
            p.bump()?;
            let args = parse_arg_list(p)?;
            p.expect_punct(")")?;
            e = Expr::Call { callee: Box::new(e), args, pos };
            continue;
        }
        if p.at_punct(".") {
            p.bump()?;
            let field = p.expect_ident()?.text;
            e = Expr::Member { base: Box::new(e), field, arrow: false, pos };
            continue;
        }
        if p.at_punct("->") {
            p.bump()?;
            let field = p.expect_ident()?.text;
            e = Expr::Member { base: Box::new(e), field, arrow: true, pos };
            continue;
        }
        if p.at_punct("++") {
            p.bump()?;
            e = Expr::Unary { op: UnOp::PostInc, operand: Box::new(e), pos };
            continue;
        }
        if p.at_punct("--") {
            p.bump()?;
            e = Expr::Unary { op: UnOp::PostDec, operand: Box::new(e), pos };
            continue;
        }
        break;
    }
    Ok(e)
}

fn parse_arg_list(p: &mut Parser) -> Result<Vec<Expr>> {
    let mut args = Vec::new();
    if p.at_punct(")") {
        return Ok(args);
    }
    loop {
        args.push(parse_assignment(p)?);
        if p.at_punct(",") {
            p.bump()?;
            continue;
        }
        break;
    }
    Ok(args)
}

fn parse_number(p: &Parser, tok: &crate::preprocessor::token::Token) -> Result<Expr> {
    let text = &tok.text;
    let looks_hex = text.starts_with("0x") || text.starts_with("0X");
    let is_float = !looks_hex && (text.contains('.') || text.contains('e') || text.contains('E'));

    if is_float {
        let trimmed = text.trim_end_matches(|c| matches!(c, 'f' | 'F' | 'l' | 'L'));
        let value: f64 = trimmed.parse().map_err(|_| Diagnostic::lexical(tok.pos.clone(), format!("invalid floating constant '{text}'")))?;
        let is_f32 = text.ends_with('f') || text.ends_with('F');
        if is_f32 {
            let ty = p.types.simple(SimpleKind::Float);
            Ok(Expr::Const { value: Constant::float_bits(ty, (value as f32).to_bits() as u64), pos: tok.pos.clone() })
        } else {
            let ty = p.types.simple(SimpleKind::Double);
            Ok(Expr::Const { value: Constant::float_bits(ty, value.to_bits()), pos: tok.pos.clone() })
        }
    } else {
        let unsigned = text.to_ascii_lowercase().contains('u');
        let long_count = text.chars().filter(|c| matches!(c, 'l' | 'L')).count();
        let cleaned = text.trim_end_matches(|c| matches!(c, 'u' | 'U' | 'l' | 'L'));
        let value: i64 = if let Some(hex) = cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
            i64::from_str_radix(hex, 16)
        } else if cleaned.len() > 1 && cleaned.starts_with('0') {
            i64::from_str_radix(&cleaned[1..], 8)
        } else {
            cleaned.parse()
        }
        .map_err(|e| Diagnostic::lexical(tok.pos.clone(), format!("invalid integer constant '{text}': {e}")))?;

        let kind = if long_count >= 1 {
            if unsigned { SimpleKind::ULong } else { SimpleKind::Long }
        } else if unsigned {
            SimpleKind::UInt
        } else {
            SimpleKind::Int
        };
        Ok(Expr::Const { value: Constant::int(p.types.simple(kind), value), pos: tok.pos.clone() })
    }
}

fn parse_char(p: &Parser, tok: &crate::preprocessor::token::Token) -> Result<Expr> {
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
            None => return Err(Diagnostic::lexical(tok.pos.clone(), "truncated escape in character constant")),
        },
        Some(c) => c as i64,
        None => return Err(Diagnostic::lexical(tok.pos.clone(), "empty character constant")),
    };
    Ok(Expr::Const { value: Constant::int(p.types.simple(SimpleKind::Int), value), pos: tok.pos.clone() })
}

/// Decode a string literal token's text (quotes included, prefix stripped
/// by the caller's context) into its byte content, without the implicit
/// trailing NUL - IR lowering appends that when it materializes the
/// rodata label (spec.md §4.3 "string literal").
fn decode_string(text: &str) -> Vec<u8> {
    let inner = text.trim_start_matches(|c| matches!(c, 'u' | 'U' | 'L')).trim_start_matches('8');
    let inner = &inner[1..inner.len() - 1];
    let mut out = Vec::new();
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push(b'\n'),
                Some('t') => out.push(b'\t'),
                Some('r') => out.push(b'\r'),
                Some('0') => out.push(0),
                Some('\\') => out.push(b'\\'),
                Some('\'') => out.push(b'\''),
                Some('"') => out.push(b'"'),
                Some(other) => {
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                }
                None => {}
            }
        } else {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::preprocessor::Preprocessor;
    use std::io::Write;

    fn parse_one_expr(src: &str) -> Expr {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(src.as_bytes()).unwrap();
        let config = CompilerConfig::new(file.path().to_path_buf());
        let pp = Preprocessor::new(&config).unwrap();
        let mut p = Parser::new(pp).unwrap();
        parse_expr(&mut p).unwrap()
    }

    #[test]
    fn precedence_matches_arithmetic() {
        // spec.md §8 scenario 1: 1 + 2 * 3 parses as 1 + (2 * 3).
        let e = parse_one_expr("1+2*3");
        match e {
            Expr::Binary { op: BinOp::Add, rhs, .. } => {
                assert!(matches!(*rhs, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("expected top-level '+', got {other:?}"),
        }
    }

    #[test]
    fn ternary_is_right_associative_with_assignment_below_it() {
        let e = parse_one_expr("a ? b : c ? d : e");
        match e {
            Expr::Cond { else_branch, .. } => assert!(matches!(*else_branch, Expr::Cond { .. })),
            other => panic!("expected a conditional expression, got {other:?}"),
        }
    }
}
