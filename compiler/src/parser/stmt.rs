//! Statements: spec.md §4.2 (the statement half of "Declarations" /
//! "Expression construction"), following the same recursive-descent shape
//! as [`super::decl`] and [`super::expr`]. `switch`/`case`/`default` are
//! parsed in the C "labelled statement" style (a `case`/`default` is a
//! label attached to the following statement, not a block header) so that
//! `ir::lower` can walk a flat statement list and open a new block at each
//! label, mirroring spec.md §4.3's block-structured control flow.

use super::{decl, expr, Parser};
use crate::ast::Stmt;
use crate::diag::{Diagnostic, Result};
use crate::preprocessor::token::TokenKind;
use crate::types::Constant;

pub(crate) fn parse_compound(p: &mut Parser) -> Result<Vec<Stmt>> {
    p.expect_punct("{")?;
    p.symtab.push_scope();
    let mut stmts = Vec::new();
    while !p.at_punct("}") {
        stmts.push(parse_stmt(p)?);
    }
    p.expect_punct("}")?;
    p.symtab.pop_scope();
    Ok(stmts)
}

pub(crate) fn parse_stmt(p: &mut Parser) -> Result<Stmt> {
    let pos = p.peek().pos.clone();

    if p.at_punct("{") {
        return Ok(Stmt::Compound(parse_compound(p)?));
    }
    if p.at_punct(";") {
        p.bump()?;
        return Ok(Stmt::Empty);
    }
    if decl::at_decl_start(p) {
        return Ok(Stmt::Decl(decl::parse_local_decl(p)?));
    }

    if p.peek().kind == TokenKind::Ident {
        match p.peek().text.as_str() {
            "if" => return parse_if(p),
            "while" => return parse_while(p),
            "do" => return parse_do_while(p),
            "for" => return parse_for(p),
            "return" => {
                p.bump()?;
                let value = if p.at_punct(";") { None } else { Some(expr::parse_expr(p)?) };
                p.expect_punct(";")?;
                return Ok(Stmt::Return { value, pos });
            }
            "break" => {
                p.bump()?;
                p.expect_punct(";")?;
                return Ok(Stmt::Break(pos));
            }
            "continue" => {
                p.bump()?;
                p.expect_punct(";")?;
                return Ok(Stmt::Continue(pos));
            }
            "switch" => return parse_switch(p),
            "case" => {
                p.bump()?;
                let value = parse_case_constant(p)?;
                p.expect_punct(":")?;
                return Ok(Stmt::Case { value, pos });
            }
            "default" => {
                p.bump()?;
                p.expect_punct(":")?;
                return Ok(Stmt::Default(pos));
            }
            "goto" => {
                p.bump()?;
                let name = p.expect_ident()?.text;
                p.expect_punct(";")?;
                return Ok(Stmt::Goto { name, pos });
            }
            _ => {}
        }
        // `identifier:` is a label; anything else starting with an
        // identifier falls through to the expression-statement case below.
        if p.peek().kind == TokenKind::Ident && p.peek2()?.is_punct(":") {
            let name = p.bump()?.text; // identifier
            p.expect_punct(":")?;
            return Ok(Stmt::Label { name, pos });
        }
    }

    let e = expr::parse_expr(p)?;
    p.expect_punct(";")?;
    Ok(Stmt::Expr(e))
}

fn parse_case_constant(p: &mut Parser) -> Result<Constant> {
    let pos = p.peek().pos.clone();
    let e = expr::parse_assignment(p)?;
    match e {
        crate::ast::Expr::Const { value, .. } => Ok(value),
        _ => Err(Diagnostic::parse(pos, "case label does not reduce to an integer constant")),
    }
}

fn parse_if(p: &mut Parser) -> Result<Stmt> {
    let pos = p.peek().pos.clone();
    p.bump()?; // if
    p.expect_punct("(")?;
    let cond = expr::parse_expr(p)?;
    p.expect_punct(")")?;
    let then_branch = Box::new(parse_stmt(p)?);
    let else_branch = if p.at_ident("else") {
        p.bump()?;
        Some(Box::new(parse_stmt(p)?))
    } else {
        None
    };
    Ok(Stmt::If { cond, then_branch, else_branch, pos })
}

fn parse_while(p: &mut Parser) -> Result<Stmt> {
    let pos = p.peek().pos.clone();
    p.bump()?; // while
    p.expect_punct("(")?;
    let cond = expr::parse_expr(p)?;
    p.expect_punct(")")?;
    let body = Box::new(parse_stmt(p)?);
    Ok(Stmt::While { cond, body, pos })
}

fn parse_do_while(p: &mut Parser) -> Result<Stmt> {
    let pos = p.peek().pos.clone();
    p.bump()?; // do
    let body = Box::new(parse_stmt(p)?);
    if !p.at_ident("while") {
        return Err(Diagnostic::parse(p.peek().pos.clone(), "expected 'while' after 'do' body"));
    }
    p.bump()?;
    p.expect_punct("(")?;
    let cond = expr::parse_expr(p)?;
    p.expect_punct(")")?;
    p.expect_punct(";")?;
    Ok(Stmt::DoWhile { body, cond, pos })
}

fn parse_for(p: &mut Parser) -> Result<Stmt> {
    let pos = p.peek().pos.clone();
    p.bump()?; // for
    p.expect_punct("(")?;
    p.symtab.push_scope();

    let init = if p.at_punct(";") {
        p.bump()?;
        None
    } else if decl::at_decl_start(p) {
        Some(Box::new(Stmt::Decl(decl::parse_local_decl(p)?)))
    } else {
        let e = expr::parse_expr(p)?;
        p.expect_punct(";")?;
        Some(Box::new(Stmt::Expr(e)))
    };

    let cond = if p.at_punct(";") { None } else { Some(expr::parse_expr(p)?) };
    p.expect_punct(";")?;

    let step = if p.at_punct(")") { None } else { Some(expr::parse_expr(p)?) };
    p.expect_punct(")")?;

    let body = Box::new(parse_stmt(p)?);
    p.symtab.pop_scope();
    Ok(Stmt::For { init, cond, step, body, pos })
}

fn parse_switch(p: &mut Parser) -> Result<Stmt> {
    let pos = p.peek().pos.clone();
    p.bump()?; // switch
    p.expect_punct("(")?;
    let scrutinee = expr::parse_expr(p)?;
    p.expect_punct(")")?;
    let body = Box::new(parse_stmt(p)?);
    Ok(Stmt::Switch { scrutinee, body, pos })
}
