//! Directive dispatch: spec.md §4.1 "Directives".
//!
//! Invoked by [`super::Preprocessor::pump`] whenever a `#` token starts a
//! line. Directives affecting conditional inclusion (`if`/`ifdef`/`ifndef`/
//! `elif`/`else`/`endif`) are always processed, even inside an already
//! inactive region, so nesting stays correct; every other directive is a
//! no-op when the enclosing region is inactive.

use super::condexpr;
use super::macros::MacroDef;
use super::token::{Token, TokenKind};
use super::{CondFrame, Preprocessor};
use crate::diag::{Diagnostic, Result};
use crate::pos::SourcePos;

pub(crate) fn process_directive(pp: &mut Preprocessor, hash_pos: SourcePos) -> Result<()> {
    let dir_tok = pp.raw_token()?;
    if dir_tok.first_of_line || dir_tok.is_eof() {
        // A bare `#` on its own line is the null directive: a no-op.
        pp.push_front(dir_tok);
        return Ok(());
    }

    let active = pp.active();
    match dir_tok.text.as_str() {
        "define" if active => directive_define(pp, hash_pos),
        "undef" if active => directive_undef(pp),
        "include" if active => directive_include(pp, hash_pos),
        "error" if active => directive_error(pp, hash_pos),
        "pragma" => skip_to_eol(pp),
        "line" => skip_to_eol(pp),
        "if" => directive_if(pp),
        "ifdef" => directive_ifdef(pp, true),
        "ifndef" => directive_ifdef(pp, false),
        "elif" => directive_elif(pp, hash_pos),
        "else" => directive_else(pp, hash_pos),
        "endif" => directive_endif(pp, hash_pos),
        _ if active => Err(Diagnostic::preprocessor(hash_pos, format!("unknown directive '#{}'", dir_tok.text))),
        _ => skip_to_eol(pp),
    }
}

fn directive_define(pp: &mut Preprocessor, hash_pos: SourcePos) -> Result<()> {
    let name_tok = pp.raw_token()?;
    if name_tok.kind != TokenKind::Ident {
        return Err(Diagnostic::preprocessor(name_tok.pos, "macro name must be an identifier"));
    }

    let peek = pp.raw_token()?;
    let (is_function_like, params, is_variadic) = if peek.is_punct("(") && !peek.whitespace_before {
        parse_param_list(pp)?
    } else {
        pp.push_front(peek);
        (false, Vec::new(), false)
    };

    let body = collect_rest_of_line(pp)?;
    if let Some(first) = body.first() {
        if first.is_punct("##") {
            return Err(Diagnostic::preprocessor(first.pos.clone(), "'##' cannot appear at the start of a macro replacement list"));
        }
    }
    if let Some(last) = body.last() {
        if last.is_punct("##") {
            return Err(Diagnostic::preprocessor(last.pos.clone(), "'##' cannot appear at the end of a macro replacement list"));
        }
    }

    let def = MacroDef { name: name_tok.text.clone(), params, is_function_like, is_variadic, body };
    pp.macros.define(def).map_err(|e| Diagnostic::preprocessor(hash_pos, e))
}

fn parse_param_list(pp: &mut Preprocessor) -> Result<(bool, Vec<String>, bool)> {
    let mut params = Vec::new();
    let mut variadic = false;
    loop {
        let tok = pp.raw_token()?;
        if tok.is_punct(")") {
            break;
        }
        if tok.is_punct("...") {
            variadic = true;
            let close = pp.raw_token()?;
            if !close.is_punct(")") {
                return Err(Diagnostic::preprocessor(close.pos, "expected ')' after '...' in macro parameter list"));
            }
            break;
        }
        if tok.kind != TokenKind::Ident {
            return Err(Diagnostic::preprocessor(tok.pos, "expected a parameter name in macro parameter list"));
        }
        params.push(tok.text.clone());
        let sep = pp.raw_token()?;
        if sep.is_punct(")") {
            break;
        }
        if !sep.is_punct(",") {
            return Err(Diagnostic::preprocessor(sep.pos, "expected ',' or ')' in macro parameter list"));
        }
    }
    Ok((true, params, variadic))
}

fn directive_undef(pp: &mut Preprocessor) -> Result<()> {
    let name_tok = pp.raw_token()?;
    if name_tok.kind != TokenKind::Ident {
        return Err(Diagnostic::preprocessor(name_tok.pos, "macro name must be an identifier"));
    }
    skip_to_eol(pp)?;
    pp.macros.undef(&name_tok.text);
    Ok(())
}

fn directive_include(pp: &mut Preprocessor, hash_pos: SourcePos) -> Result<()> {
    let tok = pp.raw_header_token()?;
    let (target, system) = match tok.kind {
        TokenKind::HeaderName => {
            let system = tok.text.starts_with('<');
            (tok.text[1..tok.text.len() - 1].to_string(), system)
        }
        TokenKind::StringLit => (tok.text[1..tok.text.len() - 1].to_string(), false),
        _ => return Err(Diagnostic::preprocessor(tok.pos, "expected \"FILENAME\" or <FILENAME> after #include")),
    };
    skip_to_eol(pp)?;
    pp.open_include(&target, system, &hash_pos)
}

fn directive_error(pp: &mut Preprocessor, hash_pos: SourcePos) -> Result<()> {
    let tokens = collect_rest_of_line(pp)?;
    let message: String = tokens.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" ");
    Err(Diagnostic::preprocessor(hash_pos, format!("#error {message}")))
}

fn directive_if(pp: &mut Preprocessor) -> Result<()> {
    let parent_active = pp.active();
    if parent_active {
        let cond = condexpr::eval_condition(pp)?;
        push_frame(pp, cond != 0, parent_active);
    } else {
        skip_to_eol(pp)?;
        push_frame(pp, false, false);
    }
    Ok(())
}

fn directive_ifdef(pp: &mut Preprocessor, want_defined: bool) -> Result<()> {
    let parent_active = pp.active();
    if parent_active {
        let name_tok = pp.raw_token()?;
        let defined = pp.macros.contains(&name_tok.text);
        skip_to_eol(pp)?;
        push_frame(pp, defined == want_defined, parent_active);
    } else {
        skip_to_eol(pp)?;
        push_frame(pp, false, false);
    }
    Ok(())
}

fn push_frame(pp: &mut Preprocessor, taking: bool, parent_active: bool) {
    pp.cond_stack.push(CondFrame {
        active: parent_active && taking,
        taking,
        taken_ever: taking,
        active_parent: parent_active,
        has_else: false,
    });
}

fn directive_elif(pp: &mut Preprocessor, hash_pos: SourcePos) -> Result<()> {
    let frame_has_else = {
        let Some(frame) = pp.cond_stack.last() else {
            return Err(Diagnostic::preprocessor(hash_pos, "#elif without a matching #if"));
        };
        frame.has_else
    };
    if frame_has_else {
        return Err(Diagnostic::preprocessor(hash_pos, "#elif after #else"));
    }

    let (active_parent, taken_ever) = {
        let frame = pp.cond_stack.last().unwrap();
        (frame.active_parent, frame.taken_ever)
    };

    if active_parent && !taken_ever {
        let cond = condexpr::eval_condition(pp)?;
        let taking = cond != 0;
        let frame = pp.cond_stack.last_mut().unwrap();
        frame.taking = taking;
        frame.active = taking;
        frame.taken_ever = taking;
    } else {
        skip_to_eol(pp)?;
        let frame = pp.cond_stack.last_mut().unwrap();
        frame.taking = false;
        frame.active = false;
    }
    Ok(())
}

fn directive_else(pp: &mut Preprocessor, hash_pos: SourcePos) -> Result<()> {
    skip_to_eol(pp)?;
    let Some(frame) = pp.cond_stack.last_mut() else {
        return Err(Diagnostic::preprocessor(hash_pos, "#else without a matching #if"));
    };
    if frame.has_else {
        return Err(Diagnostic::preprocessor(hash_pos, "#else after #else"));
    }
    frame.has_else = true;
    if frame.active_parent && !frame.taken_ever {
        frame.taking = true;
        frame.active = true;
        frame.taken_ever = true;
    } else {
        frame.taking = false;
        frame.active = false;
    }
    Ok(())
}

fn directive_endif(pp: &mut Preprocessor, hash_pos: SourcePos) -> Result<()> {
    skip_to_eol(pp)?;
    if pp.cond_stack.pop().is_none() {
        return Err(Diagnostic::preprocessor(hash_pos, "#endif without a matching #if"));
    }
    Ok(())
}

/// Consume raw tokens through the end of the current physical line,
/// discarding them (used after a directive's meaningful arguments have
/// already been read, to swallow any trailing garbage).
pub(crate) fn skip_to_eol(pp: &mut Preprocessor) -> Result<()> {
    loop {
        let tok = pp.raw_token()?;
        if tok.is_eof() || tok.first_of_line {
            pp.push_front(tok);
            return Ok(());
        }
    }
}

/// Consume and return the raw tokens through the end of the current
/// physical line (used for `#error`'s message and `#if`'s condition).
pub(crate) fn collect_rest_of_line(pp: &mut Preprocessor) -> Result<Vec<Token>> {
    let mut out = Vec::new();
    loop {
        let tok = pp.raw_token()?;
        if tok.is_eof() || (tok.first_of_line && !out.is_empty()) {
            pp.push_front(tok);
            return Ok(out);
        }
        if tok.first_of_line && out.is_empty() {
            pp.push_front(tok);
            return Ok(out);
        }
        out.push(tok);
    }
}
