//! Declarations: spec.md §4.2 "Declarations" (type specifiers, declarators,
//! `struct`/`union`, `typedef`, external definitions).

use super::{expr, stmt, Parser};
use crate::ast::{ExternalDecl, FunctionDef, Initializer, InitValue, Param, TranslationUnit, VarDecl};
use crate::diag::{Diagnostic, Result};
use crate::preprocessor::token::TokenKind;
use crate::symtab::Symbol;
use crate::types::{SimpleKind, TypeId};

pub(crate) struct DeclSpec {
    pub ty_base: TypeId,
    pub is_static: bool,
    pub is_typedef: bool,
}

const QUALIFIERS: &[&str] = &["const", "volatile", "restrict", "inline"];
const SIMPLE_WORDS: &[&str] = &["void", "char", "short", "int", "long", "float", "double", "signed", "unsigned", "_Bool"];

pub(crate) fn at_decl_start(p: &Parser) -> bool {
    let tok = p.peek();
    if tok.kind != TokenKind::Ident {
        return false;
    }
    matches!(tok.text.as_str(), "static" | "extern" | "typedef" | "struct" | "union")
        || QUALIFIERS.contains(&tok.text.as_str())
        || SIMPLE_WORDS.contains(&tok.text.as_str())
        || p.symtab.is_typedef(&tok.text)
}

pub(crate) fn parse_decl_specifiers(p: &mut Parser) -> Result<DeclSpec> {
    let mut is_static = false;
    let mut is_typedef = false;
    let mut words: Vec<String> = Vec::new();
    let mut ty_base: Option<TypeId> = None;

    loop {
        if p.peek().kind != TokenKind::Ident {
            break;
        }
        let text = p.peek().text.clone();
        match text.as_str() {
            "static" => {
                is_static = true;
                p.bump()?;
            }
            "extern" | "auto" | "register" => {
                p.bump()?;
            }
            "typedef" => {
                is_typedef = true;
                p.bump()?;
            }
            _ if QUALIFIERS.contains(&text.as_str()) => {
                p.bump()?;
            }
            "struct" | "union" => {
                ty_base = Some(parse_struct_or_union(p)?);
                break;
            }
            _ if SIMPLE_WORDS.contains(&text.as_str()) => {
                words.push(text);
                p.bump()?;
            }
            _ if words.is_empty() && ty_base.is_none() && p.symtab.is_typedef(&text) => {
                p.bump()?;
                ty_base = Some(match p.symtab.lookup(&text) {
                    Some(Symbol::Typedef { ty }) => *ty,
                    _ => unreachable!(),
                });
                break;
            }
            _ => break,
        }
    }

    let ty_base = match ty_base {
        Some(t) => t,
        None => {
            if words.is_empty() {
                return Err(Diagnostic::parse(p.peek().pos.clone(), "expected a type specifier"));
            }
            p.types.simple(resolve_simple_kind(&words, p)?)
        }
    };

    Ok(DeclSpec { ty_base, is_static, is_typedef })
}

fn resolve_simple_kind(words: &[String], p: &Parser) -> Result<SimpleKind> {
    let unsigned = words.iter().any(|w| w == "unsigned");
    let signed = words.iter().any(|w| w == "signed");
    let long_count = words.iter().filter(|w| w.as_str() == "long").count();
    let base = words.iter().find(|w| matches!(w.as_str(), "void" | "char" | "short" | "int" | "float" | "double" | "_Bool")).map(|s| s.as_str());

    Ok(match base {
        Some("void") => SimpleKind::Void,
        Some("_Bool") => SimpleKind::Bool,
        Some("char") => {
            if unsigned {
                SimpleKind::UChar
            } else if signed {
                SimpleKind::SChar
            } else {
                SimpleKind::Char
            }
        }
        Some("short") => {
            if unsigned {
                SimpleKind::UShort
            } else {
                SimpleKind::Short
            }
        }
        Some("float") => SimpleKind::Float,
        Some("double") => {
            if long_count >= 1 {
                SimpleKind::LDouble
            } else {
                SimpleKind::Double
            }
        }
        Some("int") | None => {
            if long_count >= 2 {
                if unsigned { SimpleKind::ULLong } else { SimpleKind::LLong }
            } else if long_count == 1 {
                if unsigned { SimpleKind::ULong } else { SimpleKind::Long }
            } else if unsigned {
                SimpleKind::UInt
            } else {
                SimpleKind::Int
            }
        }
        _ => return Err(Diagnostic::parse(p.peek().pos.clone(), "unrecognized type specifier combination")),
    })
}

fn parse_struct_or_union(p: &mut Parser) -> Result<TypeId> {
    let is_union = p.at_ident("union");
    p.bump()?; // `struct` or `union`

    let tag = if p.peek().kind == TokenKind::Ident {
        Some(p.bump()?.text)
    } else {
        None
    };

    if p.at_punct("{") {
        p.bump()?;
        let id = match tag.as_ref().and_then(|t| p.symtab.lookup_tag(t)) {
            Some(existing) if !p.types.aggregate(existing).complete => existing,
            _ => p.types.new_aggregate(tag.clone(), is_union),
        };
        if let Some(t) = &tag {
            p.symtab.declare_tag(t.clone(), id);
        }

        let mut members = Vec::new();
        while !p.at_punct("}") {
            let spec = parse_decl_specifiers(p)?;
            loop {
                let decl = parse_declarator(p, spec.ty_base)?;
                members.push((decl.name, decl.ty));
                if p.at_punct(",") {
                    p.bump()?;
                    continue;
                }
                break;
            }
            p.expect_punct(";")?;
        }
        p.expect_punct("}")?;
        p.types.complete_aggregate(id, members);
        return Ok(id);
    }

    let tag = tag.ok_or_else(|| Diagnostic::parse(p.peek().pos.clone(), "expected a tag name or '{' after struct/union"))?;
    if let Some(id) = p.symtab.lookup_tag(&tag) {
        Ok(id)
    } else {
        let id = p.types.new_aggregate(Some(tag.clone()), is_union);
        p.symtab.declare_tag(tag, id);
        Ok(id)
    }
}

pub(crate) struct Declarator {
    pub name: String,
    pub ty: TypeId,
    pub is_function: bool,
    pub params: Vec<Param>,
    pub is_variadic: bool,
    /// Set when this declarator's outermost array dimension was a
    /// non-constant expression (spec.md GLOSSARY "VLA"); `ty` is then a
    /// `TypeKind::Vla` rather than `TypeKind::Array`.
    pub vla_len: Option<Box<crate::ast::Expr>>,
}

pub(crate) fn parse_declarator(p: &mut Parser, base: TypeId) -> Result<Declarator> {
    let mut ty = base;
    while p.at_punct("*") {
        p.bump()?;
        while QUALIFIERS.contains(&p.peek().text.as_str()) && p.peek().kind == TokenKind::Ident {
            p.bump()?;
        }
        ty = p.types.pointer_to(ty);
    }
    parse_direct_declarator(p, ty)
}

fn parse_direct_declarator(p: &mut Parser, ty: TypeId) -> Result<Declarator> {
    let name = if p.peek().kind == TokenKind::Ident {
        p.bump()?.text
    } else if p.at_punct("(") {
        // A parenthesized nested declarator (e.g. around a function-pointer
        // declarator). This subset does not reconstruct the inner type
        // shape beyond the name it binds - acceptable for the straight-line
        // object/function declarators spec.md's scenarios need.
        p.bump()?;
        let inner = parse_declarator(p, ty)?;
        p.expect_punct(")")?;
        return Ok(inner);
    } else {
        return Err(Diagnostic::parse(p.peek().pos.clone(), "expected a declarator name"));
    };

    if p.at_punct("[") {
        let mut dims: Vec<ArrayDim> = Vec::new();
        while p.at_punct("[") {
            p.bump()?;
            if p.at_punct("]") {
                dims.push(ArrayDim::Incomplete);
            } else {
                dims.push(parse_array_dim(p)?);
            }
            p.expect_punct("]")?;
        }
        // Only the outermost (leftmost) dimension may be a runtime
        // expression (spec.md GLOSSARY "VLA"; `int a[n][4]` is a VLA of
        // 4-element rows, `int a[4][n]` is not representable by this
        // subset's single-slot `VlaAlloc`).
        let vla_len = match dims.first() {
            Some(ArrayDim::Runtime(_)) if dims.len() > 1 => {
                return Err(Diagnostic::parse(
                    p.peek().pos.clone(),
                    "only the outermost array dimension may be variable-length",
                ));
            }
            Some(ArrayDim::Runtime(e)) => Some(e.clone()),
            _ => None,
        };
        let mut elem = ty;
        for (i, dim) in dims.into_iter().enumerate().rev() {
            elem = match dim {
                ArrayDim::Const(n) => p.types.array_of(elem, n),
                ArrayDim::Incomplete => p.types.incomplete_array_of(elem),
                // The outermost slot's element type stands in for the VLA
                // itself; wrapped in `vla_of` below once the loop reaches i==0.
                ArrayDim::Runtime(_) if i == 0 => elem,
                ArrayDim::Runtime(_) => unreachable!("non-leading runtime dimension rejected above"),
            };
        }
        if vla_len.is_some() {
            elem = p.types.vla_of(elem);
        }
        return Ok(Declarator { name, ty: elem, is_function: false, params: Vec::new(), is_variadic: false, vla_len });
    }

    if p.at_punct("(") {
        p.bump()?;
        let (params, is_variadic) = parse_param_list(p)?;
        return Ok(Declarator { name, ty, is_function: true, params, is_variadic, vla_len: None });
    }

    Ok(Declarator { name, ty, is_function: false, params: Vec::new(), is_variadic: false, vla_len: None })
}

enum ArrayDim {
    Const(u64),
    Incomplete,
    Runtime(Box<crate::ast::Expr>),
}

/// A `[`...`]` array dimension: a constant expression (the common case) or,
/// inside a function body, a runtime expression (a VLA bound).
fn parse_array_dim(p: &mut Parser) -> Result<ArrayDim> {
    let value = expr::parse_assignment(p)?;
    match value {
        crate::ast::Expr::Const { value: crate::types::Constant::Typed { bits, .. }, .. } => Ok(ArrayDim::Const(bits)),
        other => Ok(ArrayDim::Runtime(Box::new(other))),
    }
}

/// C11 §6.7.6.3p7: a parameter of array (or VLA) type is adjusted to a
/// pointer to the element type, the same decay `ir::lower` applies to array
/// expressions (spec.md §4.2's array-to-pointer decay, here at declaration
/// time rather than use time since a parameter's "array-ness" never
/// resurfaces - `sizeof` on a parameter already sees the pointer).
fn decay_param_type(p: &mut Parser, ty: TypeId) -> TypeId {
    use crate::types::TypeKind;
    match p.types.kind(ty) {
        TypeKind::Array(_) | TypeKind::Vla | TypeKind::IncompleteArray => {
            let elem = p.types.pointee(ty).unwrap();
            p.types.pointer_to(elem)
        }
        _ => ty,
    }
}

fn parse_param_list(p: &mut Parser) -> Result<(Vec<Param>, bool)> {
    let mut params = Vec::new();
    let mut variadic = false;

    if p.at_punct(")") {
        p.bump()?;
        return Ok((params, variadic));
    }
    if p.at_ident("void") {
        // Look ahead: bare `(void)` means zero parameters.
        p.bump()?;
        if p.at_punct(")") {
            p.bump()?;
            return Ok((params, variadic));
        }
        // `void` started a real parameter's type (e.g. `void *p`); fall
        // through treating it as the first parameter's base type.
        let decl = parse_declarator(p, p.types.void())?;
        params.push(Param { name: decl.name, ty: decay_param_type(p, decl.ty) });
    }

    loop {
        if p.at_punct(")") {
            break;
        }
        if p.at_punct("...") {
            p.bump()?;
            variadic = true;
            break;
        }
        let spec = parse_decl_specifiers(p)?;
        let decl = if p.at_punct(",") || p.at_punct(")") {
            Declarator { name: String::new(), ty: spec.ty_base, is_function: false, params: Vec::new(), is_variadic: false, vla_len: None }
        } else {
            parse_declarator(p, spec.ty_base)?
        };
        params.push(Param { name: decl.name, ty: decay_param_type(p, decl.ty) });
        if p.at_punct(",") {
            p.bump()?;
            continue;
        }
        break;
    }
    p.expect_punct(")")?;
    Ok((params, variadic))
}

pub(crate) fn parse_external_decl(p: &mut Parser, unit: &mut TranslationUnit) -> Result<()> {
    if p.at_punct(";") {
        p.bump()?;
        return Ok(());
    }

    let pos = p.peek().pos.clone();
    let spec = parse_decl_specifiers(p)?;

    if p.at_punct(";") {
        p.bump()?;
        return Ok(());
    }

    let mut decl = parse_declarator(p, spec.ty_base)?;

    if decl.is_function {
        let param_types: Vec<TypeId> = decl.params.iter().map(|pr| pr.ty).collect();
        let fn_ty = p.types.function_of(decl.ty, &param_types, decl.is_variadic);
        p.symtab.declare(decl.name.clone(), Symbol::Function { ty: fn_ty, is_variadic: decl.is_variadic });

        if p.at_punct("{") {
            p.symtab.push_scope();
            for param in &decl.params {
                p.symtab.declare(param.name.clone(), Symbol::Local { ty: param.ty });
            }
            let body = stmt::parse_compound(p)?;
            p.symtab.pop_scope();
            unit.decls.push(ExternalDecl::Function(FunctionDef {
                name: decl.name,
                ret_ty: decl.ty,
                params: decl.params,
                is_variadic: decl.is_variadic,
                body,
                is_static: spec.is_static,
                pos,
            }));
        } else {
            p.expect_punct(";")?;
            unit.decls.push(ExternalDecl::FunctionPrototype { name: decl.name, ty: fn_ty, pos });
        }
        return Ok(());
    }

    loop {
        let init = if p.at_punct("=") {
            p.bump()?;
            Some(parse_initializer(p)?)
        } else {
            None
        };

        if spec.is_typedef {
            p.symtab.declare(decl.name.clone(), Symbol::Typedef { ty: decl.ty });
        } else {
            if decl.vla_len.is_some() {
                return Err(Diagnostic::semantic(pos, "variable-length array declared at file scope"));
            }
            p.symtab.declare(decl.name.clone(), Symbol::Global { ty: decl.ty });
            unit.decls.push(ExternalDecl::GlobalVar(VarDecl { name: decl.name, ty: decl.ty, init, is_static: spec.is_static, pos: pos.clone(), vla_len: None }));
        }

        if p.at_punct(",") {
            p.bump()?;
            decl = parse_declarator(p, spec.ty_base)?;
            continue;
        }
        break;
    }
    p.expect_punct(";")?;
    Ok(())
}

/// A local declaration inside a function body (spec.md §4.2): same
/// specifier/declarator grammar as file scope, minus function
/// definitions, which C doesn't allow to nest.
pub(crate) fn parse_local_decl(p: &mut Parser) -> Result<Vec<VarDecl>> {
    let pos = p.peek().pos.clone();
    let spec = parse_decl_specifiers(p)?;
    let mut out = Vec::new();
    loop {
        let decl = parse_declarator(p, spec.ty_base)?;
        let init = if p.at_punct("=") {
            p.bump()?;
            Some(parse_initializer(p)?)
        } else {
            None
        };
        if spec.is_typedef {
            p.symtab.declare(decl.name, Symbol::Typedef { ty: decl.ty });
        } else {
            p.symtab.declare(decl.name.clone(), Symbol::Local { ty: decl.ty });
            out.push(VarDecl { name: decl.name, ty: decl.ty, init, is_static: spec.is_static, pos: pos.clone(), vla_len: decl.vla_len });
        }
        if p.at_punct(",") {
            p.bump()?;
            continue;
        }
        break;
    }
    p.expect_punct(";")?;
    Ok(out)
}

pub(crate) fn parse_initializer(p: &mut Parser) -> Result<Vec<Initializer>> {
    if p.at_punct("{") {
        parse_braced_initializer_list(p)
    } else {
        let value = expr::parse_assignment(p)?;
        Ok(vec![Initializer { field: None, index: None, value: InitValue::Expr(value) }])
    }
}

fn parse_braced_initializer_list(p: &mut Parser) -> Result<Vec<Initializer>> {
    p.expect_punct("{")?;
    let mut items = Vec::new();
    while !p.at_punct("}") {
        let field = if p.at_punct(".") {
            p.bump()?;
            let name = p.expect_ident()?.text;
            p.expect_punct("=")?;
            Some(name)
        } else {
            None
        };
        let index = if p.at_punct("[") {
            p.bump()?;
            let tok = p.bump()?;
            let n: u64 = tok.text.parse().map_err(|_| Diagnostic::parse(tok.pos.clone(), "expected an integer array-designator index"))?;
            p.expect_punct("]")?;
            p.expect_punct("=")?;
            Some(n)
        } else {
            None
        };
        let value = if p.at_punct("{") {
            InitValue::Nested(parse_braced_initializer_list(p)?)
        } else {
            InitValue::Expr(expr::parse_assignment(p)?)
        };
        items.push(Initializer { field, index, value });
        if p.at_punct(",") {
            p.bump()?;
            continue;
        }
        break;
    }
    p.expect_punct("}")?;
    Ok(items)
}
