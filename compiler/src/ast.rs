//! The abstract syntax tree: spec.md §3 "Expression"/"Statement"/"Decl".
//!
//! Generalizes the teacher's `ast.rs` node shapes (each node pairs payload
//! with a `SourceLocation`) to the C grammar: expressions, statements, and
//! top-level declarations (objects, functions, `struct`/`union`/`typedef`).
//! Types named in source (`int`, `struct S *`, `char[4]`) are resolved to
//! `TypeId`s during parsing via the active `TypeTable`, so the AST never
//! carries unresolved type syntax past `parser::decl`.

use crate::pos::SourcePos;
use crate::types::{Constant, TypeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add, Sub, Mul, Div, Mod,
    Shl, Shr,
    Lt, Gt, Le, Ge, Eq, Ne,
    BitAnd, BitXor, BitOr,
    LogAnd, LogOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Plus, Neg, Not, BitNot,
    Deref, Addr,
    PreInc, PreDec, PostInc, PostDec,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SizeofArg {
    Expr(Box<Expr>),
    Type(TypeId),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Const { value: Constant, pos: SourcePos },
    StringLit { bytes: Vec<u8>, pos: SourcePos },
    Ident { name: String, pos: SourcePos },
    Unary { op: UnOp, operand: Box<Expr>, pos: SourcePos },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr>, pos: SourcePos },
    /// `lhs op= rhs`; plain `=` carries `op: None`.
    Assign { op: Option<BinOp>, lhs: Box<Expr>, rhs: Box<Expr>, pos: SourcePos },
    Cond { cond: Box<Expr>, then_branch: Box<Expr>, else_branch: Box<Expr>, pos: SourcePos },
    Call { callee: Box<Expr>, args: Vec<Expr>, pos: SourcePos },
    Member { base: Box<Expr>, field: String, arrow: bool, pos: SourcePos },
    Index { base: Box<Expr>, index: Box<Expr>, pos: SourcePos },
    Cast { ty: TypeId, expr: Box<Expr>, pos: SourcePos },
    Sizeof { arg: SizeofArg, pos: SourcePos },
    Comma { lhs: Box<Expr>, rhs: Box<Expr>, pos: SourcePos },
    /// `(Type){ initializers }` (spec.md §4.3 "compound literal").
    CompoundLiteral { ty: TypeId, init: Vec<Initializer>, pos: SourcePos },
    VaStart { ap: Box<Expr>, last_named: String, pos: SourcePos },
    VaArg { ap: Box<Expr>, ty: TypeId, pos: SourcePos },
    VaEnd { ap: Box<Expr>, pos: SourcePos },
    VaCopy { dst: Box<Expr>, src: Box<Expr>, pos: SourcePos },
}

impl Expr {
    pub fn pos(&self) -> &SourcePos {
        match self {
            Expr::Const { pos, .. }
            | Expr::StringLit { pos, .. }
            | Expr::Ident { pos, .. }
            | Expr::Unary { pos, .. }
            | Expr::Binary { pos, .. }
            | Expr::Assign { pos, .. }
            | Expr::Cond { pos, .. }
            | Expr::Call { pos, .. }
            | Expr::Member { pos, .. }
            | Expr::Index { pos, .. }
            | Expr::Cast { pos, .. }
            | Expr::Sizeof { pos, .. }
            | Expr::Comma { pos, .. }
            | Expr::CompoundLiteral { pos, .. }
            | Expr::VaStart { pos, .. }
            | Expr::VaArg { pos, .. }
            | Expr::VaEnd { pos, .. }
            | Expr::VaCopy { pos, .. } => pos,
        }
    }
}

/// One designated or positional initializer element. Designators
/// (`.field =`, `[index] =`) are resolved to a plain position list by the
/// parser before lowering (spec.md §4.3: IR construction sees only flat,
/// ordered initializer lists).
#[derive(Debug, Clone)]
pub struct Initializer {
    pub field: Option<String>,
    pub index: Option<u64>,
    pub value: InitValue,
}

#[derive(Debug, Clone)]
pub enum InitValue {
    Expr(Expr),
    Nested(Vec<Initializer>),
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub ty: TypeId,
    pub init: Option<Vec<Initializer>>,
    pub is_static: bool,
    pub pos: SourcePos,
    /// Present iff `ty` is a `TypeKind::Vla`: the element-count expression
    /// evaluated at block entry (spec.md GLOSSARY "VLA"). `None` for every
    /// ordinary object.
    pub vla_len: Option<Box<Expr>>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    Decl(Vec<VarDecl>),
    Compound(Vec<Stmt>),
    If { cond: Expr, then_branch: Box<Stmt>, else_branch: Option<Box<Stmt>>, pos: SourcePos },
    While { cond: Expr, body: Box<Stmt>, pos: SourcePos },
    DoWhile { body: Box<Stmt>, cond: Expr, pos: SourcePos },
    For { init: Option<Box<Stmt>>, cond: Option<Expr>, step: Option<Expr>, body: Box<Stmt>, pos: SourcePos },
    Return { value: Option<Expr>, pos: SourcePos },
    Break(SourcePos),
    Continue(SourcePos),
    Switch { scrutinee: Expr, body: Box<Stmt>, pos: SourcePos },
    Case { value: Constant, pos: SourcePos },
    Default(SourcePos),
    Label { name: String, pos: SourcePos },
    Goto { name: String, pos: SourcePos },
    Empty,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeId,
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub ret_ty: TypeId,
    pub params: Vec<Param>,
    pub is_variadic: bool,
    pub body: Vec<Stmt>,
    pub is_static: bool,
    pub pos: SourcePos,
}

#[derive(Debug, Clone)]
pub enum ExternalDecl {
    Function(FunctionDef),
    /// A function declared but not defined here (a prototype, or `extern`).
    FunctionPrototype { name: String, ty: TypeId, pos: SourcePos },
    GlobalVar(VarDecl),
}

#[derive(Debug, Clone, Default)]
pub struct TranslationUnit {
    pub decls: Vec<ExternalDecl>,
}
