//! spec.md §3 "Function" and the whole-translation-unit container that
//! `ir::lower` produces and `codegen` consumes.

use super::builder::{BlockArena, VarTable};
use super::BlockId;
use crate::abi::AbiFunctionData;
use crate::types::TypeId;

/// spec.md §3 "Function. Name, external-linkage flag, list of block ids,
/// list of variables, and an opaque ABI-data pointer whose layout is
/// defined by the active ABI."
pub struct Function {
    pub name: String,
    pub is_global: bool,
    pub blocks: BlockArena,
    pub vars: VarTable,
    pub entry: BlockId,
    pub abi_data: AbiFunctionData,
    /// The C return type, needed only by `codegen::emit` to classify how a
    /// `Exit::Return` value is placed into registers - everything upstream
    /// of codegen already resolved calls/returns through the `Abi` trait.
    pub ret_ty: TypeId,
}

/// A file-scope object (spec.md §4.2's `GlobalVar`, lowered out of the AST
/// the same way a local's initializer is, but materialized into `.data`/
/// `.bss` text instead of IR stores).
pub struct GlobalVar {
    pub name: String,
    pub ty: TypeId,
    pub is_global: bool,
    /// Flattened initial bytes, one entry per byte offset that has an
    /// explicit initializer; offsets with no entry are zero-initialized
    /// (`.bss`, or explicit zero fill in `.data`).
    pub init: Option<Vec<u8>>,
}

/// The whole translation unit after IR construction: spec.md §2's "functions
/// of basic blocks", plus the program-wide data `codegen` needs to emit
/// alongside them (string literal rodata, global variables).
#[derive(Default)]
pub struct Program {
    pub functions: Vec<Function>,
    pub globals: Vec<GlobalVar>,
    /// `(label, bytes)` for every string literal encountered during
    /// lowering, emitted to `.rodata` (spec.md §4.6).
    pub string_literals: Vec<(String, Vec<u8>)>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }
}
