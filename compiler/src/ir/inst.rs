//! IR opcodes: spec.md §3 "IR Instruction" and §4.5's opcode catalogue.
//!
//! One Rust enum variant per opcode family, carrying exactly the operands
//! that opcode needs rather than the source's fixed two-operand-plus-union
//! shape (spec.md §9 "Polymorphism": first-class variants, not an integer
//! tag).

use super::{BlockId, VarId};
use crate::types::{Constant, TypeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithDomain {
    /// Signed/unsigned integer of the operands' (already-converted) size.
    Int { unsigned: bool },
    Float,
}

#[derive(Debug, Clone)]
pub enum Inst {
    /// A dispatch-table opcode (spec.md §4.5 "A dispatch table maps simple
    /// arithmetic IR opcodes to a short sequence of assembly templates").
    BinArith { op: ArithOp, domain: ArithDomain, result: VarId, lhs: VarId, rhs: VarId },
    BinaryNot { result: VarId, src: VarId },
    NegateInt { result: VarId, src: VarId },
    NegateFloat { result: VarId, src: VarId },
    BoolCast { result: VarId, src: VarId },
    /// Zero-extending integer cast (widening an already-unsigned value, or
    /// narrowing - both are a plain register-width truncation/zero move).
    IntCastZero { result: VarId, src: VarId },
    /// Sign-extending integer cast (widening a signed value).
    IntCastSign { result: VarId, src: VarId },
    /// float<->double conversion (same "float-ness", different width).
    FloatCast { result: VarId, src: VarId },
    IntFloatCast { result: VarId, src: VarId },
    UintFloatCast { result: VarId, src: VarId },
    FloatIntCast { result: VarId, src: VarId },

    /// Dereference `ptr`, copying `size_of(result)` bytes into `result`.
    Load { result: VarId, ptr: VarId },
    /// Like `Load`, but `ptr` first has `offset` added to it (spec.md's
    /// "part-load ... with offset" - a `get-member` through a pointer).
    LoadPartAddress { result: VarId, ptr: VarId, offset: i32 },
    /// Load from `%rbp + offset` directly (no pointer variable involved;
    /// used for stack-argument and spilled-register reads).
    LoadBaseRelative { result: VarId, offset: i32 },
    /// Store `value`'s bytes at `%rbp + offset` directly.
    StoreBaseRelative { value: VarId, offset: i32 },
    /// Store `value`'s bytes through `ptr`.
    Store { value: VarId, ptr: VarId },
    /// Store `value`'s bytes through `base + offset`.
    StorePartAddress { value: VarId, base: VarId, offset: i32 },
    /// Store `value`'s bytes at `%rsp + offset` (call-argument spill).
    StoreStackRelative { value: VarId, offset: i32 },
    /// Stack-to-stack copy (compound assignment of an aggregate lvalue to
    /// another stack-resident aggregate).
    Copy { dst: VarId, src: VarId },
    /// `result = &var` (of a stack-resident variable).
    AddressOf { result: VarId, var: VarId },
    /// `result = &(*base_ptr).offset` - address of a struct/union member
    /// reached through a pointer (spec.md §4.2 "member access ... on a
    /// pointer, by get-member directly").
    GetMember { result: VarId, base: VarId, offset: i32 },

    /// Materialize a compile-time constant into `result`'s stack slot.
    Constant { result: VarId, value: Constant },
    /// Materialize a compile-time constant through `ptr` (no slot of its
    /// own - used when writing a compound-literal/initializer element).
    ConstantAddress { ptr: VarId, value: Constant },

    SetZeroPtr { ptr: VarId, size: u32 },
    CopyMemory { dst: VarId, src: VarId, size: u32 },

    /// Indirect call through a fixed, non-clobbered scratch register
    /// (spec.md §9 "codegen_call ... a non-clobbered scratch register").
    Call { func: VarId, scratch_reg: u8 },

    /// Move a variable's value into a physical register ahead of a call or
    /// return (spec.md's `set-reg`).
    SetReg { src: VarId, reg: u8, is_sse: bool },
    /// Move a physical register's contents into a variable, after a call
    /// returns or at function entry (spec.md's `get-reg`).
    GetReg { result: VarId, reg: u8, is_sse: bool },
    /// `%rsp += change` (spec.md's call-lowering stack adjustment, and the
    /// Microsoft ABI's shadow-space reservation).
    ModifyStackPointer { change: i32 },

    /// Reserve `size` bytes on the permanent frame, used for C `alloca`.
    /// `save_to_preamble` flags the one slot the VLA-rollback preamble
    /// restores from (spec.md §4.5 "one may be flagged for the preamble").
    Alloc { result: VarId, size: u32, save_to_preamble: bool },
    /// A variable-length-array allocation; `dominance` is assigned by
    /// `codegen::layout` once all VLA-alloc instructions in the function
    /// are known (spec.md §4.5 "vla-alloc: slot-based").
    VlaAlloc { result: VarId, size: VarId, dominance: usize },

    VaStart { result: VarId },
    VaArg { result: VarId, ap: VarId, ty: TypeId },

    /// A two-predecessor phi (spec.md §4.3: "exactly two predecessors are
    /// supported"). Must occupy a prefix of its block (spec.md §3 Basic
    /// block invariant).
    Phi { result: VarId, block_a: BlockId, val_a: VarId, block_b: BlockId, val_b: VarId },
}

/// A basic block's single terminator (spec.md §3 "Basic block" exit
/// variants). `None` here is the placeholder a freshly-opened block starts
/// with; `ir::lower` always replaces it before the block is sealed, and an
/// un-replaced `None` reaching codegen lowers to `ud2` (spec.md §4.5 "Block
/// exits ... None = ud2"), matching an unreachable path rather than
/// panicking.
#[derive(Debug, Clone)]
pub enum Exit {
    None,
    Jump(BlockId),
    If { cond: VarId, block_true: BlockId, block_false: BlockId },
    Switch { cond: VarId, cases: Vec<(i64, BlockId)>, default: Option<BlockId> },
    Return(VarId),
    ReturnZero,
    Unreachable,
}
