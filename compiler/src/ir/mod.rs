//! The three-address IR: spec.md §3 "Variable (IR)" / "IR Instruction" /
//! "Basic block" / "Function", and §4.3 "IR and control-flow construction".
//!
//! A block-structured, phi-capable (but phi-free in the optimizing sense -
//! no optimization passes run over it) representation. Every node is
//! tagged sum type rather than the source's integer-tag-plus-union, so an
//! unhandled `Inst`/`Exit` variant is a compile error in `codegen`
//! (spec.md §9 "Polymorphism").

pub mod builder;
pub mod function;
pub mod inst;
pub mod lower;

pub use builder::{assign_storage, BlockArena, FunctionBuilder, VarTable};
pub use function::{Function, GlobalVar, Program};
pub use inst::{Exit, Inst};

/// An id into a function's variable table (spec.md §3 "Variable (IR): an
/// integer id").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

/// An id into the program's block arena. Unique across the whole
/// translation unit, not just within one function (spec.md §3 "Basic
/// block: each block has a unique integer id").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Where a variable ultimately lives, resolved by `codegen::layout`
/// (spec.md §3 "storage class (stack slot after codegen)"). Every variable
/// in this subset lives on the stack - there is no register allocation
/// beyond the fixed scratch scheme (spec.md "Explicit non-goals").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarStorage {
    Unassigned,
    /// Byte offset below `%rbp` (i.e. the operand of `-N(%rbp)`).
    Stack(i32),
}

#[derive(Debug, Clone)]
pub struct VarData {
    pub size: u32,
    /// True if this variable is live across more than one basic block, in
    /// which case it gets a permanent frame slot rather than overlapping
    /// with other blocks' scratch variables (spec.md §4.5 "Stack layout
    /// per function").
    pub spans_block: bool,
    pub used: bool,
    pub first_block: Option<BlockId>,
    pub storage: VarStorage,
}

impl VarData {
    fn new(size: u32) -> Self {
        VarData { size, spans_block: false, used: false, first_block: None, storage: VarStorage::Unassigned }
    }
}
