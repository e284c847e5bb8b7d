//! Block and variable management primitives: spec.md §4.3 "Provides
//! block-management primitives: new_block, block_start, and macros that
//! push instructions into the current block."
//!
//! Block ids are scoped to one function (the source's global numbering is
//! an implementation detail, not a semantic requirement - spec.md only
//! promises each block "a unique integer id" within the structures that
//! reference it). Assembler labels are qualified with the owning
//! function's name so the final text has no cross-function collisions.

use super::inst::{Exit, Inst};
use super::{BlockId, VarData, VarId, VarStorage};

#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub label: String,
    pub insts: Vec<Inst>,
    pub exit: Exit,
    /// Byte count of this block's non-spanning scratch variables, filled
    /// in by `codegen::layout` (spec.md §4.5 "each block owns a local
    /// counter").
    pub stack_counter: u32,
}

/// Per-function block storage (spec.md §3 Function: "list of block ids").
#[derive(Debug, Default)]
pub struct BlockArena {
    blocks: Vec<Block>,
}

impl BlockArena {
    pub fn new() -> Self {
        BlockArena { blocks: Vec::new() }
    }

    pub fn new_block(&mut self, func_name: &str) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        let label = format!(".L{func_name}_{}", id.0);
        self.blocks.push(Block { id, label, insts: Vec::new(), exit: Exit::None, stack_counter: 0 });
        id
    }

    pub fn get(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0 as usize]
    }

    pub fn ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.iter().map(|b| b.id)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Per-function variable table (spec.md §3 "Variable (IR)").
#[derive(Debug, Default)]
pub struct VarTable {
    vars: Vec<VarData>,
}

impl VarTable {
    pub fn new() -> Self {
        VarTable { vars: Vec::new() }
    }

    pub fn new_var(&mut self, size: u32) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(VarData::new(size));
        id
    }

    pub fn get(&self, id: VarId) -> &VarData {
        &self.vars[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: VarId) -> &mut VarData {
        &mut self.vars[id.0 as usize]
    }

    pub fn ids(&self) -> impl Iterator<Item = VarId> + '_ {
        (0..self.vars.len() as u32).map(VarId)
    }

    pub fn size_of(&self, id: VarId) -> u32 {
        self.vars[id.0 as usize].size
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Builds one function's blocks and variables (spec.md §4.3). Holds the
/// "current block" cursor that every `push_*` helper writes into, and
/// tracks which variable was first referenced in which block so
/// `codegen::layout` can tell a block-local scratch variable from one that
/// spans blocks (spec.md §4.5 "spans_block").
pub struct FunctionBuilder {
    pub name: String,
    pub blocks: BlockArena,
    pub vars: VarTable,
    pub current: BlockId,
    pub entry: BlockId,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut blocks = BlockArena::new();
        let entry = blocks.new_block(&name);
        FunctionBuilder { name, blocks, vars: VarTable::new(), current: entry, entry }
    }

    pub fn new_block(&mut self) -> BlockId {
        self.blocks.new_block(&self.name)
    }

    /// Switch the cursor to `id` (spec.md §4.3 `block_start`). If the
    /// previously current block never got a terminator, it implicitly
    /// falls through to the new one (spec.md §4.3 "if none is set before
    /// the next block starts, the block falls through via implicit jump").
    pub fn block_start(&mut self, id: BlockId) {
        let prev = self.current;
        if matches!(self.blocks.get(prev).exit, Exit::None) && prev != id {
            self.blocks.get_mut(prev).exit = Exit::Jump(id);
        }
        self.current = id;
    }

    pub fn set_exit(&mut self, exit: Exit) {
        self.blocks.get_mut(self.current).exit = exit;
    }

    pub fn has_exit(&self) -> bool {
        !matches!(self.blocks.get(self.current).exit, Exit::None)
    }

    pub fn new_var(&mut self, size: u32) -> VarId {
        let id = self.vars.new_var(size);
        self.touch(id);
        id
    }

    /// Record that `id` was referenced while lowering `self.current`,
    /// marking it as spanning blocks the moment it's touched from a second
    /// one (spec.md §4.5's two-pass stack allocation needs this by the
    /// time a function is fully lowered).
    pub fn touch(&mut self, id: VarId) {
        let block = self.current;
        let data = self.vars.get_mut(id);
        data.used = true;
        match data.first_block {
            None => data.first_block = Some(block),
            Some(b) if b != block => data.spans_block = true,
            _ => {}
        }
    }

    pub fn push(&mut self, inst: Inst) {
        for v in inst_operands(&inst) {
            self.touch(v);
        }
        self.blocks.get_mut(self.current).insts.push(inst);
    }
}

/// Every `VarId` an instruction reads or writes, used to mark
/// span-across-blocks liveness as instructions are pushed.
fn inst_operands(inst: &Inst) -> Vec<VarId> {
    use Inst::*;
    match *inst {
        BinArith { result, lhs, rhs, .. } => vec![result, lhs, rhs],
        BinaryNot { result, src }
        | NegateInt { result, src }
        | NegateFloat { result, src }
        | BoolCast { result, src }
        | IntCastZero { result, src }
        | IntCastSign { result, src }
        | FloatCast { result, src }
        | IntFloatCast { result, src }
        | UintFloatCast { result, src }
        | FloatIntCast { result, src } => vec![result, src],
        Load { result, ptr } => vec![result, ptr],
        LoadPartAddress { result, ptr, .. } => vec![result, ptr],
        LoadBaseRelative { result, .. } => vec![result],
        StoreBaseRelative { value, .. } => vec![value],
        Store { value, ptr } => vec![value, ptr],
        StorePartAddress { value, base, .. } => vec![value, base],
        StoreStackRelative { value, .. } => vec![value],
        Copy { dst, src } => vec![dst, src],
        AddressOf { result, var } => vec![result, var],
        GetMember { result, base, .. } => vec![result, base],
        Constant { result, .. } => vec![result],
        ConstantAddress { ptr, .. } => vec![ptr],
        SetZeroPtr { ptr, .. } => vec![ptr],
        CopyMemory { dst, src, .. } => vec![dst, src],
        Call { func, .. } => vec![func],
        SetReg { src, .. } => vec![src],
        GetReg { result, .. } => vec![result],
        ModifyStackPointer { .. } => vec![],
        Alloc { result, .. } => vec![result],
        VlaAlloc { result, size, .. } => vec![result, size],
        VaStart { result } => vec![result],
        VaArg { result, ap, .. } => vec![result, ap],
        Phi { result, val_a, val_b, .. } => vec![result, val_a, val_b],
    }
}

pub(crate) fn round_up(value: u32, align: u32) -> u32 {
    if align == 0 {
        return value;
    }
    (value + align - 1) / align * align
}

/// Mark a storage class directly, bypassing `touch` - used by codegen's
/// layout pass once it has decided a variable's final frame offset.
pub fn assign_storage(vars: &mut VarTable, id: VarId, storage: VarStorage) {
    vars.get_mut(id).storage = storage;
}
