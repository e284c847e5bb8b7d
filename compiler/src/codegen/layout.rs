//! Stack-frame layout: spec.md §4.5 "Stack layout per function".
//!
//! Two passes over an already-lowered `Function`: first every variable
//! whose live range spans more than one block gets a permanent slot, then
//! the remaining block-local scratch variables are packed into a single
//! overlap region sized to the largest block's total (spec.md "Per-block
//! scratch variables overlap ... the frame reserves max(block.counter)
//! bytes"). VLA tracking slots and `alloca` data regions sit between the
//! two, in the order spec.md lists them.

use crate::abi::AbiFunctionData;
use crate::ir::{assign_storage, BlockId, Function, Inst, VarId, VarStorage};
use std::collections::HashMap;

pub struct FrameLayout {
    pub frame_size: u32,
    /// Offset of the SysV register-save area, if this function is variadic.
    pub reg_save_area_offset: Option<i32>,
    /// Byte offset of each VLA's rsp-cache slot, keyed by dominance index.
    pub vla_slot_offset: HashMap<usize, i32>,
    /// Byte offset of the raw data region each `Inst::Alloc` reserves,
    /// keyed by the instruction's own result variable.
    pub alloca_data_offset: HashMap<VarId, i32>,
}

fn round_up(value: u32, align: u32) -> u32 {
    if align == 0 {
        value
    } else {
        (value + align - 1) / align * align
    }
}

pub fn layout_function(func: &mut Function) -> FrameLayout {
    // The register-save area is read by `emit_preamble`/`emit_va_arg`
    // directly through a stack offset, never through an IR instruction, so
    // the ordinary touch-based `spans_block` heuristic never sees it; force
    // a permanent slot here instead.
    if let AbiFunctionData::SysV(d) = &func.abi_data {
        if let Some(rsa) = d.reg_save_area {
            func.vars.get_mut(rsa).spans_block = true;
        }
    }

    let mut vla_dominances: Vec<usize> = Vec::new();
    let mut alloca_insts: Vec<(VarId, u32)> = Vec::new();
    for id in func.blocks.ids() {
        for inst in &func.blocks.get(id).insts {
            match inst {
                Inst::VlaAlloc { dominance, .. } => {
                    if !vla_dominances.contains(dominance) {
                        vla_dominances.push(*dominance);
                    }
                }
                Inst::Alloc { result, size, .. } => alloca_insts.push((*result, *size)),
                _ => {}
            }
        }
    }
    vla_dominances.sort_unstable();

    let mut cursor: i32 = 0;

    let mut permanent: Vec<VarId> =
        func.vars.ids().filter(|&v| func.vars.get(v).used && func.vars.get(v).spans_block).collect();
    permanent.sort_unstable();
    for v in permanent {
        let size = func.vars.size_of(v).max(1);
        cursor -= round_up(size, 8) as i32;
        assign_storage(&mut func.vars, v, VarStorage::Stack(cursor));
    }

    let mut vla_slot_offset = HashMap::new();
    for d in vla_dominances {
        cursor -= 8;
        vla_slot_offset.insert(d, cursor);
    }

    let mut alloca_data_offset = HashMap::new();
    for (result, size) in alloca_insts {
        cursor -= round_up(size.max(1), 8) as i32;
        alloca_data_offset.insert(result, cursor);
    }

    // Block-local scratch region: every used, non-spanning variable packs
    // into its owning block's slice of one shared overlap region.
    let mut per_block: HashMap<BlockId, Vec<VarId>> = HashMap::new();
    for v in func.vars.ids() {
        let data = func.vars.get(v);
        if data.used && !data.spans_block {
            if let Some(block) = data.first_block {
                per_block.entry(block).or_default().push(v);
            }
        }
    }

    let mut max_bytes: u32 = 0;
    let mut laid_out: Vec<(BlockId, Vec<(VarId, i32)>, u32)> = Vec::with_capacity(per_block.len());
    for (block, mut vars) in per_block {
        vars.sort_unstable();
        let mut local_cursor: i32 = 0;
        let mut offsets = Vec::with_capacity(vars.len());
        for v in vars {
            let size = func.vars.size_of(v).max(1);
            local_cursor -= round_up(size, 8) as i32;
            offsets.push((v, local_cursor));
        }
        let bytes = (-local_cursor) as u32;
        max_bytes = max_bytes.max(bytes);
        laid_out.push((block, offsets, bytes));
    }

    cursor -= max_bytes as i32;
    let overlap_base = cursor;
    for (block, offsets, bytes) in laid_out {
        func.blocks.get_mut(block).stack_counter = bytes;
        for (v, local_off) in offsets {
            assign_storage(&mut func.vars, v, VarStorage::Stack(overlap_base + local_off));
        }
    }

    let reg_save_area_offset = match &func.abi_data {
        AbiFunctionData::SysV(d) => d.reg_save_area.map(|v| match func.vars.get(v).storage {
            VarStorage::Stack(off) => off,
            VarStorage::Unassigned => 0,
        }),
        AbiFunctionData::Ms(_) => None,
    };

    FrameLayout {
        frame_size: round_up((-cursor) as u32, 16),
        reg_save_area_offset,
        vla_slot_offset,
        alloca_data_offset,
    }
}
