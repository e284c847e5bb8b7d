//! Microsoft x64 ABI: spec.md §4.4, grounded in
//! `examples/original_source/src/abi/microsoft.c`.
//!
//! First four arguments in `rcx, rdx, r8, r9` (floats take the same
//! positional slot as an integer would, in an `xmm` register instead -
//! the "slot", not the register file, is shared, matching
//! `ms_data.n_args`/`register_idx` in the original). Aggregates that don't
//! fit a single 1/2/4/8-byte register pass by pointer (`fits_into_reg` in
//! the original). A 32-byte shadow space is reserved above stack arguments.
//! Return in `rax` if it fits a register, else a hidden pointer in `rcx`
//! (`ms_data.returns_address`). `va_list` is a plain pointer one level of
//! indirection deeper than SysV's, advanced 8 bytes per argument
//! (`ms_emit_va_arg`).

use super::{Abi, AbiFunctionData, ArgClass, CallArg};
use crate::asm::{self, Emitter, Operand, Reg};
use crate::diag::Result;
use crate::ir::{FunctionBuilder, Inst, VarId};
use crate::types::{TypeId, TypeTable};

const ARG_REGS: [Reg; 4] = [Reg::Rcx, Reg::Rdx, Reg::R8, Reg::R9];
const SHADOW_SPACE: u32 = 32;
const CALL_SCRATCH_REG: u8 = 10; // r10, not one of the four argument registers

#[derive(Debug, Clone)]
pub struct MsFnData {
    pub is_variadic: bool,
    /// Number of argument slots (0..=4) consumed by named parameters -
    /// `ms_data.n_args` in the original.
    pub n_named_args: u32,
    /// True if the callee receives a hidden destination pointer in `rcx`
    /// for its oversized return value (`ms_data.returns_address`).
    pub returns_address: bool,
}

pub struct Msx64;

fn is_aggregate(types: &TypeTable, ty: TypeId) -> bool {
    use crate::types::TypeKind;
    matches!(types.kind(ty), TypeKind::Struct(_) | TypeKind::Union(_))
}

/// `fits_into_reg` in `microsoft.c`: only power-of-two sizes 1/2/4/8 pass
/// directly in a register; anything else (including a 3- or 5-byte struct)
/// passes by pointer.
fn fits_into_reg(size: u32) -> bool {
    matches!(size, 1 | 2 | 4 | 8)
}

impl Abi for Msx64 {
    fn target_name(&self) -> &'static str {
        "ms"
    }

    fn lower_call(
        &self,
        b: &mut FunctionBuilder,
        types: &TypeTable,
        func: VarId,
        ret_ty: TypeId,
        args: &[CallArg],
        _is_variadic_call: bool,
        _n_named_params: usize,
    ) -> Result<Option<VarId>> {
        let ret_by_ptr = !types.is_void(ret_ty) && types.size_of(ret_ty) > 8 && !fits_into_reg(types.size_of(ret_ty));
        let hidden_ret = if ret_by_ptr { Some(b.new_var(types.size_of(ret_ty))) } else { None };

        // spec.md §4.4 "Call lowering (both ABIs): stack-adjust =
        // max(shadow, round_up(8*n_args, 16))".
        let n_args = args.len() + hidden_ret.is_some() as usize;
        let stack_adjust = (SHADOW_SPACE).max(round_up((n_args as u32) * 8, 16));
        b.push(Inst::ModifyStackPointer { change: -(stack_adjust as i32) });

        let mut slot = 0usize;
        if let Some(dest) = hidden_ret {
            let addr = b.new_var(8);
            b.push(Inst::AddressOf { result: addr, var: dest });
            place(b, slot, addr, false);
            slot += 1;
        }

        for arg in args {
            let (value, is_sse) = if is_aggregate(types, arg.ty) {
                let size = types.size_of(arg.ty);
                if fits_into_reg(size) {
                    let addr = b.new_var(8);
                    b.push(Inst::AddressOf { result: addr, var: arg.var });
                    let chunk = b.new_var(8);
                    b.push(Inst::LoadPartAddress { result: chunk, ptr: addr, offset: 0 });
                    (chunk, false)
                } else {
                    let addr = b.new_var(8);
                    b.push(Inst::AddressOf { result: addr, var: arg.var });
                    (addr, false)
                }
            } else {
                (arg.var, types.is_float(arg.ty))
            };
            place(b, slot, value, is_sse);
            slot += 1;
        }

        b.push(Inst::Call { func, scratch_reg: CALL_SCRATCH_REG });

        let result = if types.is_void(ret_ty) {
            None
        } else if ret_by_ptr {
            hidden_ret
        } else {
            let size = types.size_of(ret_ty);
            let var = b.new_var(size);
            let is_sse = types.is_float(ret_ty);
            b.push(Inst::GetReg { result: var, reg: if is_sse { 0 } else { Reg::Rax as u8 }, is_sse });
            Some(var)
        };

        b.push(Inst::ModifyStackPointer { change: stack_adjust as i32 });
        Ok(result)
    }

    fn new_function(
        &self,
        b: &mut FunctionBuilder,
        types: &TypeTable,
        params: &[TypeId],
        is_variadic: bool,
    ) -> (Vec<VarId>, AbiFunctionData) {
        let mut result = Vec::with_capacity(params.len());
        let mut idx = 0usize;
        for &ty in params {
            if is_aggregate(types, ty) {
                let size = types.size_of(ty);
                if fits_into_reg(size) {
                    let var = b.new_var(size);
                    if idx < ARG_REGS.len() {
                        let chunk = b.new_var(8);
                        b.push(Inst::GetReg { result: chunk, reg: ARG_REGS[idx] as u8, is_sse: false });
                        let addr = b.new_var(8);
                        b.push(Inst::AddressOf { result: addr, var });
                        b.push(Inst::StorePartAddress { value: chunk, base: addr, offset: 0 });
                    } else {
                        b.push(Inst::LoadBaseRelative { result: var, offset: 16 + ((idx as i32) * 8) });
                    }
                    result.push(var);
                } else {
                    let ptr = b.new_var(8);
                    if idx < ARG_REGS.len() {
                        b.push(Inst::GetReg { result: ptr, reg: ARG_REGS[idx] as u8, is_sse: false });
                    } else {
                        b.push(Inst::LoadBaseRelative { result: ptr, offset: 16 + ((idx as i32) * 8) });
                    }
                    let local = b.new_var(size);
                    b.push(Inst::Load { result: local, ptr });
                    result.push(local);
                }
            } else {
                let size = types.size_of(ty);
                let var = b.new_var(size);
                let is_sse = types.is_float(ty);
                if idx < ARG_REGS.len() {
                    b.push(Inst::GetReg { result: var, reg: if is_sse { idx as u8 } else { ARG_REGS[idx] as u8 }, is_sse });
                } else {
                    b.push(Inst::LoadBaseRelative { result: var, offset: 16 + ((idx as i32) * 8) });
                }
                result.push(var);
            }
            idx += 1;
        }

        let data = AbiFunctionData::Ms(MsFnData { is_variadic, n_named_args: idx as u32, returns_address: false });
        (result, data)
    }

    fn lower_return(&self, b: &mut FunctionBuilder, types: &TypeTable, ret_ty: TypeId, value: Option<VarId>) {
        let Some(value) = value else {
            b.set_exit(crate::ir::Exit::ReturnZero);
            return;
        };
        let _ = types;
        b.set_exit(crate::ir::Exit::Return(value));
    }

    fn emit_preamble(&self, em: &mut Emitter, data: &AbiFunctionData, _reg_save_area_offset: Option<i32>) {
        let AbiFunctionData::Ms(d) = data else { return };
        // `ms_emit_function_preamble`: spill the four integer argument
        // registers at `rbp+16..rbp+40` only for a variadic function, so
        // `va_arg` can walk them as if they were ordinary stack arguments.
        if !d.is_variadic {
            return;
        }
        for (i, reg) in ARG_REGS.iter().enumerate() {
            let off = 16 + (i as i32) * 8;
            em.ins2("movq", asm::r8(*reg), Operand::Mem(off, Reg::Rbp));
        }
    }

    fn emit_va_start(&self, em: &mut Emitter, data: &AbiFunctionData, _reg_save_area_offset: Option<i32>, ap_offset: i32) {
        let AbiFunctionData::Ms(d) = data else { return };
        // `ms_emit_va_start`: `leaq n_args*8+16(%rbp), %rax`; `ap` is a
        // plain pointer to the first unnamed stack argument.
        let off = 16 + (d.n_named_args as i32) * 8;
        em.ins2("leaq", Operand::Mem(off, Reg::Rbp), asm::r8(Reg::Rax));
        em.ins2("movq", asm::r8(Reg::Rax), Operand::Mem(ap_offset, Reg::Rbp));
    }

    fn emit_va_arg(&self, em: &mut Emitter, types: &TypeTable, ty: TypeId, ap_offset: i32, result_offset: i32) {
        // `ms_emit_va_arg`: `ap` is one level of indirection deeper than
        // SysV's - dereference, then advance by 8 regardless of the
        // argument's own size (every MS stack slot is pointer-width).
        let _ = (types, ty);
        em.ins2("movq", Operand::Mem(ap_offset, Reg::Rbp), asm::r8(Reg::Rcx));
        em.ins2("movq", Operand::Mem(0, Reg::Rcx), asm::r8(Reg::Rdx));
        em.ins2("movq", asm::r8(Reg::Rdx), Operand::Mem(result_offset, Reg::Rbp));
        em.ins2("addq", Operand::Imm(8), asm::r8(Reg::Rcx));
        em.ins2("movq", asm::r8(Reg::Rcx), Operand::Mem(ap_offset, Reg::Rbp));
    }
}

fn place(b: &mut FunctionBuilder, slot: usize, value: VarId, is_sse: bool) {
    if slot < ARG_REGS.len() {
        b.push(Inst::SetReg { src: value, reg: if is_sse { slot as u8 } else { ARG_REGS[slot] as u8 }, is_sse });
    } else {
        b.push(Inst::StoreStackRelative { value, offset: (slot as i32) * 8 });
    }
}

fn round_up(value: u32, align: u32) -> u32 {
    (value + align - 1) / align * align
}
