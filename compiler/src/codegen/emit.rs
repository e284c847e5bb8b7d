//! Assembly emission: spec.md §4.5 "Codegen" - walks each function's blocks
//! in order, translating one IR instruction or block exit at a time into
//! the `asm::Emitter` text layer. Grounded in
//! `examples/original_source/src/codegen.c`'s per-opcode dispatch, reshaped
//! around a Rust `match` over `Inst`/`Exit` instead of a switch over an
//! integer tag (spec.md §9 "Polymorphism").

use super::layout::FrameLayout;
use crate::abi::Abi;
use crate::asm::{self, Emitter, Operand, Reg, Section};
use crate::config::{CodeModel, CompilerConfig};
use crate::diag::{Diagnostic, Result};
use crate::ir::builder::VarTable;
use crate::ir::function::GlobalVar;
use crate::ir::inst::ArithOp;
use crate::ir::{BlockArena, BlockId, Exit, Function, Inst, VarId, VarStorage};
use crate::pos::SourcePos;
use crate::types::{Constant, TypeId, TypeKind, TypeTable};

fn mem(off: i32) -> Operand {
    Operand::Mem(off, Reg::Rbp)
}

fn suffix(size: u32) -> &'static str {
    match size {
        1 => "b",
        2 => "w",
        4 => "l",
        _ => "q",
    }
}

fn mov_mnemonic(size: u32) -> &'static str {
    match size {
        1 => "movb",
        2 => "movw",
        4 => "movl",
        _ => "movq",
    }
}

fn test_mnemonic(size: u32) -> &'static str {
    match size {
        1 => "testb",
        2 => "testw",
        4 => "testl",
        _ => "testq",
    }
}

fn cmp_mnemonic(size: u32) -> &'static str {
    match size {
        1 => "cmpb",
        2 => "cmpw",
        4 => "cmpl",
        _ => "cmpq",
    }
}

fn cqto_for(size: u32) -> &'static str {
    if size > 4 {
        "cqto"
    } else {
        "cltd"
    }
}

/// Round a byte count up to the nearest register width this MVP moves in
/// one instruction (1/2/4/8); aggregate-sized values go through
/// `move_bytes`'s `rep movsb` path instead and never reach this helper.
fn reg_width(size: u32) -> u32 {
    match size {
        0 | 1 => 1,
        2 => 2,
        3 | 4 => 4,
        _ => 8,
    }
}

fn ice(message: impl Into<String>) -> Diagnostic {
    Diagnostic::ice(SourcePos::synthetic(), message)
}

fn offset_of(vars: &VarTable, id: VarId) -> Result<i32> {
    match vars.get(id).storage {
        VarStorage::Stack(off) => Ok(off),
        VarStorage::Unassigned => Err(ice(format!("{id:?} reached codegen without a frame slot"))),
    }
}

/// Move `size` bytes from `src_off(%rbp)` to `dst_off(%rbp)` via a scratch
/// register, or `rep movsb` for anything bigger than a register (spec.md
/// §4.5 opcodes `Copy`/`CopyMemory`).
fn move_bytes(em: &mut Emitter, src_off: i32, dst_off: i32, size: u32) {
    if size <= 8 {
        let sz = reg_width(size);
        em.ins2(mov_mnemonic(sz), mem(src_off), asm::reg_sized(Reg::Rax, sz));
        em.ins2(mov_mnemonic(sz), asm::reg_sized(Reg::Rax, sz), mem(dst_off));
    } else {
        em.ins2("leaq", mem(src_off), asm::r8(Reg::Rsi));
        em.ins2("leaq", mem(dst_off), asm::r8(Reg::Rdi));
        em.ins2("movl", Operand::Imm(size as i64), asm::r4(Reg::Rcx));
        em.ins0("rep movsb");
    }
}

fn copy_var(em: &mut Emitter, vars: &VarTable, dst: VarId, src: VarId) -> Result<()> {
    let size = vars.size_of(dst).max(vars.size_of(src)).max(1);
    move_bytes(em, offset_of(vars, src)?, offset_of(vars, dst)?, size);
    Ok(())
}

/// Copy every phi at the head of `succ` whose matching predecessor is
/// `pred` into its result slot. Must run at the *edge* into `succ` (at the
/// end of the jumping/branching predecessor), never at the phi site
/// itself, since `succ` has two predecessors and only one edge is live on
/// a given pass (spec.md §4.3 "exactly two predecessors are supported").
fn resolve_phis(em: &mut Emitter, vars: &VarTable, blocks: &BlockArena, pred: BlockId, succ: BlockId) -> Result<()> {
    for inst in &blocks.get(succ).insts {
        let Inst::Phi { result, block_a, val_a, block_b, val_b } = inst else { break };
        if *block_a == pred {
            copy_var(em, vars, *result, *val_a)?;
        } else if *block_b == pred {
            copy_var(em, vars, *result, *val_b)?;
        }
    }
    Ok(())
}

pub fn emit_program(program: &mut crate::ir::Program, types: &TypeTable, abi: &dyn Abi, config: &CompilerConfig) -> Result<String> {
    let mut em = Emitter::new(config.half_assemble);

    if !program.string_literals.is_empty() {
        em.section(Section::Rodata);
        for (label, bytes) in &program.string_literals {
            em.label(label, false);
            emit_byte_data(&mut em, bytes);
        }
    }

    for g in &program.globals {
        emit_global(&mut em, types, g);
    }

    for func in &mut program.functions {
        let frame = super::layout::layout_function(func);
        emit_function(&mut em, func, types, abi, &frame, config)?;
    }

    Ok(em.finish())
}

fn emit_byte_data(em: &mut Emitter, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    let vals: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
    em.directive(format!("\t.byte {}", vals.join(",")));
}

fn emit_global(em: &mut Emitter, types: &TypeTable, g: &GlobalVar) {
    let size = types.size_of(g.ty).max(1);
    match &g.init {
        Some(bytes) if bytes.iter().any(|&b| b != 0) => {
            em.section(Section::Data);
            em.label(&g.name, g.is_global);
            emit_byte_data(em, bytes);
        }
        _ => {
            em.section(Section::Bss);
            em.label(&g.name, g.is_global);
            em.directive(format!("\t.zero {size}"));
        }
    }
}

pub fn emit_function(em: &mut Emitter, func: &Function, types: &TypeTable, abi: &dyn Abi, frame: &FrameLayout, config: &CompilerConfig) -> Result<()> {
    em.section(Section::Text);
    em.label(&func.name, func.is_global);
    em.ins1("pushq", asm::r8(Reg::Rbp));
    em.ins2("movq", asm::r8(Reg::Rsp), asm::r8(Reg::Rbp));
    if frame.frame_size > 0 {
        em.ins2("subq", Operand::Imm(frame.frame_size as i64), asm::r8(Reg::Rsp));
    }
    abi.emit_preamble(em, &func.abi_data, frame.reg_save_area_offset);

    let epilogue_label = format!(".Lepilogue_{}", func.name);

    for block_id in func.blocks.ids() {
        let block = func.blocks.get(block_id);
        em.label(&block.label, false);
        for inst in &block.insts {
            if matches!(inst, Inst::Phi { .. }) {
                continue;
            }
            emit_inst(em, func, types, frame, config, abi, inst)?;
        }
        emit_exit(em, func, types, abi, block_id, &epilogue_label)?;
    }

    em.label(&epilogue_label, false);
    em.ins0("leave");
    em.ins0("ret");
    Ok(())
}

fn emit_exit(em: &mut Emitter, func: &Function, types: &TypeTable, abi: &dyn Abi, block_id: BlockId, epilogue_label: &str) -> Result<()> {
    let vars = &func.vars;
    let blocks = &func.blocks;
    match &blocks.get(block_id).exit {
        Exit::None | Exit::Unreachable => {
            em.ins0("ud2");
            Ok(())
        }
        Exit::Jump(target) => {
            resolve_phis(em, vars, blocks, block_id, *target)?;
            em.directive(format!("\tjmp\t{}", blocks.get(*target).label));
            Ok(())
        }
        Exit::If { cond, block_true, block_false } => {
            let size = reg_width(vars.size_of(*cond));
            let off = offset_of(vars, *cond)?;
            em.ins2(mov_mnemonic(size), mem(off), asm::reg_sized(Reg::Rax, size));
            em.ins2(test_mnemonic(size), asm::reg_sized(Reg::Rax, size), asm::reg_sized(Reg::Rax, size));
            let false_label = format!(".Lif_false_{}_{}", func.name, block_id.0);
            em.directive(format!("\tje\t{false_label}"));
            resolve_phis(em, vars, blocks, block_id, *block_true)?;
            em.directive(format!("\tjmp\t{}", blocks.get(*block_true).label));
            em.label(&false_label, false);
            resolve_phis(em, vars, blocks, block_id, *block_false)?;
            em.directive(format!("\tjmp\t{}", blocks.get(*block_false).label));
            Ok(())
        }
        Exit::Switch { cond, cases, default } => {
            let size = reg_width(vars.size_of(*cond));
            let off = offset_of(vars, *cond)?;
            em.ins2(mov_mnemonic(size), mem(off), asm::reg_sized(Reg::Rax, size));
            let mut stubs: Vec<(String, BlockId)> = Vec::new();
            for (i, (value, target)) in cases.iter().enumerate() {
                let stub = format!(".Lcase_{}_{}_{}", func.name, block_id.0, i);
                em.ins2(cmp_mnemonic(size), Operand::Imm(*value), asm::reg_sized(Reg::Rax, size));
                em.directive(format!("\tje\t{stub}"));
                stubs.push((stub, *target));
            }
            match default {
                Some(target) => {
                    let stub = format!(".Lcase_default_{}_{}", func.name, block_id.0);
                    em.directive(format!("\tjmp\t{stub}"));
                    stubs.push((stub, *target));
                }
                None => em.ins0("ud2"),
            }
            for (stub, target) in stubs {
                em.label(&stub, false);
                resolve_phis(em, vars, blocks, block_id, target)?;
                em.directive(format!("\tjmp\t{}", blocks.get(target).label));
            }
            Ok(())
        }
        Exit::ReturnZero => {
            em.ins2("xorl", asm::r4(Reg::Rax), asm::r4(Reg::Rax));
            em.directive(format!("\tjmp\t{epilogue_label}"));
            Ok(())
        }
        Exit::Return(value) => {
            emit_return_value(em, vars, types, abi, func.ret_ty, *value)?;
            em.directive(format!("\tjmp\t{epilogue_label}"));
            Ok(())
        }
    }
}

/// Place `value` (of the function's own return type) into the register(s)
/// the active ABI returns through. SysV aggregates up to 16 bytes split
/// across `rax`/`rdx`; this MVP classifies purely by size (spec.md §4.4's
/// documented simplification already accepted in `abi::sysv` for call
/// lowering - an all-integer/memory split, never a mixed SSE eightbyte).
fn emit_return_value(em: &mut Emitter, vars: &VarTable, types: &TypeTable, abi: &dyn Abi, ret_ty: TypeId, value: VarId) -> Result<()> {
    if types.is_void(ret_ty) {
        return Ok(());
    }
    let off = offset_of(vars, value)?;
    match types.kind(ret_ty) {
        TypeKind::Simple(s) if s.is_float() => {
            let size = types.size_of(ret_ty);
            let mn = if size == 4 { "movss" } else { "movsd" };
            em.ins2(mn, mem(off), Operand::Xmm(0));
            Ok(())
        }
        TypeKind::Struct(_) | TypeKind::Union(_) => {
            let size = types.size_of(ret_ty);
            if size <= 8 {
                let sz = reg_width(size);
                em.ins2(mov_mnemonic(sz), mem(off), asm::reg_sized(Reg::Rax, sz));
                Ok(())
            } else if size <= 16 && abi.target_name() == "sysv" {
                em.ins2("movq", mem(off), asm::r8(Reg::Rax));
                em.ins2("movq", mem(off + 8), asm::r8(Reg::Rdx));
                Ok(())
            } else {
                Err(ice(format!("returning a {size}-byte aggregate by value from the `{}` target is not supported", abi.target_name())))
            }
        }
        _ => {
            let size = reg_width(vars.size_of(value));
            em.ins2(mov_mnemonic(size), mem(off), asm::reg_sized(Reg::Rax, size));
            Ok(())
        }
    }
}

fn setcc(op: ArithOp, unsigned: bool) -> &'static str {
    match (op, unsigned) {
        (ArithOp::Lt, false) => "setl",
        (ArithOp::Lt, true) => "setb",
        (ArithOp::Gt, false) => "setg",
        (ArithOp::Gt, true) => "seta",
        (ArithOp::Le, false) => "setle",
        (ArithOp::Le, true) => "setbe",
        (ArithOp::Ge, false) => "setge",
        (ArithOp::Ge, true) => "setae",
        (ArithOp::Eq, _) => "sete",
        (ArithOp::Ne, _) => "setne",
        _ => "sete",
    }
}

fn is_comparison(op: ArithOp) -> bool {
    matches!(op, ArithOp::Lt | ArithOp::Gt | ArithOp::Le | ArithOp::Ge | ArithOp::Eq | ArithOp::Ne)
}

fn store_setcc_result(em: &mut Emitter, result_off: i32, result_size: u32) {
    em.ins2("movzbl", asm::r1(Reg::Rax), asm::r4(Reg::Rax));
    em.ins2(mov_mnemonic(reg_width(result_size)), asm::reg_sized(Reg::Rax, reg_width(result_size)), mem(result_off));
}

fn emit_int_arith(em: &mut Emitter, vars: &VarTable, op: ArithOp, unsigned: bool, result: VarId, lhs: VarId, rhs: VarId) -> Result<()> {
    let size = reg_width(vars.size_of(lhs).max(vars.size_of(rhs)));
    let lhs_off = offset_of(vars, lhs)?;
    let rhs_off = offset_of(vars, rhs)?;
    let result_off = offset_of(vars, result)?;
    let result_size = vars.size_of(result).max(1);

    em.ins2(mov_mnemonic(size), mem(lhs_off), asm::reg_sized(Reg::Rax, size));
    em.ins2(mov_mnemonic(size), mem(rhs_off), asm::reg_sized(Reg::Rcx, size));

    if is_comparison(op) {
        em.ins2(cmp_mnemonic(size), asm::reg_sized(Reg::Rcx, size), asm::reg_sized(Reg::Rax, size));
        em.ins1(setcc(op, unsigned), asm::r1(Reg::Rax));
        store_setcc_result(em, result_off, result_size);
        return Ok(());
    }

    match op {
        ArithOp::Add | ArithOp::Sub | ArithOp::BitAnd | ArithOp::BitOr | ArithOp::BitXor | ArithOp::Mul => {
            let mn = match op {
                ArithOp::Add => format!("add{}", suffix(size)),
                ArithOp::Sub => format!("sub{}", suffix(size)),
                ArithOp::BitAnd => format!("and{}", suffix(size)),
                ArithOp::BitOr => format!("or{}", suffix(size)),
                ArithOp::BitXor => format!("xor{}", suffix(size)),
                ArithOp::Mul => format!("imul{}", suffix(size)),
                _ => unreachable!(),
            };
            em.ins2(&mn, asm::reg_sized(Reg::Rcx, size), asm::reg_sized(Reg::Rax, size));
        }
        ArithOp::Shl => {
            em.ins2("movb", asm::r1(Reg::Rcx), asm::r1(Reg::Rcx));
            em.ins2(&format!("shl{}", suffix(size)), asm::r1(Reg::Rcx), asm::reg_sized(Reg::Rax, size));
        }
        ArithOp::Shr => {
            let base = if unsigned { "shr" } else { "sar" };
            em.ins2(&format!("{base}{}", suffix(size)), asm::r1(Reg::Rcx), asm::reg_sized(Reg::Rax, size));
        }
        ArithOp::Div | ArithOp::Mod => {
            if unsigned {
                em.ins2(&format!("xor{}", suffix(size)), asm::reg_sized(Reg::Rdx, size), asm::reg_sized(Reg::Rdx, size));
                em.ins1(&format!("div{}", suffix(size)), asm::reg_sized(Reg::Rcx, size));
            } else {
                em.ins0(cqto_for(size));
                em.ins1(&format!("idiv{}", suffix(size)), asm::reg_sized(Reg::Rcx, size));
            }
            if op == ArithOp::Mod {
                em.ins2(mov_mnemonic(size), asm::reg_sized(Reg::Rdx, size), asm::reg_sized(Reg::Rax, size));
            }
        }
        _ => return Err(ice(format!("{op:?} is not an integer opcode"))),
    }
    em.ins2(mov_mnemonic(reg_width(result_size)), asm::reg_sized(Reg::Rax, reg_width(result_size)), mem(result_off));
    Ok(())
}

fn float_suffix(size: u32) -> &'static str {
    if size == 4 {
        "ss"
    } else {
        "sd"
    }
}

fn emit_float_arith(em: &mut Emitter, vars: &VarTable, op: ArithOp, result: VarId, lhs: VarId, rhs: VarId) -> Result<()> {
    let size = vars.size_of(lhs).max(vars.size_of(rhs)).max(4);
    let fs = float_suffix(size);
    let lhs_off = offset_of(vars, lhs)?;
    let rhs_off = offset_of(vars, rhs)?;
    let result_off = offset_of(vars, result)?;
    let mov = format!("mov{fs}");
    em.ins2(&mov, mem(lhs_off), Operand::Xmm(0));
    em.ins2(&mov, mem(rhs_off), Operand::Xmm(1));

    if is_comparison(op) {
        em.ins2(&format!("ucomi{fs}"), Operand::Xmm(1), Operand::Xmm(0));
        // `ucomisd`/`ucomiss` set flags the same way an unsigned integer
        // compare would (CF/ZF, no sign interpretation), so the unsigned
        // branch of `setcc` applies directly; unordered (NaN) results are
        // not distinguished from "less than" here (a documented MVP gap).
        em.ins1(setcc(op, true), asm::r1(Reg::Rax));
        store_setcc_result(em, result_off, vars.size_of(result).max(1));
        return Ok(());
    }

    let mn = match op {
        ArithOp::Add => format!("add{fs}"),
        ArithOp::Sub => format!("sub{fs}"),
        ArithOp::Mul => format!("mul{fs}"),
        ArithOp::Div => format!("div{fs}"),
        _ => return Err(ice(format!("{op:?} is not a float opcode"))),
    };
    em.ins2(&mn, Operand::Xmm(1), Operand::Xmm(0));
    em.ins2(&mov, Operand::Xmm(0), mem(result_off));
    Ok(())
}

/// One IR instruction (spec.md §4.5's opcode catalogue).
fn emit_inst(em: &mut Emitter, func: &Function, types: &TypeTable, frame: &FrameLayout, config: &CompilerConfig, abi: &dyn Abi, inst: &Inst) -> Result<()> {
    let vars = &func.vars;
    match inst {
        Inst::BinArith { op, domain, result, lhs, rhs } => match domain {
            crate::ir::inst::ArithDomain::Int { unsigned } => emit_int_arith(em, vars, *op, *unsigned, *result, *lhs, *rhs),
            crate::ir::inst::ArithDomain::Float => emit_float_arith(em, vars, *op, *result, *lhs, *rhs),
        },
        Inst::BinaryNot { result, src } => {
            let size = reg_width(vars.size_of(*src));
            em.ins2(mov_mnemonic(size), mem(offset_of(vars, *src)?), asm::reg_sized(Reg::Rax, size));
            em.ins1(&format!("not{}", suffix(size)), asm::reg_sized(Reg::Rax, size));
            let rsize = reg_width(vars.size_of(*result));
            em.ins2(mov_mnemonic(rsize), asm::reg_sized(Reg::Rax, rsize), mem(offset_of(vars, *result)?));
            Ok(())
        }
        Inst::NegateInt { result, src } => {
            let size = reg_width(vars.size_of(*src));
            em.ins2(mov_mnemonic(size), mem(offset_of(vars, *src)?), asm::reg_sized(Reg::Rax, size));
            em.ins1(&format!("neg{}", suffix(size)), asm::reg_sized(Reg::Rax, size));
            let rsize = reg_width(vars.size_of(*result));
            em.ins2(mov_mnemonic(rsize), asm::reg_sized(Reg::Rax, rsize), mem(offset_of(vars, *result)?));
            Ok(())
        }
        Inst::NegateFloat { result, src } => {
            let size = vars.size_of(*src).max(4);
            let fs = float_suffix(size);
            em.ins2(&format!("mov{fs}"), mem(offset_of(vars, *src)?), Operand::Xmm(0));
            em.ins2("pxor", Operand::Xmm(1), Operand::Xmm(1));
            em.ins2(&format!("sub{fs}"), Operand::Xmm(0), Operand::Xmm(1));
            em.ins2(&format!("mov{fs}"), Operand::Xmm(1), mem(offset_of(vars, *result)?));
            Ok(())
        }
        Inst::BoolCast { result, src } => {
            let size = reg_width(vars.size_of(*src));
            em.ins2(mov_mnemonic(size), mem(offset_of(vars, *src)?), asm::reg_sized(Reg::Rax, size));
            em.ins2(test_mnemonic(size), asm::reg_sized(Reg::Rax, size), asm::reg_sized(Reg::Rax, size));
            em.ins1("setne", asm::r1(Reg::Rax));
            store_setcc_result(em, offset_of(vars, *result)?, vars.size_of(*result).max(1));
            Ok(())
        }
        Inst::IntCastZero { result, src } | Inst::IntCastSign { result, src } => {
            let signed = matches!(inst, Inst::IntCastSign { .. });
            emit_int_cast(em, vars, *result, *src, signed)
        }
        Inst::FloatCast { result, src } => {
            let src_size = vars.size_of(*src).max(4);
            let dst_size = vars.size_of(*result).max(4);
            let src_off = offset_of(vars, *src)?;
            let dst_off = offset_of(vars, *result)?;
            if src_size == dst_size {
                em.ins2(&format!("mov{}", float_suffix(src_size)), mem(src_off), Operand::Xmm(0));
            } else if src_size == 4 {
                em.ins2("movss", mem(src_off), Operand::Xmm(0));
                em.ins2("cvtss2sd", Operand::Xmm(0), Operand::Xmm(0));
            } else {
                em.ins2("movsd", mem(src_off), Operand::Xmm(0));
                em.ins2("cvtsd2ss", Operand::Xmm(0), Operand::Xmm(0));
            }
            em.ins2(&format!("mov{}", float_suffix(dst_size)), Operand::Xmm(0), mem(dst_off));
            Ok(())
        }
        Inst::IntFloatCast { result, src } | Inst::UintFloatCast { result, src } => {
            let unsigned = matches!(inst, Inst::UintFloatCast { .. });
            emit_int_to_float(em, vars, *result, *src, unsigned)
        }
        Inst::FloatIntCast { result, src } => {
            let src_size = vars.size_of(*src).max(4);
            let dst_size = vars.size_of(*result).max(1);
            let src_off = offset_of(vars, *src)?;
            let dst_off = offset_of(vars, *result)?;
            em.ins2(&format!("mov{}", float_suffix(src_size)), mem(src_off), Operand::Xmm(0));
            let dreg = if dst_size > 4 { 8 } else { 4 };
            em.ins2(&format!("cvtt{}2si{}", float_suffix(src_size), suffix(dreg)), Operand::Xmm(0), asm::reg_sized(Reg::Rax, dreg));
            em.ins2(mov_mnemonic(reg_width(dst_size)), asm::reg_sized(Reg::Rax, reg_width(dst_size)), mem(dst_off));
            Ok(())
        }
        Inst::Load { result, ptr } => {
            em.ins2("movq", mem(offset_of(vars, *ptr)?), asm::r8(Reg::Rax));
            let size = vars.size_of(*result).max(1);
            if size <= 8 {
                let sz = reg_width(size);
                em.ins2(mov_mnemonic(sz), Operand::Mem(0, Reg::Rax), asm::reg_sized(Reg::Rcx, sz));
                em.ins2(mov_mnemonic(sz), asm::reg_sized(Reg::Rcx, sz), mem(offset_of(vars, *result)?));
            } else {
                em.ins2("movq", asm::r8(Reg::Rax), asm::r8(Reg::Rsi));
                em.ins2("leaq", mem(offset_of(vars, *result)?), asm::r8(Reg::Rdi));
                em.ins2("movl", Operand::Imm(size as i64), asm::r4(Reg::Rcx));
                em.ins0("rep movsb");
            }
            Ok(())
        }
        Inst::LoadPartAddress { result, ptr, offset } => {
            em.ins2("movq", mem(offset_of(vars, *ptr)?), asm::r8(Reg::Rax));
            let size = reg_width(vars.size_of(*result));
            em.ins2(mov_mnemonic(size), Operand::Mem(*offset, Reg::Rax), asm::reg_sized(Reg::Rcx, size));
            em.ins2(mov_mnemonic(size), asm::reg_sized(Reg::Rcx, size), mem(offset_of(vars, *result)?));
            Ok(())
        }
        Inst::LoadBaseRelative { result, offset } => {
            let size = reg_width(vars.size_of(*result));
            em.ins2(mov_mnemonic(size), Operand::Mem(*offset, Reg::Rbp), asm::reg_sized(Reg::Rax, size));
            em.ins2(mov_mnemonic(size), asm::reg_sized(Reg::Rax, size), mem(offset_of(vars, *result)?));
            Ok(())
        }
        Inst::StoreBaseRelative { value, offset } => {
            let size = reg_width(vars.size_of(*value));
            em.ins2(mov_mnemonic(size), mem(offset_of(vars, *value)?), asm::reg_sized(Reg::Rax, size));
            em.ins2(mov_mnemonic(size), asm::reg_sized(Reg::Rax, size), Operand::Mem(*offset, Reg::Rbp));
            Ok(())
        }
        Inst::Store { value, ptr } => {
            let size = vars.size_of(*value).max(1);
            em.ins2("movq", mem(offset_of(vars, *ptr)?), asm::r8(Reg::Rax));
            if size <= 8 {
                let sz = reg_width(size);
                em.ins2(mov_mnemonic(sz), mem(offset_of(vars, *value)?), asm::reg_sized(Reg::Rcx, sz));
                em.ins2(mov_mnemonic(sz), asm::reg_sized(Reg::Rcx, sz), Operand::Mem(0, Reg::Rax));
            } else {
                em.ins2("leaq", mem(offset_of(vars, *value)?), asm::r8(Reg::Rsi));
                em.ins2("movq", asm::r8(Reg::Rax), asm::r8(Reg::Rdi));
                em.ins2("movl", Operand::Imm(size as i64), asm::r4(Reg::Rcx));
                em.ins0("rep movsb");
            }
            Ok(())
        }
        Inst::StorePartAddress { value, base, offset } => {
            let size = reg_width(vars.size_of(*value));
            em.ins2("movq", mem(offset_of(vars, *base)?), asm::r8(Reg::Rax));
            em.ins2(mov_mnemonic(size), mem(offset_of(vars, *value)?), asm::reg_sized(Reg::Rcx, size));
            em.ins2(mov_mnemonic(size), asm::reg_sized(Reg::Rcx, size), Operand::Mem(*offset, Reg::Rax));
            Ok(())
        }
        Inst::StoreStackRelative { value, offset } => {
            let size = reg_width(vars.size_of(*value));
            em.ins2(mov_mnemonic(size), mem(offset_of(vars, *value)?), asm::reg_sized(Reg::Rax, size));
            em.ins2(mov_mnemonic(size), asm::reg_sized(Reg::Rax, size), Operand::Mem(*offset, Reg::Rsp));
            Ok(())
        }
        Inst::Copy { dst, src } => copy_var(em, vars, *dst, *src),
        Inst::AddressOf { result, var } => {
            em.ins2("leaq", mem(offset_of(vars, *var)?), asm::r8(Reg::Rax));
            em.ins2("movq", asm::r8(Reg::Rax), mem(offset_of(vars, *result)?));
            Ok(())
        }
        Inst::GetMember { result, base, offset } => {
            em.ins2("movq", mem(offset_of(vars, *base)?), asm::r8(Reg::Rax));
            em.ins2("leaq", Operand::Mem(*offset, Reg::Rax), asm::r8(Reg::Rax));
            em.ins2("movq", asm::r8(Reg::Rax), mem(offset_of(vars, *result)?));
            Ok(())
        }
        Inst::Constant { result, value } => emit_constant_to_slot(em, vars, types, config, *result, value),
        Inst::ConstantAddress { ptr, value } => emit_constant_through_ptr(em, vars, types, config, *ptr, value),
        Inst::SetZeroPtr { ptr, size } => {
            em.ins2("movq", mem(offset_of(vars, *ptr)?), asm::r8(Reg::Rdi));
            em.ins2("xorl", asm::r4(Reg::Rax), asm::r4(Reg::Rax));
            em.ins2("movl", Operand::Imm(*size as i64), asm::r4(Reg::Rcx));
            em.ins0("rep stosb");
            Ok(())
        }
        Inst::CopyMemory { dst, src, size } => {
            em.ins2("movq", mem(offset_of(vars, *src)?), asm::r8(Reg::Rsi));
            em.ins2("movq", mem(offset_of(vars, *dst)?), asm::r8(Reg::Rdi));
            em.ins2("movl", Operand::Imm(*size as i64), asm::r4(Reg::Rcx));
            em.ins0("rep movsb");
            Ok(())
        }
        Inst::Call { func: callee, scratch_reg } => {
            let reg = Reg::from_code(*scratch_reg);
            em.ins2("movq", mem(offset_of(vars, *callee)?), asm::r8(reg));
            em.ins1("callq", Operand::IndirectReg(reg));
            Ok(())
        }
        Inst::SetReg { src, reg, is_sse } => {
            let off = offset_of(vars, *src)?;
            if *is_sse {
                let size = vars.size_of(*src).max(4);
                em.ins2(&format!("mov{}", float_suffix(size)), mem(off), Operand::Xmm(*reg));
            } else {
                let size = reg_width(vars.size_of(*src));
                em.ins2(mov_mnemonic(size), mem(off), asm::reg_sized(Reg::from_code(*reg), size));
            }
            Ok(())
        }
        Inst::GetReg { result, reg, is_sse } => {
            let off = offset_of(vars, *result)?;
            if *is_sse {
                let size = vars.size_of(*result).max(4);
                em.ins2(&format!("mov{}", float_suffix(size)), Operand::Xmm(*reg), mem(off));
            } else {
                let size = reg_width(vars.size_of(*result));
                em.ins2(mov_mnemonic(size), asm::reg_sized(Reg::from_code(*reg), size), mem(off));
            }
            Ok(())
        }
        Inst::ModifyStackPointer { change } => {
            if *change < 0 {
                em.ins2("subq", Operand::Imm(-(*change) as i64), asm::r8(Reg::Rsp));
            } else if *change > 0 {
                em.ins2("addq", Operand::Imm(*change as i64), asm::r8(Reg::Rsp));
            }
            Ok(())
        }
        Inst::Alloc { result, .. } => {
            let data_off = *frame.alloca_data_offset.get(result).ok_or_else(|| ice("alloca result missing from frame layout"))?;
            em.ins2("leaq", mem(data_off), asm::r8(Reg::Rax));
            em.ins2("movq", asm::r8(Reg::Rax), mem(offset_of(vars, *result)?));
            Ok(())
        }
        Inst::VlaAlloc { result, size, dominance } => emit_vla_alloc(em, vars, frame, &func.name, *result, *size, *dominance),
        Inst::VaStart { result } => {
            let ap_off = offset_of(vars, *result)?;
            abi.emit_va_start(em, &func.abi_data, frame.reg_save_area_offset, ap_off);
            Ok(())
        }
        Inst::VaArg { result, ap, ty } => {
            let ap_off = offset_of(vars, *ap)?;
            let result_off = offset_of(vars, *result)?;
            abi.emit_va_arg(em, types, *ty, ap_off, result_off);
            Ok(())
        }
        Inst::Phi { .. } => Ok(()),
    }
}

fn emit_int_cast(em: &mut Emitter, vars: &VarTable, result: VarId, src: VarId, signed: bool) -> Result<()> {
    let src_size = vars.size_of(src).max(1);
    let dst_size = vars.size_of(result).max(1);
    let src_off = offset_of(vars, src)?;
    let dst_off = offset_of(vars, result)?;
    if dst_size <= src_size {
        let sz = reg_width(dst_size);
        em.ins2(mov_mnemonic(sz), mem(src_off), asm::reg_sized(Reg::Rax, sz));
        em.ins2(mov_mnemonic(sz), asm::reg_sized(Reg::Rax, sz), mem(dst_off));
        return Ok(());
    }
    let ssz = reg_width(src_size);
    let dsz = reg_width(dst_size);
    if ssz == 4 && dsz == 8 && !signed {
        // `movl` into a 32-bit register already zero-extends into the
        // full 64-bit register on x86-64; no dedicated `movzlq` exists.
        em.ins2("movl", mem(src_off), asm::r4(Reg::Rax));
    } else {
        let mn = format!("mov{}{}{}", if signed { "s" } else { "z" }, suffix(ssz), suffix(dsz));
        em.ins2(&mn, mem(src_off), asm::reg_sized(Reg::Rax, dsz));
    }
    em.ins2(mov_mnemonic(dsz), asm::reg_sized(Reg::Rax, dsz), mem(dst_off));
    Ok(())
}

/// Widen `src` to a 64-bit integer in `%rax` (sign-extending for a signed
/// source, zero-extending for an unsigned one - the known gap is a `uint64`
/// source whose top bit is set, converted as if it were negative, a
/// simplification this MVP accepts rather than the multi-instruction
/// unsigned-int64-to-double sequence).
fn widen_to_rax(em: &mut Emitter, src_off: i32, src_size: u32, signed: bool) {
    let ssz = reg_width(src_size);
    match (ssz, signed) {
        (8, _) => em.ins2("movq", mem(src_off), asm::r8(Reg::Rax)),
        (4, false) => em.ins2("movl", mem(src_off), asm::r4(Reg::Rax)),
        (4, true) => em.ins2("movslq", mem(src_off), asm::r8(Reg::Rax)),
        (2, false) => em.ins2("movzwq", mem(src_off), asm::r8(Reg::Rax)),
        (2, true) => em.ins2("movswq", mem(src_off), asm::r8(Reg::Rax)),
        (_, false) => em.ins2("movzbq", mem(src_off), asm::r8(Reg::Rax)),
        (_, true) => em.ins2("movsbq", mem(src_off), asm::r8(Reg::Rax)),
    }
}

fn emit_int_to_float(em: &mut Emitter, vars: &VarTable, result: VarId, src: VarId, unsigned: bool) -> Result<()> {
    let src_size = vars.size_of(src).max(1);
    let dst_size = vars.size_of(result).max(4);
    let src_off = offset_of(vars, src)?;
    let dst_off = offset_of(vars, result)?;
    widen_to_rax(em, src_off, src_size, !unsigned);
    let fs = float_suffix(dst_size);
    em.ins2(&format!("cvtsi2{fs}q"), asm::r8(Reg::Rax), Operand::Xmm(0));
    em.ins2(&format!("mov{fs}"), Operand::Xmm(0), mem(dst_off));
    Ok(())
}

fn emit_constant_to_slot(em: &mut Emitter, vars: &VarTable, types: &TypeTable, config: &CompilerConfig, result: VarId, value: &Constant) -> Result<()> {
    let off = offset_of(vars, result)?;
    let size = vars.size_of(result).max(1);
    emit_constant_at(em, types, config, off, size, value)
}

fn emit_constant_through_ptr(em: &mut Emitter, vars: &VarTable, types: &TypeTable, config: &CompilerConfig, ptr: VarId, value: &Constant) -> Result<()> {
    em.ins2("movq", mem(offset_of(vars, ptr)?), asm::r8(Reg::Rax));
    let size = match value {
        Constant::Typed { ty, .. } => types.size_of(*ty).max(1),
        Constant::Label(_) | Constant::LabelPointer(_) => 8,
    };
    emit_constant_at_reg(em, config, Reg::Rax, 0, size, value);
    Ok(())
}

/// Write `value`'s bytes at `off(%rbp)`.
fn emit_constant_at(em: &mut Emitter, types: &TypeTable, config: &CompilerConfig, off: i32, size: u32, value: &Constant) -> Result<()> {
    let _ = types;
    emit_constant_at_reg(em, config, Reg::Rbp, off, size, value);
    Ok(())
}

/// Shared by the direct-slot and through-pointer constant opcodes: writes
/// `value` at `disp(base)`.
fn emit_constant_at_reg(em: &mut Emitter, config: &CompilerConfig, base: Reg, disp: i32, size: u32, value: &Constant) {
    match value {
        Constant::Typed { bits, .. } => {
            if size <= 4 {
                let imm = match size {
                    1 => (*bits as u8) as i64,
                    2 => (*bits as u16) as i64,
                    _ => (*bits as u32) as i64,
                };
                em.ins2(mov_mnemonic(reg_width(size)), Operand::Imm(imm), Operand::Mem(disp, base));
            } else {
                em.ins2("movabsq", Operand::Imm(*bits as i64), asm::r8(Reg::Rax));
                em.ins2("movq", asm::r8(Reg::Rax), Operand::Mem(disp, base));
            }
        }
        Constant::Label(name) => {
            emit_load_label(em, config, name, false);
            em.ins2("movq", asm::r8(Reg::Rax), Operand::Mem(disp, base));
        }
        Constant::LabelPointer(name) => {
            emit_load_label(em, config, name, true);
            em.ins2("movq", asm::r8(Reg::Rax), Operand::Mem(disp, base));
        }
    }
}

/// Load a symbol's address (`is_address`) or its pointer-sized contents
/// into `%rax`, per the configured code model (spec.md §4.5: small uses a
/// RIP-relative `movq`/`leaq`; large uses an absolute `movabsq`).
fn emit_load_label(em: &mut Emitter, config: &CompilerConfig, name: &str, is_address: bool) {
    match config.code_model {
        CodeModel::Small => {
            if is_address {
                em.directive(format!("\tleaq\t{name}(%rip), %rax"));
            } else {
                em.directive(format!("\tmovq\t{name}(%rip), %rax"));
            }
        }
        CodeModel::Large => {
            em.directive(format!("\tmovabsq\t${name}, %rax"));
            if !is_address {
                em.ins2("movq", Operand::Mem(0, Reg::Rax), asm::r8(Reg::Rax));
            }
        }
    }
}

/// `dominance`-indexed VLA allocation (spec.md §4.5 "vla-alloc: slot-based.
/// Each VLA has a dominance index; the current rsp is cached in its slot
/// the first time through, restored on subsequent passes (so loop
/// iterations reuse the same region). Higher-indexed slots are zeroed when
/// a lower-indexed VLA is entered").
fn emit_vla_alloc(em: &mut Emitter, vars: &VarTable, frame: &FrameLayout, func_name: &str, result: VarId, size: VarId, dominance: usize) -> Result<()> {
    let slot_off = *frame.vla_slot_offset.get(&dominance).ok_or_else(|| ice("vla dominance index missing from frame layout"))?;
    let size_off = offset_of(vars, size)?;
    let result_off = offset_of(vars, result)?;
    let reuse_label = format!(".Lvla_reuse_{func_name}_{dominance}_{}", result.0);

    em.ins2("movq", mem(slot_off), asm::r8(Reg::Rax));
    em.ins2("testq", asm::r8(Reg::Rax), asm::r8(Reg::Rax));
    em.directive(format!("\tjne\t{reuse_label}"));
    em.ins2("movq", mem(size_off), asm::r8(Reg::Rcx));
    em.ins2("addq", Operand::Imm(15), asm::r8(Reg::Rcx));
    em.ins2("andq", Operand::Imm(-16), asm::r8(Reg::Rcx));
    em.ins2("subq", asm::r8(Reg::Rcx), asm::r8(Reg::Rsp));
    em.ins2("movq", asm::r8(Reg::Rsp), asm::r8(Reg::Rax));
    em.ins2("movq", asm::r8(Reg::Rax), mem(slot_off));
    em.label(&reuse_label, false);
    em.ins2("movq", asm::r8(Reg::Rax), asm::r8(Reg::Rsp));
    em.ins2("movq", asm::r8(Reg::Rax), mem(result_off));

    for (&d, &off) in frame.vla_slot_offset.iter() {
        if d > dominance {
            em.ins2("movq", Operand::Imm(0), mem(off));
        }
    }
    Ok(())
}
