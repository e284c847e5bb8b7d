//! The ABI layer: spec.md §4.4 and §9 "The ABI as a dispatch capability."
//!
//! Two implementations (`sysv`, `msx64`) share one interface of five
//! operations - `lower_call`, `new_function`, `lower_return`, `emit_preamble`,
//! `emit_va_arg` (`emit_va_start` folds into the same call as the fifth, see
//! below) - bound once at ABI-selection time. Grounded in
//! `examples/original_source/src/abi/abi.h`'s five-function-pointer capability
//! shape, modeled here as a trait object (`Box<dyn Abi>`) threaded through IR
//! construction and codegen, rather than as free function pointers assigned
//! into a struct. `examples/original_source/src/abi/microsoft.c` double-binds
//! `abi_emit_va_start` (lines 195-196 there); this rewrite binds each hook
//! exactly once since a trait impl cannot accidentally duplicate a method.

pub mod msx64;
pub mod sysv;

use crate::asm::Emitter;
use crate::diag::Result;
use crate::ir::{FunctionBuilder, VarId};
use crate::types::{TypeId, TypeTable};

/// spec.md §4.4 "aggregates ... classified by eightbyte (INTEGER/SSE/MEMORY)".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgClass {
    Integer,
    Sse,
    /// Passed (or returned) through a hidden pointer rather than registers.
    Memory,
}

/// Per-function ABI bookkeeping (spec.md §3 Function: "an opaque ABI-data
/// pointer whose layout is defined by the active ABI"). Modeled as a
/// closed enum instead of an opaque pointer since both concrete ABIs are
/// known at compile time.
#[derive(Debug, Clone)]
pub enum AbiFunctionData {
    SysV(sysv::SysVFnData),
    Ms(msx64::MsFnData),
}

/// One call's classified argument, produced by `lower_call`'s caller
/// (`ir::lower`) and consumed by the active ABI.
pub struct CallArg {
    pub var: VarId,
    pub ty: TypeId,
}

/// The calling-convention capability object (spec.md §4.4, §9).
pub trait Abi {
    fn target_name(&self) -> &'static str;

    /// spec.md §4.4 "Call lowering ... compute a stack-adjust, ... place
    /// each argument into its assigned register or stack slot, set
    /// registers, emit the call, pull the return value, and undo the stack
    /// modification." Returns the variable holding the call's result, or
    /// `None` for a `void` call.
    fn lower_call(
        &self,
        b: &mut FunctionBuilder,
        types: &TypeTable,
        func: VarId,
        ret_ty: TypeId,
        args: &[CallArg],
        is_variadic_call: bool,
        n_named_params: usize,
    ) -> Result<Option<VarId>>;

    /// Classify `params`, materialize each as a local variable loaded from
    /// its incoming register or stack slot, and build this function's ABI
    /// record. Returns one `VarId` per parameter, in declaration order.
    fn new_function(
        &self,
        b: &mut FunctionBuilder,
        types: &TypeTable,
        params: &[TypeId],
        is_variadic: bool,
    ) -> (Vec<VarId>, AbiFunctionData);

    fn lower_return(&self, b: &mut FunctionBuilder, types: &TypeTable, ret_ty: TypeId, value: Option<VarId>);

    /// Codegen-time function-entry spill: SysV's variadic register-save
    /// area, or MS's shadow-space register spill (spec.md's supplemented
    /// `ms_emit_function_preamble`/SysV varargs preamble).
    fn emit_preamble(&self, em: &mut Emitter, data: &AbiFunctionData, reg_save_area_offset: Option<i32>);

    /// `va_start(ap, ...)`: populate the `va_list` object at `ap_offset`
    /// (an offset below `%rbp`).
    fn emit_va_start(&self, em: &mut Emitter, data: &AbiFunctionData, reg_save_area_offset: Option<i32>, ap_offset: i32);

    /// `va_arg(ap, T)`: advance `ap` and load the next argument of type `T`
    /// into the slot at `result_offset`.
    fn emit_va_arg(&self, em: &mut Emitter, types: &TypeTable, ty: TypeId, ap_offset: i32, result_offset: i32);
}

/// Classify a (non-variadic-bookkeeping) scalar argument as INTEGER or SSE
/// (spec.md §4.4); aggregates are classified by their own ABI-specific
/// logic since SysV and MS disagree on the threshold.
pub(crate) fn scalar_class(types: &TypeTable, ty: TypeId) -> ArgClass {
    if types.is_float(ty) {
        ArgClass::Sse
    } else {
        ArgClass::Integer
    }
}

pub fn select(target: crate::config::Target) -> Box<dyn Abi> {
    match target {
        crate::config::Target::SysV => Box::new(sysv::SysV),
        crate::config::Target::Ms => Box::new(msx64::Msx64),
    }
}
