//! Code generation: spec.md §4.5. Turns a lowered `ir::Program` into AT&T
//! assembly text, one function at a time, through a two-pass stack-frame
//! layout followed by per-instruction emission.

pub mod emit;
pub mod layout;

use crate::abi::Abi;
use crate::config::CompilerConfig;
use crate::diag::Result;
use crate::types::TypeTable;

pub fn generate(program: &mut crate::ir::Program, types: &TypeTable, abi: &dyn Abi, config: &CompilerConfig) -> Result<String> {
    emit::emit_program(program, types, abi, config)
}
