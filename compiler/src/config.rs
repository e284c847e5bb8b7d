//! Compiler configuration.
//!
//! Generalizes the teacher's `CompilerConfig` (config.rs): a single struct
//! threaded through every pipeline stage instead of ad hoc globals. Built
//! once from CLI flags in `main.rs`, consumed by the preprocessor (include
//! paths, predefined macros), the ABI layer (target selection) and codegen
//! (code model, half-assemble).

use serde::Serialize;
use std::path::PathBuf;

/// Which calling convention/ABI to target. Spec.md §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Target {
    /// System V AMD64 (Linux, *BSD, macOS).
    SysV,
    /// Microsoft x64 (Windows).
    Ms,
}

impl std::str::FromStr for Target {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sysv" => Ok(Target::SysV),
            "ms" => Ok(Target::Ms),
            other => Err(format!("unknown --target `{other}` (expected sysv|ms)")),
        }
    }
}

/// Code generation memory model for label references. Spec.md §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CodeModel {
    /// RIP-relative `movq` (fits a 32-bit signed displacement).
    Small,
    /// `movabsq` of a 64-bit absolute address.
    Large,
}

impl std::str::FromStr for CodeModel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "small" => Ok(CodeModel::Small),
            "large" => Ok(CodeModel::Large),
            other => Err(format!("unknown --code-model `{other}` (expected small|large)")),
        }
    }
}

/// A `-D NAME[=VAL]` predefinition, captured before the preprocessor's
/// macro table exists so the driver can seed it uniformly with macros that
/// came from `#define` and macros that came from the command line.
#[derive(Debug, Clone, Serialize)]
pub struct PredefinedMacro {
    pub name: String,
    pub value: Option<String>,
}

/// Compiler-wide configuration, resolved once from CLI flags and threaded
/// through preprocessing, parsing, IR construction and codegen exactly as
/// the ABI capability object is (spec.md's "ABI as a dispatch capability").
#[derive(Debug, Clone, Serialize)]
pub struct CompilerConfig {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub user_include_paths: Vec<PathBuf>,
    pub system_include_paths: Vec<PathBuf>,
    pub defines: Vec<PredefinedMacro>,
    pub undefines: Vec<String>,
    pub target: Target,
    pub code_model: CodeModel,
    pub half_assemble: bool,
}

impl CompilerConfig {
    pub fn new(input: PathBuf) -> Self {
        CompilerConfig {
            input,
            output: None,
            user_include_paths: Vec::new(),
            system_include_paths: Vec::new(),
            defines: Vec::new(),
            undefines: Vec::new(),
            target: Target::SysV,
            code_model: CodeModel::Small,
            half_assemble: false,
        }
    }

    /// Search paths for the preprocessor's `input_open`, in priority order
    /// (the parent directory is prepended by the caller for non-system
    /// includes; see spec.md §4.1 `input_open`).
    pub fn include_search_path(&self, system: bool) -> &[PathBuf] {
        if system {
            &self.system_include_paths
        } else {
            &self.user_include_paths
        }
    }
}
