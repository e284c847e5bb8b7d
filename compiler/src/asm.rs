//! Assembler text emitter: spec.md §4.6.
//!
//! A minimal output layer: section-switch suppression, tab-indented
//! instructions, flush-left labels, `#`-prefixed comments. Grounded in
//! `examples/original_source/src/assembler/assembler.c`, which tracks
//! "current section" purely to avoid redundant `.text`/`.data` directives
//! and tab-indents mnemonics while leaving labels flush left - both kept
//! here verbatim.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Text,
    Data,
    Rodata,
    Bss,
}

impl Section {
    fn directive(self) -> &'static str {
        match self {
            Section::Text => ".text",
            Section::Data => ".data",
            Section::Rodata => ".section .rodata",
            Section::Bss => ".bss",
        }
    }
}

/// Discriminants follow the x86-64 ModRM register numbering so `Inst::SetReg`/
/// `GetReg`'s abstract `reg: u8` (spec.md's IR-level register id) converts
/// directly via `Reg::from_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Reg {
    pub fn from_code(code: u8) -> Reg {
        use Reg::*;
        match code {
            0 => Rax, 1 => Rcx, 2 => Rdx, 3 => Rbx, 4 => Rsp, 5 => Rbp, 6 => Rsi, 7 => Rdi,
            8 => R8, 9 => R9, 10 => R10, 11 => R11, 12 => R12, 13 => R13, 14 => R14, 15 => R15,
            _ => Rax,
        }
    }

    /// SysV integer-argument order (spec.md §4.4).
    pub const SYSV_ARGS: [Reg; 6] = [Reg::Rdi, Reg::Rsi, Reg::Rdx, Reg::Rcx, Reg::R8, Reg::R9];
    /// Microsoft x64 integer-argument order (spec.md §4.4).
    pub const MS_ARGS: [Reg; 4] = [Reg::Rcx, Reg::Rdx, Reg::R8, Reg::R9];

    /// Name at a given operand width in bytes (1/2/4/8).
    pub fn name(self, size: u32) -> &'static str {
        use Reg::*;
        match (self, size) {
            (Rax, 8) => "%rax", (Rax, 4) => "%eax", (Rax, 2) => "%ax", (Rax, 1) => "%al",
            (Rbx, 8) => "%rbx", (Rbx, 4) => "%ebx", (Rbx, 2) => "%bx", (Rbx, 1) => "%bl",
            (Rcx, 8) => "%rcx", (Rcx, 4) => "%ecx", (Rcx, 2) => "%cx", (Rcx, 1) => "%cl",
            (Rdx, 8) => "%rdx", (Rdx, 4) => "%edx", (Rdx, 2) => "%dx", (Rdx, 1) => "%dl",
            (Rsi, 8) => "%rsi", (Rsi, 4) => "%esi", (Rsi, 2) => "%si", (Rsi, 1) => "%sil",
            (Rdi, 8) => "%rdi", (Rdi, 4) => "%edi", (Rdi, 2) => "%di", (Rdi, 1) => "%dil",
            (Rbp, 8) => "%rbp", (Rbp, 4) => "%ebp", (Rbp, 2) => "%bp", (Rbp, 1) => "%bpl",
            (Rsp, 8) => "%rsp", (Rsp, 4) => "%esp", (Rsp, 2) => "%sp", (Rsp, 1) => "%spl",
            (R8, 8) => "%r8", (R8, 4) => "%r8d", (R8, 2) => "%r8w", (R8, 1) => "%r8b",
            (R9, 8) => "%r9", (R9, 4) => "%r9d", (R9, 2) => "%r9w", (R9, 1) => "%r9b",
            (R10, 8) => "%r10", (R10, 4) => "%r10d", (R10, 2) => "%r10w", (R10, 1) => "%r10b",
            (R11, 8) => "%r11", (R11, 4) => "%r11d", (R11, 2) => "%r11w", (R11, 1) => "%r11b",
            (R12, 8) => "%r12", (R12, 4) => "%r12d", (R12, 2) => "%r12w", (R12, 1) => "%r12b",
            (R13, 8) => "%r13", (R13, 4) => "%r13d", (R13, 2) => "%r13w", (R13, 1) => "%r13b",
            (R14, 8) => "%r14", (R14, 4) => "%r14d", (R14, 2) => "%r14w", (R14, 1) => "%r14b",
            (R15, 8) => "%r15", (R15, 4) => "%r15d", (R15, 2) => "%r15w", (R15, 1) => "%r15b",
            _ => "%rax",
        }
    }
}

/// Operand forms supported by this MVP (spec.md §4.6): register, SSE
/// register, indirect-call register, immediate, immediate-plus-label, and
/// `offset(base)` memory - no scaled-index addressing.
#[derive(Debug, Clone)]
pub enum Operand {
    Reg(Reg, u32),
    Xmm(u8),
    /// `*%reg`, the operand form of an indirect `callq`.
    IndirectReg(Reg),
    Imm(i64),
    /// `$label+offset` (or, for `movabsq`, just `label+offset` textually
    /// via the same constructor - callers choose the mnemonic).
    ImmLabel(String, i64),
    Mem(i32, Reg),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r, size) => write!(f, "{}", r.name(*size)),
            Operand::Xmm(n) => write!(f, "%xmm{n}"),
            Operand::IndirectReg(r) => write!(f, "*{}", r.name(8)),
            Operand::Imm(v) => write!(f, "${v}"),
            Operand::ImmLabel(label, 0) => write!(f, "${label}"),
            Operand::ImmLabel(label, off) if *off > 0 => write!(f, "${label}+{off}"),
            Operand::ImmLabel(label, off) => write!(f, "${label}{off}"),
            Operand::Mem(0, base) => write!(f, "({})", base.name(8)),
            Operand::Mem(off, base) => write!(f, "{off}({})", base.name(8)),
        }
    }
}

pub fn r8(r: Reg) -> Operand {
    Operand::Reg(r, 8)
}
pub fn r4(r: Reg) -> Operand {
    Operand::Reg(r, 4)
}
pub fn r2(r: Reg) -> Operand {
    Operand::Reg(r, 2)
}
pub fn r1(r: Reg) -> Operand {
    Operand::Reg(r, 1)
}
pub fn reg_sized(r: Reg, size: u32) -> Operand {
    Operand::Reg(r, size)
}

/// The optional in-process x86-64 instruction encoder boundary (spec.md
/// §1: "an auxiliary boundary: only its interface is specified"). When
/// `--half-assemble` is set, `Emitter` asks the active encoder to turn a
/// mnemonic-plus-operands instruction into raw bytes and emits those as
/// `.byte` directives instead of the mnemonic text; immediate-label
/// operands bypass this (spec.md §4.5) since the assembler must still see
/// the symbol to relocate it.
pub trait InstructionEncoder {
    /// Encode one instruction, or return `None` to fall back to mnemonic
    /// text (e.g. because this encoder doesn't implement that opcode).
    fn encode(&self, mnemonic: &str, operands: &[Operand]) -> Option<Vec<u8>>;
}

/// No in-process encoder is implemented in this MVP (spec.md's boundary is
/// interface-only); `--half-assemble` with this encoder degrades to plain
/// mnemonic emission for every instruction.
pub struct NullEncoder;

impl InstructionEncoder for NullEncoder {
    fn encode(&self, _mnemonic: &str, _operands: &[Operand]) -> Option<Vec<u8>> {
        None
    }
}

pub struct Emitter {
    out: String,
    current_section: Option<Section>,
    half_assemble: bool,
    encoder: Box<dyn InstructionEncoder>,
}

impl Emitter {
    pub fn new(half_assemble: bool) -> Self {
        Emitter { out: String::new(), current_section: None, half_assemble, encoder: Box::new(NullEncoder) }
    }

    pub fn with_encoder(half_assemble: bool, encoder: Box<dyn InstructionEncoder>) -> Self {
        Emitter { out: String::new(), current_section: None, half_assemble, encoder }
    }

    pub fn section(&mut self, section: Section) {
        if self.current_section != Some(section) {
            self.out.push_str(section.directive());
            self.out.push('\n');
            self.current_section = Some(section);
        }
    }

    pub fn label(&mut self, name: &str, global: bool) {
        if global {
            self.out.push_str(&format!(".global {name}\n"));
        }
        self.out.push_str(&format!("{name}:\n"));
    }

    pub fn comment(&mut self, text: impl fmt::Display) {
        self.out.push_str(&format!("\t# {text}\n"));
    }

    pub fn directive(&mut self, text: impl fmt::Display) {
        self.out.push_str(&format!("{text}\n"));
    }

    pub fn ins0(&mut self, mnemonic: &str) {
        self.emit(mnemonic, &[]);
    }

    pub fn ins1(&mut self, mnemonic: &str, a: Operand) {
        self.emit(mnemonic, &[a]);
    }

    pub fn ins2(&mut self, mnemonic: &str, src: Operand, dst: Operand) {
        self.emit(mnemonic, &[src, dst]);
    }

    fn has_label_operand(operands: &[Operand]) -> bool {
        operands.iter().any(|o| matches!(o, Operand::ImmLabel(..)))
    }

    fn emit(&mut self, mnemonic: &str, operands: &[Operand]) {
        if self.half_assemble && !Self::has_label_operand(operands) {
            if let Some(bytes) = self.encoder.encode(mnemonic, operands) {
                let hex: Vec<String> = bytes.iter().map(|b| format!("0x{b:02x}")).collect();
                self.out.push_str(&format!("\t.byte {}\n", hex.join(", ")));
                return;
            }
        }
        let joined: Vec<String> = operands.iter().map(|o| o.to_string()).collect();
        if joined.is_empty() {
            self.out.push_str(&format!("\t{mnemonic}\n"));
        } else {
            self.out.push_str(&format!("\t{mnemonic}\t{}\n", joined.join(", ")));
        }
    }

    pub fn finish(self) -> String {
        self.out
    }
}
