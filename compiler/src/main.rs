//! `cc` CLI: compile a C11-subset source file to x86-64 AT&T assembly.

use cc::config::{CodeModel, CompilerConfig, PredefinedMacro, Target};
use clap::{CommandFactory, Parser as ClapParser};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use std::process;

#[derive(ClapParser)]
#[command(name = "cc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile a C11 subset to x86-64 AT&T assembly", long_about = None)]
struct Cli {
    /// Input C source file
    input: Option<PathBuf>,

    /// Output assembly path (defaults to stdout)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Add a directory to the user include search path (repeatable)
    #[arg(short = 'I', value_name = "DIR")]
    include: Vec<PathBuf>,

    /// Add a directory to the system include search path (repeatable)
    #[arg(long = "isystem", value_name = "DIR")]
    isystem: Vec<PathBuf>,

    /// Define a macro, optionally `NAME=VALUE` (repeatable)
    #[arg(short = 'D', value_name = "NAME[=VALUE]")]
    define: Vec<String>,

    /// Undefine a macro (repeatable)
    #[arg(short = 'U', value_name = "NAME")]
    undefine: Vec<String>,

    /// Target calling convention
    #[arg(long, default_value = "sysv")]
    target: Target,

    /// Code model for label/symbol references
    #[arg(long = "code-model", default_value = "small")]
    code_model: CodeModel,

    /// Emit `.byte` sequences instead of mnemonic text wherever the
    /// in-process encoder supports an instruction
    #[arg(long)]
    half_assemble: bool,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the resolved `CompilerConfig` as TOML to stderr and exit
    #[arg(long)]
    dump_config: bool,

    /// Generate a shell completion script and exit
    #[arg(long, value_enum)]
    completions: Option<Shell>,
}

fn main() {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(shell, &mut cmd, name, &mut io::stdout());
        return;
    }

    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let Some(input) = cli.input else {
        eprintln!("error: no input file");
        process::exit(1);
    };

    let mut config = CompilerConfig::new(input);
    config.output = cli.output;
    config.user_include_paths = cli.include;
    config.system_include_paths = cli.isystem;
    config.target = cli.target;
    config.code_model = cli.code_model;
    config.half_assemble = cli.half_assemble;
    config.undefines = cli.undefine;
    config.defines = cli
        .define
        .iter()
        .map(|d| match d.split_once('=') {
            Some((name, value)) => PredefinedMacro { name: name.to_string(), value: Some(value.to_string()) },
            None => PredefinedMacro { name: d.clone(), value: None },
        })
        .collect();

    if cli.dump_config {
        match toml::to_string_pretty(&config) {
            Ok(text) => eprintln!("{text}"),
            Err(e) => eprintln!("error serializing config: {e}"),
        }
        return;
    }

    tracing::debug!(input = %config.input.display(), "starting compilation");

    match cc::compile(&config) {
        Ok(asm) => match &config.output {
            Some(path) => {
                if let Err(e) = std::fs::write(path, asm) {
                    eprintln!("error: cannot write '{}': {e}", path.display());
                    process::exit(1);
                }
            }
            None => print!("{asm}"),
        },
        Err(diag) => {
            eprintln!("{diag}");
            process::exit(1);
        }
    }
}
