//! Command-line runner for "I use Arch btw" programs
//!
//! Compiles a source file for the chosen target and runs it with
//! stdin/stdout as the program's I/O channels. Diagnostics go to
//! stderr, colored when it is a terminal.

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use iuab_engine::{compile, Context, Target};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

#[derive(Parser)]
#[command(name = "iuab")]
#[command(about = "\"I use Arch btw\" toolchain", long_about = None)]
#[command(version)]
struct Cli {
    /// Source file to compile and run
    file: PathBuf,

    /// Compilation target; defaults to native code where available
    #[arg(short, long, value_enum)]
    target: Option<TargetArg>,

    /// Report how long execution took
    #[arg(long)]
    time: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TargetArg {
    /// Portable bytecode interpreter
    Bytecode,
    /// Native x86-64 code (unix hosts only)
    Jit,
}

impl TargetArg {
    fn into_target(self) -> Target {
        match self {
            TargetArg::Bytecode => Target::Bytecode,
            TargetArg::Jit => Target::JitX86_64,
        }
    }
}

fn host_default_target() -> Target {
    if Target::JitX86_64.is_supported() {
        Target::JitX86_64
    } else {
        Target::Bytecode
    }
}

/// Respects `NO_COLOR`, otherwise auto-detects the terminal.
fn color_choice() -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    }
}

fn report_error(phase: &str, detail: &str) {
    let mut stderr = StandardStream::stderr(color_choice());
    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
    let _ = write!(stderr, "{phase}:");
    let _ = stderr.reset();
    let _ = writeln!(stderr, " {detail}");
}

/// Handler for the `gentoo` keyword: dumps the pointer state to stderr.
extern "C" fn print_debug_info(ctx: &mut Context<'_>) {
    let mut stderr = StandardStream::stderr(color_choice());
    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true));
    let _ = write!(stderr, "debug:");
    let _ = stderr.reset();
    let _ = writeln!(
        stderr,
        " ip = {:p} (program + {:#x}); dp = {:p} (memory + {:#x}); *dp = {}",
        ctx.ip(),
        ctx.ip_offset(),
        ctx.dp(),
        ctx.dp_offset(),
        ctx.current_byte()
    );
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let target = cli
        .target
        .map(TargetArg::into_target)
        .unwrap_or_else(host_default_target);
    if !target.is_supported() {
        anyhow::bail!("the {} target is not supported on this host", target);
    }

    let file = File::open(&cli.file)
        .with_context(|| format!("cannot open {}", cli.file.display()))?;
    let compile_started = Instant::now();
    let program = match compile(target, BufReader::new(file)) {
        Ok(program) => program,
        Err(err) => {
            report_error("compiler error", &err.to_string());
            std::process::exit(1);
        }
    };
    let compile_elapsed = compile_started.elapsed();

    let mut ctx = Context::new(
        program.as_bytes(),
        Box::new(io::stdin()),
        Box::new(io::stdout()),
        print_debug_info,
    );

    let started = Instant::now();
    let result = program.run(&mut ctx);
    let elapsed = started.elapsed();
    let _ = ctx.flush_output();

    if let Err(err) = result {
        // Only the bytecode backend tracks instruction positions.
        let detail = match target {
            Target::Bytecode => format!("{err} at program + {:#x}", ctx.ip_offset()),
            _ => err.to_string(),
        };
        report_error("run-time error", &detail);
        std::process::exit(1);
    }

    if cli.time {
        eprintln!("{target} target: compiled in {compile_elapsed:?}, ran in {elapsed:?}");
    }
    Ok(())
}
