use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use ferrite_elfcopy::{CopyFlags, Elfcopy, StripMode};
use ferrite_tools::{init_diagnostics, print_error};

/// Discard symbols and debugging information from ELF objects.
#[derive(Debug, Parser)]
#[command(name = "strip", version)]
struct Args {
    /// Ignored, present for compatibility.
    #[arg(short = 'I', long = "input-target", value_name = "TARGET", hide = true)]
    input_target: Option<String>,

    /// Write the output for the given target.
    #[arg(short = 'O', long = "output-target", value_name = "TARGET")]
    output_target: Option<String>,

    /// Remove the named section.
    #[arg(short = 'R', long = "remove-section", value_name = "NAME")]
    remove_section: Vec<String>,

    /// Remove all symbol and relocation information (the default).
    #[arg(short = 's', long = "strip-all")]
    strip_all: bool,

    /// Remove debugging symbols and sections.
    #[arg(short = 'S', long = "strip-debug", short_aliases = ['g', 'd'])]
    strip_debug: bool,

    /// Remove symbols not needed for relocation processing.
    #[arg(long = "strip-unneeded")]
    strip_unneeded: bool,

    /// Keep only debugging content.
    #[arg(long = "only-keep-debug")]
    only_keep_debug: bool,

    /// Keep the named symbol.
    #[arg(short = 'K', long = "keep-symbol", value_name = "NAME")]
    keep_symbol: Vec<String>,

    /// Remove the named symbol.
    #[arg(short = 'N', long = "strip-symbol", value_name = "NAME")]
    strip_symbol: Vec<String>,

    /// Write the stripped object here instead of in place.
    #[arg(short = 'o', long = "output-file", value_name = "PATH")]
    output_file: Option<PathBuf>,

    /// Preserve access and modification dates.
    #[arg(short = 'p', long = "preserve-dates")]
    preserve_dates: bool,

    /// Remove non-global symbols.
    #[arg(short = 'x', long = "discard-all")]
    discard_all: bool,

    /// Remove compiler-generated local symbols.
    #[arg(short = 'X', long = "discard-locals")]
    discard_locals: bool,

    /// Files to strip.
    #[arg(value_name = "file", required = true)]
    files: Vec<PathBuf>,
}

fn build(args: &Args) -> Result<Elfcopy> {
    let mut ecp = Elfcopy::new();

    if args.strip_all {
        ecp.set_strip(StripMode::All);
    }
    if args.strip_debug {
        ecp.set_strip(StripMode::Debug);
    }
    if args.strip_unneeded {
        ecp.set_strip(StripMode::Unneeded);
    }
    if args.only_keep_debug {
        ecp.set_strip(StripMode::NonDebug);
    }
    // Without an explicit choice, strip means strip everything.
    if ecp.strip() == StripMode::None {
        ecp.set_strip(StripMode::All);
    }

    if args.discard_all || args.discard_locals {
        ecp.set_flags(CopyFlags::DISCARD_LOCAL);
    }
    if args.preserve_dates {
        ecp.set_flags(CopyFlags::PRESERVE_DATE);
    }
    if let Some(ref target) = args.output_target {
        ecp.set_output_target(target)?;
    }

    for name in &args.remove_section {
        ecp.remove_section(name)?;
    }
    for name in &args.keep_symbol {
        ecp.keep_symbol(name);
    }
    for name in &args.strip_symbol {
        ecp.strip_symbol(name);
    }

    Ok(ecp)
}

fn run(args: &Args) -> Result<()> {
    let ecp = build(args)?;
    for file in &args.files {
        ecp.rewrite_file(file, args.output_file.as_deref())
            .with_context(|| format!("can not strip {}", file.display()))?;
    }
    Ok(())
}

fn main() -> ExitCode {
    init_diagnostics();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            print_error(&error);
            ExitCode::FAILURE
        }
    }
}
