use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use ferrite_elfcopy::{CopyFlags, Elfcopy, StripMode};
use ferrite_tools::{
    add_section_from_file, apply_symbol_list, init_diagnostics, print_error, rename_section,
    set_section_flags,
};

/// Copy and translate ELF objects while applying section and symbol
/// edits.
#[derive(Debug, Parser)]
#[command(name = "elfcopy", version)]
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

    /// Copy only the named sections.
    #[arg(short = 'j', long = "only-section", value_name = "NAME")]
    only_section: Vec<String>,

    /// Remove all symbol and relocation information.
    #[arg(short = 'S', long = "strip-all")]
    strip_all: bool,

    /// Remove debugging symbols and sections.
    #[arg(short = 'g', long = "strip-debug", short_alias = 'd')]
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

    /// Make the named symbol local.
    #[arg(short = 'L', long = "localize-symbol", value_name = "NAME")]
    localize_symbol: Vec<String>,

    /// Make symbols listed in the file local.
    #[arg(long = "localize-symbols", value_name = "FILE")]
    localize_symbols: Vec<PathBuf>,

    /// Make the named symbol global.
    #[arg(long = "globalize-symbol", value_name = "NAME")]
    globalize_symbol: Vec<String>,

    /// Make symbols listed in the file global.
    #[arg(long = "globalize-symbols", value_name = "FILE")]
    globalize_symbols: Vec<PathBuf>,

    /// Make the named symbol weak.
    #[arg(short = 'W', long = "weaken-symbol", value_name = "NAME")]
    weaken_symbol: Vec<String>,

    /// Rename the named symbol.
    #[arg(long = "redefine-sym", value_name = "OLD=NEW")]
    redefine_sym: Vec<String>,

    /// Keep only the named symbols global.
    #[arg(short = 'G', long = "keep-global-symbol", value_name = "NAME")]
    keep_global_symbol: Vec<String>,

    /// Remove non-global symbols.
    #[arg(short = 'x', long = "discard-all")]
    discard_all: bool,

    /// Remove compiler-generated local symbols.
    #[arg(short = 'X', long = "discard-locals")]
    discard_locals: bool,

    /// Add a new section with the contents of the file.
    #[arg(long = "add-section", value_name = "NAME=FILE")]
    add_section: Vec<String>,

    /// Rename a section, optionally changing its flags.
    #[arg(long = "rename-section", value_name = "OLD=NEW[,FLAGS]")]
    rename_section: Vec<String>,

    /// Replace a section's flags.
    #[arg(long = "set-section-flags", value_name = "NAME=FLAGS")]
    set_section_flags: Vec<String>,

    /// Preserve access and modification dates.
    #[arg(short = 'p', long = "preserve-dates")]
    preserve_dates: bool,

    /// Input file.
    #[arg(value_name = "infile", required = true)]
    infile: PathBuf,

    /// Output file; the input is rewritten in place when omitted.
    #[arg(value_name = "outfile")]
    outfile: Option<PathBuf>,
}

fn build(args: &Args) -> Result<Elfcopy> {
    let mut ecp = Elfcopy::new();

    // Later strip flags win, as with repeated options.
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
    for name in &args.only_section {
        ecp.only_section(name)?;
    }
    for arg in &args.add_section {
        add_section_from_file(&mut ecp, arg)?;
    }
    for arg in &args.rename_section {
        rename_section(&mut ecp, arg)?;
    }
    for arg in &args.set_section_flags {
        set_section_flags(&mut ecp, arg)?;
    }

    for name in &args.keep_symbol {
        ecp.keep_symbol(name);
    }
    for name in &args.strip_symbol {
        ecp.strip_symbol(name);
    }
    for name in &args.localize_symbol {
        ecp.localize_symbol(name);
    }
    for path in &args.localize_symbols {
        apply_symbol_list(&mut ecp, path, |ecp, name| {
            ecp.localize_symbol(name);
        })?;
    }
    for name in &args.globalize_symbol {
        ecp.globalize_symbol(name);
    }
    for path in &args.globalize_symbols {
        apply_symbol_list(&mut ecp, path, |ecp, name| {
            ecp.globalize_symbol(name);
        })?;
    }
    for name in &args.weaken_symbol {
        ecp.weaken_symbol(name);
    }
    for name in &args.keep_global_symbol {
        ecp.keep_global_symbol(name);
    }
    for arg in &args.redefine_sym {
        let (old, new) = ferrite_tools::split_pair(arg, "--redefine-sym")?;
        ecp.redefine_symbol(old, new);
    }

    Ok(ecp)
}

fn run(args: &Args) -> Result<()> {
    let ecp = build(args)?;
    ecp.rewrite_file(&args.infile, args.outfile.as_deref())
        .with_context(|| format!("can not copy {}", args.infile.display()))
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
