//! Shared plumbing for the ferrite command-line front-ends.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use ferrite_elfcopy::{parse_symbol_list, Elfcopy, SectionFlags};

/// Installs the stderr diagnostics subscriber the tools log through.
pub fn init_diagnostics() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .init();
}

/// Splits a `NAME=VALUE` option argument.
pub fn split_pair<'a>(arg: &'a str, option: &str) -> Result<(&'a str, &'a str)> {
    match arg.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name, value)),
        _ => bail!("illegal format for {option} option"),
    }
}

/// Applies `--add-section NAME=FILE`: the file's bytes become the payload.
pub fn add_section_from_file(ecp: &mut Elfcopy, arg: &str) -> Result<()> {
    let (name, path) = split_pair(arg, "--add-section")?;
    let data = fs::read(path).with_context(|| format!("can not open {path}"))?;
    ecp.add_section(name, data);
    Ok(())
}

/// Applies `--rename-section OLD=NEW[,FLAGS]`.
pub fn rename_section(ecp: &mut Elfcopy, arg: &str) -> Result<()> {
    let (old, rest) = split_pair(arg, "--rename-section")?;
    let (new, flags) = match rest.split_once(',') {
        Some((new, flags)) => (new, Some(SectionFlags::parse_list(flags)?)),
        None => (rest, None),
    };
    ecp.rename_section(old, new, flags);
    Ok(())
}

/// Applies `--set-section-flags NAME=FLAGS`.
pub fn set_section_flags(ecp: &mut Elfcopy, arg: &str) -> Result<()> {
    let (name, flags) = split_pair(arg, "--set-section-flags")?;
    ecp.set_section_flags(name, SectionFlags::parse_list(flags)?);
    Ok(())
}

/// Reads a symbol-list file and applies `op` to every listed name.
pub fn apply_symbol_list(
    ecp: &mut Elfcopy,
    path: &Path,
    op: impl Fn(&mut Elfcopy, &str),
) -> Result<()> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("can not open {}", path.display()))?;
    for name in parse_symbol_list(&contents) {
        op(ecp, &name);
    }
    Ok(())
}

/// Prints an error and the chain of causes, the way the tools report
/// failures before exiting non-zero.
pub fn print_error(error: &anyhow::Error) {
    eprintln!("error: {error}");
    for cause in error.chain().skip(1) {
        eprintln!("   caused by {cause}");
    }
}
