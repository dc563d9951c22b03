use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;

use ferrite_elf::{ByteView, ElfObject};
use ferrite_elfcopy::{section_strings, Elfcopy};
use ferrite_tools::{init_diagnostics, print_error};

/// Manipulate the comment section of ELF objects.
#[derive(Debug, Parser)]
#[command(name = "mcs", version)]
struct Args {
    /// Append the string to the section.
    #[arg(short = 'a', value_name = "string")]
    append: Option<String>,

    /// Compress the section by removing duplicate strings.
    #[arg(short = 'c')]
    compress: bool,

    /// Delete the section.
    #[arg(short = 'd')]
    delete: bool,

    /// Operate on the named section instead of .comment.
    #[arg(short = 'n', value_name = "name")]
    name: Option<String>,

    /// Print the strings of the section.
    #[arg(short = 'p')]
    print: bool,

    /// Files to edit.
    #[arg(value_name = "file", required = true)]
    files: Vec<PathBuf>,
}

fn run(args: &Args) -> Result<()> {
    // Delete overrides the other operations, and operations do not
    // respect the order they were given in.
    let delete = args.delete;
    let append = if delete { None } else { args.append.as_deref() };
    let compress = !delete && args.compress;
    let print = !delete && args.print;

    if !delete && append.is_none() && !compress && !print {
        bail!("at least one of -a, -c, -d or -p must be specified");
    }

    let section = args.name.as_deref().unwrap_or(".comment");

    let mut ecp = Elfcopy::new();
    if delete {
        ecp.remove_section(section)?;
    }
    if let Some(string) = append {
        ecp.append_string(section, string);
    }
    if compress {
        ecp.compress_section(section);
    }

    for file in &args.files {
        if print {
            let view = ByteView::open(file)
                .with_context(|| format!("can not open {}", file.display()))?;
            let obj = ElfObject::parse(&view)
                .with_context(|| format!("can not parse {}", file.display()))?;
            if let Some((_, found)) = obj.section_by_name(section) {
                println!("{}:", file.display());
                for string in section_strings(&found.data) {
                    println!("{string}");
                }
            }
        }

        // A pure print run rewrites nothing.
        if delete || append.is_some() || compress {
            ecp.rewrite_file(file, None)
                .with_context(|| format!("can not edit {}", file.display()))?;
        }
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
