//! The object rewriter behind the `elfcopy`, `strip` and `mcs`
//! front-ends.
//!
//! An [`Elfcopy`] accumulates a section action program (remove, copy-only,
//! rename, flag, add, plus the mcs edits) and a symbol action program
//! (keep, strip, localize, globalize, weaken, redefine, and the bulk
//! strip modes), then rewrites an input ELF object in three phases:
//!
//!  1. plan the output section list and the input→output index map,
//!  2. filter and regenerate the symbol and string tables,
//!  3. lay out file offsets and serialize.
//!
//! The output is always complete and self-consistent or absent; there is
//! no partial-output recovery.

#![warn(missing_docs)]

mod copy;
mod error;
mod layout;
mod options;
mod relocs;
mod sections;
mod segments;
mod symbols;

use ferrite_elf::{Class, ElfObject, Endianness};

pub use crate::error::{CopyError, CopyErrorKind};
pub use crate::options::{
    parse_symbol_list, CopyFlags, SectionAction, SectionActions, SectionAdd, SectionFlags,
    StripMode, SymbolAction, SymbolActions,
};
pub use crate::sections::{compress_strings, section_strings};

/// Resolves an output-target name (`-O`) to a class and byte order.
///
/// The generic `elf{32,64}-{little,big}` spellings are accepted along
/// with the common machine-specific aliases.
pub fn parse_target(name: &str) -> Result<(Class, Endianness), CopyError> {
    let target = match name {
        "elf32-little" | "elf32-i386" | "elf32-littlearm" | "elf32-littlemips" => {
            (Class::Elf32, Endianness::Little)
        }
        "elf32-big" | "elf32-bigmips" | "elf32-sparc" | "elf32-powerpc" => {
            (Class::Elf32, Endianness::Big)
        }
        "elf64-little" | "elf64-x86-64" | "elf64-littleaarch64" | "elf64-littleriscv" => {
            (Class::Elf64, Endianness::Little)
        }
        "elf64-big" | "elf64-sparc" | "elf64-powerpc" => (Class::Elf64, Endianness::Big),
        _ => {
            return Err(CopyError::new(
                CopyErrorKind::Argument,
                format!("{name}: invalid target name"),
            ))
        }
    };
    Ok(target)
}

/// A configured rewriter run.
///
/// Accumulate actions with the builder methods, then apply them with
/// [`rewrite`](Self::rewrite) (bytes to bytes) or
/// [`rewrite_file`](Self::rewrite_file) (path to path, with the
/// temporary-file dance for in-place edits).
#[derive(Debug, Default)]
pub struct Elfcopy {
    pub(crate) strip: StripMode,
    pub(crate) flags: CopyFlags,
    pub(crate) sec_actions: SectionActions,
    pub(crate) additions: Vec<SectionAdd>,
    pub(crate) sym_actions: SymbolActions,
    pub(crate) output_class: Option<Class>,
    pub(crate) output_endianness: Option<Endianness>,
}

impl Elfcopy {
    /// Creates a rewriter with an empty action program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bulk strip mode. Later settings win, as with repeated
    /// command-line flags.
    pub fn set_strip(&mut self, strip: StripMode) -> &mut Self {
        self.strip = strip;
        self
    }

    /// The configured strip mode.
    pub fn strip(&self) -> StripMode {
        self.strip
    }

    /// Enables bulk flags such as `DISCARD_LOCAL` or `WEAKEN_ALL`.
    pub fn set_flags(&mut self, flags: CopyFlags) -> &mut Self {
        self.flags |= flags;
        self
    }

    /// Whether timestamps are preserved on the output file.
    pub fn preserve_dates(&self) -> bool {
        self.flags.contains(CopyFlags::PRESERVE_DATE)
    }

    /// Selects the output class and byte order (`-O TARGET`).
    pub fn set_output_target(&mut self, name: &str) -> Result<&mut Self, CopyError> {
        let (class, endianness) = parse_target(name)?;
        self.output_class = Some(class);
        self.output_endianness = Some(endianness);
        Ok(self)
    }

    /// Marks a section for removal (`-R`).
    pub fn remove_section(&mut self, name: &str) -> Result<&mut Self, CopyError> {
        let action = self.sec_actions.entry(name.to_string()).or_default();
        if action.copy {
            return Err(CopyError::new(
                CopyErrorKind::Argument,
                "both copy and remove specified",
            ));
        }
        action.remove = true;
        Ok(self)
    }

    /// Marks a section as copy-only (`-j`); everything unmarked goes.
    pub fn only_section(&mut self, name: &str) -> Result<&mut Self, CopyError> {
        let action = self.sec_actions.entry(name.to_string()).or_default();
        if action.remove {
            return Err(CopyError::new(
                CopyErrorKind::Argument,
                "both copy and remove specified",
            ));
        }
        action.copy = true;
        Ok(self)
    }

    /// Renames a section, optionally replacing its flags.
    pub fn rename_section(
        &mut self,
        name: &str,
        new_name: &str,
        flags: Option<SectionFlags>,
    ) -> &mut Self {
        let action = self.sec_actions.entry(name.to_string()).or_default();
        action.rename = Some(new_name.to_string());
        if flags.is_some() {
            action.flags = flags;
        }
        self
    }

    /// Replaces a section's flags (`--set-section-flags`).
    pub fn set_section_flags(&mut self, name: &str, flags: SectionFlags) -> &mut Self {
        self.sec_actions.entry(name.to_string()).or_default().flags = Some(flags);
        self
    }

    /// Adds a new section with the given payload (`--add-section`).
    pub fn add_section(&mut self, name: &str, data: Vec<u8>) -> &mut Self {
        self.additions.push(SectionAdd {
            name: name.to_string(),
            data,
        });
        self
    }

    /// Appends a string to a section's payload (mcs `-a`).
    pub fn append_string(&mut self, name: &str, string: &str) -> &mut Self {
        self.sec_actions.entry(name.to_string()).or_default().append = Some(string.to_string());
        self
    }

    /// Deduplicates a section's strings (mcs `-c`).
    pub fn compress_section(&mut self, name: &str) -> &mut Self {
        self.sec_actions
            .entry(name.to_string())
            .or_default()
            .compress = true;
        self
    }

    /// Marks a section's strings for reporting (mcs `-p`).
    pub fn print_section(&mut self, name: &str) -> &mut Self {
        self.sec_actions.entry(name.to_string()).or_default().print = true;
        self
    }

    /// The names marked for string reporting, in deterministic order.
    pub fn printed_sections(&self) -> impl Iterator<Item = &str> {
        self.sec_actions
            .iter()
            .filter(|(_, action)| action.print)
            .map(|(name, _)| name.as_str())
    }

    /// Retains a symbol unconditionally (`-K`).
    pub fn keep_symbol(&mut self, name: &str) -> &mut Self {
        self.sym_actions.entry(name.to_string()).or_default().keep = true;
        self
    }

    /// Drops a symbol unconditionally (`-N`).
    pub fn strip_symbol(&mut self, name: &str) -> &mut Self {
        self.sym_actions.entry(name.to_string()).or_default().strip = true;
        self
    }

    /// Demotes a symbol to local binding (`-L`).
    pub fn localize_symbol(&mut self, name: &str) -> &mut Self {
        self.sym_actions
            .entry(name.to_string())
            .or_default()
            .localize = true;
        self
    }

    /// Promotes a local symbol to global binding.
    pub fn globalize_symbol(&mut self, name: &str) -> &mut Self {
        self.sym_actions
            .entry(name.to_string())
            .or_default()
            .globalize = true;
        self
    }

    /// Demotes a symbol to weak binding.
    pub fn weaken_symbol(&mut self, name: &str) -> &mut Self {
        self.sym_actions.entry(name.to_string()).or_default().weaken = true;
        self
    }

    /// Exempts a symbol from the `KEEP_GLOBAL` bulk demotion.
    pub fn keep_global_symbol(&mut self, name: &str) -> &mut Self {
        self.sym_actions
            .entry(name.to_string())
            .or_default()
            .keep_global = true;
        self.flags |= CopyFlags::KEEP_GLOBAL;
        self
    }

    /// Renames a symbol before string-table insertion.
    pub fn redefine_symbol(&mut self, name: &str, new_name: &str) -> &mut Self {
        self.sym_actions
            .entry(name.to_string())
            .or_default()
            .new_name = Some(new_name.to_string());
        self
    }

    /// Rewrites an object held in memory and returns the output bytes.
    pub fn rewrite(&self, input: &[u8]) -> Result<Vec<u8>, CopyError> {
        let obj = ElfObject::parse(input)?;

        let mut plan = sections::plan_sections(self, &obj)?;
        symbols::plan_symbols(self, &obj, &mut plan)?;
        relocs::update_relocations(
            &obj,
            &mut plan,
            self.output_class.unwrap_or(obj.class),
            self.output_endianness.unwrap_or(obj.endianness),
        )?;
        layout::finish(self, &obj, plan)
    }
}
