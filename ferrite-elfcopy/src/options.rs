//! The action programs a rewriter run is configured with.

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::error::{CopyError, CopyErrorKind};

bitflags! {
    /// Bulk defaults that apply to every symbol.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CopyFlags: u32 {
        /// Copy the input's timestamps onto the output file.
        const PRESERVE_DATE = 1 << 0;
        /// Discard all local symbols (`-x`/`-X`).
        const DISCARD_LOCAL = 1 << 1;
        /// Weaken every global symbol.
        const WEAKEN_ALL = 1 << 2;
        /// Localize every global except those listed as KEEPG.
        const KEEP_GLOBAL = 1 << 3;
    }
}

/// Which class of symbols a strip mode removes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StripMode {
    /// No bulk stripping.
    #[default]
    None,
    /// Remove the symbol table and debug sections (`--strip-all`).
    All,
    /// Remove debugging sections and debug-helper symbols
    /// (`--strip-debug`).
    Debug,
    /// Remove symbols not needed by relocations (`--strip-unneeded`).
    Unneeded,
    /// Keep only debugging content (`--only-keep-debug`).
    NonDebug,
}

bitflags! {
    /// Flag tokens accepted by rename and set-section-flags actions.
    ///
    /// `alloc`, `readonly`, `code` and `data` map onto `sh_flags` bits;
    /// the rest are internal markers carried through the action program.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SectionFlags: u32 {
        /// Occupies memory at run time.
        const ALLOC = 1 << 0;
        /// Loaded from the file.
        const LOAD = 1 << 1;
        /// Not loaded from the file.
        const NOLOAD = 1 << 2;
        /// Not writable at run time.
        const READONLY = 1 << 3;
        /// Debugging section.
        const DEBUG = 1 << 4;
        /// Executable code.
        const CODE = 1 << 5;
        /// Writable data.
        const DATA = 1 << 6;
        /// Read-only data.
        const ROM = 1 << 7;
        /// Shared between processes.
        const SHARED = 1 << 8;
        /// Has file contents.
        const CONTENTS = 1 << 9;
    }
}

impl SectionFlags {
    /// Parses a comma-separated, case-insensitive flag list.
    pub fn parse_list(list: &str) -> Result<Self, CopyError> {
        let mut flags = SectionFlags::empty();
        for token in list.split(',') {
            let flag = match token.trim().to_ascii_lowercase().as_str() {
                "alloc" => SectionFlags::ALLOC,
                "load" => SectionFlags::LOAD,
                "noload" => SectionFlags::NOLOAD,
                "readonly" => SectionFlags::READONLY,
                "debug" => SectionFlags::DEBUG,
                "code" => SectionFlags::CODE,
                "data" => SectionFlags::DATA,
                "rom" => SectionFlags::ROM,
                "share" => SectionFlags::SHARED,
                "contents" => SectionFlags::CONTENTS,
                other => {
                    return Err(CopyError::new(
                        CopyErrorKind::Argument,
                        format!("unrecognized section flag {other}"),
                    ))
                }
            };
            flags |= flag;
        }
        Ok(flags)
    }

    /// Applies the token set to existing `sh_flags` bits.
    pub fn apply_to(self, sh_flags: u64) -> u64 {
        use goblin::elf::section_header::{SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE};

        let mut flags = sh_flags;
        if self.contains(SectionFlags::ALLOC) || self.contains(SectionFlags::LOAD) {
            flags |= u64::from(SHF_ALLOC);
        }
        if self.contains(SectionFlags::READONLY) {
            flags &= !u64::from(SHF_WRITE);
        }
        if self.contains(SectionFlags::DATA) {
            flags |= u64::from(SHF_WRITE);
        }
        if self.contains(SectionFlags::CODE) {
            flags |= u64::from(SHF_EXECINSTR);
        }
        flags
    }
}

/// The actions accumulated against one section name.
#[derive(Clone, Debug, Default)]
pub struct SectionAction {
    /// Drop the section (`-R`, mcs `-d`).
    pub remove: bool,
    /// Keep only sections marked this way (`-j`).
    pub copy: bool,
    /// Rename to this name.
    pub rename: Option<String>,
    /// Replace flags with this token set.
    pub flags: Option<SectionFlags>,
    /// Append this string to the payload (mcs `-a`).
    pub append: Option<String>,
    /// Deduplicate the payload's strings (mcs `-c`).
    pub compress: bool,
    /// Report the payload's strings (mcs `-p`).
    pub print: bool,
}

/// A section created from caller-provided bytes (`--add-section`).
#[derive(Clone, Debug)]
pub struct SectionAdd {
    /// Name of the new section.
    pub name: String,
    /// Its payload.
    pub data: Vec<u8>,
}

/// The actions accumulated against one symbol name.
#[derive(Clone, Debug, Default)]
pub struct SymbolAction {
    /// Retain unconditionally.
    pub keep: bool,
    /// Drop unconditionally (beaten by `keep`).
    pub strip: bool,
    /// Demote to local binding.
    pub localize: bool,
    /// Promote a local to global binding.
    pub globalize: bool,
    /// Demote to weak binding.
    pub weaken: bool,
    /// Exempt from the KEEP_GLOBAL bulk demotion.
    pub keep_global: bool,
    /// Rename before string-table insertion.
    pub new_name: Option<String>,
}

/// Ordered name-keyed action tables.
///
/// `BTreeMap` keeps iteration deterministic, which keeps output layout a
/// pure function of the action program.
pub type SectionActions = BTreeMap<String, SectionAction>;

/// Symbol actions keyed by symbol name.
pub type SymbolActions = BTreeMap<String, SymbolAction>;

/// Parses a symbol-list file: one name per line, `#` comments, blank
/// lines ignored, surrounding whitespace stripped.
pub fn parse_symbol_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use goblin::elf::section_header::{SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE};

    #[test]
    fn test_parse_flag_list() {
        let flags = SectionFlags::parse_list("Alloc,READONLY,code").unwrap();
        assert!(flags.contains(SectionFlags::ALLOC));
        assert!(flags.contains(SectionFlags::READONLY));
        assert!(flags.contains(SectionFlags::CODE));

        assert_eq!(
            SectionFlags::parse_list("alloc,bogus").unwrap_err().kind(),
            crate::CopyErrorKind::Argument
        );
    }

    #[test]
    fn test_apply_clears_write_for_readonly() {
        let flags = SectionFlags::parse_list("readonly,code").unwrap();
        let applied = flags.apply_to(u64::from(SHF_WRITE | SHF_ALLOC));
        assert_eq!(applied, u64::from(SHF_ALLOC | SHF_EXECINSTR));
    }

    #[test]
    fn test_parse_symbol_list() {
        let names = parse_symbol_list("  main  \n# a comment\n\n\thelper\nmain\n");
        assert_eq!(names, vec!["main", "helper", "main"]);
    }
}
