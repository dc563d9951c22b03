//! Phase A: planning the output section list.
//!
//! The input section list is walked in order, the section action program
//! decides survival, and every kept section lands in the plan with its
//! final name, flags and payload. `.symtab`, `.strtab` and `.shstrtab`
//! never travel through this path; they are materialized behind the
//! user-addable sections once the symbol phase has decided their fate.

use goblin::elf::section_header::{SHT_PROGBITS, SHT_STRTAB, SHT_SYMTAB};

use ferrite_elf::{is_debug_section_name, ElfObject, Section};

use crate::options::StripMode;
use crate::symbols::SymtabDisposition;
use crate::{Elfcopy, CopyError};

/// One planned output section.
#[derive(Clone, Debug)]
pub(crate) struct OutSection {
    /// Backing input section index, `None` for added sections.
    pub input_index: Option<usize>,
    pub name: String,
    pub sh_type: u32,
    pub flags: u64,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
    /// Link and info still carry input-space section indices; the layout
    /// phase remaps them through `secndx`.
    pub link: u32,
    pub info: u32,
    pub addralign: u64,
    pub entsize: u64,
    pub data: Vec<u8>,
}

/// The evolving output plan threaded through the three phases.
#[derive(Debug)]
pub(crate) struct Plan {
    /// NULL section, kept sections, then added sections.
    pub sections: Vec<OutSection>,
    /// Input section index to output index; zero means removed.
    pub secndx: Vec<usize>,
    /// Index of the input `.symtab`, if present.
    pub input_symtab: Option<usize>,
    /// Index of the input `.strtab`, if present.
    pub input_strtab: Option<usize>,
    /// Whether the output is a relocatable object.
    pub relocatable: bool,
    /// Filled in by the symbol phase.
    pub symtab: SymtabDisposition,
}

impl Plan {
    /// The output index `.symtab` will occupy if it is emitted.
    pub fn planned_symtab_index(&self) -> usize {
        self.sections.len()
    }
}

fn is_remove_section(ecp: &Elfcopy, copy_mode: bool, section: &Section) -> bool {
    let name = section.name.as_str();
    let action = ecp.sec_actions.get(name);

    if action.is_some_and(|a| a.remove) {
        return true;
    }
    if copy_mode && !action.is_some_and(|a| a.copy) {
        return true;
    }

    let debug = is_debug_section_name(name);
    match ecp.strip {
        StripMode::All | StripMode::Debug | StripMode::Unneeded if debug => true,
        StripMode::NonDebug if !debug => true,
        _ => false,
    }
}

/// Deduplicates the NUL-separated strings of a payload, keeping first
/// occurrences in order. Used by the mcs compress operation.
pub fn compress_strings(data: &[u8]) -> Vec<u8> {
    let mut seen: Vec<&[u8]> = Vec::new();
    let mut out = Vec::with_capacity(data.len());

    for chunk in data.split(|&b| b == 0) {
        if chunk.is_empty() {
            continue;
        }
        if seen.contains(&chunk) {
            continue;
        }
        seen.push(chunk);
        out.extend_from_slice(chunk);
        out.push(0);
    }

    out
}

/// Splits a payload into its NUL-terminated strings. Used by the mcs
/// print operation.
pub fn section_strings(data: &[u8]) -> Vec<String> {
    data.split(|&b| b == 0)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}

pub(crate) fn plan_sections(ecp: &Elfcopy, obj: &ElfObject) -> Result<Plan, CopyError> {
    let copy_mode = ecp.sec_actions.values().any(|a| a.copy);
    let count = obj.sections.len();

    let mut input_symtab = None;
    let mut input_strtab = None;
    let mut removed = vec![false; count];

    // First pass: everything except relocation sections, whose fate
    // depends on their target's.
    for (index, section) in obj.sections().enumerate().skip(1) {
        match section.name.as_str() {
            ".symtab" if section.sh_type == SHT_SYMTAB => {
                input_symtab = Some(index);
                continue;
            }
            ".strtab" if section.sh_type == SHT_STRTAB => {
                input_strtab = Some(index);
                continue;
            }
            ".shstrtab" if index == obj.shstrndx => continue,
            _ => {}
        }
        if section.is_reloc() {
            continue;
        }
        removed[index] = is_remove_section(ecp, copy_mode, section);
    }

    // Second pass: a relocation section goes when its own name says so
    // or when the section it patches is gone.
    for (index, section) in obj.sections().enumerate().skip(1) {
        if !section.is_reloc() {
            continue;
        }
        let target = section.info as usize;
        removed[index] = is_remove_section(ecp, copy_mode, section)
            || (target != 0 && target < count && removed[target]);
    }

    let mut plan = Plan {
        sections: vec![OutSection {
            input_index: Some(0),
            name: String::new(),
            sh_type: 0,
            flags: 0,
            addr: 0,
            offset: 0,
            size: 0,
            link: 0,
            info: 0,
            addralign: 0,
            entsize: 0,
            data: Vec::new(),
        }],
        secndx: vec![0; count],
        input_symtab,
        input_strtab,
        relocatable: obj.is_relocatable(),
        symtab: SymtabDisposition::Absent,
    };

    for (index, section) in obj.sections().enumerate().skip(1) {
        if removed[index]
            || Some(index) == input_symtab
            || Some(index) == input_strtab
            || index == obj.shstrndx
        {
            continue;
        }

        let mut out = OutSection {
            input_index: Some(index),
            name: section.name.clone(),
            sh_type: section.sh_type,
            flags: section.flags,
            addr: section.addr,
            offset: 0,
            size: section.size,
            link: section.link,
            info: section.info,
            addralign: section.addralign,
            entsize: section.entsize,
            data: section.data.clone(),
        };

        if let Some(action) = ecp.sec_actions.get(section.name.as_str()) {
            if let Some(ref new_name) = action.rename {
                out.name = new_name.clone();
            }
            if let Some(flags) = action.flags {
                out.flags = flags.apply_to(out.flags);
            }
            if let Some(ref string) = action.append {
                out.data.extend_from_slice(string.as_bytes());
                out.data.push(0);
                out.size = out.data.len() as u64;
            }
            if action.compress {
                out.data = compress_strings(&out.data);
                out.size = out.data.len() as u64;
            }
        }

        plan.secndx[index] = plan.sections.len();
        plan.sections.push(out);
    }

    // Added sections land after the last kept section, before the string
    // and symbol tables.
    for addition in &ecp.additions {
        plan.sections.push(OutSection {
            input_index: None,
            name: addition.name.clone(),
            sh_type: SHT_PROGBITS,
            flags: 0,
            addr: 0,
            offset: 0,
            size: addition.data.len() as u64,
            link: 0,
            info: 0,
            addralign: 1,
            entsize: 0,
            data: addition.data.clone(),
        });
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_strings() {
        let data = b"GCC 9\0clang\0GCC 9\0";
        assert_eq!(compress_strings(data), b"GCC 9\0clang\0");
    }

    #[test]
    fn test_section_strings() {
        let data = b"one\0two\0";
        assert_eq!(section_strings(data), vec!["one", "two"]);
    }
}
