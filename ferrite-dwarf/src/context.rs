//! The debug context: owned section data, parsed units and caches.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use ferrite_elf::ElfObject;

use crate::constants::{DW_AT_macro_info, DW_AT_stmt_list};
use crate::error::{DwarfError, DwarfErrorKind};
use crate::line::{self, LineProgram};
use crate::loclist::{self, Loclist};
use crate::macinfo::{self, MacroSet};
use crate::reloc;
use crate::unit::CompilationUnit;
use crate::value::AttrValue;

/// The raw payloads of the debug sections a context works from.
///
/// Every field is optional; parsing degrades gracefully when a section is
/// absent. When extracted from a relocatable object the payloads have
/// their `.rela.debug_*` sections already applied.
#[derive(Clone, Debug, Default)]
pub struct DwarfSections {
    /// `.debug_info`.
    pub info: Option<Vec<u8>>,
    /// `.debug_abbrev`.
    pub abbrev: Option<Vec<u8>>,
    /// `.debug_str`.
    pub str: Option<Vec<u8>>,
    /// `.debug_loc`.
    pub loc: Option<Vec<u8>>,
    /// `.debug_line`.
    pub line: Option<Vec<u8>>,
    /// `.debug_macinfo`.
    pub macinfo: Option<Vec<u8>>,
}

impl DwarfSections {
    /// Extracts and relocates the debug sections of an ELF object.
    pub fn from_object(obj: &ElfObject) -> Result<Self, DwarfError> {
        let mut sections = DwarfSections::default();
        for (index, section) in obj.sections().enumerate() {
            let slot = match section.name.as_str() {
                ".debug_info" => &mut sections.info,
                ".debug_abbrev" => &mut sections.abbrev,
                ".debug_str" => &mut sections.str,
                ".debug_loc" => &mut sections.loc,
                ".debug_line" => &mut sections.line,
                ".debug_macinfo" => &mut sections.macinfo,
                _ => continue,
            };
            *slot = Some(reloc::relocated_section_data(obj, index)?);
        }
        Ok(sections)
    }
}

/// A parse failure confined to one compilation unit.
#[derive(Debug)]
pub struct UnitError {
    /// Offset of the failed unit in `.debug_info`.
    pub offset: u64,
    /// What went wrong.
    pub error: DwarfError,
}

/// A DWARF debug context.
///
/// Owns the (relocated) section payloads, the parsed compilation units
/// and the caches; every DWARF operation goes through an explicit context
/// rather than ambient process state. A context belongs to one task and
/// no operation on it is reentrant.
#[derive(Debug)]
pub struct DwarfContext {
    endian: scroll::Endian,
    sections: DwarfSections,
    units: Vec<CompilationUnit>,
    /// Failures confined to single units; the units after them parsed.
    pub unit_errors: Vec<UnitError>,
    loclists: BTreeMap<u64, Loclist>,
    line_programs: BTreeMap<usize, LineProgram>,
    macro_sets: Option<Vec<MacroSet>>,
}

impl DwarfContext {
    /// Builds a context over an ELF object's debug sections.
    pub fn from_object(obj: &ElfObject) -> Result<Self, DwarfError> {
        let sections = DwarfSections::from_object(obj)?;
        Self::from_sections(sections, obj.endianness().scroll())
    }

    /// Builds a context from raw section payloads.
    ///
    /// All unit headers and DIE trees are parsed eagerly. A format error
    /// inside one unit skips that unit (recorded in `unit_errors`) and
    /// continues at the next unit boundary; an error in a unit header
    /// itself is fatal because the boundary is lost.
    pub fn from_sections(
        sections: DwarfSections,
        endian: scroll::Endian,
    ) -> Result<Self, DwarfError> {
        let mut context = DwarfContext {
            endian,
            sections,
            units: Vec::new(),
            unit_errors: Vec::new(),
            loclists: BTreeMap::new(),
            line_programs: BTreeMap::new(),
            macro_sets: None,
        };

        let info = match context.sections.info.as_deref() {
            Some(info) => info,
            None => return Ok(context),
        };
        let abbrev = context
            .sections
            .abbrev
            .as_deref()
            .ok_or(DwarfErrorKind::NoEntry)?;
        let strings = context.sections.str.as_deref();

        let mut offset = 0u64;
        while (offset as usize) < info.len() {
            match CompilationUnit::parse(info, offset, abbrev, strings, endian) {
                Ok(unit) => {
                    let end = unit.end_offset();
                    if end <= offset {
                        return Err(DwarfErrorKind::CorruptedData.into());
                    }
                    context.units.push(unit);
                    offset = end;
                }
                Err(error) => {
                    // Recover at the next boundary if the header was
                    // readable; without a unit length there is no
                    // boundary to resume at.
                    let mut cursor = ferrite_elf::Cursor::new(info, endian);
                    cursor.seek(offset as usize);
                    let (format, unit_length) =
                        crate::unit::read_initial_length(&mut cursor).map_err(|_| {
                            DwarfError::new(DwarfErrorKind::CorruptedData, error.to_string())
                        })?;
                    let end = offset + format.initial_length_size() as u64 + unit_length;
                    if end <= offset || end as usize > info.len() {
                        return Err(error);
                    }
                    context.unit_errors.push(UnitError { offset, error });
                    offset = end;
                }
            }
        }

        Ok(context)
    }

    /// The byte order of the debug sections.
    pub fn endian(&self) -> scroll::Endian {
        self.endian
    }

    /// The successfully parsed compilation units, in section order.
    pub fn units(&self) -> &[CompilationUnit] {
        &self.units
    }

    /// Finds the unit containing the absolute `.debug_info` offset.
    pub fn unit_for_offset(&self, offset: u64) -> Option<&CompilationUnit> {
        self.units
            .iter()
            .find(|unit| unit.offset <= offset && offset < unit.end_offset())
    }

    /// Parses and caches the location list at `offset` in `.debug_loc`.
    ///
    /// Idempotent: a second call for the same offset returns the cached
    /// list. `address_size` must match the referencing unit.
    pub fn loclist_add(&mut self, offset: u64, address_size: u8) -> Result<&Loclist, DwarfError> {
        match self.loclists.entry(offset) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let data = self
                    .sections
                    .loc
                    .as_deref()
                    .ok_or(DwarfErrorKind::NoEntry)?;
                let list = loclist::parse_loclist(data, offset, self.endian, address_size)?;
                Ok(entry.insert(list))
            }
        }
    }

    /// Returns the cached location list at `offset`.
    pub fn loclist_find(&self, offset: u64) -> Result<&Loclist, DwarfError> {
        self.loclists
            .get(&offset)
            .ok_or_else(|| DwarfErrorKind::NoEntry.into())
    }

    /// Parses and caches the line program of the unit at `unit_index`.
    ///
    /// The program is located through the root DIE's `DW_AT_stmt_list`.
    pub fn line_program(&mut self, unit_index: usize) -> Result<&LineProgram, DwarfError> {
        if !self.line_programs.contains_key(&unit_index) {
            let unit = self.units.get(unit_index).ok_or(DwarfErrorKind::Argument)?;
            let root = unit.root().ok_or(DwarfErrorKind::NoEntry)?;
            let offset = match root.attr(DW_AT_stmt_list) {
                Some(AttrValue::Unsigned(offset)) | Some(AttrValue::LoclistPointer(offset)) => {
                    *offset
                }
                Some(_) => return Err(DwarfErrorKind::CorruptedData.into()),
                None => return Err(DwarfErrorKind::NoEntry.into()),
            };

            let data = self
                .sections
                .line
                .as_deref()
                .ok_or(DwarfErrorKind::NoEntry)?;
            let program =
                line::parse_line_program(data, offset, self.endian, unit.encoding.address_size)?;
            self.line_programs.insert(unit_index, program);
        }

        self.line_programs
            .get(&unit_index)
            .ok_or_else(|| DwarfErrorKind::Argument.into())
    }

    /// Parses and caches every macro set in `.debug_macinfo`.
    pub fn macro_sets(&mut self) -> Result<&[MacroSet], DwarfError> {
        if self.macro_sets.is_none() {
            let data = self
                .sections
                .macinfo
                .as_deref()
                .ok_or(DwarfErrorKind::NoEntry)?;
            self.macro_sets = Some(macinfo::parse_macinfo(data, self.endian)?);
        }
        Ok(self.macro_sets.as_deref().unwrap_or_default())
    }

    /// The macro-info offset referenced by a unit root, if any.
    pub fn macro_offset(&self, unit_index: usize) -> Option<u64> {
        let root = self.units.get(unit_index)?.root()?;
        match root.attr(DW_AT_macro_info) {
            Some(AttrValue::Unsigned(offset)) | Some(AttrValue::LoclistPointer(offset)) => {
                Some(*offset)
            }
            _ => None,
        }
    }
}
