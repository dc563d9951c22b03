//! Compilation units and their DIE trees.
//!
//! DIEs are stored in an arena per unit, in parse order (which is the
//! on-disk preorder), with children linked by arena index and a hash from
//! section offset to index for resolving reference-form attributes.

use std::collections::HashMap;

use ferrite_elf::{Cursor, ElfError};

use crate::abbrev::AbbrevTable;
use crate::error::{DwarfError, DwarfErrorKind};
use crate::value::{self, AttrValue, Attribute};

/// The DWARF format of a unit: the width of its section offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// 4-byte section offsets.
    Dwarf32,
    /// 8-byte section offsets (initial length `0xffffffff`).
    Dwarf64,
}

impl Format {
    /// The size of a section offset in this format.
    pub fn offset_size(self) -> usize {
        match self {
            Format::Dwarf32 => 4,
            Format::Dwarf64 => 8,
        }
    }

    /// The size of the initial length field.
    pub fn initial_length_size(self) -> usize {
        match self {
            Format::Dwarf32 => 4,
            Format::Dwarf64 => 12,
        }
    }
}

/// The properties needed to decode values inside one unit.
#[derive(Clone, Copy, Debug)]
pub struct UnitEncoding {
    /// The unit's DWARF format.
    pub format: Format,
    /// The unit's DWARF version (2 through 4).
    pub version: u16,
    /// The size of a target address in bytes.
    pub address_size: u8,
}

/// A debugging information entry.
#[derive(Clone, Debug)]
pub struct Die {
    /// Absolute offset of this DIE in `.debug_info`.
    pub offset: u64,
    /// Nesting depth below the unit root.
    pub level: u32,
    /// The abbreviation code that shaped this DIE.
    pub code: u64,
    /// The tag, copied out of the abbreviation.
    pub tag: u64,
    /// Attribute values in declaration order.
    pub attrs: Vec<Attribute>,
    /// Arena indices of the children, in order.
    pub children: Vec<usize>,
}

impl Die {
    /// Returns the value of `attr` if this DIE carries it.
    pub fn attr(&self, attr: u64) -> Option<&AttrValue> {
        self.attrs.iter().find(|a| a.attr == attr).map(|a| &a.value)
    }
}

/// A compilation unit: header fields, abbreviations and the DIE arena.
#[derive(Clone, Debug)]
pub struct CompilationUnit {
    /// Offset of the unit header in `.debug_info`.
    pub offset: u64,
    /// The unit length from the header, excluding the initial length
    /// field itself.
    pub unit_length: u64,
    /// The unit's encoding properties.
    pub encoding: UnitEncoding,
    /// Offset of the unit's abbreviation table in `.debug_abbrev`.
    pub abbrev_offset: u64,
    /// This unit's abbreviations.
    pub abbrevs: AbbrevTable,
    dies: Vec<Die>,
    by_offset: HashMap<u64, usize>,
}

fn corrupt(e: ElfError) -> DwarfError {
    DwarfError::new(DwarfErrorKind::CorruptedData, e)
}

/// Reads an initial length field, returning the format and the length.
pub fn read_initial_length(cursor: &mut Cursor<'_>) -> Result<(Format, u64), DwarfError> {
    let initial = cursor.read_u32().map_err(corrupt)?;
    if initial == 0xffff_ffff {
        Ok((Format::Dwarf64, cursor.read_u64().map_err(corrupt)?))
    } else if initial >= 0xffff_fff0 {
        // Reserved initial length values.
        Err(DwarfErrorKind::CorruptedData.into())
    } else {
        Ok((Format::Dwarf32, u64::from(initial)))
    }
}

impl CompilationUnit {
    /// Parses the unit starting at `offset` in `.debug_info`.
    ///
    /// `abbrev` is the entire `.debug_abbrev` payload; `strings` the
    /// `.debug_str` payload if present.
    pub fn parse(
        info: &[u8],
        offset: u64,
        abbrev: &[u8],
        strings: Option<&[u8]>,
        endian: scroll::Endian,
    ) -> Result<Self, DwarfError> {
        let mut cursor = Cursor::new(info, endian);
        cursor.seek(offset as usize);

        let (format, unit_length) = read_initial_length(&mut cursor)?;
        let unit_end = offset
            .checked_add(format.initial_length_size() as u64)
            .and_then(|v| v.checked_add(unit_length))
            .ok_or(DwarfErrorKind::CorruptedData)?;
        if unit_end as usize > info.len() {
            return Err(DwarfErrorKind::CorruptedData.into());
        }

        let version = cursor.read_u16().map_err(corrupt)?;
        if !(2..=4).contains(&version) {
            return Err(DwarfErrorKind::CorruptedData.into());
        }

        let abbrev_offset = cursor.read_uint(format.offset_size()).map_err(corrupt)?;
        let address_size = cursor.read_u8().map_err(corrupt)?;
        if address_size != 4 && address_size != 8 {
            return Err(DwarfErrorKind::CorruptedData.into());
        }

        let encoding = UnitEncoding {
            format,
            version,
            address_size,
        };

        if abbrev_offset as usize >= abbrev.len() {
            return Err(DwarfErrorKind::InvalidAbbrev.into());
        }
        let mut abbrev_cursor = Cursor::new(abbrev, endian);
        abbrev_cursor.seek(abbrev_offset as usize);
        let abbrevs = AbbrevTable::parse(&mut abbrev_cursor)?;

        let mut unit = CompilationUnit {
            offset,
            unit_length,
            encoding,
            abbrev_offset,
            abbrevs,
            dies: Vec::new(),
            by_offset: HashMap::new(),
        };

        unit.parse_dies(&mut cursor, unit_end, strings)?;
        Ok(unit)
    }

    fn parse_dies(
        &mut self,
        cursor: &mut Cursor<'_>,
        unit_end: u64,
        strings: Option<&[u8]>,
    ) -> Result<(), DwarfError> {
        let mut stack: Vec<usize> = Vec::new();

        while (cursor.position() as u64) < unit_end {
            let die_offset = cursor.position() as u64;
            let code = cursor.read_uleb128().map_err(corrupt)?;

            if code == 0 {
                // Close one level; a null at the root ends the unit.
                if stack.pop().is_none() {
                    break;
                }
                continue;
            }

            let abbrev = self
                .abbrevs
                .get(code)
                .ok_or(DwarfErrorKind::InvalidAbbrev)?;

            let mut attrs = Vec::with_capacity(abbrev.attrs.len());
            for spec in &abbrev.attrs {
                let value = value::parse_value(
                    cursor,
                    spec.attr,
                    spec.form,
                    self.encoding,
                    self.offset,
                    strings,
                )?;
                attrs.push(Attribute {
                    attr: spec.attr,
                    form: spec.form,
                    value,
                });
            }

            let index = self.dies.len();
            let die = Die {
                offset: die_offset,
                level: stack.len() as u32,
                code,
                tag: abbrev.tag,
                attrs,
                children: Vec::new(),
            };

            if let Some(&parent) = stack.last() {
                self.dies[parent].children.push(index);
            }
            self.by_offset.insert(die_offset, index);

            let has_children = abbrev.has_children;
            self.dies.push(die);
            if has_children {
                stack.push(index);
            }
        }

        Ok(())
    }

    /// One past the last byte of this unit in `.debug_info`.
    pub fn end_offset(&self) -> u64 {
        self.offset + self.encoding.format.initial_length_size() as u64 + self.unit_length
    }

    /// The DIEs of this unit in preorder, which equals on-disk order.
    pub fn dies(&self) -> &[Die] {
        &self.dies
    }

    /// The root DIE, absent only in a degenerate empty unit.
    pub fn root(&self) -> Option<&Die> {
        self.dies.first()
    }

    /// Constant-time lookup of a DIE by its absolute section offset.
    pub fn die_by_offset(&self, offset: u64) -> Option<&Die> {
        self.by_offset.get(&offset).map(|&index| &self.dies[index])
    }

    /// The children of a DIE, in declaration order.
    pub fn children<'a>(&'a self, die: &'a Die) -> impl Iterator<Item = &'a Die> {
        die.children.iter().map(move |&index| &self.dies[index])
    }
}
