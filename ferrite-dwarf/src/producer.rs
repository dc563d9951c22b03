//! The producer surface: building debug sections from scratch.
//!
//! A client accumulates units, DIEs, attribute values, macro records and
//! location lists, then serializes the lot into well-formed section
//! payloads. Abbreviations are not spelled out by the client; every
//! distinct DIE shape (tag, children flag, attribute/form list) is
//! assigned a code automatically.

use std::collections::HashMap;

use ferrite_elf::Buffer;

use crate::abbrev::{Abbrev, AbbrevTable, AttrSpec};
use crate::constants::*;
use crate::context::DwarfSections;
use crate::error::{DwarfError, DwarfErrorKind};
use crate::expr::{self, Operation};
use crate::line::LineProgram;
use crate::loclist::{self, LoclistEntry};
use crate::macinfo::{self, MacroRecord};
use crate::unit::Format;

/// Identifies a unit added to a producer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnitId(usize);

/// Identifies a DIE within its unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DieId(usize);

/// An attribute value supplied by a producer client.
///
/// The encoding form is chosen by the producer: variable-length data
/// forms for constants, in-place strings, blocks for expressions and
/// 4-byte unit-relative references.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProducerValue {
    /// An unsigned constant (`DW_FORM_udata`).
    Unsigned(u64),
    /// A signed constant (`DW_FORM_sdata`).
    Signed(i64),
    /// A flag (`DW_FORM_flag`).
    Flag(bool),
    /// An in-place string (`DW_FORM_string`).
    Str(String),
    /// An uninterpreted block (`DW_FORM_block`).
    Block(Vec<u8>),
    /// A target address (`DW_FORM_addr`).
    Address(u64),
    /// A reference to another DIE of the same unit (`DW_FORM_ref4`).
    Reference(DieId),
    /// A location expression, encoded as a block.
    Location(Vec<Operation>),
    /// An offset into the emitted `.debug_loc` (`DW_FORM_data4/8`).
    LoclistPointer(u64),
}

struct ProducerDie {
    tag: u64,
    attrs: Vec<(u64, ProducerValue)>,
    children: Vec<usize>,
}

struct ProducerUnit {
    dies: Vec<ProducerDie>,
    root: Option<usize>,
}

/// Accumulates debug information and serializes it into section bytes.
pub struct DwarfProducer {
    endian: scroll::Endian,
    format: Format,
    version: u16,
    address_size: u8,
    units: Vec<ProducerUnit>,
    macros: Vec<MacroRecord>,
    loclists: Vec<Vec<LoclistEntry>>,
    line_program: Option<LineProgram>,
}

impl DwarfProducer {
    /// Creates a producer for the given target properties.
    pub fn new(
        endian: scroll::Endian,
        format: Format,
        version: u16,
        address_size: u8,
    ) -> Result<Self, DwarfError> {
        if !(2..=4).contains(&version) || (address_size != 4 && address_size != 8) {
            return Err(DwarfErrorKind::Argument.into());
        }
        Ok(Self {
            endian,
            format,
            version,
            address_size,
            units: Vec::new(),
            macros: Vec::new(),
            loclists: Vec::new(),
            line_program: None,
        })
    }

    /// Starts a new compilation unit.
    pub fn add_unit(&mut self) -> UnitId {
        self.units.push(ProducerUnit {
            dies: Vec::new(),
            root: None,
        });
        UnitId(self.units.len() - 1)
    }

    /// Adds a DIE to a unit. A `None` parent makes it the unit root,
    /// which must not already exist.
    pub fn add_die(
        &mut self,
        unit: UnitId,
        parent: Option<DieId>,
        tag: u64,
    ) -> Result<DieId, DwarfError> {
        let unit = self
            .units
            .get_mut(unit.0)
            .ok_or(DwarfErrorKind::Argument)?;

        let index = unit.dies.len();
        match parent {
            None => {
                if unit.root.is_some() {
                    return Err(DwarfErrorKind::Argument.into());
                }
                unit.root = Some(index);
            }
            Some(parent) => {
                let parent = unit
                    .dies
                    .get_mut(parent.0)
                    .ok_or(DwarfErrorKind::Argument)?;
                parent.children.push(index);
            }
        }

        unit.dies.push(ProducerDie {
            tag,
            attrs: Vec::new(),
            children: Vec::new(),
        });
        Ok(DieId(index))
    }

    /// Appends an attribute value to a DIE.
    pub fn add_attr(
        &mut self,
        unit: UnitId,
        die: DieId,
        attr: u64,
        value: ProducerValue,
    ) -> Result<(), DwarfError> {
        let unit = self
            .units
            .get_mut(unit.0)
            .ok_or(DwarfErrorKind::Argument)?;
        let die = unit.dies.get_mut(die.0).ok_or(DwarfErrorKind::Argument)?;
        die.attrs.push((attr, value));
        Ok(())
    }

    /// Appends a macro record to the producer's single macro stream.
    pub fn add_macro(&mut self, record: MacroRecord) {
        self.macros.push(record);
    }

    /// Adds a location list and returns its id.
    ///
    /// The section offset the list will land at is available immediately
    /// through [`loclist_offset`](Self::loclist_offset), so it can be
    /// stored in a [`ProducerValue::LoclistPointer`] before emission.
    pub fn add_loclist(&mut self, entries: Vec<LoclistEntry>) -> usize {
        self.loclists.push(entries);
        self.loclists.len() - 1
    }

    /// The `.debug_loc` offset the list with the given id will be
    /// emitted at.
    pub fn loclist_offset(&self, id: usize) -> Result<u64, DwarfError> {
        if id >= self.loclists.len() {
            return Err(DwarfErrorKind::Argument.into());
        }

        let mut offset = 0u64;
        for entries in &self.loclists[..id] {
            let mut buf = Buffer::new(self.endian);
            loclist::encode_loclist(entries, &mut buf, self.address_size)?;
            offset += buf.len() as u64;
        }
        Ok(offset)
    }

    /// Sets the line program emitted into `.debug_line`.
    pub fn set_line_program(&mut self, program: LineProgram) {
        self.line_program = Some(program);
    }

    /// Serializes everything accumulated so far.
    pub fn emit(&self) -> Result<DwarfSections, DwarfError> {
        let mut sections = DwarfSections::default();

        if !self.units.is_empty() {
            let mut abbrev = Buffer::new(self.endian);
            let mut info = Buffer::new(self.endian);

            for unit in &self.units {
                let abbrev_offset = abbrev.len() as u64;
                let table = self.build_abbrevs(unit);
                table.encode(&mut abbrev);
                self.emit_unit(unit, &table, abbrev_offset, &mut info)?;
            }

            sections.abbrev = Some(abbrev.into_vec());
            sections.info = Some(info.into_vec());
        }

        if !self.loclists.is_empty() {
            let mut buf = Buffer::new(self.endian);
            for entries in &self.loclists {
                loclist::encode_loclist(entries, &mut buf, self.address_size)?;
            }
            sections.loc = Some(buf.into_vec());
        }

        if !self.macros.is_empty() {
            let mut buf = Buffer::new(self.endian);
            macinfo::encode_macinfo(&self.macros, &mut buf);
            sections.macinfo = Some(buf.into_vec());
        }

        if let Some(ref program) = self.line_program {
            sections.line = Some(program.encode(self.endian, self.address_size)?);
        }

        Ok(sections)
    }

    fn form_for(&self, value: &ProducerValue) -> u64 {
        match value {
            ProducerValue::Unsigned(_) => DW_FORM_udata,
            ProducerValue::Signed(_) => DW_FORM_sdata,
            ProducerValue::Flag(_) => DW_FORM_flag,
            ProducerValue::Str(_) => DW_FORM_string,
            ProducerValue::Block(_) => DW_FORM_block,
            ProducerValue::Address(_) => DW_FORM_addr,
            ProducerValue::Reference(_) => DW_FORM_ref4,
            ProducerValue::Location(_) => DW_FORM_block,
            ProducerValue::LoclistPointer(_) => match self.format {
                Format::Dwarf32 => DW_FORM_data4,
                Format::Dwarf64 => DW_FORM_data8,
            },
        }
    }

    fn build_abbrevs(&self, unit: &ProducerUnit) -> AbbrevTable {
        type Shape = (u64, bool, Vec<AttrSpec>);

        let mut table = AbbrevTable::default();
        let mut codes: HashMap<Shape, u64> = HashMap::new();

        for die in &unit.dies {
            let specs: Vec<AttrSpec> = die
                .attrs
                .iter()
                .map(|(attr, value)| AttrSpec {
                    attr: *attr,
                    form: self.form_for(value),
                })
                .collect();
            let shape = (die.tag, !die.children.is_empty(), specs);

            if !codes.contains_key(&shape) {
                let code = codes.len() as u64 + 1;
                table.push(Abbrev {
                    code,
                    tag: shape.0,
                    has_children: shape.1,
                    offset: 0,
                    attrs: shape.2.clone(),
                });
                codes.insert(shape, code);
            }
        }

        table
    }

    fn emit_unit(
        &self,
        unit: &ProducerUnit,
        table: &AbbrevTable,
        abbrev_offset: u64,
        info: &mut Buffer,
    ) -> Result<(), DwarfError> {
        let header_size = self.format.initial_length_size() + 2 + self.format.offset_size() + 1;

        let mut body = Buffer::new(self.endian);
        let mut die_offsets = vec![0u64; unit.dies.len()];
        let mut patches: Vec<(usize, usize)> = Vec::new();

        if let Some(root) = unit.root {
            self.emit_die(
                unit,
                table,
                root,
                header_size as u64,
                &mut body,
                &mut die_offsets,
                &mut patches,
            )?;
        }

        let mut body = body.into_vec();
        for (pos, target) in patches {
            let offset = die_offsets[target] as u32;
            let mut patch = Buffer::new(self.endian);
            patch.push_u32(offset);
            body[pos..pos + 4].copy_from_slice(&patch.into_vec());
        }

        // unit_length excludes the initial length field itself.
        let unit_length = (2 + self.format.offset_size() + 1 + body.len()) as u64;
        match self.format {
            Format::Dwarf32 => info.push_u32(unit_length as u32),
            Format::Dwarf64 => {
                info.push_u32(0xffff_ffff);
                info.push_u64(unit_length);
            }
        }
        info.push_u16(self.version);
        match self.format {
            Format::Dwarf32 => info.push_u32(abbrev_offset as u32),
            Format::Dwarf64 => info.push_u64(abbrev_offset),
        }
        info.push_u8(self.address_size);
        info.push_bytes(&body);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_die(
        &self,
        unit: &ProducerUnit,
        table: &AbbrevTable,
        index: usize,
        header_size: u64,
        body: &mut Buffer,
        die_offsets: &mut [u64],
        patches: &mut Vec<(usize, usize)>,
    ) -> Result<(), DwarfError> {
        let die = &unit.dies[index];
        die_offsets[index] = header_size + body.len() as u64;

        let specs: Vec<AttrSpec> = die
            .attrs
            .iter()
            .map(|(attr, value)| AttrSpec {
                attr: *attr,
                form: self.form_for(value),
            })
            .collect();
        let abbrev = table
            .find_shape(die.tag, !die.children.is_empty(), &specs)
            .ok_or(DwarfErrorKind::Argument)?;

        body.push_uleb128(abbrev.code);

        for (_, value) in &die.attrs {
            match value {
                ProducerValue::Unsigned(v) => body.push_uleb128(*v),
                ProducerValue::Signed(v) => body.push_sleb128(*v),
                ProducerValue::Flag(v) => body.push_u8(*v as u8),
                ProducerValue::Str(s) => {
                    body.push_bytes(s.as_bytes());
                    body.push_u8(0);
                }
                ProducerValue::Block(bytes) => {
                    body.push_uleb128(bytes.len() as u64);
                    body.push_bytes(bytes);
                }
                ProducerValue::Address(addr) => body
                    .push_uint(*addr, self.address_size as usize)
                    .map_err(|e| DwarfError::new(DwarfErrorKind::Argument, e))?,
                ProducerValue::Reference(target) => {
                    if target.0 >= unit.dies.len() {
                        return Err(DwarfErrorKind::Argument.into());
                    }
                    patches.push((body.len(), target.0));
                    body.push_u32(0);
                }
                ProducerValue::Location(ops) => {
                    let mut block = Buffer::new(self.endian);
                    expr::encode_expression(ops, &mut block, self.address_size)?;
                    let block = block.into_vec();
                    body.push_uleb128(block.len() as u64);
                    body.push_bytes(&block);
                }
                ProducerValue::LoclistPointer(offset) => match self.format {
                    Format::Dwarf32 => body.push_u32(*offset as u32),
                    Format::Dwarf64 => body.push_u64(*offset),
                },
            }
        }

        if !die.children.is_empty() {
            for &child in &die.children {
                self.emit_die(unit, table, child, header_size, body, die_offsets, patches)?;
            }
            body.push_uleb128(0);
        }

        Ok(())
    }
}
