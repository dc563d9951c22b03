//! Line number programs: the row state machine and its encoder.

use ferrite_elf::{Buffer, Cursor, ElfError};

use crate::constants::*;
use crate::error::{DwarfError, DwarfErrorKind};
use crate::unit::{read_initial_length, Format};

/// A source file referenced by a line program.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileEntry {
    /// The file name as stored.
    pub name: String,
    /// Index into the include directories, zero for the compilation
    /// directory.
    pub dir_index: u64,
    /// Modification time, zero if unknown.
    pub mtime: u64,
    /// File size in bytes, zero if unknown.
    pub length: u64,
}

/// The header of a line number program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineProgramHeader {
    /// The program's DWARF format.
    pub format: Format,
    /// The line-table version (2 through 4).
    pub version: u16,
    /// Size of the smallest target instruction.
    pub min_instruction_length: u8,
    /// Operations per instruction, 1 before version 4.
    pub max_ops_per_instruction: u8,
    /// Initial value of the `is_stmt` register.
    pub default_is_stmt: bool,
    /// Smallest line advance a special opcode can encode.
    pub line_base: i8,
    /// Range of line advances special opcodes encode.
    pub line_range: u8,
    /// First special opcode value.
    pub opcode_base: u8,
    /// Operand counts of the standard opcodes, indexed by opcode - 1.
    pub standard_opcode_lengths: Vec<u8>,
    /// Include directories, 1-based in the file entries.
    pub include_directories: Vec<String>,
    /// The file table, 1-based in the rows.
    pub file_names: Vec<FileEntry>,
}

/// One row of the generated line table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LineRow {
    /// Target address of the first instruction of the row.
    pub address: u64,
    /// 1-based index into the file table.
    pub file: u64,
    /// Source line, zero when unknown.
    pub line: u64,
    /// Source column, zero when unknown.
    pub column: u64,
    /// Whether the row is a statement boundary.
    pub is_stmt: bool,
    /// Marks the first address past a sequence.
    pub end_sequence: bool,
}

/// A parsed line program: its header and the emitted rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineProgram {
    /// The program header.
    pub header: LineProgramHeader,
    /// The rows in emission order.
    pub rows: Vec<LineRow>,
}

fn invalid(e: ElfError) -> DwarfError {
    DwarfError::new(DwarfErrorKind::InvalidLine, e)
}

struct Registers {
    address: u64,
    file: u64,
    line: i64,
    column: u64,
    is_stmt: bool,
}

impl Registers {
    fn new(default_is_stmt: bool) -> Self {
        Self {
            address: 0,
            file: 1,
            line: 1,
            column: 0,
            is_stmt: default_is_stmt,
        }
    }

    fn row(&self, end_sequence: bool) -> LineRow {
        LineRow {
            address: self.address,
            file: self.file,
            line: self.line.max(0) as u64,
            column: self.column,
            is_stmt: self.is_stmt,
            end_sequence,
        }
    }
}

fn parse_file_entry(cursor: &mut Cursor<'_>, name: &[u8]) -> Result<FileEntry, DwarfError> {
    Ok(FileEntry {
        name: String::from_utf8_lossy(name).into_owned(),
        dir_index: cursor.read_uleb128().map_err(invalid)?,
        mtime: cursor.read_uleb128().map_err(invalid)?,
        length: cursor.read_uleb128().map_err(invalid)?,
    })
}

/// Parses the line program starting at `offset` in `.debug_line`.
pub fn parse_line_program(
    data: &[u8],
    offset: u64,
    endian: scroll::Endian,
    address_size: u8,
) -> Result<LineProgram, DwarfError> {
    if offset as usize >= data.len() {
        return Err(DwarfErrorKind::InvalidLine.into());
    }

    let mut cursor = Cursor::new(data, endian);
    cursor.seek(offset as usize);

    let (format, unit_length) = read_initial_length(&mut cursor)
        .map_err(|_| DwarfError::from(DwarfErrorKind::InvalidLine))?;
    let program_end = offset as usize + format.initial_length_size() + unit_length as usize;
    if program_end > data.len() {
        return Err(DwarfErrorKind::InvalidLine.into());
    }

    let version = cursor.read_u16().map_err(invalid)?;
    if !(2..=4).contains(&version) {
        return Err(DwarfErrorKind::InvalidLine.into());
    }

    let header_length = cursor.read_uint(format.offset_size()).map_err(invalid)?;
    let program_start = cursor.position() + header_length as usize;

    let min_instruction_length = cursor.read_u8().map_err(invalid)?;
    let max_ops_per_instruction = if version >= 4 {
        cursor.read_u8().map_err(invalid)?
    } else {
        1
    };
    let default_is_stmt = cursor.read_u8().map_err(invalid)? != 0;
    let line_base = cursor.read_u8().map_err(invalid)? as i8;
    let line_range = cursor.read_u8().map_err(invalid)?;
    let opcode_base = cursor.read_u8().map_err(invalid)?;
    if line_range == 0 || opcode_base == 0 {
        return Err(DwarfErrorKind::InvalidLine.into());
    }

    let mut standard_opcode_lengths = Vec::with_capacity(opcode_base as usize - 1);
    for _ in 1..opcode_base {
        standard_opcode_lengths.push(cursor.read_u8().map_err(invalid)?);
    }

    let mut include_directories = Vec::new();
    loop {
        let dir = cursor.read_cstr().map_err(invalid)?;
        if dir.is_empty() {
            break;
        }
        include_directories.push(String::from_utf8_lossy(dir).into_owned());
    }

    let mut file_names = Vec::new();
    loop {
        let name = cursor.read_cstr().map_err(invalid)?;
        if name.is_empty() {
            break;
        }
        file_names.push(parse_file_entry(&mut cursor, name)?);
    }

    let mut header = LineProgramHeader {
        format,
        version,
        min_instruction_length,
        max_ops_per_instruction,
        default_is_stmt,
        line_base,
        line_range,
        opcode_base,
        standard_opcode_lengths,
        include_directories,
        file_names,
    };

    // The declared header length wins over our own position, as opcodes
    // may have been appended after a vendor extension.
    cursor.seek(program_start);

    let mut rows = Vec::new();
    let mut regs = Registers::new(header.default_is_stmt);

    while cursor.position() < program_end {
        let opcode = cursor.read_u8().map_err(invalid)?;

        if opcode >= header.opcode_base {
            let adjusted = u64::from(opcode - header.opcode_base);
            regs.address += (adjusted / u64::from(header.line_range))
                * u64::from(header.min_instruction_length);
            regs.line += i64::from(header.line_base)
                + (adjusted % u64::from(header.line_range)) as i64;
            rows.push(regs.row(false));
        } else if opcode == 0 {
            // Extended opcode: length-prefixed.
            let length = cursor.read_uleb128().map_err(invalid)? as usize;
            let end = cursor.position() + length;
            if length == 0 || end > program_end {
                return Err(DwarfErrorKind::InvalidLine.into());
            }
            let sub = cursor.read_u8().map_err(invalid)?;
            match sub {
                DW_LNE_end_sequence => {
                    rows.push(regs.row(true));
                    regs = Registers::new(header.default_is_stmt);
                }
                DW_LNE_set_address => {
                    regs.address = cursor
                        .read_uint(address_size as usize)
                        .map_err(invalid)?;
                }
                DW_LNE_define_file => {
                    let name = cursor.read_cstr().map_err(invalid)?;
                    let entry = parse_file_entry(&mut cursor, name)?;
                    header.file_names.push(entry);
                }
                _ => {
                    // Unknown extension, e.g. set_discriminator on old
                    // producers. Skip its payload.
                }
            }
            cursor.seek(end);
        } else {
            match opcode {
                DW_LNS_copy => rows.push(regs.row(false)),
                DW_LNS_advance_pc => {
                    let advance = cursor.read_uleb128().map_err(invalid)?;
                    regs.address += advance * u64::from(header.min_instruction_length);
                }
                DW_LNS_advance_line => {
                    regs.line += cursor.read_sleb128().map_err(invalid)?;
                }
                DW_LNS_set_file => regs.file = cursor.read_uleb128().map_err(invalid)?,
                DW_LNS_set_column => regs.column = cursor.read_uleb128().map_err(invalid)?,
                DW_LNS_negate_stmt => regs.is_stmt = !regs.is_stmt,
                DW_LNS_set_basic_block => {}
                DW_LNS_const_add_pc => {
                    let adjusted = u64::from(255 - header.opcode_base);
                    regs.address += (adjusted / u64::from(header.line_range))
                        * u64::from(header.min_instruction_length);
                }
                DW_LNS_fixed_advance_pc => {
                    regs.address += u64::from(cursor.read_u16().map_err(invalid)?);
                }
                _ => {
                    // A standard opcode this consumer does not model;
                    // consume its declared ULEB128 operands.
                    let count = header
                        .standard_opcode_lengths
                        .get(opcode as usize - 1)
                        .copied()
                        .unwrap_or(0);
                    for _ in 0..count {
                        cursor.read_uleb128().map_err(invalid)?;
                    }
                }
            }
        }
    }

    Ok(LineProgram { header, rows })
}

impl LineProgramHeader {
    /// A header with the layout this crate's encoder emits.
    pub fn new(file_names: Vec<FileEntry>) -> Self {
        Self {
            format: Format::Dwarf32,
            version: 2,
            min_instruction_length: 1,
            max_ops_per_instruction: 1,
            default_is_stmt: true,
            line_base: -5,
            line_range: 14,
            opcode_base: 13,
            standard_opcode_lengths: vec![0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1],
            include_directories: Vec::new(),
            file_names,
        }
    }
}

impl LineProgram {
    /// Serializes the program into `.debug_line` bytes.
    ///
    /// Rows are emitted with explicit standard opcodes, one sequence per
    /// `end_sequence` row; special opcodes are not synthesized. The result
    /// parses back into the same rows.
    pub fn encode(&self, endian: scroll::Endian, address_size: u8) -> Result<Vec<u8>, DwarfError> {
        if self.header.format == Format::Dwarf64 {
            return Err(DwarfErrorKind::Argument.into());
        }

        let mut header = Buffer::new(endian);
        header.push_u8(self.header.min_instruction_length);
        if self.header.version >= 4 {
            header.push_u8(self.header.max_ops_per_instruction);
        }
        header.push_u8(self.header.default_is_stmt as u8);
        header.push_u8(self.header.line_base as u8);
        header.push_u8(self.header.line_range);
        header.push_u8(self.header.opcode_base);
        for &length in &self.header.standard_opcode_lengths {
            header.push_u8(length);
        }
        for dir in &self.header.include_directories {
            header.push_bytes(dir.as_bytes());
            header.push_u8(0);
        }
        header.push_u8(0);
        for file in &self.header.file_names {
            header.push_bytes(file.name.as_bytes());
            header.push_u8(0);
            header.push_uleb128(file.dir_index);
            header.push_uleb128(file.mtime);
            header.push_uleb128(file.length);
        }
        header.push_u8(0);
        let header = header.into_vec();

        let mut program = Buffer::new(endian);
        let mut regs = Registers::new(self.header.default_is_stmt);
        for row in &self.rows {
            if row.end_sequence {
                if row.address != regs.address {
                    self.advance_pc(&mut program, row.address, regs.address)?;
                }
                program.push_u8(0);
                program.push_uleb128(1);
                program.push_u8(DW_LNE_end_sequence);
                regs = Registers::new(self.header.default_is_stmt);
                continue;
            }

            if regs.address == 0 && row.address != 0 {
                program.push_u8(0);
                program.push_uleb128(1 + address_size as u64);
                program.push_u8(DW_LNE_set_address);
                let mut addr = Buffer::new(endian);
                addr.push_uint(row.address, address_size as usize)
                    .map_err(invalid)?;
                program.push_bytes(&addr.into_vec());
                regs.address = row.address;
            } else if row.address != regs.address {
                self.advance_pc(&mut program, row.address, regs.address)?;
                regs.address = row.address;
            }

            if row.line as i64 != regs.line {
                program.push_u8(DW_LNS_advance_line);
                program.push_sleb128(row.line as i64 - regs.line);
                regs.line = row.line as i64;
            }
            if row.file != regs.file {
                program.push_u8(DW_LNS_set_file);
                program.push_uleb128(row.file);
                regs.file = row.file;
            }
            if row.column != regs.column {
                program.push_u8(DW_LNS_set_column);
                program.push_uleb128(row.column);
                regs.column = row.column;
            }
            if row.is_stmt != regs.is_stmt {
                program.push_u8(DW_LNS_negate_stmt);
                regs.is_stmt = row.is_stmt;
            }
            program.push_u8(DW_LNS_copy);
        }
        let program = program.into_vec();

        // unit_length covers everything after the initial length field:
        // version (2) + header_length (4) + header + program.
        let mut out = Buffer::new(endian);
        out.push_u32((2 + 4 + header.len() + program.len()) as u32);
        out.push_u16(self.header.version);
        out.push_u32(header.len() as u32);
        out.push_bytes(&header);
        out.push_bytes(&program);
        Ok(out.into_vec())
    }

    fn advance_pc(&self, buf: &mut Buffer, to: u64, from: u64) -> Result<(), DwarfError> {
        let delta = to.checked_sub(from).ok_or(DwarfErrorKind::Argument)?;
        let min = u64::from(self.header.min_instruction_length);
        if min == 0 || delta % min != 0 {
            return Err(DwarfErrorKind::Argument.into());
        }
        buf.push_u8(DW_LNS_advance_pc);
        buf.push_uleb128(delta / min);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use scroll::LE;

    fn sample_program() -> LineProgram {
        let header = LineProgramHeader::new(vec![FileEntry {
            name: "main.c".to_string(),
            ..FileEntry::default()
        }]);
        LineProgram {
            header,
            rows: vec![
                LineRow {
                    address: 0x1000,
                    file: 1,
                    line: 10,
                    column: 0,
                    is_stmt: true,
                    end_sequence: false,
                },
                LineRow {
                    address: 0x1008,
                    file: 1,
                    line: 11,
                    column: 4,
                    is_stmt: true,
                    end_sequence: false,
                },
                LineRow {
                    address: 0x1010,
                    file: 1,
                    line: 11,
                    column: 4,
                    is_stmt: true,
                    end_sequence: true,
                },
            ],
        }
    }

    #[test]
    fn test_encode_parse_round_trip() {
        let program = sample_program();
        let bytes = program.encode(LE, 8).unwrap();
        let parsed = parse_line_program(&bytes, 0, LE, 8).unwrap();

        assert_eq!(parsed.rows, program.rows);
        assert_eq!(parsed.header.file_names, program.header.file_names);
        assert_eq!(parsed.header.version, 2);
    }

    #[test]
    fn test_bad_version() {
        let program = sample_program();
        let mut bytes = program.encode(LE, 8).unwrap();
        bytes[4] = 9; // version
        let err = parse_line_program(&bytes, 0, LE, 8).unwrap_err();
        assert_eq!(err.kind(), DwarfErrorKind::InvalidLine);
    }

    #[test]
    fn test_offset_out_of_bounds() {
        let err = parse_line_program(&[0u8; 4], 100, LE, 8).unwrap_err();
        assert_eq!(err.kind(), DwarfErrorKind::InvalidLine);
    }
}
