//! Macro information streams (`.debug_macinfo`).

use ferrite_elf::{Buffer, Cursor, ElfError};

use crate::constants::*;
use crate::error::{DwarfError, DwarfErrorKind};

/// One record of a macro information stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MacroRecord {
    /// A `#define`, with the line it occurred on and "name value" text.
    Define {
        /// Source line of the definition.
        line: u64,
        /// The macro name and replacement text.
        text: String,
    },
    /// An `#undef`.
    Undef {
        /// Source line of the removal.
        line: u64,
        /// The macro name.
        text: String,
    },
    /// Start of an included file.
    StartFile {
        /// Line of the inclusion in the including file.
        line: u64,
        /// Index into the line program's file table.
        file: u64,
    },
    /// End of the current included file.
    EndFile,
    /// A vendor extension record.
    VendorExt {
        /// A vendor-defined constant.
        line: u64,
        /// The vendor-defined payload.
        text: String,
    },
}

/// The records of one macro stream, terminated by a zero type byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacroSet {
    /// Offset of the first record in `.debug_macinfo`.
    pub offset: u64,
    /// The records in stream order.
    pub records: Vec<MacroRecord>,
}

fn invalid(e: ElfError) -> DwarfError {
    DwarfError::new(DwarfErrorKind::InvalidMacinfo, e)
}

fn read_text(cursor: &mut Cursor<'_>) -> Result<String, DwarfError> {
    let bytes = cursor.read_cstr().map_err(invalid)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Parses every macro set in a `.debug_macinfo` payload.
///
/// Each set runs up to and including its zero type byte; sets follow each
/// other until the section is exhausted.
pub fn parse_macinfo(data: &[u8], endian: scroll::Endian) -> Result<Vec<MacroSet>, DwarfError> {
    let mut cursor = Cursor::new(data, endian);
    let mut sets = Vec::new();

    while !cursor.is_empty() {
        let offset = cursor.position() as u64;
        let mut records = Vec::new();

        loop {
            let kind = cursor.read_u8().map_err(invalid)?;
            if kind == 0 {
                break;
            }

            let record = match kind {
                DW_MACINFO_define => MacroRecord::Define {
                    line: cursor.read_uleb128().map_err(invalid)?,
                    text: read_text(&mut cursor)?,
                },
                DW_MACINFO_undef => MacroRecord::Undef {
                    line: cursor.read_uleb128().map_err(invalid)?,
                    text: read_text(&mut cursor)?,
                },
                DW_MACINFO_start_file => MacroRecord::StartFile {
                    line: cursor.read_uleb128().map_err(invalid)?,
                    file: cursor.read_uleb128().map_err(invalid)?,
                },
                DW_MACINFO_end_file => MacroRecord::EndFile,
                DW_MACINFO_vendor_ext => MacroRecord::VendorExt {
                    line: cursor.read_uleb128().map_err(invalid)?,
                    text: read_text(&mut cursor)?,
                },
                _ => return Err(DwarfErrorKind::InvalidMacinfo.into()),
            };
            records.push(record);
        }

        if records.is_empty() && cursor.is_empty() {
            // Trailing terminator byte, not an empty set.
            break;
        }
        sets.push(MacroSet { offset, records });
    }

    Ok(sets)
}

/// Serializes macro records into one `.debug_macinfo` stream, including
/// the terminating zero byte.
pub fn encode_macinfo(records: &[MacroRecord], buf: &mut Buffer) {
    for record in records {
        match record {
            MacroRecord::Define { line, text } => {
                buf.push_u8(DW_MACINFO_define);
                buf.push_uleb128(*line);
                buf.push_bytes(text.as_bytes());
                buf.push_u8(0);
            }
            MacroRecord::Undef { line, text } => {
                buf.push_u8(DW_MACINFO_undef);
                buf.push_uleb128(*line);
                buf.push_bytes(text.as_bytes());
                buf.push_u8(0);
            }
            MacroRecord::StartFile { line, file } => {
                buf.push_u8(DW_MACINFO_start_file);
                buf.push_uleb128(*line);
                buf.push_uleb128(*file);
            }
            MacroRecord::EndFile => buf.push_u8(DW_MACINFO_end_file),
            MacroRecord::VendorExt { line, text } => {
                buf.push_u8(DW_MACINFO_vendor_ext);
                buf.push_uleb128(*line);
                buf.push_bytes(text.as_bytes());
                buf.push_u8(0);
            }
        }
    }
    buf.push_u8(0);
}
