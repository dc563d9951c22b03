//! Location lists from `.debug_loc`.
//!
//! A list is a run of `(start, end)` address pairs: `(0, 0)` terminates,
//! an all-ones `start` selects a new base address, and anything else
//! bounds a location expression prefixed with a 2-byte length.

use ferrite_elf::{Buffer, Cursor, ElfError};

use crate::error::{DwarfError, DwarfErrorKind};
use crate::expr::{self, Locdesc};

/// One entry of a location list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoclistEntry {
    /// A location valid over `[lopc, hipc)`, relative to the current base.
    Location(Locdesc),
    /// Selects a new base address for the following entries.
    BaseSelect {
        /// The new base address.
        base: u64,
    },
    /// Terminates the list.
    End,
}

/// A parsed location list, keyed by its offset in `.debug_loc`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Loclist {
    /// The offset this list starts at.
    pub offset: u64,
    /// The entries in stream order, including base selections and the
    /// terminating end entry.
    pub entries: Vec<LoclistEntry>,
    /// The number of bytes the list occupies in the section.
    pub byte_length: u64,
}

fn invalid(e: ElfError) -> DwarfError {
    DwarfError::new(DwarfErrorKind::InvalidLoclist, e)
}

/// Parses the location list starting at `offset` in `.debug_loc`.
pub fn parse_loclist(
    data: &[u8],
    offset: u64,
    endian: scroll::Endian,
    address_size: u8,
) -> Result<Loclist, DwarfError> {
    if offset as usize >= data.len() {
        return Err(DwarfErrorKind::InvalidLoclist.into());
    }

    let base_marker = expr::max_address(address_size);
    let mut cursor = Cursor::new(data, endian);
    cursor.seek(offset as usize);

    let mut entries = Vec::new();
    while !cursor.is_empty() {
        let start = cursor.read_uint(address_size as usize).map_err(invalid)?;
        let end = cursor.read_uint(address_size as usize).map_err(invalid)?;

        if start == 0 && end == 0 {
            entries.push(LoclistEntry::End);
            break;
        }

        if start == base_marker {
            entries.push(LoclistEntry::BaseSelect { base: end });
            continue;
        }

        let length = cursor.read_u16().map_err(invalid)? as usize;
        if cursor.remaining() < length {
            return Err(DwarfErrorKind::InvalidLoclist.into());
        }
        let block = cursor.read_bytes(length).map_err(invalid)?;

        entries.push(LoclistEntry::Location(Locdesc {
            lopc: start,
            hipc: end,
            operations: expr::parse_expression(block, endian, address_size)?,
        }));
    }

    let byte_length = cursor.position() as u64 - offset;
    Ok(Loclist {
        offset,
        entries,
        byte_length,
    })
}

/// Serializes a list of entries into `.debug_loc` bytes.
pub fn encode_loclist(
    entries: &[LoclistEntry],
    buf: &mut Buffer,
    address_size: u8,
) -> Result<(), DwarfError> {
    let base_marker = expr::max_address(address_size);

    for entry in entries {
        match entry {
            LoclistEntry::Location(desc) => {
                buf.push_uint(desc.lopc, address_size as usize)
                    .map_err(invalid)?;
                buf.push_uint(desc.hipc, address_size as usize)
                    .map_err(invalid)?;

                let mut block = Buffer::new(buf.endian());
                expr::encode_expression(&desc.operations, &mut block, address_size)?;
                let block = block.into_vec();
                if block.len() > u16::MAX as usize {
                    return Err(DwarfErrorKind::Argument.into());
                }
                buf.push_u16(block.len() as u16);
                buf.push_bytes(&block);
            }
            LoclistEntry::BaseSelect { base } => {
                buf.push_uint(base_marker, address_size as usize)
                    .map_err(invalid)?;
                buf.push_uint(*base, address_size as usize).map_err(invalid)?;
            }
            LoclistEntry::End => {
                buf.push_uint(0, address_size as usize).map_err(invalid)?;
                buf.push_uint(0, address_size as usize).map_err(invalid)?;
            }
        }
    }

    Ok(())
}
