//! Attribute values and their per-form decoders.

use ferrite_elf::{Cursor, ElfError};

use crate::constants::*;
use crate::error::{DwarfError, DwarfErrorKind};
use crate::expr::{self, Locdesc};
use crate::unit::UnitEncoding;

/// A decoded attribute value, tagged by the shape its form implies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttrValue {
    /// Constants, flags and data forms.
    Unsigned(u64),
    /// `DW_FORM_sdata`.
    Signed(i64),
    /// `DW_FORM_flag` and `DW_FORM_flag_present`.
    Flag(bool),
    /// In-place and `.debug_str` strings.
    Str(String),
    /// Raw block forms on non-location attributes.
    Block(Vec<u8>),
    /// A reference to a DIE in the same unit, as an absolute
    /// `.debug_info` offset.
    Reference(u64),
    /// A reference to a DIE in any unit (`DW_FORM_ref_addr`).
    GlobalReference(u64),
    /// A target address.
    Address(u64),
    /// A parsed location expression from a block-valued location
    /// attribute.
    Location(Locdesc),
    /// A `.debug_loc` offset from a constant-valued location attribute;
    /// resolve through the debug context's location-list cache.
    LoclistPointer(u64),
}

/// An attribute of a DIE: the definition pair plus the decoded value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    /// The attribute (`DW_AT_*`).
    pub attr: u64,
    /// The form the value was encoded in; for indirect attributes this is
    /// the resolved form, not `DW_FORM_indirect`.
    pub form: u64,
    /// The decoded value.
    pub value: AttrValue,
}

fn corrupt(e: ElfError) -> DwarfError {
    DwarfError::new(DwarfErrorKind::CorruptedData, e)
}

fn read_str_at(strings: Option<&[u8]>, offset: u64) -> Result<String, DwarfError> {
    let data = strings.ok_or(DwarfErrorKind::CorruptedData)?;
    let tail = data
        .get(offset as usize..)
        .ok_or(DwarfErrorKind::CorruptedData)?;
    let end = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(DwarfErrorKind::CorruptedData)?;
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}

/// Decodes one attribute value at the cursor, driven by its form.
///
/// `cu_offset` rebases unit-relative references to absolute `.debug_info`
/// offsets, so they can be resolved through the unit's offset hash.
pub fn parse_value(
    cursor: &mut Cursor<'_>,
    attr: u64,
    form: u64,
    encoding: UnitEncoding,
    cu_offset: u64,
    strings: Option<&[u8]>,
) -> Result<AttrValue, DwarfError> {
    let endian = cursor.endian();
    let address_size = encoding.address_size;
    let offset_size = encoding.format.offset_size();
    let is_loc = is_location_attribute(attr);

    let value = match form {
        DW_FORM_addr => AttrValue::Address(
            cursor
                .read_uint(address_size as usize)
                .map_err(corrupt)?,
        ),
        DW_FORM_data1 => AttrValue::Unsigned(u64::from(cursor.read_u8().map_err(corrupt)?)),
        DW_FORM_data2 => AttrValue::Unsigned(u64::from(cursor.read_u16().map_err(corrupt)?)),
        DW_FORM_data4 | DW_FORM_data8 | DW_FORM_sec_offset => {
            let value = if form == DW_FORM_data4 {
                u64::from(cursor.read_u32().map_err(corrupt)?)
            } else if form == DW_FORM_data8 {
                cursor.read_u64().map_err(corrupt)?
            } else {
                cursor.read_uint(offset_size).map_err(corrupt)?
            };
            if is_loc {
                AttrValue::LoclistPointer(value)
            } else {
                AttrValue::Unsigned(value)
            }
        }
        DW_FORM_udata => AttrValue::Unsigned(cursor.read_uleb128().map_err(corrupt)?),
        DW_FORM_sdata => AttrValue::Signed(cursor.read_sleb128().map_err(corrupt)?),
        DW_FORM_flag => AttrValue::Flag(cursor.read_u8().map_err(corrupt)? != 0),
        DW_FORM_flag_present => AttrValue::Flag(true),
        DW_FORM_string => {
            let bytes = cursor.read_cstr().map_err(corrupt)?;
            AttrValue::Str(String::from_utf8_lossy(bytes).into_owned())
        }
        DW_FORM_strp => {
            let offset = cursor.read_uint(offset_size).map_err(corrupt)?;
            AttrValue::Str(read_str_at(strings, offset)?)
        }
        DW_FORM_block1 | DW_FORM_block2 | DW_FORM_block4 | DW_FORM_block | DW_FORM_exprloc => {
            let length = match form {
                DW_FORM_block1 => u64::from(cursor.read_u8().map_err(corrupt)?),
                DW_FORM_block2 => u64::from(cursor.read_u16().map_err(corrupt)?),
                DW_FORM_block4 => u64::from(cursor.read_u32().map_err(corrupt)?),
                _ => cursor.read_uleb128().map_err(corrupt)?,
            };
            let bytes = cursor.read_bytes(length as usize).map_err(corrupt)?;
            if is_loc || form == DW_FORM_exprloc {
                AttrValue::Location(expr::parse_locdesc(bytes, endian, address_size)?)
            } else {
                AttrValue::Block(bytes.to_vec())
            }
        }
        DW_FORM_ref1 => {
            AttrValue::Reference(cu_offset + u64::from(cursor.read_u8().map_err(corrupt)?))
        }
        DW_FORM_ref2 => {
            AttrValue::Reference(cu_offset + u64::from(cursor.read_u16().map_err(corrupt)?))
        }
        DW_FORM_ref4 => {
            AttrValue::Reference(cu_offset + u64::from(cursor.read_u32().map_err(corrupt)?))
        }
        DW_FORM_ref8 => AttrValue::Reference(cu_offset + cursor.read_u64().map_err(corrupt)?),
        DW_FORM_ref_udata => {
            AttrValue::Reference(cu_offset + cursor.read_uleb128().map_err(corrupt)?)
        }
        DW_FORM_ref_addr => {
            // DWARF 2 encoded this with the address size; later versions
            // use the offset size.
            let size = if encoding.version == 2 {
                address_size as usize
            } else {
                offset_size
            };
            AttrValue::GlobalReference(cursor.read_uint(size).map_err(corrupt)?)
        }
        DW_FORM_indirect => {
            let actual = cursor.read_uleb128().map_err(corrupt)?;
            if actual == DW_FORM_indirect {
                return Err(DwarfErrorKind::CorruptedData.into());
            }
            return parse_value(cursor, attr, actual, encoding, cu_offset, strings);
        }
        _ => return Err(DwarfErrorKind::CorruptedData.into()),
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    use ferrite_elf::Buffer;
    use scroll::LE;

    use crate::unit::Format;

    fn encoding() -> UnitEncoding {
        UnitEncoding {
            format: Format::Dwarf32,
            version: 4,
            address_size: 8,
        }
    }

    fn decode(attr: u64, form: u64, data: &[u8]) -> AttrValue {
        let mut cursor = Cursor::new(data, LE);
        parse_value(&mut cursor, attr, form, encoding(), 0x100, None).unwrap()
    }

    #[test]
    fn test_constants() {
        assert_eq!(decode(DW_AT_decl_line, DW_FORM_data1, &[42]), AttrValue::Unsigned(42));
        assert_eq!(
            decode(DW_AT_const_value, DW_FORM_sdata, &[0x7f]),
            AttrValue::Signed(-1)
        );
        assert_eq!(
            decode(DW_AT_external, DW_FORM_flag, &[1]),
            AttrValue::Flag(true)
        );
    }

    #[test]
    fn test_in_place_string() {
        assert_eq!(
            decode(DW_AT_name, DW_FORM_string, b"main\0"),
            AttrValue::Str("main".to_string())
        );
    }

    #[test]
    fn test_strp() {
        let strings = b"\0foo\0main\0";
        let mut buf = Buffer::new(LE);
        buf.push_u32(5);
        let data = buf.into_vec();

        let mut cursor = Cursor::new(&data, LE);
        let value =
            parse_value(&mut cursor, DW_AT_name, DW_FORM_strp, encoding(), 0, Some(strings))
                .unwrap();
        assert_eq!(value, AttrValue::Str("main".to_string()));
    }

    #[test]
    fn test_reference_rebased_to_section() {
        let mut buf = Buffer::new(LE);
        buf.push_u32(0x40);
        let data = buf.into_vec();
        assert_eq!(
            decode(DW_AT_type, DW_FORM_ref4, &data),
            AttrValue::Reference(0x140)
        );
    }

    #[test]
    fn test_location_block_is_parsed() {
        // block1 of length 1: DW_OP_reg0+2.
        let data = [1, DW_OP_reg0 + 2];
        match decode(DW_AT_location, DW_FORM_block1, &data) {
            AttrValue::Location(desc) => {
                assert_eq!(desc.operations.len(), 1);
                assert_eq!(desc.operations[0].code, DW_OP_reg0 + 2);
            }
            other => panic!("expected location, got {other:?}"),
        }
    }

    #[test]
    fn test_loclist_pointer() {
        let mut buf = Buffer::new(LE);
        buf.push_u32(0x80);
        let data = buf.into_vec();
        assert_eq!(
            decode(DW_AT_location, DW_FORM_data4, &data),
            AttrValue::LoclistPointer(0x80)
        );
    }

    #[test]
    fn test_non_location_block_stays_raw() {
        let data = [2, 0xaa, 0xbb];
        assert_eq!(
            decode(DW_AT_const_value, DW_FORM_block1, &data),
            AttrValue::Block(vec![0xaa, 0xbb])
        );
    }

    #[test]
    fn test_indirect() {
        let mut buf = Buffer::new(LE);
        buf.push_uleb128(DW_FORM_data2);
        buf.push_u16(0x1234);
        let data = buf.into_vec();
        assert_eq!(
            decode(DW_AT_decl_line, DW_FORM_indirect, &data),
            AttrValue::Unsigned(0x1234)
        );
    }

    #[test]
    fn test_undefined_form() {
        let mut cursor = Cursor::new(&[0u8], LE);
        let err = parse_value(&mut cursor, DW_AT_name, 0x7f, encoding(), 0, None).unwrap_err();
        assert_eq!(err.kind(), DwarfErrorKind::CorruptedData);
    }
}
