use std::collections::HashMap;

use ferrite_elf::{Buffer, Cursor};

use crate::constants::{DW_CHILDREN_no, DW_CHILDREN_yes};
use crate::error::{DwarfError, DwarfErrorKind};

/// One `(attribute, form)` pair of an abbreviation declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AttrSpec {
    /// The attribute (`DW_AT_*`).
    pub attr: u64,
    /// The form its value is encoded in (`DW_FORM_*`).
    pub form: u64,
}

/// A single abbreviation declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Abbrev {
    /// The nonzero code DIEs use to select this declaration.
    pub code: u64,
    /// The tag of DIEs using this declaration (`DW_TAG_*`).
    pub tag: u64,
    /// Whether such DIEs own children.
    pub has_children: bool,
    /// Offset of this declaration in `.debug_abbrev`.
    pub offset: u64,
    /// The attribute definitions, in encoding order.
    pub attrs: Vec<AttrSpec>,
}

/// One compilation unit's abbreviation table, indexed by code.
#[derive(Clone, Debug, Default)]
pub struct AbbrevTable {
    abbrevs: Vec<Abbrev>,
    by_code: HashMap<u64, usize>,
}

impl AbbrevTable {
    /// Parses one table from the cursor, which must sit at the table's
    /// start inside `.debug_abbrev`. Stops at the zero code that
    /// terminates the table.
    pub fn parse(cursor: &mut Cursor<'_>) -> Result<Self, DwarfError> {
        let invalid = |e| DwarfError::new(DwarfErrorKind::InvalidAbbrev, e);

        let mut table = AbbrevTable::default();
        loop {
            let offset = cursor.position() as u64;
            let code = cursor.read_uleb128().map_err(invalid)?;
            if code == 0 {
                return Ok(table);
            }

            let tag = cursor.read_uleb128().map_err(invalid)?;
            let has_children = match cursor.read_u8().map_err(invalid)? {
                DW_CHILDREN_no => false,
                DW_CHILDREN_yes => true,
                _ => return Err(DwarfErrorKind::InvalidAbbrev.into()),
            };

            let mut attrs = Vec::new();
            loop {
                let attr = cursor.read_uleb128().map_err(invalid)?;
                let form = cursor.read_uleb128().map_err(invalid)?;
                if attr == 0 && form == 0 {
                    break;
                }
                attrs.push(AttrSpec { attr, form });
            }

            let index = table.abbrevs.len();
            table.by_code.insert(code, index);
            table.abbrevs.push(Abbrev {
                code,
                tag,
                has_children,
                offset,
                attrs,
            });
        }
    }

    /// Looks up a declaration by its code.
    pub fn get(&self, code: u64) -> Option<&Abbrev> {
        self.by_code.get(&code).map(|&index| &self.abbrevs[index])
    }

    /// Appends a declaration built elsewhere, e.g. by the producer.
    pub fn push(&mut self, abbrev: Abbrev) {
        self.by_code.insert(abbrev.code, self.abbrevs.len());
        self.abbrevs.push(abbrev);
    }

    /// Finds the declaration matching an exact shape.
    pub fn find_shape(&self, tag: u64, has_children: bool, attrs: &[AttrSpec]) -> Option<&Abbrev> {
        self.abbrevs
            .iter()
            .find(|a| a.tag == tag && a.has_children == has_children && a.attrs == attrs)
    }

    /// The declarations in declaration order.
    pub fn abbrevs(&self) -> &[Abbrev] {
        &self.abbrevs
    }

    /// True if the table holds no declarations.
    pub fn is_empty(&self) -> bool {
        self.abbrevs.is_empty()
    }

    /// Serializes the table, including its terminating zero code.
    pub fn encode(&self, buf: &mut Buffer) {
        for abbrev in &self.abbrevs {
            buf.push_uleb128(abbrev.code);
            buf.push_uleb128(abbrev.tag);
            buf.push_u8(if abbrev.has_children {
                DW_CHILDREN_yes
            } else {
                DW_CHILDREN_no
            });
            for spec in &abbrev.attrs {
                buf.push_uleb128(spec.attr);
                buf.push_uleb128(spec.form);
            }
            buf.push_uleb128(0);
            buf.push_uleb128(0);
        }
        buf.push_uleb128(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use scroll::LE;

    use crate::constants::*;

    fn sample_table() -> Vec<u8> {
        let mut buf = Buffer::new(LE);
        // code 1: compile_unit, children, name/strp low_pc/addr high_pc/addr.
        buf.push_uleb128(1);
        buf.push_uleb128(DW_TAG_compile_unit);
        buf.push_u8(DW_CHILDREN_yes);
        for (attr, form) in [
            (DW_AT_name, DW_FORM_strp),
            (DW_AT_low_pc, DW_FORM_addr),
            (DW_AT_high_pc, DW_FORM_addr),
        ] {
            buf.push_uleb128(attr);
            buf.push_uleb128(form);
        }
        buf.push_uleb128(0);
        buf.push_uleb128(0);
        buf.push_uleb128(0);
        buf.into_vec()
    }

    #[test]
    fn test_parse_and_lookup() {
        let data = sample_table();
        let mut cursor = Cursor::new(&data, LE);
        let table = AbbrevTable::parse(&mut cursor).unwrap();

        let abbrev = table.get(1).unwrap();
        assert_eq!(abbrev.tag, DW_TAG_compile_unit);
        assert!(abbrev.has_children);
        assert_eq!(
            abbrev.attrs,
            vec![
                AttrSpec {
                    attr: DW_AT_name,
                    form: DW_FORM_strp
                },
                AttrSpec {
                    attr: DW_AT_low_pc,
                    form: DW_FORM_addr
                },
                AttrSpec {
                    attr: DW_AT_high_pc,
                    form: DW_FORM_addr
                },
            ]
        );

        assert!(table.get(2).is_none());
    }

    #[test]
    fn test_bad_children_flag() {
        let mut buf = Buffer::new(LE);
        buf.push_uleb128(1);
        buf.push_uleb128(DW_TAG_base_type);
        buf.push_u8(7);

        let data = buf.into_vec();
        let mut cursor = Cursor::new(&data, LE);
        let err = AbbrevTable::parse(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), DwarfErrorKind::InvalidAbbrev);
    }

    #[test]
    fn test_truncated_table() {
        let data = sample_table();
        let mut cursor = Cursor::new(&data[..4], LE);
        let err = AbbrevTable::parse(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), DwarfErrorKind::InvalidAbbrev);
    }

    #[test]
    fn test_encode_round_trip() {
        let data = sample_table();
        let mut cursor = Cursor::new(&data, LE);
        let table = AbbrevTable::parse(&mut cursor).unwrap();

        let mut buf = Buffer::new(LE);
        table.encode(&mut buf);
        assert_eq!(buf.into_vec(), data);
    }
}
