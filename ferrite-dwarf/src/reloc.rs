//! Pre-parse relocation of debug sections.
//!
//! Relocatable objects carry `.rela.debug_*` sections whose entries patch
//! section-relative offsets into the debug sections. Parsing without
//! applying them would chase dangling offsets, so consumers work on a
//! relocated in-memory copy; the object itself is never modified.

use scroll::{Pread, Pwrite};

use ferrite_elf::{Class, ElfObject};

use crate::error::{DwarfError, DwarfErrorKind};

/// Returns a copy of the section at `index` with its paired `.rel`/
/// `.rela` section applied: the class-sized value at each `r_offset` is
/// incremented by the relocation's addend.
///
/// Sections without a paired relocation section are returned as plain
/// copies.
pub fn relocated_section_data(obj: &ElfObject, index: usize) -> Result<Vec<u8>, DwarfError> {
    let section = obj
        .section_by_index(index)
        .ok_or(DwarfErrorKind::Argument)?;
    let mut data = section.data.clone();

    let reloc_section = obj
        .sections()
        .enumerate()
        .find(|(_, s)| s.is_reloc() && s.info as usize == index);
    let (reloc_index, _) = match reloc_section {
        Some(found) => found,
        None => return Ok(data),
    };

    let endian = obj.endianness().scroll();
    let value_size = match obj.class() {
        Class::Elf32 => 4,
        Class::Elf64 => 8,
    };

    for reloc in obj.relocations(reloc_index)? {
        let offset = reloc.offset as usize;
        if offset + value_size > data.len() {
            return Err(DwarfErrorKind::CorruptedData.into());
        }

        let addend = reloc.addend.unwrap_or(0);
        match obj.class() {
            Class::Elf32 => {
                let value: u32 = data
                    .pread_with(offset, endian)
                    .map_err(|e| DwarfError::new(DwarfErrorKind::CorruptedData, e))?;
                let patched = value.wrapping_add(addend as u32);
                data.pwrite_with(patched, offset, endian)
                    .map_err(|e| DwarfError::new(DwarfErrorKind::CorruptedData, e))?;
            }
            Class::Elf64 => {
                let value: u64 = data
                    .pread_with(offset, endian)
                    .map_err(|e| DwarfError::new(DwarfErrorKind::CorruptedData, e))?;
                let patched = value.wrapping_add(addend as u64);
                data.pwrite_with(patched, offset, endian)
                    .map_err(|e| DwarfError::new(DwarfErrorKind::CorruptedData, e))?;
            }
        }
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    use goblin::elf::section_header::SHT_PROGBITS;

    use ferrite_elf::{Class, Endianness, Relocation, Symbol};
    use ferrite_testutils::ObjectBuilder;

    #[test]
    fn test_addend_applied_to_copy() {
        let mut builder = ObjectBuilder::relocatable(Class::Elf64, Endianness::Little);
        let debug = builder.section(".debug_info", SHT_PROGBITS, 0, vec![0u8; 16]);
        let symtab = builder.symtab(&[("", Symbol::default())]);
        builder.rela(
            debug,
            symtab,
            &[Relocation {
                offset: 8,
                sym: 0,
                rtype: 1,
                addend: Some(0x60),
            }],
        );

        let obj = builder.build();
        let (index, original) = obj.section_by_name(".debug_info").unwrap();
        let original = original.data.clone();

        let relocated = relocated_section_data(&obj, index).unwrap();
        assert_eq!(&relocated[..8], &original[..8]);
        assert_eq!(u64::from_le_bytes(relocated[8..16].try_into().unwrap()), 0x60);

        // The object's own payload is untouched.
        let (_, section) = obj.section_by_name(".debug_info").unwrap();
        assert_eq!(section.data, original);
    }

    #[test]
    fn test_out_of_bounds_offset() {
        let mut builder = ObjectBuilder::relocatable(Class::Elf64, Endianness::Little);
        let debug = builder.section(".debug_info", SHT_PROGBITS, 0, vec![0u8; 8]);
        let symtab = builder.symtab(&[("", Symbol::default())]);
        builder.rela(
            debug,
            symtab,
            &[Relocation {
                offset: 4,
                sym: 0,
                rtype: 1,
                addend: Some(1),
            }],
        );

        let obj = builder.build();
        let (index, _) = obj.section_by_name(".debug_info").unwrap();
        let err = relocated_section_data(&obj, index).unwrap_err();
        assert_eq!(err.kind(), DwarfErrorKind::CorruptedData);
    }
}
