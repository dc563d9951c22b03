//! Rewriting surviving relocation sections against the new symbol table.

use tracing::warn;

use ferrite_elf::{Buffer, Class, ElfObject, Endianness};

use crate::sections::Plan;
use crate::symbols::SymtabDisposition;
use crate::CopyError;

/// Remaps the symbol indices of every surviving relocation section
/// through `symndx` and re-encodes the payloads for the output class and
/// byte order.
///
/// Runs only when the symbol table was regenerated; intact tables keep
/// their indices, and with no table left the payloads stay as they are.
pub(crate) fn update_relocations(
    obj: &ElfObject,
    plan: &mut Plan,
    out_class: Class,
    out_endianness: Endianness,
) -> Result<(), CopyError> {
    let symtab_index = match plan.input_symtab {
        Some(index) => index,
        None => return Ok(()),
    };
    let symndx = match plan.symtab {
        SymtabDisposition::Generated(ref generated) => &generated.symndx,
        _ => return Ok(()),
    };

    for out in &mut plan.sections {
        let input_index = match out.input_index {
            Some(index) if index != 0 => index,
            _ => continue,
        };
        let section = &obj.sections[input_index];
        if !section.is_reloc() || section.link as usize != symtab_index {
            continue;
        }

        let mut buf = Buffer::new(out_endianness.scroll());
        let rela = section.sh_type == goblin::elf::section_header::SHT_RELA;

        for mut reloc in obj.relocations(input_index)? {
            let old = reloc.sym as usize;
            if old != 0 {
                let new = symndx.get(old).copied().unwrap_or(0);
                if new == 0 {
                    warn!(
                        section = out.name.as_str(),
                        index = old,
                        "relocation references a removed symbol"
                    );
                }
                reloc.sym = new as u32;
            }
            reloc.encode(&mut buf, out_class);
        }

        out.data = buf.into_vec();
        out.size = out.data.len() as u64;
        out.entsize = out_class.reloc_size(rela) as u64;
    }

    Ok(())
}
