//! Phase C: assigning file offsets and serializing the output object.
//!
//! The canonical output order: ELF header, program headers, the kept
//! sections in input order followed by added sections, `.shstrtab`, the
//! section header table, then `.symtab`, `.strtab` and, for relocatable
//! outputs, the relocation payloads at the very end. Section header
//! *indices* follow a different, fixed arrangement: kept and added
//! sections first, then `.symtab`, `.strtab` and `.shstrtab` last.

use goblin::elf::header::{ET_DYN, ET_EXEC, ET_REL};
use goblin::elf::section_header::{SHF_ALLOC, SHT_STRTAB, SHT_SYMTAB};
use tracing::warn;

use ferrite_elf::{Buffer, ElfObject, Section, StrtabBuilder};

use crate::sections::{OutSection, Plan};
use crate::symbols::SymtabDisposition;
use crate::{Elfcopy, CopyError, CopyErrorKind};

fn align_up(value: u64, align: u64) -> u64 {
    if align > 1 {
        (value + align - 1) & !(align - 1)
    } else {
        value
    }
}

fn remap_link(secndx: &[usize], name: &str, link: u32) -> u32 {
    if link == 0 {
        return 0;
    }
    match secndx.get(link as usize) {
        Some(&mapped) if mapped != 0 => mapped as u32,
        _ => {
            warn!(section = name, link, "sh_link points at a removed section");
            0
        }
    }
}

fn into_section(out: OutSection, secndx: &[usize]) -> Section {
    let is_reloc = out.sh_type == goblin::elf::section_header::SHT_REL
        || out.sh_type == goblin::elf::section_header::SHT_RELA;

    let link = remap_link(secndx, &out.name, out.link);
    let info = if is_reloc && out.input_index.is_some() {
        remap_link(secndx, &out.name, out.info)
    } else {
        out.info
    };

    Section {
        name: out.name,
        sh_type: out.sh_type,
        flags: out.flags,
        addr: out.addr,
        offset: 0,
        size: out.size,
        link,
        info,
        addralign: out.addralign,
        entsize: out.entsize,
        data: out.data,
    }
}

/// Finishes the pipeline: materializes the table sections, assigns every
/// file offset, recomputes segment coverage and serializes the object.
pub(crate) fn finish(ecp: &Elfcopy, obj: &ElfObject, plan: Plan) -> Result<Vec<u8>, CopyError> {
    match obj.e_type {
        ET_REL | ET_EXEC | ET_DYN => {}
        _ => return Err(CopyErrorKind::UnsupportedType.into()),
    }

    let class = ecp.output_class.unwrap_or(obj.class);
    let endianness = ecp.output_endianness.unwrap_or(obj.endianness);
    let relocatable = plan.relocatable;
    let secndx = plan.secndx;

    let mut sections: Vec<Section> = Vec::with_capacity(plan.sections.len() + 3);
    for out in plan.sections {
        sections.push(into_section(out, &secndx));
    }

    let symtab_index = sections.len();
    match plan.symtab {
        SymtabDisposition::Absent | SymtabDisposition::Dropped => {}
        SymtabDisposition::Intact => {
            let input_symtab = plan.input_symtab.ok_or(CopyErrorKind::MissingSection)?;
            let input_strtab = plan.input_strtab.ok_or(CopyErrorKind::MissingSection)?;
            for index in [input_symtab, input_strtab] {
                let section = &obj.sections[index];
                let mut copy = section.clone();
                copy.link = remap_link(&secndx, &copy.name, copy.link);
                copy.offset = 0;
                sections.push(copy);
            }
        }
        SymtabDisposition::Generated(generated) => {
            let mut payload = Buffer::new(endianness.scroll());
            for symbol in &generated.symbols {
                symbol.encode(&mut payload, class);
            }
            let data = payload.into_vec();
            sections.push(Section {
                name: ".symtab".to_string(),
                sh_type: SHT_SYMTAB,
                flags: 0,
                addr: 0,
                offset: 0,
                size: data.len() as u64,
                link: (symtab_index + 1) as u32,
                info: generated.nls as u32,
                addralign: class.sym_align(),
                entsize: class.sym_size() as u64,
                data,
            });
            sections.push(Section {
                name: ".strtab".to_string(),
                sh_type: SHT_STRTAB,
                flags: 0,
                addr: 0,
                offset: 0,
                size: generated.strtab.len() as u64,
                link: 0,
                info: 0,
                addralign: 1,
                entsize: 0,
                data: generated.strtab,
            });
        }
    }

    // .shstrtab holds every output section name, its own included.
    let mut shstrtab = StrtabBuilder::new();
    for section in &sections {
        if !section.name.is_empty() {
            shstrtab.insert(&section.name);
        }
    }
    shstrtab.insert(".shstrtab");
    let shstrndx = sections.len();
    let shstrtab_data = shstrtab.into_bytes();
    sections.push(Section {
        name: ".shstrtab".to_string(),
        sh_type: SHT_STRTAB,
        flags: 0,
        addr: 0,
        offset: 0,
        size: shstrtab_data.len() as u64,
        link: 0,
        info: 0,
        addralign: 1,
        entsize: 0,
        data: shstrtab_data,
    });

    // Offset assignment in the canonical file order.
    let phnum = obj.program_headers.len() as u64;
    let phoff = if phnum > 0 { class.ehdr_size() as u64 } else { 0 };
    let mut cursor = class.ehdr_size() as u64 + phnum * class.phdr_size() as u64;
    let has_phdrs = phnum > 0;

    let is_deferred_reloc = |section: &Section| relocatable && section.is_reloc();
    let table_indices = [symtab_index, symtab_index + 1];

    // Kept and added sections, in index order.
    for (index, section) in sections.iter_mut().enumerate().skip(1) {
        if index >= symtab_index || is_deferred_reloc(section) {
            continue;
        }

        cursor = align_up(cursor, section.addralign);
        if has_phdrs && section.flags & u64::from(SHF_ALLOC) != 0 {
            // Preserve the input file position of loadable content so
            // segment coverage survives; fall back to the running cursor
            // when the input position is no longer reachable.
            if let Some(input_index) = secndx.iter().position(|&out| out == index) {
                let input_offset = obj.sections[input_index].offset;
                if input_offset >= cursor {
                    cursor = input_offset;
                }
            }
        }
        section.offset = cursor;
        if !section.is_nobits() {
            cursor += section.data.len() as u64;
        }
    }

    // .shstrtab.
    {
        let section = &mut sections[shstrndx];
        section.offset = cursor;
        cursor += section.data.len() as u64;
    }

    // Section header table.
    let shoff = align_up(cursor, class.addr_size() as u64);
    cursor = shoff + (sections.len() * class.shdr_size()) as u64;

    // .symtab and .strtab payloads follow the header table.
    for &index in &table_indices {
        if index < shstrndx {
            let section = &mut sections[index];
            cursor = align_up(cursor, section.addralign);
            section.offset = cursor;
            cursor += section.data.len() as u64;
        }
    }

    // Relocation payloads close the file for relocatables.
    for section in sections.iter_mut() {
        if is_deferred_reloc(section) {
            cursor = align_up(cursor, section.addralign);
            section.offset = cursor;
            cursor += section.data.len() as u64;
        }
    }

    let mut out = ElfObject {
        class,
        endianness,
        os_abi: obj.os_abi,
        abi_version: obj.abi_version,
        e_type: obj.e_type,
        machine: obj.machine,
        version: obj.version,
        entry: obj.entry,
        flags: obj.flags,
        phoff,
        shoff,
        shstrndx,
        program_headers: obj.program_headers.clone(),
        sections,
    };

    crate::segments::update_segments(
        obj,
        &mut out,
        &secndx,
        phoff,
        phnum * class.phdr_size() as u64,
    );

    Ok(out.to_vec()?)
}
