use goblin::elf;
use goblin::elf::header::{EI_CLASS, ELFCLASS32, ELFCLASS64, ELFDATA2LSB, ELFDATA2MSB};
use goblin::elf::section_header::{SHT_NOBITS, SHT_NULL, SHT_SYMTAB};

use crate::error::{ElfError, ElfErrorKind};
use crate::reader::Cursor;
use crate::section::Section;
use crate::writer::Buffer;

const EI_OSABI: usize = 7;
const EI_ABIVERSION: usize = 8;

/// The ELF class of an object: 32- or 64-bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Class {
    /// `ELFCLASS32`.
    Elf32,
    /// `ELFCLASS64`.
    Elf64,
}

impl Class {
    /// The `EI_CLASS` identification byte.
    pub fn ident(self) -> u8 {
        match self {
            Class::Elf32 => ELFCLASS32,
            Class::Elf64 => ELFCLASS64,
        }
    }

    /// Size of an address or offset in file structures.
    pub fn addr_size(self) -> usize {
        match self {
            Class::Elf32 => 4,
            Class::Elf64 => 8,
        }
    }

    /// Size of the ELF header.
    pub fn ehdr_size(self) -> usize {
        match self {
            Class::Elf32 => 52,
            Class::Elf64 => 64,
        }
    }

    /// Size of one program header entry.
    pub fn phdr_size(self) -> usize {
        match self {
            Class::Elf32 => 32,
            Class::Elf64 => 56,
        }
    }

    /// Size of one section header entry.
    pub fn shdr_size(self) -> usize {
        match self {
            Class::Elf32 => 40,
            Class::Elf64 => 64,
        }
    }

    /// Size of one symbol table entry.
    pub fn sym_size(self) -> usize {
        match self {
            Class::Elf32 => 16,
            Class::Elf64 => 24,
        }
    }

    /// Size of one relocation entry, with or without an addend.
    pub fn reloc_size(self, rela: bool) -> usize {
        match (self, rela) {
            (Class::Elf32, false) => 8,
            (Class::Elf32, true) => 12,
            (Class::Elf64, false) => 16,
            (Class::Elf64, true) => 24,
        }
    }

    /// Alignment of symbol table entries.
    pub fn sym_align(self) -> u64 {
        self.addr_size() as u64
    }
}

/// The byte order of an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endianness {
    /// `ELFDATA2LSB`.
    Little,
    /// `ELFDATA2MSB`.
    Big,
}

impl Endianness {
    /// The `EI_DATA` identification byte.
    pub fn ident(self) -> u8 {
        match self {
            Endianness::Little => ELFDATA2LSB,
            Endianness::Big => ELFDATA2MSB,
        }
    }

    /// The matching `scroll` context for reads and writes.
    pub fn scroll(self) -> scroll::Endian {
        match self {
            Endianness::Little => scroll::LE,
            Endianness::Big => scroll::BE,
        }
    }
}

/// A program header of an executable or shared object.
#[derive(Clone, Copy, Debug, Default)]
pub struct Segment {
    /// Segment type (`PT_*`).
    pub p_type: u32,
    /// Segment attribute flags.
    pub p_flags: u32,
    /// File offset of the segment contents.
    pub p_offset: u64,
    /// Virtual address of the segment.
    pub p_vaddr: u64,
    /// Physical address, where relevant.
    pub p_paddr: u64,
    /// Number of file bytes in the segment.
    pub p_filesz: u64,
    /// Number of memory bytes in the segment.
    pub p_memsz: u64,
    /// Segment alignment.
    pub p_align: u64,
}

/// A symbol table entry, uniform across both ELF classes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Symbol {
    /// Offset of the name in the paired string table.
    pub name_index: u32,
    /// Binding and type, packed as in `st_info`.
    pub info: u8,
    /// Visibility, as in `st_other`.
    pub other: u8,
    /// Section index, including the `SHN_*` special values.
    pub shndx: u16,
    /// Symbol value.
    pub value: u64,
    /// Symbol size.
    pub size: u64,
}

impl Symbol {
    /// The symbol binding (`STB_*`), the high nibble of `st_info`.
    pub fn bind(&self) -> u8 {
        self.info >> 4
    }

    /// The symbol type (`STT_*`), the low nibble of `st_info`.
    pub fn sym_type(&self) -> u8 {
        self.info & 0xf
    }

    /// Replaces the binding, keeping the type.
    pub fn set_bind(&mut self, bind: u8) {
        self.info = (bind << 4) | (self.info & 0xf);
    }

    /// True for `STB_LOCAL` symbols.
    pub fn is_local(&self) -> bool {
        self.bind() == elf::sym::STB_LOCAL
    }

    /// True for `STB_GLOBAL` symbols.
    pub fn is_global(&self) -> bool {
        self.bind() == elf::sym::STB_GLOBAL
    }

    /// True for `STB_WEAK` symbols.
    pub fn is_weak(&self) -> bool {
        self.bind() == elf::sym::STB_WEAK
    }

    /// Decodes one entry from a symbol table payload.
    pub fn parse(cursor: &mut Cursor<'_>, class: Class) -> Result<Self, ElfError> {
        match class {
            Class::Elf32 => {
                let name_index = cursor.read_u32()?;
                let value = u64::from(cursor.read_u32()?);
                let size = u64::from(cursor.read_u32()?);
                let info = cursor.read_u8()?;
                let other = cursor.read_u8()?;
                let shndx = cursor.read_u16()?;
                Ok(Symbol {
                    name_index,
                    info,
                    other,
                    shndx,
                    value,
                    size,
                })
            }
            Class::Elf64 => {
                let name_index = cursor.read_u32()?;
                let info = cursor.read_u8()?;
                let other = cursor.read_u8()?;
                let shndx = cursor.read_u16()?;
                let value = cursor.read_u64()?;
                let size = cursor.read_u64()?;
                Ok(Symbol {
                    name_index,
                    info,
                    other,
                    shndx,
                    value,
                    size,
                })
            }
        }
    }

    /// Appends the entry to a symbol table payload.
    pub fn encode(&self, buf: &mut Buffer, class: Class) {
        match class {
            Class::Elf32 => {
                buf.push_u32(self.name_index);
                buf.push_u32(self.value as u32);
                buf.push_u32(self.size as u32);
                buf.push_u8(self.info);
                buf.push_u8(self.other);
                buf.push_u16(self.shndx);
            }
            Class::Elf64 => {
                buf.push_u32(self.name_index);
                buf.push_u8(self.info);
                buf.push_u8(self.other);
                buf.push_u16(self.shndx);
                buf.push_u64(self.value);
                buf.push_u64(self.size);
            }
        }
    }
}

/// A relocation entry, uniform across classes and `REL`/`RELA` variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Relocation {
    /// Offset into the section the relocation applies to.
    pub offset: u64,
    /// Index into the associated symbol table.
    pub sym: u32,
    /// Architecture-specific relocation type.
    pub rtype: u32,
    /// The explicit addend, present only in `SHT_RELA` sections.
    pub addend: Option<i64>,
}

impl Relocation {
    /// Decodes one entry from a relocation section payload.
    pub fn parse(cursor: &mut Cursor<'_>, class: Class, rela: bool) -> Result<Self, ElfError> {
        match class {
            Class::Elf32 => {
                let offset = u64::from(cursor.read_u32()?);
                let info = cursor.read_u32()?;
                let addend = if rela {
                    Some(i64::from(cursor.read_u32()? as i32))
                } else {
                    None
                };
                Ok(Relocation {
                    offset,
                    sym: info >> 8,
                    rtype: info & 0xff,
                    addend,
                })
            }
            Class::Elf64 => {
                let offset = cursor.read_u64()?;
                let info = cursor.read_u64()?;
                let addend = if rela {
                    Some(cursor.read_u64()? as i64)
                } else {
                    None
                };
                Ok(Relocation {
                    offset,
                    sym: (info >> 32) as u32,
                    rtype: info as u32,
                    addend,
                })
            }
        }
    }

    /// Appends the entry to a relocation section payload.
    ///
    /// An addend is written exactly when `self.addend` is present, so the
    /// caller must keep the `REL`/`RELA` variant consistent per section.
    pub fn encode(&self, buf: &mut Buffer, class: Class) {
        match class {
            Class::Elf32 => {
                buf.push_u32(self.offset as u32);
                buf.push_u32((self.sym << 8) | (self.rtype & 0xff));
                if let Some(addend) = self.addend {
                    buf.push_u32(addend as u32);
                }
            }
            Class::Elf64 => {
                buf.push_u64(self.offset);
                buf.push_u64((u64::from(self.sym) << 32) | u64::from(self.rtype));
                if let Some(addend) = self.addend {
                    buf.push_u64(addend as u64);
                }
            }
        }
    }
}

/// An ELF object held fully in memory.
///
/// Parsed from bytes via `goblin`; every section payload is copied in, so
/// the object outlives the input buffer and can be freely rewritten. The
/// layout fields (`phoff`, `shoff`, each section's `offset`) are taken at
/// face value by [`commit`](Self::commit) — a rewriter assigns them and
/// nothing in this crate second-guesses the assignment.
#[derive(Clone, Debug)]
pub struct ElfObject {
    /// The ELF class.
    pub class: Class,
    /// The byte order.
    pub endianness: Endianness,
    /// OS/ABI identification byte.
    pub os_abi: u8,
    /// ABI version byte.
    pub abi_version: u8,
    /// Object type (`ET_*`).
    pub e_type: u16,
    /// Machine identifier (`EM_*`).
    pub machine: u16,
    /// File version, `EV_CURRENT` in practice.
    pub version: u32,
    /// Entry point address.
    pub entry: u64,
    /// Processor-specific flags.
    pub flags: u32,
    /// File offset of the program header table, zero if absent.
    pub phoff: u64,
    /// File offset of the section header table.
    pub shoff: u64,
    /// Index of the section-header string table.
    pub shstrndx: usize,
    /// Program headers, possibly empty.
    pub program_headers: Vec<Segment>,
    /// Sections in index order. Index zero is the reserved NULL section.
    pub sections: Vec<Section>,
}

impl ElfObject {
    /// Tests whether the buffer could contain an ELF object.
    pub fn test(data: &[u8]) -> bool {
        data.get(0..elf::header::SELFMAG)
            .is_some_and(|magic| magic == elf::header::ELFMAG)
    }

    /// Parses an ELF object from the given bytes.
    pub fn parse(data: &[u8]) -> Result<Self, ElfError> {
        if !Self::test(data) {
            return Err(ElfErrorKind::NotElf.into());
        }

        let ident_class = data
            .get(EI_CLASS)
            .copied()
            .ok_or(ElfErrorKind::Truncated)?;
        if ident_class != ELFCLASS32 && ident_class != ELFCLASS64 {
            return Err(ElfErrorKind::UnsupportedClass.into());
        }

        let obj = elf::Elf::parse(data).map_err(|e| ElfError::new(ElfErrorKind::Malformed, e))?;

        let class = if obj.is_64 { Class::Elf64 } else { Class::Elf32 };
        let endianness = if obj.little_endian {
            Endianness::Little
        } else {
            Endianness::Big
        };

        let mut sections = Vec::with_capacity(obj.section_headers.len());
        for shdr in &obj.section_headers {
            let name = obj
                .shdr_strtab
                .get_at(shdr.sh_name)
                .ok_or(ElfErrorKind::BadStringTable)?
                .to_string();

            let data_slice = if shdr.sh_type == SHT_NULL || shdr.sh_type == SHT_NOBITS {
                &[][..]
            } else {
                let start = shdr.sh_offset as usize;
                let end = start
                    .checked_add(shdr.sh_size as usize)
                    .ok_or(ElfErrorKind::Truncated)?;
                data.get(start..end).ok_or(ElfErrorKind::Truncated)?
            };

            sections.push(Section {
                name,
                sh_type: shdr.sh_type,
                flags: shdr.sh_flags,
                addr: shdr.sh_addr,
                offset: shdr.sh_offset,
                size: shdr.sh_size,
                link: shdr.sh_link,
                info: shdr.sh_info,
                addralign: shdr.sh_addralign,
                entsize: shdr.sh_entsize,
                data: data_slice.to_vec(),
            });
        }

        let shstrndx = obj.header.e_shstrndx as usize;
        if !sections.is_empty() && shstrndx >= sections.len() {
            return Err(ElfErrorKind::BadStringTable.into());
        }

        let program_headers = obj
            .program_headers
            .iter()
            .map(|ph| Segment {
                p_type: ph.p_type,
                p_flags: ph.p_flags,
                p_offset: ph.p_offset,
                p_vaddr: ph.p_vaddr,
                p_paddr: ph.p_paddr,
                p_filesz: ph.p_filesz,
                p_memsz: ph.p_memsz,
                p_align: ph.p_align,
            })
            .collect();

        Ok(ElfObject {
            class,
            endianness,
            os_abi: data.get(EI_OSABI).copied().unwrap_or(0),
            abi_version: data.get(EI_ABIVERSION).copied().unwrap_or(0),
            e_type: obj.header.e_type,
            machine: obj.header.e_machine,
            version: obj.header.e_version,
            entry: obj.header.e_entry,
            flags: obj.header.e_flags,
            phoff: obj.header.e_phoff,
            shoff: obj.header.e_shoff,
            shstrndx,
            program_headers,
            sections,
        })
    }

    /// The ELF class of this object.
    pub fn class(&self) -> Class {
        self.class
    }

    /// The byte order of this object.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// The sections of this object in index order.
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    /// Looks up a section by index.
    pub fn section_by_index(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }

    /// Finds the first section with the given name.
    pub fn section_by_name(&self, name: &str) -> Option<(usize, &Section)> {
        self.sections
            .iter()
            .enumerate()
            .find(|(_, s)| s.name == name)
    }

    /// Returns the index following `index`, if any section exists there.
    pub fn next_section_index(&self, index: usize) -> Option<usize> {
        let next = index + 1;
        (next < self.sections.len()).then_some(next)
    }

    /// The program headers of this object.
    pub fn program_headers(&self) -> &[Segment] {
        &self.program_headers
    }

    /// True for `ET_REL` objects.
    pub fn is_relocatable(&self) -> bool {
        self.e_type == elf::header::ET_REL
    }

    /// Parses the symbol table section at `index`.
    ///
    /// Validates the reserved all-zero entry at index zero; a table whose
    /// first entry is anything else is rejected rather than patched up.
    pub fn symbols(&self, index: usize) -> Result<Vec<Symbol>, ElfError> {
        let section = self
            .section_by_index(index)
            .ok_or(ElfErrorKind::BadSymbolTable)?;
        if section.sh_type != SHT_SYMTAB {
            return Err(ElfErrorKind::BadSymbolTable.into());
        }

        let entsize = self.class.sym_size();
        if section.data.len() % entsize != 0 {
            return Err(ElfErrorKind::Truncated.into());
        }

        let mut cursor = Cursor::new(&section.data, self.endianness.scroll());
        let mut symbols = Vec::with_capacity(section.data.len() / entsize);
        while !cursor.is_empty() {
            symbols.push(Symbol::parse(&mut cursor, self.class)?);
        }

        if let Some(first) = symbols.first() {
            if *first != Symbol::default() {
                return Err(ElfErrorKind::BadSymbolTable.into());
            }
        }

        Ok(symbols)
    }

    /// Parses the relocation section at `index`.
    pub fn relocations(&self, index: usize) -> Result<Vec<Relocation>, ElfError> {
        let section = self
            .section_by_index(index)
            .ok_or(ElfErrorKind::Malformed)?;
        let rela = match section.sh_type {
            elf::section_header::SHT_RELA => true,
            elf::section_header::SHT_REL => false,
            _ => return Err(ElfErrorKind::Malformed.into()),
        };

        let entsize = self.class.reloc_size(rela);
        if section.data.len() % entsize != 0 {
            return Err(ElfErrorKind::Truncated.into());
        }

        let mut cursor = Cursor::new(&section.data, self.endianness.scroll());
        let mut relocs = Vec::with_capacity(section.data.len() / entsize);
        while !cursor.is_empty() {
            relocs.push(Relocation::parse(&mut cursor, self.class, rela)?);
        }

        Ok(relocs)
    }

    /// Resolves a NUL-terminated string at `offset` inside the string
    /// table section at `index`.
    pub fn string_at(&self, index: usize, offset: usize) -> Result<&str, ElfError> {
        let section = self
            .section_by_index(index)
            .ok_or(ElfErrorKind::BadStringTable)?;
        let tail = section
            .data
            .get(offset..)
            .ok_or(ElfErrorKind::BadStringTable)?;
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(ElfErrorKind::BadStringTable)?;
        std::str::from_utf8(&tail[..end])
            .map_err(|e| ElfError::new(ElfErrorKind::BadStringTable, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_info() {
        let mut sym = Symbol {
            info: (elf::sym::STB_GLOBAL << 4) | elf::sym::STT_FUNC,
            ..Symbol::default()
        };
        assert!(sym.is_global());
        assert_eq!(sym.sym_type(), elf::sym::STT_FUNC);

        sym.set_bind(elf::sym::STB_WEAK);
        assert!(sym.is_weak());
        assert_eq!(sym.sym_type(), elf::sym::STT_FUNC);
    }

    #[test]
    fn test_symbol_codec() {
        let sym = Symbol {
            name_index: 17,
            info: (elf::sym::STB_LOCAL << 4) | elf::sym::STT_OBJECT,
            other: 0,
            shndx: 3,
            value: 0x1000,
            size: 64,
        };

        for class in [Class::Elf32, Class::Elf64] {
            let mut buf = Buffer::new(scroll::LE);
            sym.encode(&mut buf, class);
            let bytes = buf.into_vec();
            assert_eq!(bytes.len(), class.sym_size());

            let mut cursor = Cursor::new(&bytes, scroll::LE);
            assert_eq!(Symbol::parse(&mut cursor, class).unwrap(), sym);
        }
    }

    #[test]
    fn test_relocation_codec() {
        let reloc = Relocation {
            offset: 0x20,
            sym: 5,
            rtype: 2,
            addend: Some(-4),
        };

        let mut buf = Buffer::new(scroll::LE);
        reloc.encode(&mut buf, Class::Elf64);
        let bytes = buf.into_vec();
        assert_eq!(bytes.len(), Class::Elf64.reloc_size(true));

        let mut cursor = Cursor::new(&bytes, scroll::LE);
        assert_eq!(
            Relocation::parse(&mut cursor, Class::Elf64, true).unwrap(),
            reloc
        );
    }

    #[test]
    fn test_not_elf() {
        let err = ElfObject::parse(b"not an object").unwrap_err();
        assert_eq!(err.kind(), ElfErrorKind::NotElf);
    }
}
