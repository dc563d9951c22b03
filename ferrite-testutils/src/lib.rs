//! Test helpers shared across the ferrite crates.
//!
//! The [`ObjectBuilder`] assembles small synthetic ELF objects entirely in
//! memory, with a naive sequential layout. The fixtures are valid enough
//! for the parsers and the rewriter; they are not meant to be runnable.

use goblin::elf::header::{EM_386, EM_X86_64, ET_REL};
use goblin::elf::section_header::{SHT_RELA, SHT_STRTAB, SHT_SYMTAB};

use ferrite_elf::{
    Buffer, Class, ElfObject, Endianness, Relocation, Section, StrtabBuilder, Symbol,
};

/// Builds synthetic ELF objects for tests.
pub struct ObjectBuilder {
    obj: ElfObject,
}

impl ObjectBuilder {
    /// Starts a relocatable object of the given class and byte order,
    /// holding only the reserved NULL section.
    pub fn relocatable(class: Class, endianness: Endianness) -> Self {
        let machine = match class {
            Class::Elf32 => EM_386,
            Class::Elf64 => EM_X86_64,
        };

        let obj = ElfObject {
            class,
            endianness,
            os_abi: 0,
            abi_version: 0,
            e_type: ET_REL,
            machine,
            version: 1,
            entry: 0,
            flags: 0,
            phoff: 0,
            shoff: 0,
            shstrndx: 0,
            program_headers: Vec::new(),
            sections: vec![Section::default()],
        };

        Self { obj }
    }

    /// Appends a section and returns its index.
    pub fn section(&mut self, name: &str, sh_type: u32, flags: u64, data: Vec<u8>) -> usize {
        let index = self.obj.sections.len();
        self.obj.sections.push(Section {
            name: name.to_string(),
            sh_type,
            flags,
            size: data.len() as u64,
            addralign: 1,
            data,
            ..Section::default()
        });
        index
    }

    /// Appends `.symtab` and `.strtab` built from named symbols.
    ///
    /// The reserved entry is prepended automatically; `sh_info` is set to
    /// one past the last local. Callers pass locals first, as a well-formed
    /// table requires. Returns the symbol table's index.
    pub fn symtab(&mut self, symbols: &[(&str, Symbol)]) -> usize {
        let class = self.obj.class;
        let mut strtab = StrtabBuilder::new();
        let mut payload = Buffer::new(self.obj.endianness.scroll());

        Symbol::default().encode(&mut payload, class);

        let mut nls = 1u32;
        for (name, symbol) in symbols {
            let mut symbol = *symbol;
            symbol.name_index = strtab.insert(name) as u32;
            symbol.encode(&mut payload, class);
            if symbol.is_local() {
                nls += 1;
            }
        }

        let symtab_index = self.obj.sections.len();
        let strtab_index = symtab_index + 1;

        self.obj.sections.push(Section {
            name: ".symtab".to_string(),
            sh_type: SHT_SYMTAB,
            link: strtab_index as u32,
            info: nls,
            addralign: class.sym_align(),
            entsize: class.sym_size() as u64,
            data: payload.into_vec(),
            ..Section::default()
        });
        self.obj.sections.push(Section {
            name: ".strtab".to_string(),
            sh_type: SHT_STRTAB,
            addralign: 1,
            data: strtab.into_bytes(),
            ..Section::default()
        });

        for index in [symtab_index, strtab_index] {
            let section = &mut self.obj.sections[index];
            section.size = section.data.len() as u64;
        }

        symtab_index
    }

    /// Appends a `.rela.<target>` section referencing `symtab_index`.
    pub fn rela(&mut self, target_index: usize, symtab_index: usize, relocs: &[Relocation]) -> usize {
        let class = self.obj.class;
        let mut payload = Buffer::new(self.obj.endianness.scroll());
        for reloc in relocs {
            let reloc = Relocation {
                addend: Some(reloc.addend.unwrap_or(0)),
                ..*reloc
            };
            reloc.encode(&mut payload, class);
        }

        let name = format!(".rela{}", self.obj.sections[target_index].name);
        let index = self.obj.sections.len();
        self.obj.sections.push(Section {
            name,
            sh_type: SHT_RELA,
            link: symtab_index as u32,
            info: target_index as u32,
            addralign: class.sym_align(),
            entsize: class.reloc_size(true) as u64,
            size: payload.len() as u64,
            data: payload.into_vec(),
            ..Section::default()
        });
        index
    }

    /// Finishes the object: appends `.shstrtab`, lays everything out
    /// sequentially and returns the model.
    pub fn build(mut self) -> ElfObject {
        let class = self.obj.class;

        let mut shstrtab = StrtabBuilder::new();
        for section in &self.obj.sections {
            if !section.name.is_empty() {
                shstrtab.insert(&section.name);
            }
        }
        shstrtab.insert(".shstrtab");

        self.obj.shstrndx = self.obj.sections.len();
        self.obj.sections.push(Section {
            name: ".shstrtab".to_string(),
            sh_type: SHT_STRTAB,
            addralign: 1,
            data: shstrtab.into_bytes(),
            ..Section::default()
        });
        let shstrndx = self.obj.shstrndx;
        let section = &mut self.obj.sections[shstrndx];
        section.size = section.data.len() as u64;

        let mut offset = class.ehdr_size() as u64;
        for section in self.obj.sections.iter_mut().skip(1) {
            let align = section.addralign.max(1);
            offset = (offset + align - 1) & !(align - 1);
            section.offset = offset;
            if !section.is_nobits() {
                offset += section.data.len() as u64;
            }
        }

        let align = class.addr_size() as u64;
        self.obj.shoff = (offset + align - 1) & !(align - 1);

        self.obj
    }

    /// Finishes the object and serializes it to bytes.
    pub fn build_vec(self) -> Vec<u8> {
        self.build().to_vec().expect("serialize synthetic object")
    }
}

/// Packs a binding and type into an `st_info` byte.
pub fn st_info(bind: u8, sym_type: u8) -> u8 {
    (bind << 4) | (sym_type & 0xf)
}
