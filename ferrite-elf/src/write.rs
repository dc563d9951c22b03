//! Serialization of a laid-out [`ElfObject`] back into file bytes.
//!
//! The model is written exactly as laid out: the ELF header at offset
//! zero, program headers at `phoff`, every section payload at its own
//! `offset`, and the section header table at `shoff`. Offsets are taken
//! as-is; assigning them is the caller's job.

use std::io::Write;

use scroll::Pwrite;

use crate::error::{ElfError, ElfErrorKind};
use crate::object::{Class, ElfObject};
use crate::strtab::find_string;

struct FieldWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    endian: scroll::Endian,
    class: Class,
}

impl<'a> FieldWriter<'a> {
    fn at(
        buf: &'a mut [u8],
        pos: usize,
        endian: scroll::Endian,
        class: Class,
    ) -> Result<Self, ElfError> {
        if pos > buf.len() {
            return Err(ElfErrorKind::Truncated.into());
        }
        Ok(Self {
            buf,
            pos,
            endian,
            class,
        })
    }

    fn put_u16(&mut self, value: u16) -> Result<(), ElfError> {
        self.buf.pwrite_with(value, self.pos, self.endian)?;
        self.pos += 2;
        Ok(())
    }

    fn put_u32(&mut self, value: u32) -> Result<(), ElfError> {
        self.buf.pwrite_with(value, self.pos, self.endian)?;
        self.pos += 4;
        Ok(())
    }

    fn put_u64(&mut self, value: u64) -> Result<(), ElfError> {
        self.buf.pwrite_with(value, self.pos, self.endian)?;
        self.pos += 8;
        Ok(())
    }

    /// Writes a class-sized address or offset field.
    fn put_addr(&mut self, value: u64) -> Result<(), ElfError> {
        match self.class {
            Class::Elf32 => self.put_u32(value as u32),
            Class::Elf64 => self.put_u64(value),
        }
    }
}

impl ElfObject {
    /// Serializes the object into a byte vector.
    pub fn to_vec(&self) -> Result<Vec<u8>, ElfError> {
        let class = self.class;
        let endian = self.endianness.scroll();

        let mut total = class.ehdr_size() as u64;
        if !self.program_headers.is_empty() {
            total = total.max(self.phoff + (self.program_headers.len() * class.phdr_size()) as u64);
        }
        for section in &self.sections {
            if !section.is_nobits() && section.sh_type != goblin::elf::section_header::SHT_NULL {
                total = total.max(section.offset + section.data.len() as u64);
            }
        }
        total = total.max(self.shoff + (self.sections.len() * class.shdr_size()) as u64);

        let mut out = vec![0u8; total as usize];

        self.write_ehdr(&mut out, endian)?;
        self.write_phdrs(&mut out, endian)?;

        for section in &self.sections {
            if section.is_nobits() || section.sh_type == goblin::elf::section_header::SHT_NULL {
                continue;
            }
            let start = section.offset as usize;
            let end = start + section.data.len();
            out[start..end].copy_from_slice(&section.data);
        }

        self.write_shdrs(&mut out, endian)?;

        Ok(out)
    }

    /// Serializes the object and writes the bytes to `sink`.
    pub fn commit<W: Write>(&self, sink: &mut W) -> Result<(), ElfError> {
        let bytes = self.to_vec()?;
        sink.write_all(&bytes)?;
        Ok(())
    }

    fn write_ehdr(&self, out: &mut [u8], endian: scroll::Endian) -> Result<(), ElfError> {
        out[..goblin::elf::header::SELFMAG].copy_from_slice(goblin::elf::header::ELFMAG);
        out[goblin::elf::header::EI_CLASS] = self.class.ident();
        out[goblin::elf::header::EI_DATA] = self.endianness.ident();
        out[goblin::elf::header::EI_VERSION] = 1;
        out[7] = self.os_abi;
        out[8] = self.abi_version;

        let mut w = FieldWriter::at(out, 16, endian, self.class)?;
        w.put_u16(self.e_type)?;
        w.put_u16(self.machine)?;
        w.put_u32(self.version)?;
        w.put_addr(self.entry)?;
        w.put_addr(if self.program_headers.is_empty() {
            0
        } else {
            self.phoff
        })?;
        w.put_addr(self.shoff)?;
        w.put_u32(self.flags)?;
        w.put_u16(self.class.ehdr_size() as u16)?;
        w.put_u16(self.class.phdr_size() as u16)?;
        w.put_u16(self.program_headers.len() as u16)?;
        w.put_u16(self.class.shdr_size() as u16)?;
        w.put_u16(self.sections.len() as u16)?;
        w.put_u16(self.shstrndx as u16)?;
        Ok(())
    }

    fn write_phdrs(&self, out: &mut [u8], endian: scroll::Endian) -> Result<(), ElfError> {
        if self.program_headers.is_empty() {
            return Ok(());
        }

        let mut pos = self.phoff as usize;
        for segment in &self.program_headers {
            let mut w = FieldWriter::at(out, pos, endian, self.class)?;
            match self.class {
                Class::Elf32 => {
                    w.put_u32(segment.p_type)?;
                    w.put_u32(segment.p_offset as u32)?;
                    w.put_u32(segment.p_vaddr as u32)?;
                    w.put_u32(segment.p_paddr as u32)?;
                    w.put_u32(segment.p_filesz as u32)?;
                    w.put_u32(segment.p_memsz as u32)?;
                    w.put_u32(segment.p_flags)?;
                    w.put_u32(segment.p_align as u32)?;
                }
                Class::Elf64 => {
                    w.put_u32(segment.p_type)?;
                    w.put_u32(segment.p_flags)?;
                    w.put_u64(segment.p_offset)?;
                    w.put_u64(segment.p_vaddr)?;
                    w.put_u64(segment.p_paddr)?;
                    w.put_u64(segment.p_filesz)?;
                    w.put_u64(segment.p_memsz)?;
                    w.put_u64(segment.p_align)?;
                }
            }
            pos += self.class.phdr_size();
        }
        Ok(())
    }

    fn write_shdrs(&self, out: &mut [u8], endian: scroll::Endian) -> Result<(), ElfError> {
        let shstrtab = self
            .section_by_index(self.shstrndx)
            .ok_or(ElfErrorKind::BadStringTable)?;

        let mut names = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            if section.name.is_empty() {
                names.push(0u32);
            } else {
                let offset = find_string(&shstrtab.data, &section.name)
                    .ok_or(ElfErrorKind::BadStringTable)?;
                names.push(offset as u32);
            }
        }

        let mut pos = self.shoff as usize;
        for (section, name) in self.sections.iter().zip(names) {
            let mut w = FieldWriter::at(out, pos, endian, self.class)?;
            w.put_u32(name)?;
            w.put_u32(section.sh_type)?;
            match self.class {
                Class::Elf32 => w.put_u32(section.flags as u32)?,
                Class::Elf64 => w.put_u64(section.flags)?,
            }
            w.put_addr(section.addr)?;
            w.put_addr(section.offset)?;
            w.put_addr(section.size)?;
            w.put_u32(section.link)?;
            w.put_u32(section.info)?;
            w.put_addr(section.addralign)?;
            w.put_addr(section.entsize)?;
            pos += self.class.shdr_size();
        }
        Ok(())
    }
}
