//! End-to-end rewriter scenarios over synthetic relocatable objects.

use goblin::elf::section_header::{
    SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE, SHT_PROGBITS, SHT_RELA, SHT_SYMTAB,
};
use goblin::elf::sym::{STB_GLOBAL, STB_LOCAL, STB_WEAK, STT_FILE, STT_FUNC, STT_NOTYPE, STT_SECTION};

use similar_asserts::assert_eq;

use ferrite_elf::{Class, ElfObject, Endianness, Relocation, Symbol, SHN_ABS, SHN_UNDEF};
use ferrite_elfcopy::{CopyFlags, Elfcopy, SectionFlags, StripMode};
use ferrite_testutils::{st_info, ObjectBuilder};

const TEXT: u16 = 1;

/// Builds the standard fixture:
/// null, .text, .data, .debug_info, .symtab, .strtab, .rela.text,
/// .shstrtab — with a file symbol, a section symbol, a local helper, a
/// global `main`, a weak function and an undefined global.
fn fixture(reloc_syms: &[u32]) -> Vec<u8> {
    let mut builder = ObjectBuilder::relocatable(Class::Elf64, Endianness::Little);
    let text = builder.section(
        ".text",
        SHT_PROGBITS,
        (SHF_ALLOC | SHF_EXECINSTR) as u64,
        vec![0x90; 32],
    );
    assert_eq!(text, TEXT as usize);
    builder.section(
        ".data",
        SHT_PROGBITS,
        (SHF_ALLOC | SHF_WRITE) as u64,
        vec![1, 2, 3, 4],
    );
    builder.section(".debug_info", SHT_PROGBITS, 0, vec![0xdd; 8]);

    let symtab = builder.symtab(&[
        (
            "a.c",
            Symbol {
                info: st_info(STB_LOCAL, STT_FILE),
                shndx: SHN_ABS,
                ..Symbol::default()
            },
        ),
        (
            "",
            Symbol {
                info: st_info(STB_LOCAL, STT_SECTION),
                shndx: TEXT,
                ..Symbol::default()
            },
        ),
        (
            "local_helper",
            Symbol {
                info: st_info(STB_LOCAL, STT_NOTYPE),
                shndx: TEXT,
                value: 0x10,
                ..Symbol::default()
            },
        ),
        (
            "main",
            Symbol {
                info: st_info(STB_GLOBAL, STT_FUNC),
                shndx: TEXT,
                size: 32,
                ..Symbol::default()
            },
        ),
        (
            "weak_fn",
            Symbol {
                info: st_info(STB_WEAK, STT_FUNC),
                shndx: TEXT,
                value: 0x20,
                ..Symbol::default()
            },
        ),
        (
            "extern_fn",
            Symbol {
                info: st_info(STB_GLOBAL, STT_NOTYPE),
                shndx: SHN_UNDEF,
                ..Symbol::default()
            },
        ),
    ]);

    let relocs: Vec<Relocation> = reloc_syms
        .iter()
        .enumerate()
        .map(|(i, &sym)| Relocation {
            offset: 8 * i as u64,
            sym,
            rtype: 2,
            addend: Some(0),
        })
        .collect();
    builder.rela(text, symtab, &relocs);

    builder.build_vec()
}

fn section_names(obj: &ElfObject) -> Vec<&str> {
    obj.sections().map(|s| s.name.as_str()).collect()
}

fn output_symbols(obj: &ElfObject) -> (Vec<(String, Symbol)>, usize) {
    let (symtab_index, symtab) = obj.section_by_name(".symtab").expect("output .symtab");
    let symbols = obj.symbols(symtab_index).unwrap();
    let nls = symtab.info as usize;
    let named = symbols
        .into_iter()
        .map(|sym| {
            let name = obj
                .string_at(symtab.link as usize, sym.name_index as usize)
                .unwrap()
                .to_string();
            (name, sym)
        })
        .collect();
    (named, nls)
}

/// Symbol ordering, sh_info and string-table closure hold for any
/// regenerated table.
fn check_symtab_invariants(obj: &ElfObject) {
    let (symtab_index, symtab) = obj.section_by_name(".symtab").expect("output .symtab");
    let symbols = obj.symbols(symtab_index).unwrap();
    let nls = symtab.info as usize;

    assert_eq!(symbols[0], Symbol::default());
    for (index, sym) in symbols.iter().enumerate() {
        if index < nls {
            assert!(sym.is_local(), "symbol {index} below sh_info must be local");
        } else {
            assert!(!sym.is_local(), "symbol {index} above sh_info must not be local");
        }
        // Every name offset addresses a NUL-terminated string.
        obj.string_at(symtab.link as usize, sym.name_index as usize)
            .unwrap();
    }
}

#[test]
fn test_copy_identity() {
    let input = fixture(&[4]);
    let output = Elfcopy::new().rewrite(&input).unwrap();

    let before = ElfObject::parse(&input).unwrap();
    let after = ElfObject::parse(&output).unwrap();

    // Same sections survive; the table sections regroup at the end of
    // the header table, so compare as sets.
    let mut before_names = section_names(&before);
    let mut after_names = section_names(&after);
    before_names.sort_unstable();
    after_names.sort_unstable();
    assert_eq!(before_names, after_names);

    // The symbol table travels byte-for-byte on the intact path.
    for name in [".symtab", ".strtab", ".text", ".data", ".rela.text"] {
        let (_, b) = before.section_by_name(name).unwrap();
        let (_, a) = after.section_by_name(name).unwrap();
        assert_eq!(b.data, a.data, "{name} payload changed");
        assert_eq!(b.sh_type, a.sh_type);
        assert_eq!(b.flags, a.flags);
    }
}

#[test]
fn test_strip_all_drops_unreferenced_table() {
    // The only relocation patches an absolute value (symbol index 0), so
    // nothing keeps the table alive.
    let input = fixture(&[0]);
    let mut ecp = Elfcopy::new();
    ecp.set_strip(StripMode::All);
    let output = ecp.rewrite(&input).unwrap();

    let obj = ElfObject::parse(&output).unwrap();
    assert_eq!(
        section_names(&obj),
        vec!["", ".text", ".data", ".rela.text", ".shstrtab"]
    );
}

#[test]
fn test_strip_all_keeps_minimum_table_for_referenced_symbols() {
    // Relocations reference `main` (4) and `extern_fn` (6).
    let input = fixture(&[4, 6]);
    let mut ecp = Elfcopy::new();
    ecp.set_strip(StripMode::All);
    let output = ecp.rewrite(&input).unwrap();

    let obj = ElfObject::parse(&output).unwrap();
    let (symbols, nls) = output_symbols(&obj);
    let names: Vec<&str> = symbols.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["", "main", "extern_fn"]);
    assert_eq!(nls, 1);
    check_symtab_invariants(&obj);

    // Relocations were rewritten to the new indices.
    let (rela_index, _) = obj.section_by_name(".rela.text").unwrap();
    let relocs = obj.relocations(rela_index).unwrap();
    assert_eq!(relocs[0].sym, 1);
    assert_eq!(relocs[1].sym, 2);

    // The relocation section still points at the regenerated table.
    let (symtab_index, _) = obj.section_by_name(".symtab").unwrap();
    let (_, rela) = obj.section_by_name(".rela.text").unwrap();
    assert_eq!(rela.link as usize, symtab_index);
}

#[test]
fn test_remove_section_takes_relocs_and_symbols() {
    let input = fixture(&[4]);
    let mut ecp = Elfcopy::new();
    ecp.remove_section(".text").unwrap();
    let output = ecp.rewrite(&input).unwrap();

    let obj = ElfObject::parse(&output).unwrap();
    let names = section_names(&obj);
    assert!(!names.contains(&".text"));
    assert!(!names.contains(&".rela.text"));

    // Symbols defined in .text are gone; the reloc that referenced main
    // no longer keeps anything alive.
    let (symbols, _) = output_symbols(&obj);
    let names: Vec<&str> = symbols.iter().map(|(name, _)| name.as_str()).collect();
    assert!(!names.contains(&"main"));
    assert!(!names.contains(&"local_helper"));
    assert!(names.contains(&"extern_fn"));
    check_symtab_invariants(&obj);
}

#[test]
fn test_rename_and_flags() {
    let mut builder = ObjectBuilder::relocatable(Class::Elf64, Endianness::Little);
    builder.section(
        ".foo",
        SHT_PROGBITS,
        (SHF_WRITE | SHF_ALLOC) as u64,
        vec![0; 8],
    );
    let input = builder.build_vec();

    let mut ecp = Elfcopy::new();
    ecp.rename_section(
        ".foo",
        ".bar",
        Some(SectionFlags::parse_list("readonly,code").unwrap()),
    );
    let output = ecp.rewrite(&input).unwrap();

    let obj = ElfObject::parse(&output).unwrap();
    assert!(obj.section_by_name(".foo").is_none());
    let (_, bar) = obj.section_by_name(".bar").unwrap();
    assert_eq!(bar.flags, (SHF_ALLOC | SHF_EXECINSTR) as u64);
}

#[test]
fn test_strip_debug_regenerates_with_section_symbols() {
    let input = fixture(&[4]);
    let mut ecp = Elfcopy::new();
    ecp.set_strip(StripMode::Debug);
    let output = ecp.rewrite(&input).unwrap();

    let obj = ElfObject::parse(&output).unwrap();
    assert!(obj.section_by_name(".debug_info").is_none());

    let (symbols, nls) = output_symbols(&obj);
    check_symtab_invariants(&obj);

    // The file symbol is gone; the section symbols were re-synthesized
    // for .text and .data (but not for the relocation section).
    let section_syms: Vec<u16> = symbols
        .iter()
        .filter(|(_, sym)| sym.sym_type() == STT_SECTION)
        .map(|(_, sym)| sym.shndx)
        .collect();
    let (text_index, _) = obj.section_by_name(".text").unwrap();
    let (data_index, _) = obj.section_by_name(".data").unwrap();
    let (rela_index, _) = obj.section_by_name(".rela.text").unwrap();
    assert!(section_syms.contains(&(text_index as u16)));
    assert!(section_syms.contains(&(data_index as u16)));
    assert!(!section_syms.contains(&(rela_index as u16)));

    assert!(!symbols.iter().any(|(_, sym)| sym.sym_type() == STT_FILE));
    assert!(symbols[..nls].iter().all(|(_, sym)| sym.is_local()));
    assert!(symbols[nls..].iter().all(|(_, sym)| !sym.is_local()));
}

#[test]
fn test_secndx_soundness() {
    let input = fixture(&[4]);
    let mut ecp = Elfcopy::new();
    ecp.set_strip(StripMode::Debug);
    let output = ecp.rewrite(&input).unwrap();

    let obj = ElfObject::parse(&output).unwrap();
    let (text_index, _) = obj.section_by_name(".text").unwrap();
    let (symbols, _) = output_symbols(&obj);

    for (name, sym) in &symbols {
        match name.as_str() {
            "main" | "weak_fn" | "local_helper" => {
                assert_eq!(sym.shndx as usize, text_index, "{name} section index");
            }
            "extern_fn" => assert_eq!(sym.shndx, SHN_UNDEF),
            _ => {}
        }
    }
}

#[test]
fn test_binding_rewrites() {
    let input = fixture(&[4]);
    let mut ecp = Elfcopy::new();
    ecp.localize_symbol("main")
        .globalize_symbol("local_helper")
        .weaken_symbol("weak_fn")
        .localize_symbol("extern_fn");
    let output = ecp.rewrite(&input).unwrap();

    let obj = ElfObject::parse(&output).unwrap();
    let (symbols, nls) = output_symbols(&obj);
    check_symtab_invariants(&obj);

    let find = |wanted: &str| {
        symbols
            .iter()
            .position(|(name, _)| name == wanted)
            .unwrap_or_else(|| panic!("{wanted} missing"))
    };

    // main was localized and therefore sorts into the local bucket.
    assert!(find("main") < nls);
    assert!(symbols[find("main")].1.is_local());

    // local_helper was globalized.
    assert!(find("local_helper") >= nls);
    assert!(symbols[find("local_helper")].1.is_global());

    // extern_fn is undefined and must not be localized.
    assert!(symbols[find("extern_fn")].1.is_global());

    assert!(symbols[find("weak_fn")].1.is_weak());
}

#[test]
fn test_weaken_all() {
    let input = fixture(&[4]);
    let mut ecp = Elfcopy::new();
    ecp.set_flags(CopyFlags::WEAKEN_ALL);
    let output = ecp.rewrite(&input).unwrap();

    let obj = ElfObject::parse(&output).unwrap();
    let (symbols, _) = output_symbols(&obj);
    for (name, sym) in &symbols {
        if name == "main" || name == "extern_fn" || name == "weak_fn" {
            assert!(sym.is_weak(), "{name} should be weak");
        }
    }
}

#[test]
fn test_redefine_symbol() {
    let input = fixture(&[4]);
    let mut ecp = Elfcopy::new();
    ecp.redefine_symbol("main", "entry_point");
    let output = ecp.rewrite(&input).unwrap();

    let obj = ElfObject::parse(&output).unwrap();
    let (symbols, _) = output_symbols(&obj);
    let names: Vec<&str> = symbols.iter().map(|(name, _)| name.as_str()).collect();
    assert!(names.contains(&"entry_point"));
    assert!(!names.contains(&"main"));
    check_symtab_invariants(&obj);
}

#[test]
fn test_discard_locals_keeps_referenced() {
    // Relocation references the local helper (index 3).
    let input = fixture(&[3]);
    let mut ecp = Elfcopy::new();
    ecp.set_flags(CopyFlags::DISCARD_LOCAL);
    let output = ecp.rewrite(&input).unwrap();

    let obj = ElfObject::parse(&output).unwrap();
    let (symbols, _) = output_symbols(&obj);
    let names: Vec<&str> = symbols.iter().map(|(name, _)| name.as_str()).collect();
    assert!(names.contains(&"local_helper"));
    assert!(!names.contains(&"a.c"));
    check_symtab_invariants(&obj);
}

#[test]
fn test_strip_unneeded() {
    let input = fixture(&[4]);
    let mut ecp = Elfcopy::new();
    ecp.set_strip(StripMode::Unneeded);
    let output = ecp.rewrite(&input).unwrap();

    let obj = ElfObject::parse(&output).unwrap();
    let (symbols, _) = output_symbols(&obj);
    let names: Vec<&str> = symbols.iter().map(|(name, _)| name.as_str()).collect();

    // Globals and weaks stay in a relocatable; the file symbol goes.
    assert!(names.contains(&"main"));
    assert!(names.contains(&"weak_fn"));
    assert!(names.contains(&"extern_fn"));
    assert!(!names.contains(&"a.c"));
    check_symtab_invariants(&obj);
}

#[test]
fn test_only_section() {
    let input = fixture(&[4]);
    let mut ecp = Elfcopy::new();
    ecp.only_section(".text").unwrap();
    let output = ecp.rewrite(&input).unwrap();

    let obj = ElfObject::parse(&output).unwrap();
    let names = section_names(&obj);
    assert!(names.contains(&".text"));
    assert!(!names.contains(&".data"));
    assert!(!names.contains(&".debug_info"));
    assert!(!names.contains(&".rela.text"));
}

#[test]
fn test_conflicting_actions_rejected() {
    let mut ecp = Elfcopy::new();
    ecp.remove_section(".text").unwrap();
    assert!(ecp.only_section(".text").is_err());

    let mut ecp = Elfcopy::new();
    ecp.only_section(".data").unwrap();
    assert!(ecp.remove_section(".data").is_err());
}

#[test]
fn test_add_section_before_shstrtab() {
    let input = fixture(&[4]);
    let mut ecp = Elfcopy::new();
    ecp.add_section(".note.extra", b"hello".to_vec());
    let output = ecp.rewrite(&input).unwrap();

    let obj = ElfObject::parse(&output).unwrap();
    let names = section_names(&obj);
    let added = names.iter().position(|&n| n == ".note.extra").unwrap();
    let shstrtab = names.iter().position(|&n| n == ".shstrtab").unwrap();
    let data = names.iter().position(|&n| n == ".data").unwrap();
    assert!(data < added);
    assert!(added < shstrtab);

    let (_, section) = obj.section_by_name(".note.extra").unwrap();
    assert_eq!(section.data, b"hello");
}

#[test]
fn test_mcs_append_and_compress() {
    let mut builder = ObjectBuilder::relocatable(Class::Elf64, Endianness::Little);
    builder.section(".comment", SHT_PROGBITS, 0, b"GCC 9\0GCC 9\0".to_vec());
    let input = builder.build_vec();

    let mut ecp = Elfcopy::new();
    ecp.compress_section(".comment");
    ecp.append_string(".comment", "mcs was here");
    let output = ecp.rewrite(&input).unwrap();

    let obj = ElfObject::parse(&output).unwrap();
    let (_, comment) = obj.section_by_name(".comment").unwrap();
    assert_eq!(
        ferrite_elfcopy::section_strings(&comment.data),
        vec!["GCC 9", "mcs was here"]
    );
}

#[test]
fn test_mcs_delete() {
    let mut builder = ObjectBuilder::relocatable(Class::Elf64, Endianness::Little);
    builder.section(".comment", SHT_PROGBITS, 0, b"GCC 9\0".to_vec());
    builder.section(".text", SHT_PROGBITS, (SHF_ALLOC | SHF_EXECINSTR) as u64, vec![0x90]);
    let input = builder.build_vec();

    let mut ecp = Elfcopy::new();
    ecp.remove_section(".comment").unwrap();
    let output = ecp.rewrite(&input).unwrap();

    let obj = ElfObject::parse(&output).unwrap();
    assert!(obj.section_by_name(".comment").is_none());
    assert!(obj.section_by_name(".text").is_some());
}

#[test]
fn test_symtab_kept_at_end_indices() {
    let input = fixture(&[4]);
    let mut ecp = Elfcopy::new();
    ecp.set_strip(StripMode::Debug);
    let output = ecp.rewrite(&input).unwrap();

    let obj = ElfObject::parse(&output).unwrap();
    assert_eq!(
        section_names(&obj),
        vec!["", ".text", ".data", ".rela.text", ".symtab", ".strtab", ".shstrtab"]
    );

    // The symbol table links to its string table and the relocation
    // section's info still names .text.
    let (symtab_index, symtab) = obj.section_by_name(".symtab").unwrap();
    let (strtab_index, _) = obj.section_by_name(".strtab").unwrap();
    assert_eq!(symtab.link as usize, strtab_index);
    assert_eq!(symtab.sh_type, SHT_SYMTAB);

    let (text_index, _) = obj.section_by_name(".text").unwrap();
    let (_, rela) = obj.section_by_name(".rela.text").unwrap();
    assert_eq!(rela.sh_type, SHT_RELA);
    assert_eq!(rela.info as usize, text_index);
    assert_eq!(rela.link as usize, symtab_index);
}

#[test]
fn test_keep_symbol_beats_strip() {
    let input = fixture(&[0]);
    let mut ecp = Elfcopy::new();
    ecp.set_strip(StripMode::All);
    ecp.keep_symbol("weak_fn");
    ecp.strip_symbol("weak_fn");
    let output = ecp.rewrite(&input).unwrap();

    let obj = ElfObject::parse(&output).unwrap();
    let (symbols, _) = output_symbols(&obj);
    let names: Vec<&str> = symbols.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["", "weak_fn"]);
}
