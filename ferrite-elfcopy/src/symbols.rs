//! Phase B: symbol filtering and symbol/string table regeneration.
//!
//! Retained symbols are emitted into two buckets, locals then
//! globals/weaks, preserving relative order within each. The paired
//! string table is built the same way, local half first, and global name
//! offsets are rebased once both halves are final. `symndx` records every
//! input symbol's output index so surviving relocations can be rewritten.

use bitvec::prelude::*;
use goblin::elf::sym::{STB_GLOBAL, STB_LOCAL, STB_WEAK, STT_FILE, STT_SECTION};
use tracing::warn;

use ferrite_elf::{ElfObject, StrtabBuilder, Symbol, SHN_LORESERVE, SHN_UNDEF};

use crate::options::{CopyFlags, StripMode};
use crate::sections::Plan;
use crate::{Elfcopy, CopyError, CopyErrorKind};

/// What happens to the symbol and string tables in the output.
#[derive(Debug, Default)]
pub(crate) enum SymtabDisposition {
    /// The input carries no symbol table.
    #[default]
    Absent,
    /// Tables are copied byte-for-byte.
    Intact,
    /// Tables were filtered empty and are omitted from the output.
    Dropped,
    /// Freshly generated tables.
    Generated(GeneratedSymtab),
}

/// The regenerated `.symtab`/`.strtab` contents.
#[derive(Debug)]
pub(crate) struct GeneratedSymtab {
    /// All output symbols, locals first.
    pub symbols: Vec<Symbol>,
    /// Number of leading local symbols; becomes the table's `sh_info`.
    pub nls: usize,
    /// The paired string table payload.
    pub strtab: Vec<u8>,
    /// Input symbol index to output symbol index; zero for dropped
    /// symbols.
    pub symndx: Vec<usize>,
}

fn is_debug_symbol(sym: &Symbol) -> bool {
    sym.sym_type() == STT_SECTION || sym.sym_type() == STT_FILE
}

/// Marks every symbol referenced from a relocation section surviving in
/// the plan and linked against the input symbol table.
fn mark_symbols(obj: &ElfObject, plan: &Plan, symtab_index: usize, count: usize) -> BitVec {
    let mut referenced = bitvec![0; count];

    for out in &plan.sections {
        let input_index = match out.input_index {
            Some(index) if index != 0 => index,
            _ => continue,
        };
        let section = &obj.sections[input_index];
        if !section.is_reloc() || section.link as usize != symtab_index {
            continue;
        }

        let relocs = match obj.relocations(input_index) {
            Ok(relocs) => relocs,
            Err(_) => {
                warn!(section = out.name.as_str(), "malformed relocation section");
                continue;
            }
        };
        for reloc in relocs {
            let sym = reloc.sym as usize;
            if sym > 0 && sym < count {
                referenced.set(sym, true);
            } else if sym != 0 {
                warn!(index = sym, "invalid relocation symbol index");
            }
        }
    }

    referenced
}

/// The retain-or-drop ladder, first matching rule wins.
fn is_remove_symbol(
    ecp: &Elfcopy,
    plan: &Plan,
    referenced: &BitVec,
    index: usize,
    sym: &Symbol,
    name: &str,
) -> bool {
    let action = ecp.sym_actions.get(name);

    if action.is_some_and(|a| a.keep) {
        return false;
    }
    if action.is_some_and(|a| a.strip) {
        return true;
    }

    // The reserved all-zero entry survives everything.
    if index == 0 && *sym == Symbol::default() {
        return false;
    }

    // Drop symbols whose section did not survive.
    if sym.shndx != SHN_UNDEF
        && sym.shndx < SHN_LORESERVE
        && plan
            .secndx
            .get(sym.shndx as usize)
            .copied()
            .unwrap_or(0)
            == 0
    {
        return true;
    }

    // A symbol some surviving relocation refers to stays, even under
    // strip-all; the output would not link without it.
    if referenced[index] {
        return false;
    }

    if ecp.strip == StripMode::All {
        return true;
    }

    // For relocatable outputs, global and weak symbols stay visible to a
    // future link.
    if plan.relocatable && (sym.is_global() || sym.is_weak()) {
        return false;
    }

    if ecp.strip == StripMode::Unneeded {
        return true;
    }

    if ecp.flags.contains(CopyFlags::DISCARD_LOCAL) && sym.is_local() {
        return true;
    }

    if ecp.strip == StripMode::Debug && is_debug_symbol(sym) {
        return true;
    }

    false
}

fn rewrite_binding(ecp: &Elfcopy, sym: &mut Symbol, name: &str) {
    let action = ecp.sym_actions.get(name);

    if sym.is_global() || sym.is_weak() {
        if ecp.flags.contains(CopyFlags::WEAKEN_ALL) || action.is_some_and(|a| a.weaken) {
            sym.set_bind(STB_WEAK);
        }
        // Undefined symbols are never localized.
        if sym.shndx != SHN_UNDEF && action.is_some_and(|a| a.localize) {
            sym.set_bind(STB_LOCAL);
        }
        if ecp.flags.contains(CopyFlags::KEEP_GLOBAL)
            && sym.shndx != SHN_UNDEF
            && !action.is_some_and(|a| a.keep_global)
        {
            sym.set_bind(STB_LOCAL);
        }
    } else if action.is_some_and(|a| a.globalize) {
        sym.set_bind(STB_GLOBAL);
    }
}

/// Runs the symbol phase and records the outcome in the plan.
pub(crate) fn plan_symbols(ecp: &Elfcopy, obj: &ElfObject, plan: &mut Plan) -> Result<(), CopyError> {
    let symtab_index = match plan.input_symtab {
        Some(index) => index,
        None => {
            if !ecp.sym_actions.is_empty() {
                return Err(CopyError::new(
                    CopyErrorKind::MissingSection,
                    "symbol actions given but the input has no .symtab",
                ));
            }
            plan.symtab = SymtabDisposition::Absent;
            return Ok(());
        }
    };

    let any_removed = plan.secndx.iter().enumerate().skip(1).any(|(index, &out)| {
        out == 0 && Some(index) != plan.input_symtab && Some(index) != plan.input_strtab
            && index != obj.shstrndx
    });

    let retarget = ecp.output_class.is_some_and(|c| c != obj.class)
        || ecp.output_endianness.is_some_and(|e| e != obj.endianness);

    let intact = ecp.strip == StripMode::None
        && ecp.sym_actions.is_empty()
        && !ecp.flags.intersects(
            CopyFlags::DISCARD_LOCAL | CopyFlags::WEAKEN_ALL | CopyFlags::KEEP_GLOBAL,
        )
        && !any_removed
        && !retarget;

    // Map the input table indices to their planned output slots before
    // filtering, so symbols referring to them are not dropped as
    // section-removed.
    let planned_symtab = plan.planned_symtab_index();
    plan.secndx[symtab_index] = planned_symtab;
    if let Some(strtab_index) = plan.input_strtab {
        plan.secndx[strtab_index] = planned_symtab + 1;
    }

    if intact {
        plan.symtab = SymtabDisposition::Intact;
        return Ok(());
    }

    let strtab_index = plan.input_strtab.ok_or_else(|| {
        CopyError::new(
            CopyErrorKind::MissingSection,
            "input has a .symtab but no .strtab",
        )
    })?;

    let symbols = obj.symbols(symtab_index)?;
    let count = symbols.len();
    let referenced = mark_symbols(obj, plan, symtab_index, count);

    // Offset zero is ambiguous in the global half (it has no leading
    // NUL), so empty names carry a sentinel until the rebase.
    const NO_NAME: u32 = u32::MAX;

    let mut locals: Vec<Symbol> = Vec::new();
    let mut globals: Vec<Symbol> = Vec::new();
    let mut local_names = StrtabBuilder::new();
    let mut global_names = StrtabBuilder::new_continuation();
    let mut symndx = vec![0usize; count];
    let mut is_global_out = bitvec![0; count];
    let mut has_section_symbol = bitvec![0; plan.sections.len() + 3];

    for (index, input_sym) in symbols.iter().enumerate() {
        let mut sym = *input_sym;
        let mut name = if sym.name_index == 0 {
            ""
        } else {
            obj.string_at(strtab_index, sym.name_index as usize)?
        };

        if is_remove_symbol(ecp, plan, &referenced, index, &sym, name) {
            continue;
        }

        rewrite_binding(ecp, &mut sym, name);

        if let Some(new_name) = ecp
            .sym_actions
            .get(name)
            .and_then(|a| a.new_name.as_deref())
        {
            name = new_name;
        }

        // Remap the section index, keeping the special values.
        if sym.shndx != SHN_UNDEF && sym.shndx < SHN_LORESERVE {
            sym.shndx = plan.secndx[sym.shndx as usize] as u16;
        }

        if sym.sym_type() == STT_SECTION && (sym.shndx as usize) < has_section_symbol.len() {
            has_section_symbol.set(sym.shndx as usize, true);
        }

        if sym.is_local() {
            sym.name_index = if name.is_empty() {
                0
            } else {
                local_names.insert(name) as u32
            };
            symndx[index] = locals.len();
            locals.push(sym);
        } else {
            sym.name_index = if name.is_empty() {
                NO_NAME
            } else {
                global_names.insert(name) as u32
            };
            symndx[index] = globals.len();
            is_global_out.set(index, true);
            globals.push(sym);
        }
    }

    // A table holding at most the reserved entry is omitted entirely.
    if locals.len() <= 1 && globals.is_empty() {
        plan.secndx[symtab_index] = 0;
        if let Some(strtab_index) = plan.input_strtab {
            plan.secndx[strtab_index] = 0;
        }
        plan.symtab = SymtabDisposition::Dropped;
        return Ok(());
    }

    // Synthesize STT_SECTION symbols for sections that lost theirs,
    // except under strip-all, where only explicitly retained symbols
    // remain.
    if ecp.strip != StripMode::All {
        for (out_index, out) in plan.sections.iter().enumerate().skip(1) {
            let is_reloc = out.sh_type == goblin::elf::section_header::SHT_REL
                || out.sh_type == goblin::elf::section_header::SHT_RELA;
            if plan.relocatable && is_reloc {
                continue;
            }
            if has_section_symbol[out_index] {
                continue;
            }
            locals.push(Symbol {
                name_index: 0,
                info: (STB_LOCAL << 4) | STT_SECTION,
                other: 0,
                shndx: out_index as u16,
                value: out.addr,
                size: 0,
            });
        }
    }

    // Globals follow locals: rebase their name offsets past the local
    // half and their indices past the final local count.
    let nls = locals.len();
    let local_size = local_names.len();
    for sym in &mut globals {
        sym.name_index = if sym.name_index == NO_NAME {
            0
        } else {
            sym.name_index + local_size as u32
        };
    }
    for index in 0..count {
        if is_global_out[index] {
            symndx[index] += nls;
        }
    }

    let mut strtab = local_names.into_bytes();
    strtab.extend_from_slice(&global_names.into_bytes());

    let mut all = locals;
    all.extend(globals);

    plan.symtab = SymtabDisposition::Generated(GeneratedSymtab {
        symbols: all,
        nls,
        strtab,
        symndx,
    });
    Ok(())
}
