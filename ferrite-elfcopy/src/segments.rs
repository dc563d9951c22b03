//! Recomputing program-header coverage after layout.

use goblin::elf::program_header::PT_PHDR;

use ferrite_elf::{ElfObject, Segment};

/// True if the input section at `index` lies inside the segment's file
/// range.
fn covers(segment: &Segment, obj: &ElfObject, index: usize) -> bool {
    use goblin::elf::section_header::{SHF_ALLOC, SHT_NULL};

    let section = &obj.sections[index];
    if section.sh_type == SHT_NULL {
        return false;
    }

    if section.is_nobits() {
        // NOBITS content exists in memory only; tie it by address.
        return section.flags & u64::from(SHF_ALLOC) != 0
            && section.addr >= segment.p_vaddr
            && section.addr + section.size <= segment.p_vaddr + segment.p_memsz;
    }

    section.offset >= segment.p_offset
        && section.offset + section.size <= segment.p_offset + segment.p_filesz
}

/// Rewrites segment file offsets and sizes to cover the output positions
/// of the sections each segment covered in the input.
///
/// Virtual addresses are never touched; the rewriter does not relocate
/// loadable content. A segment that covered the ELF or program header
/// region keeps that head: its offset shifts by the same delta as its
/// first covered section.
pub(crate) fn update_segments(
    obj: &ElfObject,
    out: &mut ElfObject,
    secndx: &[usize],
    phoff: u64,
    phdr_size: u64,
) {
    for segment in &mut out.program_headers {
        if segment.p_type == PT_PHDR {
            segment.p_offset = phoff;
            segment.p_filesz = phdr_size;
            segment.p_memsz = phdr_size;
            continue;
        }

        // The input sections this segment covered, paired with their
        // surviving output counterparts.
        let mut first: Option<(u64, u64)> = None;
        let mut file_end: Option<u64> = None;

        for (input_index, &output_index) in secndx.iter().enumerate() {
            if output_index == 0 || !covers(segment, obj, input_index) {
                continue;
            }
            let input = &obj.sections[input_index];
            let output = &out.sections[output_index];

            match first {
                Some((in_off, _)) if input.offset >= in_off => {}
                _ => first = Some((input.offset, output.offset)),
            }
            if !output.is_nobits() {
                let end = output.offset + output.data.len() as u64;
                file_end = Some(file_end.map_or(end, |e| e.max(end)));
            }
        }

        let (in_first, out_first) = match first {
            Some(pair) => pair,
            None => continue,
        };

        let delta = out_first.wrapping_sub(in_first);
        segment.p_offset = segment.p_offset.wrapping_add(delta);
        if let Some(end) = file_end {
            segment.p_filesz = end.saturating_sub(segment.p_offset);
        }
    }
}
