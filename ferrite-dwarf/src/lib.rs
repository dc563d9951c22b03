//! A DWARF consumer and producer for the 2–4 era.
//!
//! The consumer side parses the `.debug_*` sections of an ELF object into
//! a traversable model: compilation units, abbreviation tables, DIE trees
//! with decoded attribute values, location expressions and lists, line
//! programs and macro information. For relocatable objects, paired
//! `.rela.debug_*` sections are applied to an in-memory copy before
//! parsing. The producer side is the mirror image: accumulate units,
//! DIEs, macros, location lists and line rows, then serialize them into
//! section payloads that the consumer parses back structurally equal.
//!
//! All state lives in an explicit [`DwarfContext`]; there is no ambient
//! process state. A context, like the units it owns, belongs to a single
//! task at a time.

#![warn(missing_docs)]

pub mod constants;

mod abbrev;
mod context;
mod error;
mod expr;
mod line;
mod loclist;
mod macinfo;
mod producer;
mod reloc;
mod unit;
mod value;

pub use crate::abbrev::{Abbrev, AbbrevTable, AttrSpec};
pub use crate::context::{DwarfContext, DwarfSections, UnitError};
pub use crate::error::{DwarfError, DwarfErrorKind};
pub use crate::expr::{
    count_operations, encode_expression, max_address, parse_expression, parse_locdesc, Locdesc,
    Operation,
};
pub use crate::line::{parse_line_program, FileEntry, LineProgram, LineProgramHeader, LineRow};
pub use crate::loclist::{encode_loclist, parse_loclist, Loclist, LoclistEntry};
pub use crate::macinfo::{encode_macinfo, parse_macinfo, MacroRecord, MacroSet};
pub use crate::producer::{DieId, DwarfProducer, ProducerValue, UnitId};
pub use crate::reloc::relocated_section_data;
pub use crate::unit::{read_initial_length, CompilationUnit, Die, Format, UnitEncoding};
pub use crate::value::{parse_value, AttrValue, Attribute};
