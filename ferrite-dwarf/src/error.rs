use std::error::Error;
use std::fmt;

use thiserror::Error;

use ferrite_elf::ElfError;

/// The error kind for [`DwarfError`].
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DwarfErrorKind {
    /// An abbreviation declaration is truncated or carries an undefined
    /// child-determination byte.
    InvalidAbbrev,

    /// A location expression contains an undefined operator.
    InvalidExpr,

    /// A location list entry runs past the end of `.debug_loc`.
    InvalidLoclist,

    /// A macro information entry has a type byte out of range.
    InvalidMacinfo,

    /// A line number program is malformed or has an unsupported version.
    InvalidLine,

    /// An argument passed by the caller is out of range.
    Argument,

    /// The requested entry does not exist.
    NoEntry,

    /// The debug data is corrupted: truncated values, undefined forms,
    /// dangling offsets.
    CorruptedData,

    /// The containing ELF object could not be read.
    Elf,
}

impl fmt::Display for DwarfErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAbbrev => write!(f, "invalid abbreviation table"),
            Self::InvalidExpr => write!(f, "invalid location expression"),
            Self::InvalidLoclist => write!(f, "invalid location list"),
            Self::InvalidMacinfo => write!(f, "invalid macro information"),
            Self::InvalidLine => write!(f, "invalid line number program"),
            Self::Argument => write!(f, "invalid argument"),
            Self::NoEntry => write!(f, "no such entry"),
            Self::CorruptedData => write!(f, "corrupted debug data"),
            Self::Elf => write!(f, "invalid containing ELF object"),
        }
    }
}

/// An error produced when reading or writing DWARF data.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct DwarfError {
    kind: DwarfErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl DwarfError {
    /// Creates a new DWARF error from a kind and an arbitrary payload.
    pub fn new<E>(kind: DwarfErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`DwarfErrorKind`] for this error.
    pub fn kind(&self) -> DwarfErrorKind {
        self.kind
    }
}

impl From<DwarfErrorKind> for DwarfError {
    fn from(kind: DwarfErrorKind) -> Self {
        Self { kind, source: None }
    }
}

impl From<ElfError> for DwarfError {
    fn from(e: ElfError) -> Self {
        Self::new(DwarfErrorKind::Elf, e)
    }
}
