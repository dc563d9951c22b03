use std::error::Error;
use std::fmt;
use std::io;

use thiserror::Error;

/// The error kind for [`ElfError`].
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElfErrorKind {
    /// The file does not start with the ELF magic.
    NotElf,

    /// The ELF class byte is neither 32- nor 64-bit.
    UnsupportedClass,

    /// A header, section payload or table entry extends past the file.
    Truncated,

    /// A name offset does not resolve inside its string table.
    BadStringTable,

    /// The symbol table is malformed, e.g. the reserved entry is missing.
    BadSymbolTable,

    /// The file violates the ELF specification in some other way.
    Malformed,

    /// Reading or writing the underlying file failed.
    Io,
}

impl fmt::Display for ElfErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotElf => write!(f, "not an ELF object"),
            Self::UnsupportedClass => write!(f, "unsupported ELF class"),
            Self::Truncated => write!(f, "truncated section or table"),
            Self::BadStringTable => write!(f, "string-table lookup out of bounds"),
            Self::BadSymbolTable => write!(f, "malformed symbol table"),
            Self::Malformed => write!(f, "malformed ELF object"),
            Self::Io => write!(f, "i/o failure"),
        }
    }
}

/// An error when reading or writing an [`ElfObject`](crate::ElfObject).
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct ElfError {
    kind: ElfErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ElfError {
    /// Creates a new ELF error from a kind and an arbitrary error payload.
    pub fn new<E>(kind: ElfErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`ElfErrorKind`] for this error.
    pub fn kind(&self) -> ElfErrorKind {
        self.kind
    }
}

impl From<ElfErrorKind> for ElfError {
    fn from(kind: ElfErrorKind) -> Self {
        Self { kind, source: None }
    }
}

impl From<io::Error> for ElfError {
    fn from(e: io::Error) -> Self {
        Self::new(ElfErrorKind::Io, e)
    }
}

impl From<goblin::error::Error> for ElfError {
    fn from(e: goblin::error::Error) -> Self {
        Self::new(ElfErrorKind::Malformed, e)
    }
}

impl From<scroll::Error> for ElfError {
    fn from(e: scroll::Error) -> Self {
        Self::new(ElfErrorKind::Truncated, e)
    }
}
