use std::error::Error;
use std::fmt;
use std::io;

use thiserror::Error;

use ferrite_elf::ElfError;

/// The error kind for [`CopyError`].
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyErrorKind {
    /// Conflicting or malformed actions, e.g. copy and remove on the
    /// same section or an unknown flag token.
    Argument,

    /// Opening, reading, writing or renaming a file failed.
    Io,

    /// The input is not a usable ELF object.
    BadObject,

    /// The input's `e_type` is not relocatable, executable or shared.
    UnsupportedType,

    /// Symbol work was requested but `.symtab` or `.strtab` is missing.
    MissingSection,
}

impl fmt::Display for CopyErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argument => write!(f, "invalid action program"),
            Self::Io => write!(f, "i/o failure"),
            Self::BadObject => write!(f, "unusable input object"),
            Self::UnsupportedType => write!(f, "unsupported object type"),
            Self::MissingSection => write!(f, "required section missing"),
        }
    }
}

/// An error produced by the object rewriter.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct CopyError {
    kind: CopyErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl CopyError {
    /// Creates a new rewriter error from a kind and an arbitrary payload.
    pub fn new<E>(kind: CopyErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`CopyErrorKind`] for this error.
    pub fn kind(&self) -> CopyErrorKind {
        self.kind
    }
}

impl From<CopyErrorKind> for CopyError {
    fn from(kind: CopyErrorKind) -> Self {
        Self { kind, source: None }
    }
}

impl From<io::Error> for CopyError {
    fn from(e: io::Error) -> Self {
        Self::new(CopyErrorKind::Io, e)
    }
}

impl From<ElfError> for CopyError {
    fn from(e: ElfError) -> Self {
        Self::new(CopyErrorKind::BadObject, e)
    }
}
