use std::fs::File;
use std::io::Read;
use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap;

use crate::error::ElfError;

enum Backing {
    Mmap(Mmap),
    Owned(Vec<u8>),
}

/// A readonly view of a file's bytes.
///
/// Regular files are memory mapped; anything that cannot be mapped (pipes,
/// zero-sized files) is read into an owned buffer instead. Either way the
/// view derefs to `&[u8]` and keeps its backing alive for its own lifetime.
pub struct ByteView {
    backing: Backing,
}

impl ByteView {
    /// Opens the file at `path` and maps or reads its contents.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ElfError> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();

        // An empty mapping is invalid on some platforms.
        let backing = if len == 0 {
            Backing::Owned(Vec::new())
        } else {
            match unsafe { Mmap::map(&file) } {
                Ok(mmap) => Backing::Mmap(mmap),
                Err(_) => {
                    let mut buf = Vec::with_capacity(len as usize);
                    file.read_to_end(&mut buf)?;
                    Backing::Owned(buf)
                }
            }
        };

        Ok(Self { backing })
    }

    /// Wraps an owned buffer in a view.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            backing: Backing::Owned(data),
        }
    }
}

impl Deref for ByteView {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self.backing {
            Backing::Mmap(ref mmap) => mmap,
            Backing::Owned(ref vec) => vec,
        }
    }
}

impl AsRef<[u8]> for ByteView {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn test_open_regular_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"ferrite").unwrap();

        let view = ByteView::open(file.path()).unwrap();
        assert_eq!(&*view, b"ferrite");
    }

    #[test]
    fn test_open_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let view = ByteView::open(file.path()).unwrap();
        assert_eq!(&*view, b"");
    }
}
