//! The file-level driver: read, rewrite, write-or-replace.

use std::env;
use std::fs::{self, File, FileTimes};
use std::io::Write;
use std::path::{Path, PathBuf};

use ferrite_elf::ByteView;

use crate::{Elfcopy, CopyError, CopyErrorKind};

fn tmpdir_for(src: &Path) -> PathBuf {
    // Respect the TMPDIR environment variable; otherwise create the
    // temporary next to the target so the final rename stays on one
    // filesystem.
    match env::var_os("TMPDIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => src
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    }
}

#[cfg(unix)]
fn mark_executable(file: &File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn mark_executable(_file: &File) -> std::io::Result<()> {
    Ok(())
}

impl Elfcopy {
    /// Rewrites `src` into `dst`, or in place when `dst` is `None`.
    ///
    /// In-place rewrites go through a uniquely named temporary file that
    /// is renamed over `src` only once fully written; on any failure the
    /// temporary is removed. With `PRESERVE_DATE` the input's access and
    /// modification times are carried over.
    pub fn rewrite_file(&self, src: &Path, dst: Option<&Path>) -> Result<(), CopyError> {
        let view = ByteView::open(src).map_err(|e| CopyError::new(CopyErrorKind::Io, e))?;
        let times = if self.preserve_dates() {
            let metadata = fs::metadata(src)?;
            Some((metadata.accessed()?, metadata.modified()?))
        } else {
            None
        };

        let output = self.rewrite(&view)?;
        drop(view);

        let out_file = match dst {
            Some(dst) => {
                let mut file = File::create(dst)?;
                file.write_all(&output)?;
                file
            }
            None => {
                let mut tmp = tempfile::Builder::new()
                    .prefix("ecp.")
                    .tempfile_in(tmpdir_for(src))
                    .map_err(|e| CopyError::new(CopyErrorKind::Io, e))?;
                tmp.write_all(&output)?;
                // Dropping a NamedTempFile unlinks it, so every error
                // path up to the rename cleans up after itself.
                tmp.persist(src)
                    .map_err(|e| CopyError::new(CopyErrorKind::Io, e.error))?
            }
        };

        mark_executable(&out_file)?;
        if let Some((accessed, modified)) = times {
            let times = FileTimes::new().set_accessed(accessed).set_modified(modified);
            out_file.set_times(times)?;
        }
        out_file.sync_all()?;

        Ok(())
    }
}
