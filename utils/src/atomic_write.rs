//! Atomic artifact write helpers.
//!
//! Uses a temp file + rename pattern so a reader never observes a half-written
//! report. Audit artifacts are write-once by default.

#[cfg(unix)]
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
#[cfg(unix)]
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Fail with `AlreadyExists` if the destination exists.
    #[default]
    CreateNew,
    /// Replace an existing destination.
    Replace,
}

/// Write `bytes` to `path` atomically, syncing file contents before the rename.
pub fn write_artifact(path: impl AsRef<Path>, bytes: &[u8], mode: WriteMode) -> io::Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    match mode {
        WriteMode::CreateNew => {
            // Persist (rename) but fail if the destination already exists.
            tmp.persist_noclobber(path).map_err(|err| err.error)?;
        }
        WriteMode::Replace => {
            tmp.persist(path).map_err(|err| err.error)?;
        }
    }

    sync_parent_dir(parent);
    Ok(())
}

#[cfg(unix)]
fn sync_parent_dir(parent: &Path) {
    if let Err(e) = File::open(parent).and_then(|d| d.sync_all()) {
        debug!(path = %parent.display(), "Parent directory sync_all failed (best-effort): {e}");
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_parent: &Path) {}
