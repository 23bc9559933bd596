//! Hash-gated atomic writer.
//!
//! ## `write_if_changed` protocol
//!
//! 1. Read the on-disk content (best effort: a failed read counts as empty).
//! 2. SHA-256 both sides and skip when they match.
//! 3. Write to `<path>.tandem.tmp`.
//! 4. Rename to the final path (atomic on POSIX).

use std::path::{Path, PathBuf};

use crate::error::{io_err, SyncError};
use crate::hash::ContentHash;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Blocking file access used by the auto-save engine. Always called off the
/// interactive context.
pub trait DocumentStore: Send + Sync + 'static {
    fn read(&self, path: &Path) -> Result<String, SyncError>;

    fn write(&self, path: &Path, content: &str) -> Result<(), SyncError>;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskStore;

impl DocumentStore for DiskStore {
    fn read(&self, path: &Path) -> Result<String, SyncError> {
        std::fs::read_to_string(path).map_err(|e| io_err(path, e))
    }

    fn write(&self, path: &Path, content: &str) -> Result<(), SyncError> {
        let tmp = tmp_path(path);
        std::fs::write(&tmp, content).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(path, e));
        }
        Ok(())
    }
}

/// `<path>.tandem.tmp`, next to the target so the rename stays on one filesystem.
pub fn tmp_path(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.tandem.tmp", path.display()))
}

// ---------------------------------------------------------------------------
// Write result
// ---------------------------------------------------------------------------

/// Outcome of an individual file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// Content differed from disk and was written.
    Written { path: PathBuf },
    /// Disk already holds this content; nothing was written.
    Unchanged { path: PathBuf },
}

/// Write `content` to `path` unless the file already holds it.
pub fn write_if_changed(
    store: &dyn DocumentStore,
    path: &Path,
    content: &str,
) -> Result<WriteResult, SyncError> {
    let on_disk = match store.read(path) {
        Ok(existing) => existing,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "unreadable on disk, treating as empty");
            String::new()
        }
    };

    if ContentHash::of(&on_disk) == ContentHash::of(content) {
        tracing::debug!("unchanged: {}", path.display());
        return Ok(WriteResult::Unchanged {
            path: path.to_path_buf(),
        });
    }

    store.write(path, content)?;
    tracing::info!("wrote: {}", path.display());
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}
