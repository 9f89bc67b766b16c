//! Utility functions for bakstash
//!
//! File helpers shared by the writer, the diff detector and the restore path:
//!
//! - Atomic publishing of a file (write to a temporary file, then rename)
//! - Idempotent directory creation
//! - Line-ending-normalized content comparison
//! - Modification time lookup that tolerates missing files
//!
//! All functions are thread-safe and can be called concurrently from
//! multiple document workers.

use crate::error::{BackupError, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::trace;

/// Create a directory and its parents if they are missing
///
/// Succeeds when the directory already exists, including when another worker
/// creates it concurrently.
pub fn ensure_directory(path: &Path) -> Result<()> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(source) => Err(BackupError::CreateDirectory {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Atomic file write (write to temp file then rename)
///
/// The content is written to a temporary file in the target's directory,
/// flushed to disk and then renamed into place. Readers observe either no
/// file or the complete content, never a partial write.
///
/// With `overwrite == false` the rename fails with [`BackupError::BackupExists`]
/// if `path` already exists, and the existing file is left untouched.
///
/// # Errors
///
/// - [`BackupError::WriteFailed`] if the temporary file cannot be created,
///   written or renamed
/// - [`BackupError::BackupExists`] if `overwrite` is false and `path` exists
pub fn atomic_write(path: &Path, content: &[u8], overwrite: bool) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| BackupError::write_failed(path, e))?;
    temp.write_all(content)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| BackupError::write_failed(path, e))?;

    let persisted = if overwrite {
        temp.persist(path)
    } else {
        temp.persist_noclobber(path)
    };

    match persisted {
        Ok(_) => {
            trace!("Atomically wrote {} bytes to {:?}", content.len(), path);
            Ok(())
        }
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
            Err(BackupError::BackupExists(path.to_path_buf()))
        }
        // The temporary file is removed when `e.file` drops
        Err(e) => Err(BackupError::write_failed(path, e.error)),
    }
}

/// Compare two serialized documents, ignoring `\r\n` vs `\n` differences
pub fn contents_match(a: &[u8], b: &[u8]) -> bool {
    if a == b {
        return true;
    }
    normalized_lines(a).eq(normalized_lines(b))
}

fn normalized_lines(content: &[u8]) -> impl Iterator<Item = &u8> + '_ {
    content
        .iter()
        .enumerate()
        .filter(move |(i, b)| !(**b == b'\r' && content.get(i + 1) == Some(&b'\n')))
        .map(|(_, b)| b)
}

/// Last modification time, or `None` if the file is missing or the
/// platform does not record it
pub fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Read a file, mapping "not found" to `None`
pub fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
