//! Backup directory discovery
//!
//! The backup directory is shared by every open document. The scanner lists
//! it, keeps the entries that belong to one document (same identifier, same
//! base name) and orders them by the timestamp embedded in the file name.
//! Filesystem modification time is only a secondary key.
//!
//! A missing directory is the normal state for a document that was never
//! backed up and yields an empty result, not an error. Entries that do not
//! parse as backup names are skipped and left alone.

use crate::error::Result;
use crate::naming::{document_base_name, BackupRecord};
use crate::path_hash::identifier_for;
use crate::utils::modified_time;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, instrument, trace};

/// A backup file found in the backup directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    /// Full path of the backup file
    pub path: PathBuf,
    /// Fields parsed from the file name
    pub record: BackupRecord,
    /// Filesystem modification time, if available
    pub modified: Option<SystemTime>,
}

/// List all backups of `document` in `backup_dir`, oldest first
///
/// # Errors
///
/// Returns an error only when the directory exists but cannot be read.
#[instrument(level = "debug")]
pub fn list_backups(document: &Path, backup_dir: &Path) -> Result<Vec<BackupEntry>> {
    let Some(base_name) = document_base_name(document) else {
        return Ok(Vec::new());
    };
    let identifier = identifier_for(document);

    let read_dir = match fs::read_dir(backup_dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            trace!("Backup directory {:?} does not exist", backup_dir);
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut entries: Vec<BackupEntry> = read_dir
        .filter_map(|dir_entry| backup_entry(dir_entry, &identifier, &base_name))
        .collect();

    entries.sort_by(|a, b| {
        a.record
            .timestamp
            .cmp(&b.record.timestamp)
            .then_with(|| a.modified.cmp(&b.modified))
    });

    debug!("Found {} backups of {:?}", entries.len(), document);
    Ok(entries)
}

/// Turn one directory entry into a backup of the document, if it is one
///
/// Unreadable entries are skipped like foreign files.
fn backup_entry(
    dir_entry: io::Result<fs::DirEntry>,
    identifier: &str,
    base_name: &str,
) -> Option<BackupEntry> {
    let dir_entry = match dir_entry {
        Ok(dir_entry) => dir_entry,
        Err(e) => {
            trace!("Skipping unreadable directory entry: {}", e);
            return None;
        }
    };
    let file_name = dir_entry.file_name().into_string().ok()?;
    let record = BackupRecord::parse(&file_name)?;
    if !record.belongs_to(identifier, base_name) {
        return None;
    }
    if !dir_entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
        return None;
    }

    let path = dir_entry.path();
    Some(BackupEntry {
        modified: modified_time(&path),
        path,
        record,
    })
}

/// The most recent backup entry of `document`, if any
pub fn latest_backup(document: &Path, backup_dir: &Path) -> Result<Option<BackupEntry>> {
    Ok(list_backups(document, backup_dir)?.pop())
}

/// Path of the most recent backup of `document`, if any
///
/// # Example
///
/// ```rust
/// use bakstash::scanner::most_recent_backup;
/// use std::path::Path;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dir = tempfile::TempDir::new()?;
/// let latest = most_recent_backup(Path::new("/tmp/refs.bib"), &dir.path().join("none"))?;
/// assert!(latest.is_none());
/// # Ok(())
/// # }
/// ```
pub fn most_recent_backup(document: &Path, backup_dir: &Path) -> Result<Option<PathBuf>> {
    Ok(latest_backup(document, backup_dir)?.map(|entry| entry.path))
}
