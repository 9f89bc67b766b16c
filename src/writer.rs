//! Writing, restoring and pruning backup files
//!
//! Every backup is published atomically: content goes to a temporary file in
//! the backup directory and is renamed into place without replacing anything.
//! A reader therefore sees either no file or a complete snapshot, and an
//! existing backup is never overwritten or truncated, even when a write fails
//! half way.

use crate::document::DocumentHandle;
use crate::error::{BackupError, Result};
use crate::naming::{BackupRecord, BackupTimestamp};
use crate::scanner::{latest_backup, list_backups, most_recent_backup};
use crate::utils::{atomic_write, ensure_directory};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// How many slots are tried when picking a name, and how often a write is
/// retried after losing a name race
const MAX_NAME_ATTEMPTS: usize = 16;

/// Path a backup of `document` taken right now would get
///
/// Pure path construction: the directory is not read or created, so two
/// calls within one second return the same path. Use [`next_backup_path`]
/// for a path that is guaranteed to be free.
///
/// Returns `None` if `document` has no file name.
pub fn backup_path_for_new_backup(document: &Path, backup_dir: &Path) -> Option<PathBuf> {
    backup_path_at(document, backup_dir, BackupTimestamp::now())
}

/// Path of the backup of `document` with the given timestamp
pub fn backup_path_at(
    document: &Path,
    backup_dir: &Path,
    timestamp: BackupTimestamp,
) -> Option<PathBuf> {
    BackupRecord::for_document(document, timestamp).map(|record| backup_dir.join(record.file_name()))
}

/// A free path for the next backup of `document`
///
/// Uses the current time unless the latest existing backup is from the same
/// second or later (clock resolution, clock going backwards), in which case
/// the slot right after the latest backup is used. The new backup therefore
/// always sorts after every existing one.
///
/// # Errors
///
/// - [`BackupError::DocumentNotSaved`] if `document` has no file name
/// - [`BackupError::Internal`] if no free slot is found after the latest backup
/// - I/O errors from listing the backup directory
pub fn next_backup_path(document: &Path, backup_dir: &Path) -> Result<PathBuf> {
    let now = BackupTimestamp::now();
    let mut timestamp = match latest_backup(document, backup_dir)? {
        Some(latest) if latest.record.timestamp.time() >= now.time() => {
            latest.record.timestamp.successor()
        }
        _ => Some(now),
    };

    for _ in 0..MAX_NAME_ATTEMPTS {
        let Some(candidate) = timestamp else { break };
        let path = backup_path_at(document, backup_dir, candidate)
            .ok_or(BackupError::DocumentNotSaved)?;
        if !path.exists() {
            return Ok(path);
        }
        timestamp = candidate.successor();
    }

    Err(BackupError::internal(format!(
        "no free backup slot for {:?} in {:?}",
        document, backup_dir
    )))
}

/// Write the current content of `document` as a new backup
///
/// Creates the backup directory (and its parents) if needed.
///
/// # Returns
///
/// The path of the new backup file.
///
/// # Errors
///
/// - [`BackupError::DocumentNotSaved`] if the document has no path
/// - [`BackupError::Content`] if the document cannot be serialized
/// - [`BackupError::CreateDirectory`] / [`BackupError::WriteFailed`] on I/O failure
#[instrument(level = "debug", skip(document), fields(path = ?document.path()))]
pub fn write_backup(document: &DocumentHandle, backup_dir: &Path) -> Result<PathBuf> {
    let path = document.require_path()?;
    let content = document.content()?;
    write_content_as_new_backup(path, backup_dir, &content)
}

/// Write `content` as a new backup of the document at `document_path`
pub fn write_content_as_new_backup(
    document_path: &Path,
    backup_dir: &Path,
    content: &[u8],
) -> Result<PathBuf> {
    ensure_directory(backup_dir)?;

    for _ in 0..MAX_NAME_ATTEMPTS {
        let target = next_backup_path(document_path, backup_dir)?;
        match atomic_write(&target, content, false) {
            Ok(()) => {
                info!("Wrote backup {:?} ({} bytes)", target, content.len());
                return Ok(target);
            }
            Err(BackupError::BackupExists(taken)) => {
                debug!("Backup name {:?} was taken concurrently, retrying", taken);
            }
            Err(e) => return Err(e),
        }
    }

    Err(BackupError::internal(format!(
        "no free backup name for {:?} after {} attempts",
        document_path, MAX_NAME_ATTEMPTS
    )))
}

/// Write `content` to an already chosen backup path
///
/// Creates the parent directory if needed. Fails with
/// [`BackupError::BackupExists`] instead of replacing an existing file.
pub fn write_backup_to(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }
    atomic_write(path, content, false)?;
    info!("Wrote backup {:?} ({} bytes)", path, content.len());
    Ok(())
}

/// Replace `document` with the content of its most recent backup
///
/// # Returns
///
/// The backup that was restored, or `None` if there is no backup.
#[instrument(level = "debug")]
pub fn restore_latest_backup(document: &Path, backup_dir: &Path) -> Result<Option<PathBuf>> {
    let Some(latest) = most_recent_backup(document, backup_dir)? else {
        return Ok(None);
    };

    let content = fs::read(&latest)?;
    if let Some(parent) = document.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }
    atomic_write(document, &content, true)?;

    info!("Restored {:?} from {:?}", document, latest);
    Ok(Some(latest))
}

/// Delete the oldest backups of `document` so that at most `keep` remain
///
/// Only files parsed as backups of this document are considered; foreign
/// files and other documents' backups are never touched.
///
/// # Returns
///
/// The deleted paths, oldest first.
pub fn prune_backups(document: &Path, backup_dir: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    let backups = list_backups(document, backup_dir)?;
    let excess = backups.len().saturating_sub(keep);

    let mut removed = Vec::with_capacity(excess);
    for entry in backups.into_iter().take(excess) {
        match fs::remove_file(&entry.path) {
            Ok(()) => {
                debug!("Pruned old backup {:?}", entry.path);
                removed.push(entry.path);
            }
            Err(e) => warn!("Failed to prune {:?}: {}", entry.path, e),
        }
    }
    Ok(removed)
}
