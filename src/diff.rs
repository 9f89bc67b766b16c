//! No-op snapshot suppression
//!
//! Before writing a backup the manager asks whether the content would actually
//! differ from the most recent backup. Without this check an idle document
//! would fill the backup directory with identical snapshots.
//!
//! Two predicates are provided:
//!
//! - [`backup_file_differs`] compares the document *on disk* with its latest
//!   backup. The hosting application uses it on open to decide whether the
//!   latest backup holds anything the saved file does not.
//! - [`content_differs_from_latest_backup`] compares *in-memory* content with
//!   the latest backup. The background worker uses it before each snapshot.
//!
//! Comparison ignores `\r\n` vs `\n` differences, since the document format
//! does not distinguish them.

use crate::error::Result;
use crate::scanner::latest_backup;
use crate::utils::{contents_match, modified_time, read_if_exists};
use std::fs;
use std::path::Path;
use tracing::{debug, instrument};

/// Whether the latest backup of `document` holds content the saved file lacks
///
/// - No backup at all: `true`, a first backup is always warranted.
/// - The document file is missing but a backup exists: `true`.
/// - The backup's modification time is older than the document's: `false`.
///   The document was saved after the backup was taken, so the backup is
///   stale rather than newer work. This holds whatever the backup contains.
/// - Otherwise the contents are compared.
///
/// # Errors
///
/// Fails only if the backup directory or one of the files exists but cannot
/// be read.
#[instrument(level = "debug")]
pub fn backup_file_differs(document: &Path, backup_dir: &Path) -> Result<bool> {
    let Some(latest) = latest_backup(document, backup_dir)? else {
        debug!("No backup of {:?} yet", document);
        return Ok(true);
    };

    let Some(current) = read_if_exists(document)? else {
        debug!("{:?} does not exist but has a backup", document);
        return Ok(true);
    };

    if let (Some(backup_modified), Some(document_modified)) =
        (latest.modified, modified_time(document))
    {
        if backup_modified < document_modified {
            debug!(
                "Latest backup {:?} predates the last save of {:?}",
                latest.path, document
            );
            return Ok(false);
        }
    }

    let backup = fs::read(&latest.path)?;
    Ok(!contents_match(&current, &backup))
}

/// Whether writing `content` as a new backup of `document` would add anything
///
/// With no backup yet, a snapshot is warranted if the document has been saved
/// before or the in-memory content is non-empty. A never-saved, empty document
/// needs no backup.
pub fn content_differs_from_latest_backup(
    content: &[u8],
    document: &Path,
    backup_dir: &Path,
) -> Result<bool> {
    match latest_backup(document, backup_dir)? {
        None => Ok(document.exists() || !content.is_empty()),
        Some(latest) => {
            let backup = fs::read(&latest.path)?;
            let differs = !contents_match(content, &backup);
            debug!("Content vs latest backup {:?}: differs = {}", latest.path, differs);
            Ok(differs)
        }
    }
}
