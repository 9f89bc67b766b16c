//! Core data types used throughout the bakstash library
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Policy**: `BackupPolicy` - the two switches owned by the host application
//! - **Change notifications**: `ChangeKind`, `ChangeEvent` - what the document layer reports
//! - **Lifecycle**: `ManagerState` - where a backup manager is in its life
//! - **Results**: `BackupOutcome` - what a snapshot attempt did
//! - **Hooks**: `BackupObserver` - how results reach the host's UI

use crate::error::BackupError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Backup switches configured by the surrounding application
///
/// `warn_before_overwrite` is carried for the host: the core only exposes
/// [`crate::diff::backup_file_differs`] and never prompts anyone itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupPolicy {
    /// Whether backups are written at all
    pub backups_enabled: bool,
    /// Whether the user wants a warning before a differing backup is superseded
    pub warn_before_overwrite: bool,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            backups_enabled: true,
            warn_before_overwrite: false,
        }
    }
}

/// What part of the document changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Entries were added, removed or edited
    Entries,
    /// Document-level metadata changed
    MetaData,
    /// Group structure changed
    Groups,
    /// Anything else
    Other,
}

/// A "document changed" notification
///
/// # Examples
///
/// ```rust
/// use bakstash::types::{ChangeEvent, ChangeKind};
///
/// let edit = ChangeEvent::new(ChangeKind::Entries);
/// assert!(edit.triggers_backup());
///
/// // Raised by automated bookkeeping, e.g. while saving
/// let bookkeeping = ChangeEvent::filtered(ChangeKind::MetaData);
/// assert!(!bookkeeping.triggers_backup());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// What changed
    pub kind: ChangeKind,
    /// Whether the change was raised by bookkeeping rather than by an edit
    pub filtered: bool,
}

impl ChangeEvent {
    /// An edit that should eventually be backed up
    pub fn new(kind: ChangeKind) -> Self {
        Self {
            kind,
            filtered: false,
        }
    }

    /// A change that must not mark the document dirty
    pub fn filtered(kind: ChangeKind) -> Self {
        Self {
            kind,
            filtered: true,
        }
    }

    /// Whether this event marks the document dirty
    pub fn triggers_backup(&self) -> bool {
        !self.filtered
    }
}

/// Lifecycle of a backup manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagerState {
    /// Not started, or fully shut down
    Stopped,
    /// Listening for changes and writing backups in the background
    Running,
    /// Draining the worker and writing the final backup
    ShuttingDown,
}

/// Result of one snapshot attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// A new backup file was written
    Written(PathBuf),
    /// The content matches the latest backup; nothing was written
    Unchanged,
    /// Backups are disabled by policy
    Disabled,
}

impl BackupOutcome {
    /// Path of the new backup, if one was written
    pub fn written_path(&self) -> Option<&Path> {
        match self {
            BackupOutcome::Written(path) => Some(path),
            _ => None,
        }
    }
}

/// Hook for reporting backup results to the host application
///
/// The core itself never shows anything to the user. Hosts implement this
/// trait to turn results into status messages or notifications. Callbacks
/// run on the backup worker thread, or on the caller's thread for explicit
/// backups, after the manager's write lock is released. They may call
/// [`BackupManager::backup_now`](crate::BackupManager::backup_now) or
/// [`BackupManager::perform_backup`](crate::BackupManager::perform_backup),
/// but never `shutdown`, which waits for the worker thread.
///
/// # Examples
///
/// ```rust
/// use bakstash::types::BackupObserver;
/// use bakstash::BackupError;
/// use std::path::Path;
///
/// struct StatusBar;
///
/// impl BackupObserver for StatusBar {
///     fn on_backup_written(&self, document: &Path, backup: &Path) {
///         println!("Backed up {} to {}", document.display(), backup.display());
///     }
///
///     fn on_backup_failed(&self, document: &Path, error: &BackupError) {
///         eprintln!("Backup of {} failed: {}", document.display(), error.user_message());
///     }
/// }
/// ```
pub trait BackupObserver: Send + Sync {
    /// Called after a backup file has been published
    fn on_backup_written(&self, document: &Path, backup: &Path);

    /// Called when a background backup failed
    ///
    /// The failure is not fatal; the next change retries.
    fn on_backup_failed(&self, document: &Path, error: &BackupError);
}

/// Default implementation of BackupObserver that does nothing
#[derive(Debug)]
pub struct NoOpObserver;

impl BackupObserver for NoOpObserver {
    fn on_backup_written(&self, _document: &Path, _backup: &Path) {}

    fn on_backup_failed(&self, _document: &Path, _error: &BackupError) {}
}
