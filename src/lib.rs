//! # bakstash - Automatic backups for open documents
//!
//! A background backup manager for editable documents. While a document is
//! open, every change is eventually snapshotted into a shared backup
//! directory. Writes never block the editing thread, and one final backup is
//! always flushed when the document closes.
//!
//! ## Overview
//!
//! bakstash provides:
//! - Stable per-document backup names namespaced by a hash of the document path
//! - Discovery of the most recent backup among thousands of foreign files
//! - Suppression of snapshots whose content matches the latest backup
//! - Atomic publication, so a backup file is always a complete snapshot
//! - A debounced per-document worker that coalesces bursts of edits
//! - A synchronous flush on shutdown that reports failure to the caller
//!
//! ## Backup file names
//!
//! ```text
//! <identifier>--<file name>--<YYYY-MM-DD--HH.MM.SS>[_NNN].bak
//! 3f2a9c01--refs.bib--2024-05-01--14.03.27.bak
//! 3f2a9c01--refs.bib--2024-05-01--14.03.27_001.bak
//! ```
//!
//! The identifier is the first 8 hex characters of the SHA-256 of the
//! normalized absolute document path. Writes within the same second get a
//! three-digit `_NNN` counter so names never collide and still sort
//! chronologically.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bakstash::{BackupConfig, BackupManager, ChangeEvent, ChangeKind, DocumentHandle, MemoryDocument};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let content = Arc::new(MemoryDocument::new("@Article{key, title = {A}}"));
//! let document = DocumentHandle::saved("/home/user/refs.bib", content.clone());
//! let config = BackupConfig::with_directory("/home/user/.local/share/bakstash/backups");
//!
//! let manager = BackupManager::start(document, config.clone())?;
//!
//! // The document layer reports edits; the worker snapshots after the debounce
//! content.set("@Article{key, title = {B}}");
//! manager.listen(ChangeEvent::new(ChangeKind::Entries));
//!
//! // On close, flush whatever is still pending
//! if let Some(path) = manager.shutdown(&config.backup_directory, config.backups_enabled)? {
//!     println!("Final backup: {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Many open documents
//!
//! ```rust,no_run
//! use bakstash::{BackupConfig, BackupRegistry, FileDocument};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = BackupRegistry::new();
//! let config = BackupConfig::default();
//!
//! registry.start(FileDocument::new("a.bib").handle(), config.clone())?;
//! registry.start(FileDocument::new("b.bib").handle(), config)?;
//!
//! // At exit
//! for (document, error) in registry.shutdown_all() {
//!     eprintln!("Could not back up {}: {}", document.display(), error);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Checking for newer work on open
//!
//! ```rust,no_run
//! use bakstash::diff::backup_file_differs;
//! use bakstash::writer::restore_latest_backup;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let document = Path::new("/home/user/refs.bib");
//! let backups = Path::new("/home/user/.local/share/bakstash/backups");
//!
//! if backup_file_differs(document, backups)? {
//!     // Ask the user, then:
//!     restore_latest_backup(document, backups)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees
//!
//! - Existing backups are never overwritten or truncated
//! - Files in the backup directory that are not backups are never touched
//! - The backup directory is never deleted, only created when needed
//! - At most one write per document runs at any time
//! - Old backups are only deleted when `max_backups` is configured
//!
//! ## Error Handling
//!
//! All operations return `Result<T, BackupError>`. A missing backup or a
//! missing backup directory is not an error; it shows up as `None`, an empty
//! list or `true` from the diff predicates.
//!
//! ## Module Organization
//!
//! - [`path_hash`]: Per-document identifiers
//! - [`naming`]: Building and parsing backup file names
//! - [`scanner`]: Finding the backups of a document
//! - [`diff`]: Deciding whether a snapshot would add anything
//! - [`writer`]: Writing, restoring and pruning backups
//! - [`document`]: The document seam
//! - [`manager`]: The per-document background manager
//! - [`registry`]: Managers of all open documents
//! - [`config`]: Configuration and builder
//! - [`types`]: Common types and hooks
//! - [`error`]: Error types and handling

// Public API modules
pub mod config;
pub mod diff;
pub mod document;
pub mod error;
pub mod manager;
pub mod naming;
pub mod path_hash;
pub mod registry;
pub mod scanner;
pub mod types;
pub mod writer;

// Internal modules (not part of public API)
mod utils;

// Re-export main types for convenience
pub use config::{BackupConfig, BackupManagerBuilder};
pub use document::{ContentProvider, DocumentHandle, FileDocument, MemoryDocument};
pub use error::{BackupError, Result};
pub use manager::{BackupManager, ChangeSender};
pub use path_hash::identifier_for;
pub use registry::BackupRegistry;
pub use scanner::{list_backups, most_recent_backup, BackupEntry};
pub use types::*;
pub use writer::backup_path_for_new_backup;
