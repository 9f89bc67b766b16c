//! Error types for the bakstash library
//!
//! This module defines all error types that can occur during backup operations.
//! A missing backup or a never-saved document is not an error: those cases are
//! reported through `Option`/`bool` results by the scanner and diff detector.
//! Everything here is an actual failure that the caller may want to act on.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the bakstash library
pub type Result<T> = std::result::Result<T, BackupError>;

/// Main error type for all backup operations
#[derive(Debug, Error)]
pub enum BackupError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Writing a backup file failed
    #[error("Failed to write backup {path:?}: {source}")]
    WriteFailed {
        /// Target backup path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The backup directory could not be created
    #[error("Failed to create backup directory {path:?}: {source}")]
    CreateDirectory {
        /// Directory that could not be created
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A backup already exists at the requested path
    #[error("Backup already exists: {0:?}")]
    BackupExists(PathBuf),

    /// The document has no on-disk path, so no stable backup name exists
    #[error("Document has never been saved")]
    DocumentNotSaved,

    /// A backup manager is already running for this document
    #[error("Backup manager already running for {0:?}")]
    AlreadyRunning(PathBuf),

    /// No backup manager is running for this document
    #[error("No backup manager running for {0:?}")]
    NotRunning(PathBuf),

    /// The content provider failed to serialize the document
    #[error("Content error: {0}")]
    Content(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BackupError {
    /// Create a content error with a custom message
    pub fn content(msg: impl Into<String>) -> Self {
        BackupError::Content(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        BackupError::Internal(msg.into())
    }

    /// Wrap an I/O error raised while writing `path`
    pub fn write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BackupError::WriteFailed {
            path: path.into(),
            source,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors leave the editing session intact; the next change
    /// cycle retries the backup.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BackupError::Io(_)
                | BackupError::WriteFailed { .. }
                | BackupError::CreateDirectory { .. }
                | BackupError::BackupExists(_)
                | BackupError::Content(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            BackupError::WriteFailed { path, .. } => {
                format!(
                    "Could not write backup {:?}. Check free disk space and permissions of the backup directory.",
                    path
                )
            }
            BackupError::CreateDirectory { path, .. } => {
                format!(
                    "Could not create backup directory {:?}. Choose a different backup directory in the preferences.",
                    path
                )
            }
            BackupError::DocumentNotSaved => {
                "The document has not been saved yet. Save it once to enable automatic backups.".to_string()
            }
            _ => self.to_string(),
        }
    }
}
