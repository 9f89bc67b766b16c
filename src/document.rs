//! The document seam
//!
//! The backup core never owns the document model. It sees an open document
//! through a [`DocumentHandle`]: the path of the saved file (if any) plus a
//! [`ContentProvider`] that serializes the current in-memory state in the
//! document's own file format, so a backup can be opened like the original.

use crate::error::{BackupError, Result};
use parking_lot::RwLock;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Source of the serialized document content
///
/// Implemented by the hosting application's document model. Called from the
/// backup worker thread, so implementations must be thread-safe.
///
/// # Examples
///
/// ```rust
/// use bakstash::document::ContentProvider;
/// use bakstash::Result;
///
/// struct Library {
///     entries: Vec<String>,
/// }
///
/// impl ContentProvider for Library {
///     fn serialize(&self) -> Result<Vec<u8>> {
///         Ok(self.entries.join("\n").into_bytes())
///     }
/// }
/// ```
pub trait ContentProvider: Send + Sync {
    /// Serialize the current state of the document
    fn serialize(&self) -> Result<Vec<u8>>;
}

/// Non-owning view of an open document
#[derive(Clone)]
pub struct DocumentHandle {
    path: Option<PathBuf>,
    provider: Arc<dyn ContentProvider>,
}

impl DocumentHandle {
    /// Create a handle for a document that may not have been saved yet
    pub fn new(path: Option<PathBuf>, provider: Arc<dyn ContentProvider>) -> Self {
        Self { path, provider }
    }

    /// Create a handle for a document saved at `path`
    pub fn saved(path: impl Into<PathBuf>, provider: Arc<dyn ContentProvider>) -> Self {
        Self::new(Some(path.into()), provider)
    }

    /// Path of the saved document, if it has one
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Path of the saved document, or [`BackupError::DocumentNotSaved`]
    pub fn require_path(&self) -> Result<&Path> {
        self.path().ok_or(BackupError::DocumentNotSaved)
    }

    /// Serialize the current content
    pub fn content(&self) -> Result<Vec<u8>> {
        self.provider.serialize()
    }
}

impl fmt::Debug for DocumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentHandle")
            .field("path", &self.path)
            .field("provider", &"<dyn ContentProvider>")
            .finish()
    }
}

/// Document content held in memory
///
/// A ready-made provider for hosts that keep the serialized form around,
/// and for tests.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    content: RwLock<Vec<u8>>,
}

impl MemoryDocument {
    /// Create a document with initial content
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: RwLock::new(content.into()),
        }
    }

    /// Replace the content
    pub fn set(&self, content: impl Into<Vec<u8>>) {
        *self.content.write() = content.into();
    }

    /// Append to the content
    pub fn append(&self, more: &[u8]) {
        self.content.write().extend_from_slice(more);
    }
}

impl ContentProvider for MemoryDocument {
    fn serialize(&self) -> Result<Vec<u8>> {
        Ok(self.content.read().clone())
    }
}

/// The saved file itself as the content source
///
/// Used for one-shot backups of a document that is not open in an editor.
#[derive(Debug, Clone)]
pub struct FileDocument {
    path: PathBuf,
}

impl FileDocument {
    /// Read content from `path` on every serialization
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Handle for this file, with the file as its own saved path
    pub fn handle(self) -> DocumentHandle {
        let path = self.path.clone();
        DocumentHandle::saved(path, Arc::new(self))
    }
}

impl ContentProvider for FileDocument {
    fn serialize(&self) -> Result<Vec<u8>> {
        fs::read(&self.path)
            .map_err(|e| BackupError::content(format!("cannot read {:?}: {}", self.path, e)))
    }
}
