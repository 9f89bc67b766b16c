//! Per-document identifiers derived from file paths
//!
//! Every backup file name starts with a short token derived from the absolute
//! path of the document it belongs to. Two documents called `refs.bib` in
//! different directories therefore never share backups, even though both live
//! in the same backup directory.
//!
//! The token is the first 4 bytes of the SHA-256 digest of the normalized
//! absolute path, rendered as 8 lowercase hex characters. It only namespaces
//! backups; it says nothing about the document content.

use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

/// Number of hex characters in an identifier
pub const IDENTIFIER_LEN: usize = 8;

/// Compute the backup identifier for a document path
///
/// Deterministic: the same path always yields the same identifier. Relative
/// paths are resolved against the current working directory first, and `.`/`..`
/// components are removed lexically, so `a/./b.bib` and `a/b.bib` share an
/// identifier. The file does not need to exist.
///
/// # Example
///
/// ```rust
/// use bakstash::path_hash::identifier_for;
/// use std::path::Path;
///
/// let id = identifier_for(Path::new("/home/user/refs.bib"));
/// assert_eq!(id.len(), 8);
/// assert_eq!(id, identifier_for(Path::new("/home/user/./refs.bib")));
/// ```
pub fn identifier_for(path: &Path) -> String {
    let normalized = normalize_path(path);
    let digest = Sha256::digest(normalized.to_string_lossy().as_bytes());
    hex::encode(&digest[..IDENTIFIER_LEN / 2])
}

/// Make a path absolute and remove `.`/`..` components without touching the disk
///
/// Symbolic links are not resolved; the document may not exist yet.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `pop` on a root is a no-op, which is what `/..` means
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Check whether a string has the shape of an identifier
pub(crate) fn is_identifier(s: &str) -> bool {
    s.len() == IDENTIFIER_LEN
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
