//! Canonical backup file names
//!
//! A backup file is named
//!
//! ```text
//! <identifier>--<base name>--<YYYY-MM-DD--HH.MM.SS>[_<NNN>].bak
//! ```
//!
//! - `identifier` is the 8 hex character token from [`crate::path_hash`]
//! - `base name` is the file name of the original document (`refs.bib`)
//! - the timestamp is local wall-clock time at second resolution
//! - `_<NNN>` is a counter appended only when more than one backup of the
//!   same document is written within one second; it runs from `_001` to
//!   `_999` and is always three digits wide so that name order stays
//!   chronological
//!
//! Parsing splits the identifier from the left and the timestamp from the
//! right, both of which have a fixed shape. Base names may therefore contain
//! the `--` delimiter themselves. Names that do not match this shape exactly
//! (including names that would not render back byte-for-byte) are treated as
//! foreign files.

use crate::path_hash::{identifier_for, is_identifier, IDENTIFIER_LEN};
use chrono::{Duration, Local, NaiveDateTime, Timelike};
use std::fmt;
use std::path::Path;

/// File extension of backup files (without the dot)
pub const BACKUP_EXTENSION: &str = "bak";

/// Separator between the fields of a backup file name
pub const FIELD_DELIMITER: &str = "--";

/// `chrono` pattern of the embedded timestamp
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d--%H.%M.%S";

const TIMESTAMP_LEN: usize = "2020-02-03--00.00.00".len();
const SEQUENCE_SEPARATOR: char = '_';
const SEQUENCE_WIDTH: usize = 3;

/// Largest same-second counter a file name can carry
pub const MAX_SEQUENCE: u32 = 999;

/// Timestamp embedded in a backup file name
///
/// Ordered by wall-clock time first and by the same-second counter second,
/// which is also the chronological order of the backups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BackupTimestamp {
    time: NaiveDateTime,
    sequence: u32,
}

impl BackupTimestamp {
    /// Create a timestamp, dropping any sub-second part of `time`
    ///
    /// `sequence` is capped at [`MAX_SEQUENCE`].
    pub fn new(time: NaiveDateTime, sequence: u32) -> Self {
        Self {
            time: time.with_nanosecond(0).unwrap_or(time),
            sequence: sequence.min(MAX_SEQUENCE),
        }
    }

    /// The current local time, without a counter
    pub fn now() -> Self {
        Self::new(Local::now().naive_local(), 0)
    }

    /// Wall-clock part of the timestamp
    pub fn time(&self) -> NaiveDateTime {
        self.time
    }

    /// Same-second counter (0 when absent from the file name)
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// The next slot within the same second, `None` once the counter is used up
    pub fn next_in_same_second(&self) -> Option<Self> {
        (self.sequence < MAX_SEQUENCE).then(|| Self {
            time: self.time,
            sequence: self.sequence + 1,
        })
    }

    /// The smallest timestamp that sorts after this one
    ///
    /// Moves on to the next second once the counter is exhausted. `None` only
    /// at the end of the representable time range.
    pub fn successor(&self) -> Option<Self> {
        self.next_in_same_second().or_else(|| {
            let time = self.time.checked_add_signed(Duration::seconds(1))?;
            Some(Self::new(time, 0))
        })
    }

    fn parse(stamp: &str, sequence: u32) -> Option<Self> {
        let time = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
        let parsed = Self::new(time, sequence);
        // Reject lenient parses such as unpadded fields
        (parsed.time.format(TIMESTAMP_FORMAT).to_string() == stamp).then_some(parsed)
    }
}

impl fmt::Display for BackupTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.time.format(TIMESTAMP_FORMAT))?;
        if self.sequence > 0 {
            write!(
                f,
                "{}{:0width$}",
                SEQUENCE_SEPARATOR,
                self.sequence,
                width = SEQUENCE_WIDTH
            )?;
        }
        Ok(())
    }
}

/// The fields encoded in a backup file name
///
/// Backup records are never persisted on their own; they are reconstructed
/// from the directory listing whenever they are needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackupRecord {
    /// Identifier of the original document's path
    pub identifier: String,
    /// File name of the original document
    pub base_name: String,
    /// When the backup was taken
    pub timestamp: BackupTimestamp,
}

impl BackupRecord {
    /// Create a record from its parts
    pub fn new(
        identifier: impl Into<String>,
        base_name: impl Into<String>,
        timestamp: BackupTimestamp,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            base_name: base_name.into(),
            timestamp,
        }
    }

    /// Build the record for a backup of `document` taken at `timestamp`
    ///
    /// Returns `None` if the path has no file name (e.g. `/` or `..`).
    pub fn for_document(document: &Path, timestamp: BackupTimestamp) -> Option<Self> {
        let base_name = document_base_name(document)?;
        Some(Self::new(identifier_for(document), base_name, timestamp))
    }

    /// Render the canonical file name
    pub fn file_name(&self) -> String {
        format_file_name(&self.identifier, &self.base_name, &self.timestamp)
    }

    /// Parse a file name; `None` for anything that is not a backup file
    pub fn parse(file_name: &str) -> Option<Self> {
        parse_file_name(file_name)
    }

    /// Whether this record is a backup of the document with these keys
    pub fn belongs_to(&self, identifier: &str, base_name: &str) -> bool {
        self.identifier == identifier && self.base_name == base_name
    }
}

/// Render `<identifier>--<base name>--<timestamp>.bak`
pub fn format_file_name(identifier: &str, base_name: &str, timestamp: &BackupTimestamp) -> String {
    format!(
        "{identifier}{FIELD_DELIMITER}{base_name}{FIELD_DELIMITER}{timestamp}.{BACKUP_EXTENSION}"
    )
}

/// Parse a backup file name back into its fields
///
/// Exact inverse of [`format_file_name`] for every name it produces.
///
/// # Example
///
/// ```rust
/// use bakstash::naming::parse_file_name;
///
/// let record = parse_file_name("27182d3c--my--refs.bib--2020-02-03--00.00.01.bak").unwrap();
/// assert_eq!(record.identifier, "27182d3c");
/// assert_eq!(record.base_name, "my--refs.bib");
/// assert!(parse_file_name("notes.txt").is_none());
/// ```
pub fn parse_file_name(file_name: &str) -> Option<BackupRecord> {
    let stem = file_name
        .strip_suffix(BACKUP_EXTENSION)?
        .strip_suffix('.')?;

    let identifier = stem.get(..IDENTIFIER_LEN)?;
    if !is_identifier(identifier) {
        return None;
    }
    let rest = stem.get(IDENTIFIER_LEN..)?.strip_prefix(FIELD_DELIMITER)?;

    let (stamped, sequence) = split_sequence(rest)?;
    let split = stamped.len().checked_sub(TIMESTAMP_LEN)?;
    let stamp = stamped.get(split..)?;
    let base_name = stamped.get(..split)?.strip_suffix(FIELD_DELIMITER)?;
    if base_name.is_empty() {
        return None;
    }

    let timestamp = BackupTimestamp::parse(stamp, sequence)?;
    Some(BackupRecord::new(identifier, base_name, timestamp))
}

/// File name of a document as used in backup names
pub fn document_base_name(document: &Path) -> Option<String> {
    document
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Split an optional `_<NNN>` counter off the end of `rest`
///
/// The timestamp contains no `_`, so a trailing all-digit segment can only be
/// the counter. Counters are always exactly three digits and never `000`.
fn split_sequence(rest: &str) -> Option<(&str, u32)> {
    match rest.rsplit_once(SEQUENCE_SEPARATOR) {
        Some((head, digits)) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            if digits.len() != SEQUENCE_WIDTH {
                return None;
            }
            let sequence: u32 = digits.parse().ok()?;
            (sequence > 0).then_some((head, sequence))
        }
        _ => Some((rest, 0)),
    }
}
