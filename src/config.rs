//! Backup configuration
//!
//! [`BackupConfig`] holds everything the host application decides about
//! backups: where they go, whether they are written, how long edits are
//! coalesced, and whether old backups are pruned. It is plain serde data and
//! can be persisted as JSON next to the host's other preferences.
//!
//! [`BackupManagerBuilder`] is the fluent way to assemble a config and start a
//! manager in one go.

use crate::document::DocumentHandle;
use crate::error::{BackupError, Result};
use crate::manager::BackupManager;
use crate::types::{BackupObserver, BackupPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default delay between the first change and the snapshot it triggers
pub const DEFAULT_DEBOUNCE_MS: u64 = 19_000;

/// Configuration for backup managers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Directory holding the backups of all documents
    pub backup_directory: PathBuf,
    /// Whether backups are written at all
    pub backups_enabled: bool,
    /// Whether the host warns before a differing backup is superseded
    pub warn_before_overwrite: bool,
    /// Delay between the first change and the snapshot, in milliseconds
    pub debounce_ms: u64,
    /// Write a final backup on shutdown even if nothing changed since the
    /// last one (identical content is still suppressed)
    pub force_final_backup: bool,
    /// Keep at most this many backups per document (`None` keeps all)
    pub max_backups: Option<usize>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_directory: default_backup_directory(),
            backups_enabled: true,
            warn_before_overwrite: false,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            force_final_backup: false,
            max_backups: None,
        }
    }
}

impl BackupConfig {
    /// Default configuration with a specific backup directory
    pub fn with_directory(backup_directory: impl Into<PathBuf>) -> Self {
        Self {
            backup_directory: backup_directory.into(),
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their default values.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        debug!("Loaded backup configuration from {:?}", path);
        Ok(config)
    }

    /// Save the configuration as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        crate::utils::atomic_write(path, json.as_bytes(), true)
    }

    /// Check the configuration for values no manager can work with
    pub fn validate(&self) -> Result<()> {
        if self.backup_directory.as_os_str().is_empty() {
            return Err(BackupError::InvalidConfiguration(
                "backup_directory must not be empty".to_string(),
            ));
        }
        if self.max_backups == Some(0) {
            return Err(BackupError::InvalidConfiguration(
                "max_backups must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The policy switches of this configuration
    pub fn policy(&self) -> BackupPolicy {
        BackupPolicy {
            backups_enabled: self.backups_enabled,
            warn_before_overwrite: self.warn_before_overwrite,
        }
    }

    /// Debounce delay as a duration
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Per-user default backup directory
///
/// `<local data dir>/bakstash/backups`, or the system temp directory when the
/// platform has no local data directory.
pub fn default_backup_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("bakstash")
        .join("backups")
}

/// Builder for starting a [`BackupManager`]
///
/// # Examples
///
/// ```rust,no_run
/// use bakstash::{BackupManagerBuilder, DocumentHandle, MemoryDocument};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let document = DocumentHandle::saved("/home/user/refs.bib", Arc::new(MemoryDocument::default()));
/// let manager = BackupManagerBuilder::new()
///     .backup_directory("/home/user/.backups")
///     .debounce(Duration::from_secs(5))
///     .max_backups(Some(10))
///     .start(document)?;
/// # Ok(())
/// # }
/// ```
pub struct BackupManagerBuilder {
    config: BackupConfig,
    observer: Option<Arc<dyn BackupObserver>>,
}

impl BackupManagerBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::from_config(BackupConfig::default())
    }

    /// Start from an existing configuration
    pub fn from_config(config: BackupConfig) -> Self {
        Self {
            config,
            observer: None,
        }
    }

    /// Set the backup directory
    pub fn backup_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.backup_directory = dir.into();
        self
    }

    /// Enable or disable backups
    pub fn backups_enabled(mut self, enabled: bool) -> Self {
        self.config.backups_enabled = enabled;
        self
    }

    /// Set the warn-before-overwrite switch
    pub fn warn_before_overwrite(mut self, warn: bool) -> Self {
        self.config.warn_before_overwrite = warn;
        self
    }

    /// Set the delay between the first change and its snapshot
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.config.debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Write a final backup on shutdown even when not dirty
    pub fn force_final_backup(mut self, force: bool) -> Self {
        self.config.force_final_backup = force;
        self
    }

    /// Limit the number of backups kept per document
    pub fn max_backups(mut self, max: Option<usize>) -> Self {
        self.config.max_backups = max;
        self
    }

    /// Report results to `observer`
    pub fn observer(mut self, observer: Arc<dyn BackupObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The configuration assembled so far
    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Start a manager for `document`
    pub fn start(self, document: DocumentHandle) -> Result<BackupManager> {
        BackupManager::start_with_observer(document, self.config, self.observer)
    }
}

impl Default for BackupManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
