//! Process-wide table of running backup managers
//!
//! Hosts with many open documents keep one [`BackupRegistry`] and start and
//! stop managers through it. At most one manager runs per document, keyed by
//! the normalized document path so that `./refs.bib` and `/home/u/refs.bib`
//! are the same document.

use crate::config::BackupConfig;
use crate::document::DocumentHandle;
use crate::error::{BackupError, Result};
use crate::manager::BackupManager;
use crate::path_hash::normalize_path;
use crate::types::BackupObserver;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Running managers, one per open document
#[derive(Default)]
pub struct BackupRegistry {
    managers: DashMap<PathBuf, Arc<BackupManager>>,
    observer: Option<Arc<dyn BackupObserver>>,
}

impl BackupRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry whose managers all report to `observer`
    pub fn with_observer(observer: Arc<dyn BackupObserver>) -> Self {
        Self {
            managers: DashMap::new(),
            observer: Some(observer),
        }
    }

    /// Start a manager for `document`
    ///
    /// # Errors
    ///
    /// - [`BackupError::AlreadyRunning`] if a manager for the same document is registered
    /// - any error of [`BackupManager::start`]
    pub fn start(&self, document: DocumentHandle, config: BackupConfig) -> Result<Arc<BackupManager>> {
        let key = normalize_path(document.require_path()?);

        match self.managers.entry(key) {
            Entry::Occupied(entry) => Err(BackupError::AlreadyRunning(entry.key().clone())),
            Entry::Vacant(entry) => {
                let manager = Arc::new(BackupManager::start_with_observer(
                    document,
                    config,
                    self.observer.clone(),
                )?);
                debug!("Registered backup manager for {:?}", entry.key());
                entry.insert(manager.clone());
                Ok(manager)
            }
        }
    }

    /// The running manager of `document`, if any
    pub fn get(&self, document: &Path) -> Option<Arc<BackupManager>> {
        self.managers
            .get(&normalize_path(document))
            .map(|entry| entry.value().clone())
    }

    /// Whether a manager runs for `document`
    pub fn contains(&self, document: &Path) -> bool {
        self.managers.contains_key(&normalize_path(document))
    }

    /// Number of running managers
    pub fn len(&self) -> usize {
        self.managers.len()
    }

    /// Whether no manager is running
    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// Shut down and unregister the manager of `document`
    ///
    /// See [`BackupManager::shutdown`] for the flush semantics. The manager is
    /// unregistered even if the final backup fails.
    ///
    /// # Errors
    ///
    /// - [`BackupError::NotRunning`] if no manager is registered for `document`
    /// - the error of the final backup
    pub fn shutdown(
        &self,
        document: &Path,
        backup_dir: &Path,
        backups_enabled: bool,
    ) -> Result<Option<PathBuf>> {
        let key = normalize_path(document);
        let (_, manager) = self
            .managers
            .remove(&key)
            .ok_or(BackupError::NotRunning(key))?;
        manager.shutdown(backup_dir, backups_enabled)
    }

    /// Shut down every manager with its own configuration
    ///
    /// Used when the host exits. Every manager is stopped even if some final
    /// backups fail.
    ///
    /// # Returns
    ///
    /// The documents whose final backup failed, with the error.
    pub fn shutdown_all(&self) -> Vec<(PathBuf, BackupError)> {
        let keys: Vec<PathBuf> = self.managers.iter().map(|entry| entry.key().clone()).collect();
        let mut failures = Vec::new();

        for key in keys {
            let Some((path, manager)) = self.managers.remove(&key) else {
                continue;
            };
            let config = manager.config();
            if let Err(e) = manager.shutdown(&config.backup_directory, config.backups_enabled) {
                warn!("Final backup of {:?} failed: {}", path, e);
                failures.push((path, e));
            }
        }

        failures
    }
}

impl std::fmt::Debug for BackupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupRegistry")
            .field("managers", &self.managers.len())
            .finish()
    }
}
