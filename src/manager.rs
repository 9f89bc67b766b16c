//! Per-document backup manager
//!
//! One [`BackupManager`] runs for every open document. It owns a background
//! worker thread and the channel the document layer pushes change
//! notifications into.
//!
//! ## Lifecycle
//!
//! ```text
//! Stopped --start--> Running --shutdown--> ShuttingDown --> Stopped
//! ```
//!
//! ## Scheduling
//!
//! A change notification only bumps a counter and sends a message, so the
//! interactive thread never waits on I/O. The worker arms a single deadline on
//! the first change; further changes before the deadline are absorbed into the
//! same snapshot. When the deadline passes the worker serializes the document,
//! skips the write if the content matches the latest backup, and otherwise
//! publishes a new backup. A change that arrives while the snapshot is running
//! keeps the document dirty and arms the next deadline, so no edit is lost.
//!
//! All writes for one document (background, explicit and the final shutdown
//! flush) take the same lock, so there is never more than one writer per
//! document. Managers of different documents share nothing but the backup
//! directory and run fully in parallel.
//!
//! ## Failures
//!
//! Background failures are logged and passed to the [`BackupObserver`]; the
//! next change retries. The final flush in [`BackupManager::shutdown`] returns
//! its error to the caller, since it is the last chance to protect the work.

use crate::config::BackupConfig;
use crate::diff::{backup_file_differs, content_differs_from_latest_backup};
use crate::document::DocumentHandle;
use crate::error::Result;
use crate::path_hash::identifier_for;
use crate::types::{
    BackupObserver, BackupOutcome, BackupPolicy, ChangeEvent, ManagerState, NoOpObserver,
};
use crate::writer::{
    backup_path_for_new_backup, next_backup_path, prune_backups, write_backup_to,
    write_content_as_new_backup,
};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, instrument, trace, warn};

/// Messages from the document layer to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerMessage {
    /// The document changed
    Changed,
    /// Stop without writing; the caller performs the final flush
    Shutdown,
}

/// State shared between the manager, its change senders and its worker
struct Shared {
    document: DocumentHandle,
    document_path: PathBuf,
    config: BackupConfig,
    observer: Arc<dyn BackupObserver>,
    state: Mutex<ManagerState>,
    /// Bumped by every change that triggers a backup
    changes: AtomicU64,
    /// Value of `changes` covered by the latest backup
    backed_up: AtomicU64,
    /// Held for the whole of every write for this document
    write_lock: Mutex<()>,
    last_backup: Mutex<Option<PathBuf>>,
}

impl Shared {
    fn is_dirty(&self) -> bool {
        self.changes.load(Ordering::SeqCst) != self.backed_up.load(Ordering::SeqCst)
    }

    /// Count a change; false if it must not reach the worker
    fn record_change(&self, event: ChangeEvent) -> bool {
        if *self.state.lock() != ManagerState::Running {
            trace!("Ignoring {:?}: manager is not running", event);
            return false;
        }
        if !event.triggers_backup() {
            trace!("Ignoring filtered {:?}", event);
            return false;
        }
        self.changes.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Write a new backup into `backup_dir` unless the content is unchanged
    fn snapshot_into(&self, backup_dir: &Path) -> Result<BackupOutcome> {
        let guard = self.write_lock.lock();
        let generation = self.changes.load(Ordering::SeqCst);
        let content = self.document.content()?;

        if !content_differs_from_latest_backup(&content, &self.document_path, backup_dir)? {
            debug!("Content of {:?} unchanged since last backup", self.document_path);
            self.backed_up.store(generation, Ordering::SeqCst);
            return Ok(BackupOutcome::Unchanged);
        }

        let path = write_content_as_new_backup(&self.document_path, backup_dir, &content)?;
        self.after_write(&path, backup_dir, generation);
        drop(guard);

        self.observer.on_backup_written(&self.document_path, &path);
        Ok(BackupOutcome::Written(path))
    }

    /// Write the current content to `path`, whatever the dirty flag says
    fn write_to(&self, path: &Path) -> Result<()> {
        let guard = self.write_lock.lock();
        let generation = self.changes.load(Ordering::SeqCst);
        let content = self.document.content()?;
        write_backup_to(path, &content)?;

        let backup_dir = path.parent().unwrap_or_else(|| Path::new("."));
        self.after_write(path, backup_dir, generation);
        drop(guard);

        self.observer.on_backup_written(&self.document_path, path);
        Ok(())
    }

    /// Bookkeeping for a published backup; runs under the write lock
    fn after_write(&self, path: &Path, backup_dir: &Path, generation: u64) {
        self.backed_up.store(generation, Ordering::SeqCst);
        *self.last_backup.lock() = Some(path.to_path_buf());

        if let Some(keep) = self.config.max_backups {
            match prune_backups(&self.document_path, backup_dir, keep) {
                Ok(removed) if !removed.is_empty() => {
                    debug!("Pruned {} old backups of {:?}", removed.len(), self.document_path)
                }
                Ok(_) => {}
                Err(e) => warn!("Pruning backups of {:?} failed: {}", self.document_path, e),
            }
        }
    }
}

/// Cloneable handle the document layer uses to report changes
///
/// Sending never blocks and never performs I/O. Notifications sent after the
/// manager has shut down are dropped.
#[derive(Clone)]
pub struct ChangeSender {
    shared: Arc<Shared>,
    sender: Sender<WorkerMessage>,
}

impl ChangeSender {
    /// Report a change of the document
    pub fn notify(&self, event: ChangeEvent) {
        if !self.shared.record_change(event) {
            return;
        }
        if self.sender.send(WorkerMessage::Changed).is_err() {
            trace!("Backup worker for {:?} is gone", self.shared.document_path);
        }
    }
}

impl std::fmt::Debug for ChangeSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSender")
            .field("document", &self.shared.document_path)
            .finish()
    }
}

/// The background worker of one manager
struct Worker {
    shared: Arc<Shared>,
    receiver: Receiver<WorkerMessage>,
}

impl Worker {
    fn run(self) {
        debug!("Backup worker for {:?} started", self.shared.document_path);
        let debounce = self.shared.config.debounce();
        let mut deadline: Option<Instant> = None;

        loop {
            let message = match deadline {
                None => self.receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
                Some(at) => self
                    .receiver
                    .recv_timeout(at.saturating_duration_since(Instant::now())),
            };

            match message {
                Ok(WorkerMessage::Changed) => {
                    if deadline.is_none() && self.shared.config.backups_enabled {
                        trace!("Snapshot of {:?} scheduled in {:?}", self.shared.document_path, debounce);
                        deadline = Some(Instant::now() + debounce);
                    }
                }
                Ok(WorkerMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    deadline = None;
                    if self.snapshot() {
                        deadline = Some(Instant::now() + debounce);
                    }
                }
            }
        }

        debug!("Backup worker for {:?} stopped", self.shared.document_path);
    }

    /// Run one background snapshot; true if another one is needed
    fn snapshot(&self) -> bool {
        let backup_dir = &self.shared.config.backup_directory;
        match self.shared.snapshot_into(backup_dir) {
            Ok(outcome) => {
                trace!("Background snapshot of {:?}: {:?}", self.shared.document_path, outcome);
                self.shared.is_dirty()
            }
            Err(e) => {
                warn!("Background backup of {:?} failed: {}", self.shared.document_path, e);
                self.shared.observer.on_backup_failed(&self.shared.document_path, &e);
                false
            }
        }
    }
}

/// Automatic backups for one open document
///
/// # Examples
///
/// ```rust,no_run
/// use bakstash::{BackupConfig, BackupManager, ChangeEvent, ChangeKind, DocumentHandle, MemoryDocument};
/// use std::path::Path;
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let content = Arc::new(MemoryDocument::new("@Article{a,}"));
/// let document = DocumentHandle::saved("/home/user/refs.bib", content.clone());
/// let config = BackupConfig::with_directory("/home/user/.backups");
///
/// let manager = BackupManager::start(document, config)?;
///
/// // Called by the document layer on every edit
/// content.set("@Article{a, title = {Edited}}");
/// manager.listen(ChangeEvent::new(ChangeKind::Entries));
///
/// // On close: flush synchronously and stop the worker
/// manager.shutdown(Path::new("/home/user/.backups"), true)?;
/// # Ok(())
/// # }
/// ```
pub struct BackupManager {
    shared: Arc<Shared>,
    sender: Sender<WorkerMessage>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BackupManager {
    /// Start backing up `document`
    ///
    /// Spawns the worker thread and returns a running manager. The backup
    /// directory is not created until the first backup is written.
    ///
    /// # Errors
    ///
    /// - [`DocumentNotSaved`](crate::BackupError::DocumentNotSaved) if the document has no path; such
    ///   documents have no stable backup name
    /// - [`InvalidConfiguration`](crate::BackupError::InvalidConfiguration) for an unusable config
    /// - [`Io`](crate::BackupError::Io) if the worker thread cannot be spawned
    pub fn start(document: DocumentHandle, config: BackupConfig) -> Result<Self> {
        Self::start_with_observer(document, config, None)
    }

    /// Start backing up `document`, reporting results to `observer`
    #[instrument(skip_all, fields(path = ?document.path()))]
    pub fn start_with_observer(
        document: DocumentHandle,
        config: BackupConfig,
        observer: Option<Arc<dyn BackupObserver>>,
    ) -> Result<Self> {
        config.validate()?;
        let document_path = document.require_path()?.to_path_buf();

        let shared = Arc::new(Shared {
            document,
            document_path: document_path.clone(),
            config,
            observer: observer.unwrap_or_else(|| Arc::new(NoOpObserver)),
            state: Mutex::new(ManagerState::Running),
            changes: AtomicU64::new(0),
            backed_up: AtomicU64::new(0),
            write_lock: Mutex::new(()),
            last_backup: Mutex::new(None),
        });

        let (sender, receiver) = mpsc::channel();
        let worker = Worker {
            shared: shared.clone(),
            receiver,
        };
        let handle = thread::Builder::new()
            .name(format!("bakstash-{}", identifier_for(&document_path)))
            .spawn(move || worker.run())?;

        info!(
            "Started backup manager for {:?} (enabled: {}, directory: {:?})",
            document_path, shared.config.backups_enabled, shared.config.backup_directory
        );

        Ok(Self {
            shared,
            sender,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Report a change of the document
    ///
    /// Returns immediately; the backup happens on the worker after the
    /// debounce delay.
    pub fn listen(&self, event: ChangeEvent) {
        self.change_sender().notify(event);
    }

    /// A handle the document layer can keep to report changes
    pub fn change_sender(&self) -> ChangeSender {
        ChangeSender {
            shared: self.shared.clone(),
            sender: self.sender.clone(),
        }
    }

    /// The path the next backup in `backup_dir` would be written to
    ///
    /// Nothing is written. The path is free at the time of the call and sorts
    /// after every existing backup of this document.
    pub fn determine_backup_path_for_new_backup(&self, backup_dir: &Path) -> Option<PathBuf> {
        match next_backup_path(&self.shared.document_path, backup_dir) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Cannot inspect backup directory {:?}: {}", backup_dir, e);
                backup_path_for_new_backup(&self.shared.document_path, backup_dir)
            }
        }
    }

    /// Write the current content to `path` right now
    ///
    /// Writes regardless of the dirty flag, the policy and the latest backup's
    /// content. Fails with [`BackupExists`](crate::BackupError::BackupExists) rather than replacing
    /// an existing file.
    #[instrument(skip(self), fields(document = ?self.shared.document_path))]
    pub fn perform_backup(&self, path: &Path) -> Result<()> {
        let result = self.shared.write_to(path);
        if let Err(e) = &result {
            self.shared.observer.on_backup_failed(&self.shared.document_path, e);
        }
        result
    }

    /// Take a snapshot now into the configured directory, unless unchanged
    pub fn backup_now(&self) -> Result<BackupOutcome> {
        if !self.shared.config.backups_enabled {
            return Ok(BackupOutcome::Disabled);
        }
        self.shared.snapshot_into(&self.shared.config.backup_directory)
    }

    /// Whether the latest backup in the configured directory differs from the saved file
    pub fn backup_file_differs(&self) -> Result<bool> {
        backup_file_differs(&self.shared.document_path, &self.shared.config.backup_directory)
    }

    /// Stop the manager, flushing a final backup synchronously
    ///
    /// Cancels any pending snapshot, waits for a snapshot in progress to
    /// finish, and then, if `backups_enabled` and the document is dirty (or
    /// `force_final_backup` is set), writes one last backup into `backup_dir`
    /// before returning. With `backups_enabled == false` nothing is written
    /// and `backup_dir` is not created.
    ///
    /// Calling this on a manager that is not running is a no-op.
    ///
    /// # Returns
    ///
    /// The path of the final backup, if one was written.
    ///
    /// # Errors
    ///
    /// Any failure of the final write, so the host can warn the user before
    /// the document is discarded.
    #[instrument(skip(self), fields(document = ?self.shared.document_path))]
    pub fn shutdown(&self, backup_dir: &Path, backups_enabled: bool) -> Result<Option<PathBuf>> {
        {
            let mut state = self.shared.state.lock();
            if *state != ManagerState::Running {
                debug!("Shutdown requested but manager is {:?}", *state);
                return Ok(None);
            }
            *state = ManagerState::ShuttingDown;
        }

        self.stop_worker();

        let needs_flush =
            backups_enabled && (self.shared.is_dirty() || self.shared.config.force_final_backup);
        let result = if needs_flush {
            self.shared
                .snapshot_into(backup_dir)
                .map(|outcome| outcome.written_path().map(Path::to_path_buf))
        } else {
            Ok(None)
        };

        *self.shared.state.lock() = ManagerState::Stopped;

        match &result {
            Ok(Some(path)) => info!("Final backup of {:?} written to {:?}", self.shared.document_path, path),
            Ok(None) => info!("Stopped backup manager for {:?}", self.shared.document_path),
            Err(e) => error!("Final backup of {:?} failed: {}", self.shared.document_path, e),
        }
        result
    }

    /// Current lifecycle state
    pub fn state(&self) -> ManagerState {
        *self.shared.state.lock()
    }

    /// Whether changes have arrived that no backup covers yet
    pub fn is_dirty(&self) -> bool {
        self.shared.is_dirty()
    }

    /// The most recent backup this manager wrote
    pub fn last_backup(&self) -> Option<PathBuf> {
        self.shared.last_backup.lock().clone()
    }

    /// Path of the managed document
    pub fn document_path(&self) -> &Path {
        &self.shared.document_path
    }

    /// The configuration this manager was started with
    pub fn config(&self) -> &BackupConfig {
        &self.shared.config
    }

    /// The policy switches of this manager
    pub fn policy(&self) -> BackupPolicy {
        self.shared.config.policy()
    }

    fn stop_worker(&self) {
        // The worker may already be gone if it panicked
        let _ = self.sender.send(WorkerMessage::Shutdown);
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!("Backup worker for {:?} panicked", self.shared.document_path);
            }
        }
    }
}

impl std::fmt::Debug for BackupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupManager")
            .field("document", &self.shared.document_path)
            .field("state", &self.state())
            .field("dirty", &self.is_dirty())
            .field("config", &self.shared.config)
            .finish()
    }
}

impl Drop for BackupManager {
    fn drop(&mut self) {
        let was_running = {
            let mut state = self.shared.state.lock();
            let running = *state == ManagerState::Running;
            *state = ManagerState::Stopped;
            running
        };
        if was_running {
            warn!(
                "Backup manager for {:?} dropped without shutdown; pending changes are not flushed",
                self.shared.document_path
            );
        }
        self.stop_worker();
    }
}
