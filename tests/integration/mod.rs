//! Integration tests for bakstash
//!
//! Exercise the public API end to end: the diff predicates against real
//! backup directories, and full manager lifecycles with real worker threads.

use ::bakstash::naming::{BackupRecord, BackupTimestamp};
use ::bakstash::*;
use chrono::{Duration as ChronoDuration, Local};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// A saved document plus a backup directory inside one temp dir
pub struct BackupFixture {
    pub temp_dir: TempDir,
    pub document: PathBuf,
    pub backup_dir: PathBuf,
}

impl BackupFixture {
    /// Create a fixture whose document is saved with `content`
    pub fn new(content: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let document = temp_dir.path().join("test.bib");
        let backup_dir = temp_dir.path().join("backups");
        fs::write(&document, content).unwrap();
        Self {
            temp_dir,
            document,
            backup_dir,
        }
    }

    /// Write a backup of the document with a timestamp `age` in the past
    pub fn backup_aged(&self, age: ChronoDuration, content: &str) -> PathBuf {
        let time = Local::now().naive_local() - age;
        self.backup_at(BackupTimestamp::new(time, 0), content)
    }

    /// Write a backup of the document with an exact timestamp
    pub fn backup_at(&self, timestamp: BackupTimestamp, content: &str) -> PathBuf {
        fs::create_dir_all(&self.backup_dir).unwrap();
        let record = BackupRecord::for_document(&self.document, timestamp).unwrap();
        let path = self.backup_dir.join(record.file_name());
        fs::write(&path, content).unwrap();
        path
    }

    /// File names in the backup directory, sorted
    pub fn sorted_backup_names(&self) -> Vec<String> {
        let mut names: Vec<String> = match fs::read_dir(&self.backup_dir) {
            Ok(read_dir) => read_dir
                .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    /// Config for this fixture's backup directory
    pub fn config(&self, debounce: Duration) -> BackupConfig {
        BackupManagerBuilder::new()
            .backup_directory(&self.backup_dir)
            .debounce(debounce)
            .config()
            .clone()
    }
}

/// Observer that records everything it is told
#[derive(Default)]
pub struct RecordingObserver {
    pub written: Mutex<Vec<PathBuf>>,
    pub failures: AtomicUsize,
}

impl BackupObserver for RecordingObserver {
    fn on_backup_written(&self, _document: &Path, backup: &Path) {
        self.written.lock().push(backup.to_path_buf());
    }

    fn on_backup_failed(&self, _document: &Path, _error: &BackupError) {
        self.failures.fetch_add(1, Ordering::SeqCst);
    }
}

/// Content provider whose first serialization is slow
pub struct SlowDocument {
    pub content: MemoryDocument,
    pub in_progress: AtomicBool,
    pub delay: Duration,
    calls: AtomicUsize,
}

impl SlowDocument {
    pub fn new(content: &str, delay: Duration) -> Self {
        Self {
            content: MemoryDocument::new(content),
            in_progress: AtomicBool::new(false),
            delay,
            calls: AtomicUsize::new(0),
        }
    }
}

impl ContentProvider for SlowDocument {
    fn serialize(&self) -> Result<Vec<u8>> {
        let snapshot = self.content.serialize()?;
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.in_progress.store(true, Ordering::SeqCst);
            thread::sleep(self.delay);
        }
        Ok(snapshot)
    }
}

/// Poll `condition` for up to ten seconds
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use bakstash::diff::backup_file_differs;
    use bakstash::writer::write_backup;
    use filetime::FileTime;
    use std::time::SystemTime;
    use tracing_test::traced_test;

    #[test]
    fn test_backup_file_differs_without_backup() {
        let fixture = BackupFixture::new("@Article{a,}");

        // Absent directory
        assert!(backup_file_differs(&fixture.document, &fixture.backup_dir).unwrap());

        // Empty directory
        fs::create_dir_all(&fixture.backup_dir).unwrap();
        assert!(backup_file_differs(&fixture.document, &fixture.backup_dir).unwrap());
    }

    #[test]
    fn test_identical_backup_does_not_differ() {
        let fixture = BackupFixture::new("@Article{a,}\n");
        fixture.backup_aged(ChronoDuration::zero(), "@Article{a,}\n");

        assert!(!backup_file_differs(&fixture.document, &fixture.backup_dir).unwrap());
    }

    #[test]
    fn test_line_endings_do_not_count_as_change() {
        let fixture = BackupFixture::new("@Article{a,}\r\n@Book{b,}\r\n");
        fixture.backup_aged(ChronoDuration::zero(), "@Article{a,}\n@Book{b,}\n");

        assert!(!backup_file_differs(&fixture.document, &fixture.backup_dir).unwrap());
    }

    #[test]
    fn test_most_recent_backup_wins_over_ten_decoys() {
        let fixture = BackupFixture::new("@Article{current,}");

        for i in 1..=10 {
            fixture.backup_aged(
                ChronoDuration::minutes(i),
                &format!("@Article{{decoy{},}}", i),
            );
        }
        let current = fixture.backup_aged(ChronoDuration::zero(), "@Article{current,}");

        assert_eq!(
            most_recent_backup(&fixture.document, &fixture.backup_dir).unwrap(),
            Some(current)
        );
        assert!(!backup_file_differs(&fixture.document, &fixture.backup_dir).unwrap());
    }

    #[test]
    fn test_newer_differing_backup_differs() {
        let fixture = BackupFixture::new("@Article{saved,}");
        let hour_ago = SystemTime::now() - Duration::from_secs(3600);
        filetime::set_file_mtime(&fixture.document, FileTime::from_system_time(hour_ago)).unwrap();

        fixture.backup_aged(ChronoDuration::minutes(5), "@Article{saved,}");
        fixture.backup_aged(ChronoDuration::zero(), "@Article{unsaved work,}");

        assert!(backup_file_differs(&fixture.document, &fixture.backup_dir).unwrap());
    }

    #[test]
    fn test_artificially_aged_backup_is_older() {
        let fixture = BackupFixture::new("@Article{saved,}");
        let backup = fixture.backup_aged(ChronoDuration::zero(), "@Article{something else,}");

        filetime::set_file_mtime(&backup, FileTime::from_unix_time(0, 0)).unwrap();
        assert!(!backup_file_differs(&fixture.document, &fixture.backup_dir).unwrap());

        // The same backup, correctly dated, holds newer work
        filetime::set_file_mtime(&backup, FileTime::now()).unwrap();
        let hour_ago = SystemTime::now() - Duration::from_secs(3600);
        filetime::set_file_mtime(&fixture.document, FileTime::from_system_time(hour_ago)).unwrap();
        assert!(backup_file_differs(&fixture.document, &fixture.backup_dir).unwrap());
    }

    #[test]
    fn test_directory_creation_is_idempotent() {
        let fixture = BackupFixture::new("@Article{a,}");
        let backup_dir = fixture.backup_dir.join("nested").join("deeper");
        let document = FileDocument::new(&fixture.document).handle();

        let first = write_backup(&document, &backup_dir).unwrap();
        let second = write_backup(&document, &backup_dir).unwrap();

        assert_ne!(first, second);
        assert!(first.exists());
        assert!(second.exists());
    }

    #[test]
    #[traced_test]
    fn test_disabled_policy_writes_nothing() {
        let fixture = BackupFixture::new("@Article{a,}");
        let content = Arc::new(MemoryDocument::new("@Article{a, edited}"));
        let manager = BackupManagerBuilder::from_config(fixture.config(Duration::from_millis(10)))
            .backups_enabled(false)
            .start(DocumentHandle::saved(&fixture.document, content))
            .unwrap();

        manager.listen(ChangeEvent::new(ChangeKind::Entries));
        thread::sleep(Duration::from_millis(100));
        assert_eq!(manager.shutdown(&fixture.backup_dir, false).unwrap(), None);

        assert!(!fixture.backup_dir.exists());
        assert!(fixture.sorted_backup_names().is_empty());
    }

    #[test]
    #[traced_test]
    fn test_enabled_policy_writes_in_order() {
        let fixture = BackupFixture::new("@Article{a,}");
        let content = Arc::new(MemoryDocument::new("@Article{a,}"));
        let manager = BackupManager::start(
            DocumentHandle::saved(&fixture.document, content.clone()),
            fixture.config(Duration::from_secs(60)),
        )
        .unwrap();

        manager.listen(ChangeEvent::new(ChangeKind::Entries));
        let first = manager
            .determine_backup_path_for_new_backup(&fixture.backup_dir)
            .unwrap();
        manager.perform_backup(&first).unwrap();

        content.set("@Article{a, title = {Second}}");
        manager.listen(ChangeEvent::new(ChangeKind::MetaData));
        manager.shutdown(&fixture.backup_dir, true).unwrap();

        let names = fixture.sorted_backup_names();
        assert!(!names.is_empty());
        assert_eq!(fixture.backup_dir.join(&names[0]), first);
        assert_eq!(names.len(), 2);
    }

    #[test]
    #[traced_test]
    fn test_debounce_coalesces_burst_into_one_backup() {
        let fixture = BackupFixture::new("");
        let content = Arc::new(MemoryDocument::new(""));
        let observer = Arc::new(RecordingObserver::default());
        let manager = BackupManagerBuilder::from_config(fixture.config(Duration::from_millis(400)))
            .observer(observer.clone())
            .start(DocumentHandle::saved(&fixture.document, content.clone()))
            .unwrap();

        let sender = manager.change_sender();
        for i in 0..100 {
            content.set(format!("@Article{{k{},}}", i));
            sender.notify(ChangeEvent::new(ChangeKind::Entries));
        }

        assert!(wait_for(|| observer.written.lock().len() == 1));
        assert!(!manager.is_dirty());
        thread::sleep(Duration::from_millis(500));
        assert_eq!(observer.written.lock().len(), 1);

        let written = observer.written.lock()[0].clone();
        assert_eq!(fs::read_to_string(written).unwrap(), "@Article{k99,}");
        manager.shutdown(&fixture.backup_dir, true).unwrap();
    }

    #[test]
    #[traced_test]
    fn test_change_during_write_is_not_lost() {
        let fixture = BackupFixture::new("");
        let slow = Arc::new(SlowDocument::new("v1", Duration::from_millis(300)));
        let manager = BackupManager::start(
            DocumentHandle::saved(&fixture.document, slow.clone()),
            fixture.config(Duration::from_millis(20)),
        )
        .unwrap();

        manager.listen(ChangeEvent::new(ChangeKind::Entries));
        assert!(wait_for(|| slow.in_progress.load(Ordering::SeqCst)));

        // The first snapshot already captured "v1"
        slow.content.set("v2");
        manager.listen(ChangeEvent::new(ChangeKind::Entries));

        assert!(wait_for(|| {
            !manager.is_dirty() && list_backups(&fixture.document, &fixture.backup_dir).unwrap().len() == 2
        }));
        let latest = most_recent_backup(&fixture.document, &fixture.backup_dir).unwrap().unwrap();
        assert_eq!(fs::read_to_string(latest).unwrap(), "v2");

        manager.shutdown(&fixture.backup_dir, true).unwrap();
    }

    #[test]
    #[traced_test]
    fn test_shutdown_waits_for_write_in_progress() {
        let fixture = BackupFixture::new("");
        let slow = Arc::new(SlowDocument::new("only", Duration::from_millis(300)));
        let manager = BackupManager::start(
            DocumentHandle::saved(&fixture.document, slow.clone()),
            fixture.config(Duration::ZERO),
        )
        .unwrap();

        manager.listen(ChangeEvent::new(ChangeKind::Entries));
        assert!(wait_for(|| slow.in_progress.load(Ordering::SeqCst)));

        // The in-flight snapshot completes; nothing is left to flush
        assert_eq!(manager.shutdown(&fixture.backup_dir, true).unwrap(), None);
        assert_eq!(list_backups(&fixture.document, &fixture.backup_dir).unwrap().len(), 1);
        assert_eq!(manager.state(), ManagerState::Stopped);
    }

    #[test]
    #[traced_test]
    fn test_background_failure_is_reported_and_not_fatal() {
        let fixture = BackupFixture::new("");
        // A file where the backup directory should be
        fs::write(&fixture.backup_dir, b"not a directory").unwrap();

        let observer = Arc::new(RecordingObserver::default());
        let content = Arc::new(MemoryDocument::new("@Article{a,}"));
        let manager = BackupManagerBuilder::from_config(fixture.config(Duration::from_millis(10)))
            .observer(observer.clone())
            .start(DocumentHandle::saved(&fixture.document, content))
            .unwrap();

        manager.listen(ChangeEvent::new(ChangeKind::Entries));
        assert!(wait_for(|| observer.failures.load(Ordering::SeqCst) >= 1));
        assert_eq!(manager.state(), ManagerState::Running);
        assert!(manager.is_dirty());

        // The final flush reports its failure to the caller
        let result = manager.shutdown(&fixture.backup_dir, true);
        assert!(result.is_err());
        assert!(result.unwrap_err().is_recoverable());
        assert_eq!(manager.state(), ManagerState::Stopped);

        // Flushing to a usable directory works
        let other = fixture.temp_dir.path().join("other");
        let manager = BackupManager::start(
            DocumentHandle::saved(&fixture.document, Arc::new(MemoryDocument::new("x"))),
            fixture.config(Duration::from_secs(60)),
        )
        .unwrap();
        manager.listen(ChangeEvent::new(ChangeKind::Entries));
        assert!(manager.shutdown(&other, true).unwrap().is_some());
    }

    #[test]
    #[traced_test]
    fn test_force_final_backup() {
        let fixture = BackupFixture::new("@Article{a,}");
        let content = Arc::new(MemoryDocument::new("@Article{a, unsaved}"));
        let manager = BackupManagerBuilder::from_config(fixture.config(Duration::from_secs(60)))
            .force_final_backup(true)
            .start(DocumentHandle::saved(&fixture.document, content))
            .unwrap();

        // No change was reported, but the close still protects the content
        let written = manager.shutdown(&fixture.backup_dir, true).unwrap();
        assert!(written.is_some());
    }

    #[test]
    #[traced_test]
    fn test_documents_back_up_independently() {
        let temp_dir = TempDir::new().unwrap();
        let backup_dir = temp_dir.path().join("backups");
        let registry = BackupRegistry::new();

        // Same file name in two directories
        let paths: Vec<PathBuf> = ["one", "two"]
            .iter()
            .map(|dir| {
                let dir = temp_dir.path().join(dir);
                fs::create_dir_all(&dir).unwrap();
                dir.join("refs.bib")
            })
            .collect();

        for (i, path) in paths.iter().enumerate() {
            let content = Arc::new(MemoryDocument::new(format!("document {}", i)));
            let config = BackupConfig {
                debounce_ms: 10,
                ..BackupConfig::with_directory(&backup_dir)
            };
            let manager = registry.start(DocumentHandle::saved(path, content), config).unwrap();
            manager.listen(ChangeEvent::new(ChangeKind::Entries));
        }

        assert!(wait_for(|| paths.iter().all(|p| !registry.get(p).unwrap().is_dirty())));
        assert!(registry.shutdown_all().is_empty());

        for (i, path) in paths.iter().enumerate() {
            let backups = list_backups(path, &backup_dir).unwrap();
            assert_eq!(backups.len(), 1);
            assert_eq!(
                fs::read_to_string(&backups[0].path).unwrap(),
                format!("document {}", i)
            );
        }
        assert_ne!(identifier_for(&paths[0]), identifier_for(&paths[1]));
    }
}
