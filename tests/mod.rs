//! Main test module for bakstash
//!
//! This module includes all test suites:
//! - Integration tests for the diff predicates and manager lifecycles
//! - Property-based tests for naming and selection invariants
//! - Edge cases around unusual names and shared backup directories

pub mod integration;

#[cfg(test)]
mod edge_cases {
    use ::bakstash::naming::{BackupRecord, BackupTimestamp};
    use ::bakstash::writer::{prune_backups, restore_latest_backup, write_backup};
    use ::bakstash::*;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_foreign_files_are_ignored_and_kept() {
        let temp_dir = TempDir::new().unwrap();
        let document = temp_dir.path().join("refs.bib");
        let backup_dir = temp_dir.path().join("backups");
        fs::create_dir_all(&backup_dir).unwrap();

        let foreign = [
            "notes.txt",
            "refs.bib.bak",
            "zzzzzzzz--refs.bib--2020-02-03--00.00.01.bak",
            "ABCDEF12--refs.bib--2020-02-03--00.00.01.bak",
            "0123abcd--refs.bib--2020-2-3--0.0.1.bak",
            "0123abcd--refs.bib--2020-02-03--00.00.01_0.bak",
            "0123abcd--refs.bib--2020-02-03--00.00.01_000.bak",
            "0123abcd--refs.bib--2020-02-03--00.00.01_7.bak",
        ];
        for name in &foreign {
            fs::write(backup_dir.join(name), "foreign").unwrap();
        }
        fs::create_dir_all(backup_dir.join("subdir.bak")).unwrap();

        assert!(list_backups(&document, &backup_dir).unwrap().is_empty());

        let handle = DocumentHandle::saved(&document, Arc::new(MemoryDocument::new("mine")));
        for _ in 0..3 {
            write_backup(&handle, &backup_dir).unwrap();
        }
        prune_backups(&document, &backup_dir, 1).unwrap();

        assert_eq!(list_backups(&document, &backup_dir).unwrap().len(), 1);
        for name in &foreign {
            assert!(backup_dir.join(name).exists(), "{} was touched", name);
        }
    }

    #[test]
    fn test_same_file_name_in_different_directories() {
        let temp_dir = TempDir::new().unwrap();
        let backup_dir = temp_dir.path().join("backups");
        let a = temp_dir.path().join("a").join("refs.bib");
        let b = temp_dir.path().join("b").join("refs.bib");

        write_backup(&DocumentHandle::saved(&a, Arc::new(MemoryDocument::new("a"))), &backup_dir).unwrap();

        assert!(most_recent_backup(&b, &backup_dir).unwrap().is_none());
        assert!(most_recent_backup(&a, &backup_dir).unwrap().is_some());
    }

    #[test]
    fn test_special_base_names() {
        let temp_dir = TempDir::new().unwrap();
        let backup_dir = temp_dir.path().join("backups");

        let names = [
            "my--refs.bib",
            "file with spaces.bib",
            "under_score_1",
            "ends-with-dash-",
            "библиография.bib",
            "文献.bib",
        ];

        for name in &names {
            let document = temp_dir.path().join(name);
            let handle = DocumentHandle::saved(&document, Arc::new(MemoryDocument::new(*name)));
            let written = match write_backup(&handle, &backup_dir) {
                Ok(path) => path,
                // Skip if the file system does not support this name
                Err(_) => continue,
            };

            let found = most_recent_backup(&document, &backup_dir).unwrap();
            assert_eq!(found, Some(written), "backup of {:?} not found", name);
        }
    }

    #[test]
    fn test_counter_backups_sort_after_plain_backup() {
        let temp_dir = TempDir::new().unwrap();
        let document = temp_dir.path().join("refs.bib");
        let backup_dir = temp_dir.path().join("backups");
        fs::create_dir_all(&backup_dir).unwrap();

        let plain = BackupTimestamp::now();
        for (timestamp, content) in [(plain, "first"), (plain.next_in_same_second().unwrap(), "second")] {
            let record = BackupRecord::for_document(&document, timestamp).unwrap();
            fs::write(backup_dir.join(record.file_name()), content).unwrap();
        }

        let latest = most_recent_backup(&document, &backup_dir).unwrap().unwrap();
        assert_eq!(fs::read_to_string(latest).unwrap(), "second");
    }

    #[test]
    fn test_restore_into_missing_document() {
        let temp_dir = TempDir::new().unwrap();
        let document = temp_dir.path().join("gone").join("refs.bib");
        let backup_dir = temp_dir.path().join("backups");

        let handle = DocumentHandle::saved(&document, Arc::new(MemoryDocument::new("recovered")));
        let backup = write_backup(&handle, &backup_dir).unwrap();

        assert_eq!(restore_latest_backup(&document, &backup_dir).unwrap(), Some(backup));
        assert_eq!(fs::read_to_string(&document).unwrap(), "recovered");
    }

    #[test]
    fn test_empty_unsaved_content_needs_no_backup() {
        let temp_dir = TempDir::new().unwrap();
        let document = temp_dir.path().join("new.bib");
        let backup_dir = temp_dir.path().join("backups");

        let manager = BackupManager::start(
            DocumentHandle::saved(&document, Arc::new(MemoryDocument::default())),
            BackupConfig::with_directory(&backup_dir),
        )
        .unwrap();
        manager.listen(ChangeEvent::new(ChangeKind::Other));

        assert_eq!(manager.shutdown(&backup_dir, true).unwrap(), None);
        assert!(!backup_dir.exists());
    }

    #[test]
    fn test_config_file_drives_manager() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("backup.json");
        let backup_dir = temp_dir.path().join("backups");

        BackupConfig {
            max_backups: Some(1),
            ..BackupConfig::with_directory(&backup_dir)
        }
        .save(&config_path)
        .unwrap();

        let content = Arc::new(MemoryDocument::new("one"));
        let document = temp_dir.path().join("refs.bib");
        let manager = BackupManager::start(
            DocumentHandle::saved(&document, content.clone()),
            BackupConfig::load(&config_path).unwrap(),
        )
        .unwrap();

        manager.backup_now().unwrap();
        content.set("two");
        manager.backup_now().unwrap();
        manager.shutdown(&backup_dir, true).unwrap();

        let backups = list_backups(&document, &backup_dir).unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read_to_string(&backups[0].path).unwrap(), "two");
    }
}
