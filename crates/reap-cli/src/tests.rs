use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use pretty_assertions::assert_eq;
use reap_core::{Database, DatabaseOptions, FileRecord, MaintenanceConfig, LOCAL_DEVICE_ID};

use crate::commands::folders::{folder_summaries, format_summary_lines, FolderSummary};
use crate::commands::maintenance::run_maintenance;
use crate::config::{ReapConfig, CONFIG_FILE_NAME};
use crate::error::{CliError, EXIT_INTERRUPTED, EXIT_LOCK_CONFLICT, EXIT_STORAGE, EXIT_USAGE};
use crate::lock::{StoreLock, LOCK_FILE_NAME};
use crate::resolve_data_dir;

const RETENTION: Duration = Duration::from_secs(48 * 60 * 60);

fn retention(retention: Duration) -> DatabaseOptions {
    DatabaseOptions::default().with_delete_retention(retention)
}

fn hours_ago(hours: i64) -> chrono::DateTime<Utc> {
    Utc::now() - ChronoDuration::hours(hours)
}

fn seed(dir: &Path, folder: &str, files: &[FileRecord]) {
    let db = Database::open(dir, DatabaseOptions::default()).unwrap();
    db.update(folder, &LOCAL_DEVICE_ID, files).unwrap();
    db.close().unwrap();
}

fn exists(dir: &Path, folder: &str, name: &str) -> bool {
    let db = Database::open(dir, DatabaseOptions::default()).unwrap();
    let found = db
        .get_device_file(folder, &LOCAL_DEVICE_ID, name)
        .unwrap()
        .is_some();
    db.close().unwrap();
    found
}

#[tokio::test(flavor = "multi_thread")]
async fn maintenance_collects_expired_tombstones() {
    let dir = tempfile::tempdir().unwrap();
    seed(
        dir.path(),
        "test-folder",
        &[
            FileRecord::tombstone("old-deleted", hours_ago(49)),
            FileRecord::new("active-file").with_size(100),
        ],
    );

    run_maintenance(dir.path(), retention(RETENTION)).await.unwrap();

    assert!(!exists(dir.path(), "test-folder", "old-deleted"));
    assert!(exists(dir.path(), "test-folder", "active-file"));
}

#[tokio::test(flavor = "multi_thread")]
async fn maintenance_refuses_when_store_is_locked() {
    let dir = tempfile::tempdir().unwrap();
    seed(
        dir.path(),
        "test-folder",
        &[FileRecord::tombstone("old-deleted", hours_ago(49))],
    );

    let held = StoreLock::acquire(dir.path()).unwrap();
    let error = run_maintenance(dir.path(), retention(RETENTION)).await.unwrap_err();

    assert!(matches!(error, CliError::LockConflict(ref path) if path.ends_with(LOCK_FILE_NAME)));
    assert_eq!(error.exit_code(), EXIT_LOCK_CONFLICT);
    assert!(exists(dir.path(), "test-folder", "old-deleted"));
    drop(held);
}

#[test]
fn lock_is_released_on_drop() {
    let dir = tempfile::tempdir().unwrap();

    let first = StoreLock::acquire(dir.path()).unwrap();
    assert!(matches!(
        StoreLock::acquire(dir.path()),
        Err(CliError::LockConflict(_))
    ));
    drop(first);

    assert!(StoreLock::acquire(dir.path()).is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn maintenance_honours_delete_retention() {
    let dir = tempfile::tempdir().unwrap();
    seed(
        dir.path(),
        "test-folder",
        &[
            FileRecord::tombstone("very-old-deleted", hours_ago(50)),
            FileRecord::tombstone("recent-deleted", hours_ago(24)),
        ],
    );

    run_maintenance(dir.path(), retention(RETENTION)).await.unwrap();

    assert!(!exists(dir.path(), "test-folder", "very-old-deleted"));
    assert!(exists(dir.path(), "test-folder", "recent-deleted"));
}

#[tokio::test(flavor = "multi_thread")]
async fn maintenance_with_zero_retention_keeps_everything() {
    let dir = tempfile::tempdir().unwrap();
    seed(
        dir.path(),
        "test-folder",
        &[FileRecord::tombstone("ancient", hours_ago(24 * 365))],
    );

    run_maintenance(dir.path(), retention(Duration::ZERO)).await.unwrap();

    assert!(exists(dir.path(), "test-folder", "ancient"));
}

#[tokio::test(flavor = "multi_thread")]
async fn maintenance_on_empty_store_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    Database::open(dir.path(), DatabaseOptions::default())
        .unwrap()
        .close()
        .unwrap();

    run_maintenance(dir.path(), retention(RETENTION)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn maintenance_on_missing_store_creates_it() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("nested").join("store");

    run_maintenance(&store, retention(RETENTION)).await.unwrap();

    assert!(store.join(LOCK_FILE_NAME).exists());
    assert_eq!(folder_summaries(&store).unwrap(), Vec::new());
}

#[tokio::test(flavor = "multi_thread")]
async fn maintenance_processes_all_folders() {
    let dir = tempfile::tempdir().unwrap();
    let folders = ["folder1", "folder2", "folder3"];
    for folder in folders {
        seed(
            dir.path(),
            folder,
            &[
                FileRecord::tombstone("old-deleted", hours_ago(49)),
                FileRecord::new("active-file"),
            ],
        );
    }

    run_maintenance(dir.path(), retention(RETENTION)).await.unwrap();

    for folder in folders {
        assert!(
            !exists(dir.path(), folder, "old-deleted"),
            "old-deleted in {folder} should have been collected"
        );
        assert!(exists(dir.path(), folder, "active-file"));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn folder_summaries_report_counts_and_watermark() {
    let dir = tempfile::tempdir().unwrap();
    seed(
        dir.path(),
        "photos",
        &[
            FileRecord::tombstone("old-deleted", hours_ago(49)),
            FileRecord::tombstone("recent-deleted", hours_ago(1)),
            FileRecord::new("active-file"),
        ],
    );

    let before = folder_summaries(dir.path()).unwrap();
    assert_eq!(
        before,
        vec![FolderSummary {
            folder: "photos".to_string(),
            database: dir.path().join("folder.0001.db"),
            files: 3,
            tombstones: 2,
            top_sequence: 3,
            last_gc_sequence: None,
        }]
    );

    run_maintenance(dir.path(), retention(RETENTION)).await.unwrap();

    let after = folder_summaries(dir.path()).unwrap();
    assert_eq!(
        after,
        vec![FolderSummary {
            folder: "photos".to_string(),
            database: dir.path().join("folder.0001.db"),
            files: 2,
            tombstones: 1,
            top_sequence: 3,
            last_gc_sequence: Some(3),
        }]
    );
    assert_eq!(
        format_summary_lines(&after),
        vec!["photos  files=2 tombstones=1 seq=3 last-gc=3".to_string()]
    );
}

#[test]
fn format_summary_lines_handles_empty_store() {
    assert_eq!(format_summary_lines(&[]), vec!["No folders".to_string()]);
}

#[test]
fn format_summary_lines_marks_unmaintained_folders() {
    let lines = format_summary_lines(&[FolderSummary {
        folder: "docs".to_string(),
        database: PathBuf::from("folder.0001.db"),
        files: 1,
        tombstones: 0,
        top_sequence: 1,
        last_gc_sequence: None,
    }]);
    assert_eq!(lines, vec!["docs  files=1 tombstones=0 seq=1 last-gc=never"]);
}

#[test]
fn resolve_data_dir_prefers_explicit_path() {
    let explicit = PathBuf::from("/tmp/reap-explicit");
    assert_eq!(resolve_data_dir(Some(explicit.clone())).unwrap(), explicit);
}

#[test]
fn folder_summaries_refuse_when_store_is_locked() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path(), "docs", &[FileRecord::new("a")]);

    let held = StoreLock::acquire(dir.path()).unwrap();
    let error = folder_summaries(dir.path()).unwrap_err();

    assert!(matches!(error, CliError::LockConflict(_)));
    assert_eq!(error.exit_code(), EXIT_LOCK_CONFLICT);
    drop(held);
    assert_eq!(folder_summaries(dir.path()).unwrap().len(), 1);
}

#[test]
fn exit_codes_distinguish_failure_kinds() {
    assert_eq!(
        CliError::LockConflict(PathBuf::from("reap.lock")).exit_code(),
        EXIT_LOCK_CONFLICT
    );
    assert_eq!(
        CliError::Core(reap_core::Error::Database("corrupt".into())).exit_code(),
        EXIT_STORAGE
    );
    assert_eq!(
        CliError::Io(std::io::Error::other("disk")).exit_code(),
        EXIT_STORAGE
    );
    assert_eq!(CliError::Config("bad".into()).exit_code(), EXIT_USAGE);
    assert_eq!(
        CliError::Core(reap_core::Error::InvalidInput("fanout".into())).exit_code(),
        EXIT_USAGE
    );
    assert_eq!(
        CliError::Core(reap_core::Error::Cancelled).exit_code(),
        EXIT_INTERRUPTED
    );
}

#[test]
fn config_defaults_when_no_file_exists() {
    let dir = tempfile::tempdir().unwrap();
    let config = ReapConfig::load(None, dir.path()).unwrap();
    assert_eq!(config, ReapConfig::default());
    assert!(!config.store_options(None).gc_enabled());
}

#[test]
fn config_is_read_from_data_dir_and_flags_override_it() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        serde_json::json!({
            "store": {"delete_retention": 172_800, "gc_fanout": 4},
            "maintenance": {"interval": 60}
        })
        .to_string(),
    )
    .unwrap();

    let config = ReapConfig::load(None, dir.path()).unwrap();
    assert_eq!(config.store_options(None), retention(RETENTION).with_gc_fanout(4));
    assert_eq!(
        config.store_options(Some(Duration::ZERO)),
        retention(Duration::ZERO).with_gc_fanout(4)
    );
    assert_eq!(
        config.maintenance_config(None),
        MaintenanceConfig::new(Duration::from_secs(60))
    );
    assert_eq!(
        config.maintenance_config(Some(Duration::from_secs(5))).interval,
        Duration::from_secs(5)
    );
}

#[test]
fn config_errors_are_usage_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.json");
    std::fs::write(&path, r#"{"store": {"retention": 1}}"#).unwrap();

    let error = ReapConfig::load(Some(&path), dir.path()).unwrap_err();
    assert!(matches!(error, CliError::Config(ref message) if message.contains("custom.json")));
    assert_eq!(error.exit_code(), EXIT_USAGE);

    let missing = ReapConfig::load(Some(&dir.path().join("absent.json")), dir.path());
    assert!(matches!(missing, Err(CliError::Config(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn maintenance_uses_retention_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    seed(
        dir.path(),
        "test-folder",
        &[FileRecord::tombstone("old-deleted", hours_ago(49))],
    );
    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        r#"{"store": {"delete_retention": 172800}}"#,
    )
    .unwrap();

    let config = ReapConfig::load(None, dir.path()).unwrap();
    run_maintenance(dir.path(), config.store_options(None))
        .await
        .unwrap();

    assert!(!exists(dir.path(), "test-folder", "old-deleted"));
}

#[test]
fn cli_parses_human_durations() {
    use clap::Parser;

    use crate::cli::{Cli, Commands};

    let cli = Cli::parse_from([
        "reap",
        "--data-dir",
        "/tmp/x",
        "maintenance",
        "--delete-retention",
        "48h",
    ]);
    assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
    assert!(matches!(
        cli.command,
        Commands::Maintenance { delete_retention } if delete_retention == Some(RETENTION)
    ));

    let cli = Cli::parse_from(["reap", "serve", "--config", "/tmp/reap.json"]);
    assert_eq!(cli.config, Some(PathBuf::from("/tmp/reap.json")));
    assert!(matches!(
        cli.command,
        Commands::Serve {
            interval: None,
            delete_retention: None
        }
    ));

    assert!(Cli::try_parse_from(["reap", "maintenance", "--delete-retention", "soon"]).is_err());
}
