//! Backup scheduler integration tests.

use std::collections::BTreeSet;
use std::fs;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use cellardb::{
    backup, BackupConfig, BackupManager, Condition, Database, Record, SnapshotFormat,
    SnapshotKind, TableOptions,
};

fn database() -> Arc<Database> {
    let db = Arc::new(Database::new());
    db.create_table("notes", TableOptions::new()).expect("create");
    db
}

fn add_note(db: &Database, text: &str) {
    db.table("notes").expect("table").insert(Record::new().with("text", text)).expect("insert");
}

fn kinds(dir: &std::path::Path) -> Vec<SnapshotKind> {
    backup::list_backups(dir).expect("list").into_iter().map(|f| f.name.kind).collect()
}

fn wait_for(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_compaction_after_max_deltas() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = database();
    let manager =
        BackupManager::new(Arc::clone(&db), BackupConfig::new(dir.path()).max_deltas_before_full(3));

    for i in 0..6 {
        add_note(&db, &format!("note {i}"));
        manager.backup_now().expect("backup");
    }
    use SnapshotKind::{Delta, Full};
    assert_eq!(kinds(dir.path()), vec![Full, Delta, Delta, Delta, Full, Delta]);
    assert_eq!(manager.deltas_since_full(), 1);
}

#[test]
fn test_delta_holds_only_changes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = database();
    let manager = BackupManager::new(Arc::clone(&db), BackupConfig::new(dir.path()));
    for i in 0..50 {
        add_note(&db, &format!("note {i}"));
    }
    assert_eq!(manager.backup_now().expect("full").statistics.upserts, 50);

    let notes = db.table("notes").expect("table");
    notes.update(&Record::new().with("text", "edited"), &Condition::le("id", 3i64)).expect("update");
    notes.delete(&Condition::eq("id", 10i64)).expect("delete");

    let report = manager.backup_now().expect("delta");
    assert_eq!(report.kind, SnapshotKind::Delta);
    assert_eq!(report.statistics.upserts, 3);
    assert_eq!(report.statistics.deletes, 1);
    assert_eq!(notes.pending_changes(), 0);
}

#[test]
fn test_debounce_writes_one_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = database();
    let manager = BackupManager::new(
        Arc::clone(&db),
        BackupConfig::new(dir.path()).min_interval(Duration::from_secs(60)),
    );

    add_note(&db, "first");
    manager.notify_change();
    add_note(&db, "second");
    manager.notify_change();

    assert_eq!(kinds(dir.path()), vec![SnapshotKind::Full]);
    assert_eq!(db.table("notes").expect("table").pending_changes(), 1);
}

#[test]
fn test_attached_manager_backs_up_on_change() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = database();
    let manager = BackupManager::new(
        Arc::clone(&db),
        BackupConfig::new(dir.path())
            .interval(Duration::from_secs(3600))
            .min_interval(Duration::ZERO),
    );
    manager.attach();
    manager.start().expect("start");

    add_note(&db, "hello");
    wait_for("a backup after the insert", || manager.last_backup_time().is_some());
    wait_for("pending changes to drain", || {
        db.table("notes").map(|t| t.pending_changes() == 0).unwrap_or(false)
    });

    manager.stop();
    manager.detach();
    add_note(&db, "unobserved");
    assert_eq!(db.table("notes").expect("table").pending_changes(), 1);
}

#[test]
fn test_failure_callback_counts_and_resets() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("backups");
    fs::write(&target, b"a file where the backup directory should be").expect("write");

    let db = database();
    add_note(&db, "keep me");
    let manager = BackupManager::new(Arc::clone(&db), BackupConfig::new(&target));
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        manager.set_failure_callback(move |err, failures| {
            seen.lock().expect("lock").push((failures, err.to_string()));
        });
    }

    for _ in 0..3 {
        assert!(manager.backup_now().is_err());
    }
    let counts: Vec<u32> = seen.lock().expect("lock").iter().map(|(n, _)| *n).collect();
    assert_eq!(counts, vec![1, 2, 3]);
    assert_eq!(manager.consecutive_failures(), 3);
    assert!(manager.last_backup_time().is_none());
    assert_eq!(db.table("notes").expect("table").pending_changes(), 1);

    fs::remove_file(&target).expect("remove");
    let report = manager.backup_now().expect("backup");
    assert_eq!(report.kind, SnapshotKind::Full);
    assert_eq!(manager.consecutive_failures(), 0);
    assert_eq!(seen.lock().expect("lock").len(), 3);
}

#[test]
fn test_scheduler_failures_reach_callback() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("blocked");
    fs::write(&target, b"not a directory").expect("write");

    let manager = BackupManager::new(
        database(),
        BackupConfig::new(&target).interval(Duration::from_millis(10)),
    );
    let calls = Arc::new(AtomicU32::new(0));
    {
        let calls = Arc::clone(&calls);
        manager.set_failure_callback(move |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
    }
    manager.start().expect("start");
    wait_for("two scheduled failures", || calls.load(Ordering::SeqCst) >= 2);
    manager.stop();
    assert!(manager.consecutive_failures() >= 2);
}

#[test]
fn test_filenames_are_unique() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = database();
    let manager = BackupManager::new(
        Arc::clone(&db),
        BackupConfig::new(dir.path()).format(SnapshotFormat::Binary),
    );

    let mut stamps = BTreeSet::new();
    for i in 0..100 {
        add_note(&db, &format!("n{i}"));
        let report = if i % 2 == 0 { manager.backup_full() } else { manager.backup_delta() };
        assert!(stamps.insert(report.expect("backup").created_at));
    }
    let files = backup::list_backups(dir.path()).expect("list");
    assert_eq!(files.len(), 100);
    assert!(files.iter().all(|f| f.name.format == SnapshotFormat::Binary));
    let names: BTreeSet<_> = files.iter().map(|f| f.path.clone()).collect();
    assert_eq!(names.len(), 100);
}

#[test]
fn test_index_change_alone_produces_delta() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = database();
    add_note(&db, "x");
    let manager = BackupManager::new(Arc::clone(&db), BackupConfig::new(dir.path()));
    manager.backup_full().expect("full");

    db.table("notes").expect("table").create_index("text", cellardb::IndexKind::Hash).expect("index");
    let report = manager.backup_delta().expect("delta");
    assert!(report.wrote_file());
    assert_eq!(report.statistics.tables, 1);
    assert_eq!(report.statistics.upserts, 0);
}
