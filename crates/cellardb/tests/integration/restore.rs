//! Restore integration tests: a database rebuilt from backups must match
//! the original exactly.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use cellardb::{
    backup, BackupConfig, BackupError, BackupManager, Condition, Database, Error, FieldType,
    IndexKind, OffloadConfig, Offloader, Record, Schema, Select, SnapshotFormat, SnapshotKind,
    TableOptions, Value,
};

/// Every table's records, keyed by table name, in key order.
fn dump(db: &Database) -> Vec<(String, Vec<Record>)> {
    db.list_tables()
        .into_iter()
        .map(|name| {
            let records = db.table(&name).expect("table").all();
            (name, records)
        })
        .collect()
}

fn assert_same_shape(original: &Database, restored: &Database) {
    assert_eq!(dump(original), dump(restored));
    for name in original.list_tables() {
        let a = original.table(&name).expect("table");
        let b = restored.table(&name).expect("table");
        assert_eq!(a.indexed_fields(), b.indexed_fields(), "indexes of {name}");
        assert_eq!(a.primary_key_field(), b.primary_key_field());
        assert_eq!(a.schema_fields(), b.schema_fields());
        assert!(b.next_auto_pk() >= a.next_auto_pk());
        assert_eq!(b.pending_changes(), 0);
    }
}

fn shop() -> Arc<Database> {
    let db = Arc::new(Database::new());
    let schema = Schema::new().with_field("sku", FieldType::String).with_field("qty", FieldType::Int);
    db.create_table(
        "stock",
        TableOptions::new().schema(schema).index("sku", IndexKind::Hash).index("qty", IndexKind::Sorted),
    )
    .expect("create stock");
    db.create_table("log", TableOptions::new().primary_key("ref")).expect("create log");
    db
}

#[test]
fn test_restore_full_and_deltas() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = shop();
    let manager = BackupManager::new(Arc::clone(&db), BackupConfig::new(dir.path()));
    let stock = db.table("stock").expect("stock");
    let log = db.table("log").expect("log");

    for i in 0..30i64 {
        stock.insert(Record::new().with("sku", format!("sku-{i}")).with("qty", i)).expect("insert");
    }
    log.insert(Record::new().with("ref", "boot").with("msg", "started")).expect("log");
    manager.backup_now().expect("full");

    stock.update(&Record::new().with("qty", 0i64), &Condition::lt("qty", 5i64)).expect("update");
    stock.delete(&Condition::between("qty", 20i64, 24i64)).expect("delete");
    let nested = Value::List(vec![1i64.into(), "two".into(), Value::Null]);
    log.insert(Record::new().with("ref", "restock").with("msg", nested)).expect("log");
    manager.backup_now().expect("delta 1");

    db.drop_table("log").expect("drop");
    let audit = db.create_table("audit", TableOptions::new()).expect("audit");
    audit.insert(Record::new().with("who", "admin")).expect("audit insert");
    stock.insert(Record::new().with("sku", "late").with("qty", 99i64)).expect("insert");
    stock.delete(&Condition::eq("sku", "late")).expect("delete again");
    manager.backup_now().expect("delta 2");

    let kinds: Vec<_> =
        backup::list_backups(dir.path()).expect("list").into_iter().map(|f| f.name.kind).collect();
    assert_eq!(kinds, vec![SnapshotKind::Full, SnapshotKind::Delta, SnapshotKind::Delta]);

    let restored = backup::restore_latest(dir.path()).expect("restore");
    assert_same_shape(&db, &restored);
    assert!(!restored.contains_table("log"));

    // Restored indexes answer queries.
    let zeroes = restored
        .table("stock")
        .expect("stock")
        .select(&Select::new().filter(Condition::eq("qty", 0i64)));
    assert_eq!(zeroes.len(), 5);
}

#[test]
fn test_restore_table_dropped_and_recreated_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = shop();
    let manager = BackupManager::new(Arc::clone(&db), BackupConfig::new(dir.path()));
    db.table("stock")
        .expect("stock")
        .insert(Record::new().with("sku", "a").with("qty", 1i64))
        .expect("insert");
    db.table("log")
        .expect("log")
        .insert(Record::new().with("ref", "boot"))
        .expect("insert");
    manager.backup_full().expect("full");

    // Same name and options as before, and no records.
    db.drop_table("log").expect("drop");
    db.create_table("log", TableOptions::new().primary_key("ref")).expect("recreate");
    let report = manager.backup_delta().expect("delta");
    assert!(report.wrote_file());
    assert_eq!(report.statistics.dropped_tables, 1);
    assert_eq!(report.statistics.tables, 1);

    let restored = backup::restore_latest(dir.path()).expect("restore");
    assert_eq!(restored.list_tables(), vec!["log", "stock"]);
    assert_eq!(restored.table("log").expect("log").count(), 0);
    assert_same_shape(&db, &restored);

    // Nothing changed since, so the next delta has no file.
    assert!(!manager.backup_delta().expect("empty delta").wrote_file());
}

#[test]
fn test_restore_explicit_chain() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = shop();
    let manager = BackupManager::new(Arc::clone(&db), BackupConfig::new(dir.path()));
    let stock = db.table("stock").expect("stock");

    stock.insert(Record::new().with("sku", "a").with("qty", 1i64)).expect("insert");
    let full = manager.backup_full().expect("full").path.expect("path");
    stock.insert(Record::new().with("sku", "b").with("qty", 2i64)).expect("insert");
    let delta = manager.backup_delta().expect("delta").path.expect("path");

    let restored = backup::restore(&full, &[delta.clone()]).expect("restore");
    assert_same_shape(&db, &restored);

    // Passing the delta as the full backup is rejected.
    assert!(matches!(
        backup::restore(&delta, &[]),
        Err(BackupError::WrongKind { expected: SnapshotKind::Full, .. })
    ));

    // A delta from a newer chain does not apply to the old full backup.
    manager.backup_full().expect("second full");
    stock.insert(Record::new().with("sku", "c").with("qty", 3i64)).expect("insert");
    let foreign = manager.backup_delta().expect("delta").path.expect("path");
    assert!(matches!(
        backup::restore(&full, &[foreign]),
        Err(BackupError::BaseMismatch { .. })
    ));
}

#[test]
fn test_restore_latest_skips_orphaned_deltas() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = || BackupConfig::new(dir.path());

    // Another database writes an older chain into the same directory.
    let other = shop();
    let other_backups = BackupManager::new(Arc::clone(&other), config());
    let other_stock = other.table("stock").expect("stock");
    other_stock.insert(Record::new().with("sku", "other").with("qty", 7i64)).expect("insert");
    other_backups.backup_full().expect("other full");

    let db = shop();
    let backups = BackupManager::new(Arc::clone(&db), config());
    let stock = db.table("stock").expect("stock");
    stock.insert(Record::new().with("sku", "a").with("qty", 1i64)).expect("insert");
    backups.backup_full().expect("full");

    // An orphaned delta, newer than the latest full but based on the old chain.
    other_stock.insert(Record::new().with("sku", "stray").with("qty", 8i64)).expect("insert");
    other_backups.backup_delta().expect("orphan delta");

    stock.insert(Record::new().with("sku", "b").with("qty", 2i64)).expect("insert");
    backups.backup_delta().expect("delta");

    assert_eq!(backup::list_backups(dir.path()).expect("list").len(), 4);
    let restored = backup::restore_latest(dir.path()).expect("restore");
    assert_same_shape(&db, &restored);
}

#[test]
fn test_restore_empty_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(matches!(backup::restore_latest(dir.path()), Err(BackupError::NoFullBackup(_))));
}

#[test]
fn test_save_and_load_both_formats() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = shop();
    let stock = db.table("stock").expect("stock");
    for i in 0..10i64 {
        stock.insert(Record::new().with("sku", format!("s{i}")).with("qty", i * 3)).expect("insert");
    }

    for format in [SnapshotFormat::JsonLines, SnapshotFormat::Binary] {
        let path = dir.path().join(format!("shop.{}", format.extension()));
        let stats = db.save(&path, format).expect("save");
        assert_eq!(stats.tables, 2);
        assert_eq!(stats.upserts, 10);
        let loaded = Database::load(&path).expect("load");
        assert_same_shape(&db, &loaded);
    }
}

#[test]
fn test_save_and_load_within_allowed_dir() {
    let root = tempfile::tempdir().expect("tempdir");
    let allowed = root.path().join("data");
    fs::create_dir(&allowed).expect("mkdir");
    let db = shop();
    db.table("stock")
        .expect("stock")
        .insert(Record::new().with("sku", "a").with("qty", 2i64))
        .expect("insert");

    let inside = allowed.join("shop.jsonl");
    db.save_within(&inside, SnapshotFormat::JsonLines, &allowed).expect("save inside");
    let loaded = Database::load_within(&inside, &allowed).expect("load inside");
    assert_same_shape(&db, &loaded);

    // `..` is resolved before the check.
    let escaping = allowed.join("..").join("escape.jsonl");
    match db.save_within(&escaping, SnapshotFormat::JsonLines, &allowed) {
        Err(Error::InvalidInput(msg)) => assert!(msg.contains("outside"), "{msg}"),
        other => panic!("expected InvalidInput, got {other:?}"),
    }
    assert!(!root.path().join("escape.jsonl").exists());

    // An existing file outside the directory is refused too.
    let outside = root.path().join("outside.jsonl");
    db.save(&outside, SnapshotFormat::JsonLines).expect("save outside");
    assert!(matches!(Database::load_within(&outside, &allowed), Err(Error::InvalidInput(_))));
}

#[test]
fn test_save_and_load_offloaded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let offloader = Offloader::new(OffloadConfig::new().workers(1)).expect("offloader");
    let db = shop();
    db.table("stock")
        .expect("stock")
        .insert(Record::new().with("sku", "a").with("qty", 5i64))
        .expect("insert");

    let path = dir.path().join("shop.bin");
    let stats = db
        .save_offloaded(&offloader, &path, SnapshotFormat::Binary)
        .wait()
        .expect("job")
        .expect("save");
    assert_eq!(stats.upserts, 1);

    let loaded = Database::load_offloaded(&offloader, &path).wait().expect("job").expect("load");
    assert_same_shape(&db, &loaded);

    let missing = Database::load_offloaded(&offloader, dir.path().join("nope.bin")).wait();
    assert!(matches!(missing, Ok(Err(_))));
}

#[test]
fn test_truncated_file_is_corruption() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = shop();
    db.table("stock")
        .expect("stock")
        .insert(Record::new().with("sku", "x").with("qty", 1i64))
        .expect("insert");
    let path = dir.path().join("shop.jsonl");
    db.save(&path, SnapshotFormat::JsonLines).expect("save");

    let bytes = fs::read(&path).expect("read");
    fs::write(&path, &bytes[..bytes.len() / 2]).expect("truncate");

    match Database::load(&path) {
        Err(Error::Backup(err)) => assert!(err.is_corruption(), "unexpected error {err}"),
        other => panic!("expected corruption, got {other:?}"),
    }
    assert!(Path::new(&path).exists());
}
