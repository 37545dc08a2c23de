//! Writing captured tables to snapshot files and replaying them.

use std::collections::BTreeMap;
use std::path::Path;

use cellardb_core::{PrimaryKey, Record};
use cellardb_storage::{
    write_snapshot_file, BackupMetadata, BackupStatistics, SnapshotContents, SnapshotFormat,
    StorageResult,
};

use crate::backup::{BackupError, BackupResult};
use crate::database::Database;
use crate::table::{DeltaCapture, FullCapture};

/// Writes a full snapshot of the captured tables.
pub(crate) fn write_full(
    path: &Path,
    format: SnapshotFormat,
    created_at: u64,
    captures: &[&FullCapture],
) -> StorageResult<BackupStatistics> {
    let metadata = BackupMetadata::new_full(created_at);
    write_snapshot_file(path, format, &metadata, |writer| {
        for capture in captures {
            writer.write_table(&capture.header)?;
        }
        for capture in captures {
            let table = capture.header.name.as_str();
            for (key, record) in &capture.records {
                writer.write_upsert(table, capture.seq, key, record)?;
            }
        }
        Ok(())
    })
}

/// Writes a delta on top of the full snapshot created at `base`.
///
/// Drops come first so that a table dropped and recreated since the last
/// backup is replayed in that order.
pub(crate) fn write_delta(
    path: &Path,
    format: SnapshotFormat,
    created_at: u64,
    base: u64,
    dropped: &[String],
    captures: &[&DeltaCapture],
) -> StorageResult<BackupStatistics> {
    let metadata = BackupMetadata::new_delta(created_at, base);
    write_snapshot_file(path, format, &metadata, |writer| {
        for name in dropped {
            writer.write_drop(name)?;
        }
        for capture in captures {
            writer.write_table(&capture.header)?;
        }
        for capture in captures {
            let table = capture.header.name.as_str();
            for (seq, key, record) in &capture.upserts {
                writer.write_upsert(table, *seq, key, record)?;
            }
            for (seq, key) in &capture.deletes {
                writer.write_delete(table, *seq, key)?;
            }
        }
        Ok(())
    })
}

#[derive(Default)]
struct TableChanges {
    upserts: Vec<(u64, PrimaryKey, Record)>,
    deletes: Vec<(u64, PrimaryKey)>,
}

/// Applies a snapshot's contents to `db`: drops, then table headers, then
/// each table's upserts and deletes.
///
/// Within one snapshot a key appears at most once, so the order of entries
/// inside a table does not matter; they are still applied in sequence order.
pub(crate) fn apply(db: &Database, contents: SnapshotContents) -> BackupResult<()> {
    for name in &contents.dropped_tables {
        db.restore_drop(name);
    }

    let mut tables = BTreeMap::new();
    for header in &contents.tables {
        tables.insert(header.name.clone(), db.restore_table(header));
    }

    let mut changes: BTreeMap<String, TableChanges> = BTreeMap::new();
    for entry in contents.upserts {
        changes.entry(entry.table).or_default().upserts.push((entry.seq, entry.key, entry.record));
    }
    for entry in contents.deletes {
        changes.entry(entry.table).or_default().deletes.push((entry.seq, entry.key));
    }

    for (name, mut change) in changes {
        let table = tables.get(&name).ok_or_else(|| BackupError::UnknownTable(name.clone()))?;
        change.upserts.sort_by_key(|(seq, _, _)| *seq);
        change.deletes.sort_by_key(|(seq, _)| *seq);
        let seq = change
            .upserts
            .iter()
            .map(|(seq, _, _)| *seq)
            .chain(change.deletes.iter().map(|(seq, _)| *seq))
            .max()
            .unwrap_or(0);
        table.apply_restored(
            change.upserts.into_iter().map(|(_, key, record)| (key, record)),
            change.deletes.into_iter().map(|(_, key)| key),
            seq,
        );
    }
    Ok(())
}
