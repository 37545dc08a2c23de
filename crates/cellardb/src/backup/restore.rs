//! Rebuilding a database from a full backup and its deltas.

use std::path::{Path, PathBuf};

use cellardb_storage::{
    list_backup_files, read_snapshot_file, BackupFileName, SnapshotContents, SnapshotKind,
};
use tracing::{info, warn};

use super::error::{BackupError, BackupResult};
use crate::database::Database;
use crate::snapshot;

/// A backup file found in a backup directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFile {
    /// Full path of the file.
    pub path: PathBuf,
    /// The parsed file name: timestamp, kind and format.
    pub name: BackupFileName,
}

/// Lists the backup files in `dir`, oldest first.
pub fn list_backups(dir: &Path) -> BackupResult<Vec<BackupFile>> {
    Ok(list_backup_files(dir)?.into_iter().map(|(path, name)| BackupFile { path, name }).collect())
}

fn read_kind(path: &Path, expected: SnapshotKind) -> BackupResult<SnapshotContents> {
    let contents = read_snapshot_file(path)?;
    if contents.metadata.kind != expected {
        return Err(BackupError::WrongKind {
            path: path.to_path_buf(),
            expected,
            actual: contents.metadata.kind,
        });
    }
    Ok(contents)
}

/// Loads the full backup at `full`, then applies each delta in order.
///
/// Every delta must be based on `full`.
///
/// # Errors
///
/// [`BackupError::WrongKind`] if `full` is a delta or a delta is a full
/// backup, [`BackupError::BaseMismatch`] for a delta from another chain, and
/// storage errors for unreadable or damaged files.
pub fn restore(full: &Path, deltas: &[PathBuf]) -> BackupResult<Database> {
    let contents = read_kind(full, SnapshotKind::Full)?;
    let base = contents.metadata.created_at;
    let mut chain = Vec::with_capacity(deltas.len());
    for path in deltas {
        let delta = read_kind(path, SnapshotKind::Delta)?;
        if delta.metadata.base != Some(base) {
            return Err(BackupError::BaseMismatch {
                path: path.clone(),
                expected: base,
                found: delta.metadata.base,
            });
        }
        chain.push(delta);
    }
    rebuild(full, contents, chain)
}

/// Restores the newest full backup in `dir` with every later delta based
/// on it. Deltas from other chains are skipped.
pub fn restore_latest(dir: &Path) -> BackupResult<Database> {
    let files = list_backups(dir)?;
    let full_at = files
        .iter()
        .rposition(|file| file.name.kind == SnapshotKind::Full)
        .ok_or_else(|| BackupError::NoFullBackup(dir.to_path_buf()))?;
    let full = &files[full_at];
    let contents = read_kind(&full.path, SnapshotKind::Full)?;
    let base = contents.metadata.created_at;

    let mut chain = Vec::new();
    for file in files[full_at + 1..].iter().filter(|f| f.name.kind == SnapshotKind::Delta) {
        let delta = read_kind(&file.path, SnapshotKind::Delta)?;
        if delta.metadata.base == Some(base) {
            chain.push(delta);
        } else {
            warn!(
                path = %file.path.display(),
                base = ?delta.metadata.base,
                "skipping delta from another chain"
            );
        }
    }
    rebuild(&full.path, contents, chain)
}

fn rebuild(
    full: &Path,
    contents: SnapshotContents,
    deltas: Vec<SnapshotContents>,
) -> BackupResult<Database> {
    let db = Database::new();
    let count = deltas.len();
    snapshot::apply(&db, contents)?;
    for delta in deltas {
        snapshot::apply(&db, delta)?;
    }
    info!(
        parent: db.span(),
        full = %full.display(),
        deltas = count,
        tables = db.list_tables().len(),
        "restored database"
    );
    Ok(db)
}
