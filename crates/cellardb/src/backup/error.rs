//! Error types for backup and restore operations.

use std::io;
use std::path::PathBuf;

use cellardb_storage::{SnapshotKind, StorageError};
use thiserror::Error;

/// Errors that can occur during backup and restore operations.
#[derive(Debug, Error)]
pub enum BackupError {
    /// An I/O error occurred outside the snapshot codec, e.g. creating the
    /// backup directory or starting the scheduler thread.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Writing or reading a snapshot file failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// No full backup exists in the directory.
    #[error("no full backup found in {}", .0.display())]
    NoFullBackup(PathBuf),

    /// A file has the wrong snapshot kind for its role in a restore.
    #[error("{} is a {actual} backup, expected {expected}", .path.display())]
    WrongKind {
        /// The offending file.
        path: PathBuf,
        /// The kind the restore needed.
        expected: SnapshotKind,
        /// The kind the file holds.
        actual: SnapshotKind,
    },

    /// A delta was built on a different full backup.
    #[error("delta {} is based on {found:?}, expected {expected}", .path.display())]
    BaseMismatch {
        /// The delta file.
        path: PathBuf,
        /// Timestamp of the full backup being restored.
        expected: u64,
        /// The base the delta records.
        found: Option<u64>,
    },

    /// A snapshot holds changes for a table it never declares.
    #[error("changes for undeclared table '{0}'")]
    UnknownTable(String),
}

impl BackupError {
    /// Returns `true` if the file read was damaged rather than missing or
    /// mismatched.
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Storage(err) if err.is_corruption())
    }
}

/// Result type for backup and restore operations.
pub type BackupResult<T> = std::result::Result<T, BackupError>;
