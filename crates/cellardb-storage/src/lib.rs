//! `CellarDB` Storage
//!
//! This crate persists table snapshots for `CellarDB`: full snapshots of every
//! record and deltas of the records changed since the previous backup.
//!
//! # Modules
//!
//! - [`types`] - The records a snapshot file is made of
//! - [`codec`] - Streaming writer and reader for the JSON-lines and binary formats
//! - [`atomic`] - Temp-file-then-rename writes
//! - [`naming`] - Time-ordered backup file names
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use cellardb_core::{PrimaryKey, Record};
//! use cellardb_storage::{BackupMetadata, SnapshotFormat, SnapshotReader, SnapshotWriter};
//!
//! let mut buf = Vec::new();
//! let mut writer = SnapshotWriter::new(&mut buf, SnapshotFormat::JsonLines).unwrap();
//! writer.write_metadata(&BackupMetadata::new_full(1)).unwrap();
//! writer.write_upsert("users", 1, &PrimaryKey::int(1), &Record::new().with("id", 1i64)).unwrap();
//! writer.finish().unwrap();
//!
//! let contents = SnapshotReader::new(Cursor::new(buf), SnapshotFormat::JsonLines)
//!     .unwrap()
//!     .read_to_end()
//!     .unwrap();
//! assert_eq!(contents.upserts.len(), 1);
//! ```

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod atomic;
pub mod codec;
pub mod error;
pub mod naming;
pub mod types;

pub use atomic::{read_snapshot_file, write_atomic, write_snapshot_file};
pub use codec::{SnapshotContents, SnapshotFormat, SnapshotReader, SnapshotWriter};
pub use error::{StorageError, StorageResult};
pub use naming::{list_backup_files, BackupFileName};
pub use types::{
    current_timestamp_micros, BackupMetadata, BackupRecord, BackupStatistics, DeleteEntry,
    IndexDefinition, SnapshotKind, TableHeader, UpsertEntry, SNAPSHOT_FORMAT_VERSION,
};
