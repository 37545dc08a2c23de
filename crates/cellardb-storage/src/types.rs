//! Record types written to snapshot files.
//!
//! A snapshot file is a sequence of [`BackupRecord`]s: one
//! [`BackupRecord::Metadata`] first, then table headers, upserts, deletes and
//! dropped-table markers, then a single [`BackupRecord::End`] carrying the
//! statistics. A file without its end marker is treated as incomplete.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use cellardb_core::{IndexKind, PrimaryKey, Record, Schema};
use serde::{Deserialize, Serialize};

/// Current snapshot format version.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Whether a snapshot holds every record or only changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    /// Every live record of every table.
    Full,
    /// Records changed since the previous backup.
    Delta,
}

impl SnapshotKind {
    /// The kind's name, as used in file names.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Delta => "delta",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Metadata heading every snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// Format version.
    pub version: u32,
    /// Full or delta.
    pub kind: SnapshotKind,
    /// Capture time, microseconds since the Unix epoch.
    pub created_at: u64,
    /// For a delta, the `created_at` of the full snapshot it applies to.
    pub base: Option<u64>,
}

impl BackupMetadata {
    /// Metadata for a full snapshot.
    #[must_use]
    pub const fn new_full(created_at: u64) -> Self {
        Self { version: SNAPSHOT_FORMAT_VERSION, kind: SnapshotKind::Full, created_at, base: None }
    }

    /// Metadata for a delta applying to the full snapshot taken at `base`.
    #[must_use]
    pub const fn new_delta(created_at: u64, base: u64) -> Self {
        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            kind: SnapshotKind::Delta,
            created_at,
            base: Some(base),
        }
    }
}

/// An index declaration carried in a table header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// The indexed field.
    pub field: String,
    /// The index kind.
    pub kind: IndexKind,
}

/// Everything needed to recreate an empty table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableHeader {
    /// The table name.
    pub name: String,
    /// The primary key field.
    pub primary_key: String,
    /// The schema, if the table has one.
    pub schema: Option<Schema>,
    /// Declared indexes.
    pub indexes: Vec<IndexDefinition>,
    /// The next auto-assigned key.
    pub next_auto_pk: i64,
}

/// A live record, written as its final state at capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertEntry {
    /// The owning table.
    pub table: String,
    /// The table mutation sequence number of the change.
    pub seq: u64,
    /// The record's key.
    pub key: PrimaryKey,
    /// The record.
    pub record: Record,
}

/// A deleted key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteEntry {
    /// The owning table.
    pub table: String,
    /// The table mutation sequence number of the deletion.
    pub seq: u64,
    /// The deleted key.
    pub key: PrimaryKey,
}

/// Counts of what a snapshot contains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupStatistics {
    /// Table headers written.
    pub tables: u64,
    /// Upserted records written.
    pub upserts: u64,
    /// Deleted keys written.
    pub deletes: u64,
    /// Dropped tables written.
    pub dropped_tables: u64,
}

impl BackupStatistics {
    /// Total number of body records.
    #[must_use]
    pub const fn total_records(&self) -> u64 {
        self.tables + self.upserts + self.deletes + self.dropped_tables
    }

    /// Returns `true` if the snapshot carries no changes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.upserts == 0 && self.deletes == 0 && self.dropped_tables == 0
    }
}

/// One record in a snapshot file.
///
/// In the text format each record is one JSON line of the form
/// `{"type": "...", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BackupRecord {
    /// The snapshot metadata. Always first.
    Metadata(BackupMetadata),
    /// A table header.
    Table(TableHeader),
    /// A live record.
    Upsert(UpsertEntry),
    /// A deleted key.
    Delete(DeleteEntry),
    /// A table dropped since the previous backup.
    DropTable(String),
    /// The end marker. Always last.
    End(BackupStatistics),
}

impl BackupRecord {
    /// A short name for the record type, used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Metadata(_) => "metadata",
            Self::Table(_) => "table",
            Self::Upsert(_) => "upsert",
            Self::Delete(_) => "delete",
            Self::DropTable(_) => "drop_table",
            Self::End(_) => "end",
        }
    }
}

/// Microseconds since the Unix epoch.
#[must_use]
pub fn current_timestamp_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
