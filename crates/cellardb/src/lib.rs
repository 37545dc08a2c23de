//! `CellarDB` - An Embeddable In-Process Record Store
//!
//! `CellarDB` keeps named tables of records in memory, answers filtered and
//! ordered queries through optional per-field indexes, and writes full and
//! incremental backups to disk in the background.
//!
//! # Features
//!
//! - **Tables**: keyed records with optional schemas and auto-assigned integer keys
//! - **Indexes**: hash indexes for equality, sorted indexes for ranges and ordering
//! - **Queries**: conditions, ordering with top-k, paging, projection and `DISTINCT`
//! - **Backups**: full and delta snapshots, compaction, debouncing and restore
//!
//! # Quick Start
//!
//! ```
//! use cellardb::{Condition, Database, IndexKind, Record, Select, SortKey, TableOptions};
//!
//! let db = Database::new();
//! let users = db.create_table("users", TableOptions::new().index("age", IndexKind::Sorted))?;
//!
//! for (name, age) in [("Alice", 30i64), ("Bob", 25), ("Carol", 41)] {
//!     users.insert(Record::new().with("name", name).with("age", age))?;
//! }
//!
//! let oldest = users.select(
//!     &Select::new().filter(Condition::ge("age", 25i64)).order_by([SortKey::desc("age")]).limit(1),
//! );
//! assert_eq!(oldest[0].get("name").and_then(|v| v.as_str()), Some("Carol"));
//! # Ok::<(), cellardb::Error>(())
//! ```
//!
//! # Backups
//!
//! ```no_run
//! use std::sync::Arc;
//! use cellardb::{BackupConfig, BackupManager, Database};
//!
//! let db = Arc::new(Database::new());
//! let backups = BackupManager::new(Arc::clone(&db), BackupConfig::new("backups"));
//! backups.attach();
//! backups.start()?;
//! # Ok::<(), cellardb::BackupError>(())
//! ```
//!
//! # Modules
//!
//! - [`backup`] - Backup scheduling and restore
//! - [`config`] - Table, backup, logging and offload options
//! - [`database`] - The table registry
//! - [`error`] - Error types
//! - [`lock`] - The writer-preferring reader/writer lock
//! - [`table`] - Tables and queries

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]

// Re-export core types
pub use cellardb_core::{
    CompareOp, Condition, CoreError, FieldIndex, FieldType, HashIndex, IndexKind, IndexStats,
    PrimaryKey, Record, Schema, SortedIndex, Value, ValueKind,
};

// Re-export storage types
pub use cellardb_storage::{BackupStatistics, SnapshotFormat, SnapshotKind};

// Modules
pub mod backup;
pub mod config;
pub mod database;
pub mod error;
pub mod lock;
pub mod logging;
pub mod offload;
mod snapshot;
pub mod table;

// Public API re-exports
pub use backup::{
    list_backups, restore, restore_latest, BackupError, BackupFile, BackupManager, BackupReport,
    BackupResult, FailureCallback,
};
pub use config::{BackupConfig, LoggingConfig, OffloadConfig, TableOptions};
pub use database::Database;
pub use error::{Error, Result};
pub use lock::{ReadGuard, RwLock, WriteGuard};
pub use offload::{OffloadError, Offloader, Ticket};
pub use table::{ChangeListener, Projection, Select, SortKey, Table};
