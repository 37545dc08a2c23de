//! Backup and restore.
//!
//! Backups are snapshot files in one directory, named
//! `backup-<micros>-<full|delta>.<ext>`. A full backup holds every table; a
//! delta holds the keys changed since the previous backup and names the full
//! backup it builds on. Restoring loads a full backup and replays its deltas
//! oldest first.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use cellardb::{backup, BackupConfig, BackupManager, Database};
//!
//! let db = Arc::new(Database::new());
//! let manager = BackupManager::new(Arc::clone(&db), BackupConfig::new("backups"));
//! manager.backup_full()?;
//!
//! let restored = backup::restore_latest(Path::new("backups"))?;
//! # Ok::<(), cellardb::BackupError>(())
//! ```

mod error;
mod manager;
mod restore;

pub use error::{BackupError, BackupResult};
pub use manager::{BackupManager, BackupReport, FailureCallback};
pub use restore::{list_backups, restore, restore_latest, BackupFile};
