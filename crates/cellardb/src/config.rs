//! Configuration structs.
//!
//! Every struct here has a `Default` and chained `#[must_use]` setters:
//!
//! ```
//! use std::time::Duration;
//! use cellardb::{BackupConfig, IndexKind, TableOptions};
//!
//! let backups = BackupConfig::new("/var/lib/app/backups")
//!     .interval(Duration::from_secs(60))
//!     .max_deltas_before_full(5);
//!
//! let users = TableOptions::new().primary_key("user_id").index("email", IndexKind::Hash);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use cellardb_core::{IndexKind, Schema};
use cellardb_storage::SnapshotFormat;

/// Options for [`Database::create_table`](crate::Database::create_table).
#[derive(Debug, Clone)]
pub struct TableOptions {
    /// Name of the primary-key field.
    /// Default: `"id"`.
    pub primary_key: String,

    /// Optional schema. When set, the primary-key field is added as `Int`
    /// unless declared.
    pub schema: Option<Schema>,

    /// Indexes created with the table.
    pub indexes: Vec<(String, IndexKind)>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self { primary_key: "id".to_owned(), schema: None, indexes: Vec::new() }
    }
}

impl TableOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the primary-key field name.
    #[must_use]
    pub fn primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = field.into();
        self
    }

    /// Set the schema.
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Add an index.
    #[must_use]
    pub fn index(mut self, field: impl Into<String>, kind: IndexKind) -> Self {
        self.indexes.push((field.into(), kind));
        self
    }
}

/// Configuration for [`BackupManager`](crate::BackupManager).
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Directory that receives backup files. Created on first backup.
    pub backup_dir: PathBuf,

    /// Time between scheduled backups.
    /// Default: 300 seconds.
    pub interval: Duration,

    /// Minimum time between change-triggered backups.
    /// Default: 5 seconds.
    pub min_interval: Duration,

    /// Write deltas between full backups.
    /// Default: true.
    pub incremental: bool,

    /// Deltas written before the next backup is upgraded to a full one.
    /// Default: 10.
    pub max_deltas_before_full: u32,

    /// On-disk format.
    /// Default: JSON lines.
    pub format: SnapshotFormat,

    /// Number of full backups (with their deltas) to keep. `None` keeps all.
    /// Default: `None`.
    pub retain_full_backups: Option<usize>,
}

impl BackupConfig {
    /// Create a configuration with default values writing into `backup_dir`.
    #[must_use]
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            interval: Duration::from_secs(300),
            min_interval: Duration::from_secs(5),
            incremental: true,
            max_deltas_before_full: 10,
            format: SnapshotFormat::JsonLines,
            retain_full_backups: None,
        }
    }

    /// Set the scheduled backup interval.
    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the debounce interval for change notifications.
    #[must_use]
    pub const fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Enable or disable delta backups.
    #[must_use]
    pub const fn incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    /// Set how many deltas may follow a full backup.
    #[must_use]
    pub const fn max_deltas_before_full(mut self, count: u32) -> Self {
        self.max_deltas_before_full = count;
        self
    }

    /// Set the on-disk format.
    #[must_use]
    pub const fn format(mut self, format: SnapshotFormat) -> Self {
        self.format = format;
        self
    }

    /// Keep only the newest `count` full backups and their deltas.
    #[must_use]
    pub const fn retain_full_backups(mut self, count: usize) -> Self {
        self.retain_full_backups = Some(count);
        self
    }
}

/// Configuration for [`logging::init`](crate::logging::init).
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG` when set.
    /// Default: `"info"`.
    pub level: String,

    /// Emit JSON lines instead of human-readable text.
    /// Default: false.
    pub json: bool,

    /// Use ANSI colors in text output.
    /// Default: true.
    pub ansi: bool,

    /// Include the event target (module path).
    /// Default: true.
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_owned(), json: false, ansi: true, with_target: true }
    }
}

impl LoggingConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default filter directive, e.g. `"debug"` or `"cellardb=trace"`.
    #[must_use]
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Enable or disable JSON output.
    #[must_use]
    pub const fn json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Enable or disable ANSI colors.
    #[must_use]
    pub const fn ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// Show or hide event targets.
    #[must_use]
    pub const fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }
}

/// Configuration for [`Offloader`](crate::Offloader).
#[derive(Debug, Clone)]
pub struct OffloadConfig {
    /// Number of worker threads.
    /// Default: 2.
    pub workers: usize,

    /// Prefix for worker thread names.
    /// Default: `"cellardb-offload"`.
    pub thread_name: String,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self { workers: 2, thread_name: "cellardb-offload".to_owned() }
    }
}

impl OffloadConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads. Zero is treated as one.
    #[must_use]
    pub const fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}
