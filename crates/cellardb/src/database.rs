//! Main database interface.
//!
//! This module provides the [`Database`] struct, a registry of named
//! [`Table`]s with whole-database save and load.
//!
//! # Examples
//!
//! ```
//! use cellardb::{Condition, Database, IndexKind, Record, Select, TableOptions};
//!
//! let db = Database::new();
//! let users = db.create_table("users", TableOptions::new().index("age", IndexKind::Sorted))?;
//!
//! users.insert(Record::new().with("name", "Alice").with("age", 30i64))?;
//! users.insert(Record::new().with("name", "Bob").with("age", 25i64))?;
//!
//! let adults = users.select(&Select::new().filter(Condition::gt("age", 26i64)));
//! assert_eq!(adults.len(), 1);
//! # Ok::<(), cellardb::Error>(())
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cellardb_storage::{
    current_timestamp_micros, BackupStatistics, SnapshotFormat, StorageError, TableHeader,
};
use tracing::{debug, info, Span};

use crate::backup;
use crate::config::TableOptions;
use crate::error::{Error, Result};
use crate::lock::RwLock;
use crate::offload::{Offloader, Ticket};
use crate::snapshot;
use crate::table::{ChangeListener, DeltaCapture, FullCapture, ListenerSlot, Table};

/// A registry of named tables.
///
/// Each table has its own lock; the registry lock is only held while
/// looking tables up, creating or dropping them. There is no lock spanning
/// more than one table.
///
/// # Thread Safety
///
/// `Database` is `Send + Sync`. Share it behind an [`Arc`] when a
/// [`BackupManager`](crate::BackupManager) or worker threads need it.
pub struct Database {
    tables: RwLock<BTreeMap<String, Arc<Table>>>,
    /// Tables dropped since the last acknowledged backup, oldest first.
    dropped: Mutex<Vec<String>>,
    listener: ListenerSlot,
    span: Span,
}

impl Database {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::with_span(tracing::info_span!("cellardb"))
    }

    /// Creates an empty database whose logs are recorded under `span`.
    #[must_use]
    pub fn with_span(span: Span) -> Self {
        Self {
            tables: RwLock::new(BTreeMap::new()),
            dropped: Mutex::new(Vec::new()),
            listener: ListenerSlot::default(),
            span,
        }
    }

    /// The span this database logs under.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Creates a table.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateTable`] if the name is taken, and
    /// [`Error::InvalidInput`] for an empty name or primary-key field.
    pub fn create_table(&self, name: &str, options: TableOptions) -> Result<Arc<Table>> {
        if name.is_empty() {
            return Err(Error::invalid_input("table name must not be empty"));
        }
        if options.primary_key.is_empty() {
            return Err(Error::invalid_input("primary key field must not be empty"));
        }

        let table = Arc::new(Table::with_parts(
            name.to_owned(),
            options.primary_key,
            options.schema,
            Arc::clone(&self.listener),
            self.table_span(name),
        ));
        for (field, kind) in &options.indexes {
            table.create_index(field, *kind)?;
        }

        {
            let mut tables = self.tables.write();
            if tables.contains_key(name) {
                return Err(Error::DuplicateTable(name.to_owned()));
            }
            tables.insert(name.to_owned(), Arc::clone(&table));
        }
        info!(parent: &self.span, table = name, primary_key = table.primary_key_field(), "created table");
        self.notify(name);
        Ok(table)
    }

    /// Drops a table and every record in it.
    ///
    /// Handles to the table held elsewhere keep working but are detached
    /// from the database.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        {
            let mut tables = self.tables.write();
            if tables.remove(name).is_none() {
                return Err(Error::TableNotFound(name.to_owned()));
            }
            // Recorded under the registry lock so captures see both or neither.
            self.lock_dropped().push(name.to_owned());
        }
        info!(parent: &self.span, table = name, "dropped table");
        self.notify(name);
        Ok(())
    }

    /// Returns the named table.
    pub fn table(&self, name: &str) -> Result<Arc<Table>> {
        self.tables.read().get(name).cloned().ok_or_else(|| Error::TableNotFound(name.to_owned()))
    }

    /// Names of every table, sorted.
    pub fn list_tables(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    /// Returns `true` if a table with this name exists.
    pub fn contains_table(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    /// Installs a callback run after every successful mutation of any table,
    /// outside the table's lock. Replaces any previous listener.
    pub fn set_change_listener(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.set_listener(Some(Arc::new(listener)));
    }

    /// Removes the change listener.
    pub fn clear_change_listener(&self) {
        self.set_listener(None);
    }

    pub(crate) fn set_listener(&self, listener: Option<ChangeListener>) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = listener;
    }

    /// Writes every table to `path` as a full snapshot, replacing the file
    /// atomically.
    pub fn save(&self, path: impl AsRef<Path>, format: SnapshotFormat) -> Result<BackupStatistics> {
        let path = path.as_ref();
        let (captures, _) = self.capture_full();
        let captures: Vec<&FullCapture> = captures.iter().map(|(_, capture)| capture).collect();
        let statistics = snapshot::write_full(path, format, current_timestamp_micros(), &captures)?;
        info!(
            parent: &self.span,
            path = %path.display(),
            tables = statistics.tables,
            records = statistics.upserts,
            "saved database"
        );
        Ok(statistics)
    }

    /// Loads a database from a file written by [`Database::save`] or a full
    /// backup. The format is chosen by file extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(backup::restore(path.as_ref(), &[])?)
    }

    /// Like [`Database::save`], but refuses a `path` that resolves outside
    /// `allowed_dir`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] if the resolved path escapes `allowed_dir`,
    /// or [`Error::Storage`] if either location cannot be resolved.
    pub fn save_within(
        &self,
        path: impl AsRef<Path>,
        format: SnapshotFormat,
        allowed_dir: impl AsRef<Path>,
    ) -> Result<BackupStatistics> {
        let path = confine(path.as_ref(), allowed_dir.as_ref())?;
        self.save(path, format)
    }

    /// Like [`Database::load`], but refuses a `path` that resolves outside
    /// `allowed_dir`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] if the resolved path escapes `allowed_dir`.
    pub fn load_within(path: impl AsRef<Path>, allowed_dir: impl AsRef<Path>) -> Result<Self> {
        let path = confine(path.as_ref(), allowed_dir.as_ref())?;
        Self::load(path)
    }

    /// Runs [`Database::save`] on an offload worker.
    pub fn save_offloaded(
        self: &Arc<Self>,
        offloader: &Offloader,
        path: impl Into<PathBuf>,
        format: SnapshotFormat,
    ) -> Ticket<Result<BackupStatistics>> {
        let db = Arc::clone(self);
        let path = path.into();
        offloader.spawn(move || db.save(&path, format))
    }

    /// Runs [`Database::load`] on an offload worker.
    pub fn load_offloaded(offloader: &Offloader, path: impl Into<PathBuf>) -> Ticket<Result<Self>> {
        let path = path.into();
        offloader.spawn(move || Self::load(&path))
    }

    fn table_span(&self, name: &str) -> Span {
        tracing::debug_span!(parent: &self.span, "table", name)
    }

    fn lock_dropped(&self) -> MutexGuard<'_, Vec<String>> {
        self.dropped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, name: &str) {
        let listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(listener) = listener {
            listener(name);
        }
    }

    /// The live tables and the pending drops, read together.
    fn tables_snapshot(&self) -> (Vec<Arc<Table>>, Vec<String>) {
        let tables = self.tables.read();
        let dropped = self.lock_dropped().clone();
        (tables.values().cloned().collect(), dropped)
    }

    /// Copies every table, one read lock at a time, plus the number of
    /// pending drops a full backup makes redundant.
    pub(crate) fn capture_full(&self) -> (Vec<(Arc<Table>, FullCapture)>, usize) {
        let (tables, dropped) = self.tables_snapshot();
        let captures = tables
            .into_iter()
            .map(|table| {
                let capture = table.capture_full();
                (table, capture)
            })
            .collect();
        (captures, dropped.len())
    }

    /// Copies every table's changes, one read lock at a time, plus the
    /// pending drops.
    pub(crate) fn capture_delta(&self) -> (Vec<(Arc<Table>, DeltaCapture)>, Vec<String>) {
        let (tables, dropped) = self.tables_snapshot();
        let captures = tables
            .into_iter()
            .map(|table| {
                let capture = table.capture_delta();
                (table, capture)
            })
            .collect();
        (captures, dropped)
    }

    /// Forgets the first `count` pending drops once a backup holds them.
    pub(crate) fn acknowledge_drops(&self, count: usize) {
        let mut dropped = self.lock_dropped();
        let count = count.min(dropped.len());
        dropped.drain(..count);
    }

    /// Creates a table from a backup header, or brings an existing one in
    /// line with it.
    pub(crate) fn restore_table(&self, header: &TableHeader) -> Arc<Table> {
        let mut tables = self.tables.write();
        if let Some(table) = tables.get(&header.name) {
            table.apply_header(header);
            return Arc::clone(table);
        }
        let table = Arc::new(Table::from_header(
            header,
            Arc::clone(&self.listener),
            self.table_span(&header.name),
        ));
        tables.insert(header.name.clone(), Arc::clone(&table));
        debug!(parent: &self.span, table = %header.name, "restored table");
        table
    }

    /// Removes a table during restore, without tracking the drop.
    pub(crate) fn restore_drop(&self, name: &str) {
        self.tables.write().remove(name);
    }
}

/// Resolves `path`, following `..` and symlinks, and checks that it lies
/// inside `allowed_dir`. A file that does not exist yet is resolved through
/// its parent directory.
fn confine(path: &Path, allowed_dir: &Path) -> Result<PathBuf> {
    let allowed = fs::canonicalize(allowed_dir).map_err(StorageError::from)?;
    let resolved = if path.exists() {
        fs::canonicalize(path).map_err(StorageError::from)?
    } else {
        let name = path.file_name().ok_or_else(|| {
            Error::invalid_input(format!("'{}' does not name a file", path.display()))
        })?;
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::canonicalize(parent).map_err(StorageError::from)?.join(name)
    };

    if resolved.starts_with(&allowed) {
        Ok(resolved)
    } else {
        Err(Error::invalid_input(format!(
            "path '{}' is outside the allowed directory '{}'",
            path.display(),
            allowed_dir.display()
        )))
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").field("tables", &self.list_tables()).finish_non_exhaustive()
    }
}
