//! Tables: records, indexes and filtered CRUD.
//!
//! A [`Table`] owns its records and indexes behind one writer-preferring
//! [`RwLock`]. Every mutation updates the records, every affected index and
//! the dirty tracker inside the same write section, so readers and backups
//! never see an index out of step with the records.
//!
//! # Example
//!
//! ```
//! use cellardb::{Condition, IndexKind, Record, Select, Table};
//!
//! let people = Table::new("people", "id", None);
//! people.create_index("age", IndexKind::Sorted)?;
//! for age in [30i64, 10, 50, 20, 40] {
//!     people.insert(Record::new().with("age", age))?;
//! }
//!
//! let hits = people.select(&Select::new().filter(Condition::between("age", 20i64, 40i64)));
//! assert_eq!(hits.len(), 3);
//! # Ok::<(), cellardb::Error>(())
//! ```

mod dirty;
mod order;
mod planner;
mod query;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cellardb_core::{
    Condition, CoreError, FieldIndex, FieldType, IndexKind, IndexStats, PrimaryKey, Record,
    Schema, Value,
};
use cellardb_storage::{IndexDefinition, TableHeader};
use tracing::{debug, trace, Span};

use crate::error::{Error, Result};
use crate::lock::RwLock;

pub use query::{Projection, Select, SortKey};

use dirty::{ChangeKind, DirtyTracker};

/// Callback run after a successful mutation, with the table name.
pub type ChangeListener = Arc<dyn Fn(&str) + Send + Sync>;

/// A listener slot shared between a database and its tables.
pub(crate) type ListenerSlot = Arc<Mutex<Option<ChangeListener>>>;

/// The lock-protected part of a table.
#[derive(Debug)]
struct TableData {
    records: BTreeMap<PrimaryKey, Arc<Record>>,
    indexes: BTreeMap<String, Box<dyn FieldIndex>>,
    next_auto_pk: i64,
}

fn indexed_value<'r>(record: &'r Record, field: &str) -> Option<&'r Value> {
    record.get(field).filter(|value| !value.is_null())
}

impl TableData {
    fn link(&mut self, key: &PrimaryKey, record: &Record) {
        for (field, index) in &mut self.indexes {
            if let Some(value) = indexed_value(record, field) {
                index.insert(value, key);
            }
        }
    }

    fn unlink(&mut self, key: &PrimaryKey, record: &Record) {
        for (field, index) in &mut self.indexes {
            if let Some(value) = indexed_value(record, field) {
                index.remove(value, key);
            }
        }
    }

    fn relink(&mut self, key: &PrimaryKey, old: &Record, new: &Record) {
        for (field, index) in &mut self.indexes {
            match (indexed_value(old, field), indexed_value(new, field)) {
                (Some(a), Some(b)) => index.update(a, b, key),
                (Some(a), None) => {
                    index.remove(a, key);
                }
                (None, Some(b)) => index.insert(b, key),
                (None, None) => {}
            }
        }
    }

    fn build_index(&self, field: &str, kind: IndexKind) -> Box<dyn FieldIndex> {
        let mut index = kind.build();
        for (key, record) in &self.records {
            if let Some(value) = indexed_value(record, field) {
                index.insert(value, key);
            }
        }
        index
    }

    /// Live records matching `condition`, in primary-key order, stopping
    /// after `stop_after` matches.
    fn scan<'d>(
        &'d self,
        condition: Option<&Condition>,
        stop_after: Option<usize>,
        span: &Span,
    ) -> Vec<(&'d PrimaryKey, &'d Arc<Record>)> {
        let limit = stop_after.unwrap_or(usize::MAX);
        let Some(condition) = condition else {
            return self.records.iter().take(limit).collect();
        };

        match planner::plan(condition, &self.indexes) {
            Some(path) => {
                let candidates = path.candidates();
                trace!(parent: span, path = path.name(), candidates = candidates.len(), "index scan");
                candidates
                    .iter()
                    .filter_map(|key| self.records.get_key_value(key))
                    .filter(|(_, record)| condition.matches(record))
                    .take(limit)
                    .collect()
            }
            None => {
                trace!(parent: span, rows = self.records.len(), "full scan");
                self.records
                    .iter()
                    .filter(|(_, record)| condition.matches(record))
                    .take(limit)
                    .collect()
            }
        }
    }

    fn header(&self, table: &Table) -> TableHeader {
        TableHeader {
            name: table.name.clone(),
            primary_key: table.primary_key.clone(),
            schema: table.schema.clone(),
            indexes: self
                .indexes
                .iter()
                .map(|(field, index)| IndexDefinition { field: field.clone(), kind: index.kind() })
                .collect(),
            next_auto_pk: self.next_auto_pk,
        }
    }
}

/// Every live record of a table, copied for a full backup.
#[derive(Debug)]
pub(crate) struct FullCapture {
    pub(crate) header: TableHeader,
    pub(crate) seq: u64,
    pub(crate) records: Vec<(PrimaryKey, Arc<Record>)>,
}

/// The changed keys of a table, copied for a delta backup.
#[derive(Debug)]
pub(crate) struct DeltaCapture {
    pub(crate) header: TableHeader,
    pub(crate) seq: u64,
    pub(crate) upserts: Vec<(u64, PrimaryKey, Arc<Record>)>,
    pub(crate) deletes: Vec<(u64, PrimaryKey)>,
}

impl DeltaCapture {
    pub(crate) fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

/// A named collection of records with optional schema and indexes.
///
/// All methods take `&self`; a table is shared between threads behind an
/// [`Arc`]. Writers are serialized and take priority over new readers.
pub struct Table {
    name: String,
    primary_key: String,
    schema: Option<Schema>,
    data: RwLock<TableData>,
    dirty: Mutex<DirtyTracker>,
    listener: ListenerSlot,
    span: Span,
}

impl Table {
    /// Creates an empty, standalone table.
    ///
    /// When a schema is given and does not declare `primary_key`, the key
    /// field is added as [`FieldType::Int`].
    pub fn new(
        name: impl Into<String>,
        primary_key: impl Into<String>,
        schema: Option<Schema>,
    ) -> Self {
        let name = name.into();
        let span = tracing::debug_span!("table", name = %name);
        Self::with_parts(name, primary_key.into(), schema, ListenerSlot::default(), span)
    }

    pub(crate) fn with_parts(
        name: String,
        primary_key: String,
        mut schema: Option<Schema>,
        listener: ListenerSlot,
        span: Span,
    ) -> Self {
        if let Some(schema) = &mut schema {
            schema.ensure_field(&primary_key, FieldType::Int);
        }
        Self {
            name,
            primary_key,
            schema,
            data: RwLock::new(TableData {
                records: BTreeMap::new(),
                indexes: BTreeMap::new(),
                next_auto_pk: 1,
            }),
            dirty: Mutex::new(DirtyTracker::default()),
            listener,
            span,
        }
    }

    /// Recreates an empty table from a backup header.
    pub(crate) fn from_header(header: &TableHeader, listener: ListenerSlot, span: Span) -> Self {
        let table = Self::with_parts(
            header.name.clone(),
            header.primary_key.clone(),
            header.schema.clone(),
            listener,
            span,
        );
        table.apply_header(header);
        table
    }

    /// The table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The primary-key field name.
    pub fn primary_key_field(&self) -> &str {
        &self.primary_key
    }

    /// The schema, if any.
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Names of the schema fields; empty without a schema.
    pub fn schema_fields(&self) -> Vec<String> {
        self.schema
            .as_ref()
            .map(|schema| schema.field_names().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// Number of live records.
    pub fn count(&self) -> usize {
        self.data.read().records.len()
    }

    /// Column names: the schema fields, or else the sorted union of every
    /// record's fields.
    pub fn columns(&self) -> Vec<String> {
        if let Some(schema) = &self.schema {
            return schema.field_names().map(str::to_owned).collect();
        }
        let data = self.data.read();
        let names: BTreeSet<&str> =
            data.records.values().flat_map(|record| record.field_names()).collect();
        names.into_iter().map(str::to_owned).collect()
    }

    /// Fields that have an index.
    pub fn indexed_fields(&self) -> Vec<String> {
        self.data.read().indexes.keys().cloned().collect()
    }

    /// Returns `true` if `field` has an index.
    pub fn has_index(&self, field: &str) -> bool {
        self.data.read().indexes.contains_key(field)
    }

    /// Statistics for the index on `field`.
    pub fn index_stats(&self, field: &str) -> Option<IndexStats> {
        self.data.read().indexes.get(field).map(|index| IndexStats::of(index.as_ref()))
    }

    /// The next key auto-assignment will hand out.
    pub fn next_auto_pk(&self) -> i64 {
        self.data.read().next_auto_pk
    }

    /// Creates an index on `field`, populated from the existing records.
    ///
    /// Creating an index that already exists with the same kind does
    /// nothing; a different kind replaces it.
    pub fn create_index(&self, field: &str, kind: IndexKind) -> Result<()> {
        if field.is_empty() {
            return Err(Error::invalid_input("index field name must not be empty"));
        }
        let mut data = self.data.write();
        if data.indexes.get(field).is_some_and(|index| index.kind() == kind) {
            return Ok(());
        }
        let index = data.build_index(field, kind);
        debug!(parent: &self.span, field, %kind, entries = index.len(), "created index");
        data.indexes.insert(field.to_owned(), index);
        Ok(())
    }

    /// Drops the index on `field`. Returns `true` if there was one.
    pub fn drop_index(&self, field: &str) -> bool {
        let dropped = self.data.write().indexes.remove(field).is_some();
        if dropped {
            debug!(parent: &self.span, field, "dropped index");
        }
        dropped
    }

    /// Inserts one record and returns its primary key.
    ///
    /// A missing or null key field is filled from the auto-key counter.
    pub fn insert(&self, record: Record) -> Result<PrimaryKey> {
        let mut keys = self.insert_many([record])?;
        keys.pop().ok_or_else(|| Error::invalid_input("insert produced no key"))
    }

    /// Inserts a batch of records atomically: on any validation failure or
    /// key collision nothing is inserted.
    pub fn insert_many(
        &self,
        records: impl IntoIterator<Item = Record>,
    ) -> Result<Vec<PrimaryKey>> {
        let records: Vec<Record> = records.into_iter().collect();
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut data = self.data.write();
        let mut next = data.next_auto_pk;
        let mut staged = Vec::with_capacity(records.len());
        let mut batch_keys = BTreeSet::new();

        for mut record in records {
            let key = match record.get(&self.primary_key) {
                None | Some(Value::Null) => {
                    let key = next;
                    next = next.checked_add(1).ok_or_else(|| {
                        Error::invalid_input(format!("table '{}' ran out of auto keys", self.name))
                    })?;
                    PrimaryKey::int(key)
                }
                Some(value) => PrimaryKey::new(value.clone())?,
            };
            record.set(self.primary_key.clone(), key.as_value().clone());

            if let Some(schema) = &self.schema {
                schema.validate(&record)?;
            }
            if data.records.contains_key(&key) || !batch_keys.insert(key.clone()) {
                return Err(Error::duplicate_key(&self.name, key));
            }
            if let Some(supplied) = key.as_int() {
                next = next.max(supplied.saturating_add(1));
            }
            staged.push((key, record));
        }

        let keys: Vec<PrimaryKey> = staged.iter().map(|(key, _)| key.clone()).collect();
        for (key, record) in staged {
            data.link(&key, &record);
            data.records.insert(key, Arc::new(record));
        }
        data.next_auto_pk = next;
        self.lock_dirty().mark(&keys, ChangeKind::Upsert);
        drop(data);

        if keys.len() > 1 {
            debug!(parent: &self.span, count = keys.len(), "inserted batch");
        }
        self.notify();
        Ok(keys)
    }

    /// Returns a copy of the record with `key`.
    pub fn get(&self, key: &PrimaryKey) -> Option<Record> {
        let shared = self.data.read().records.get(key).map(Arc::clone);
        shared.map(into_owned)
    }

    /// Returns copies of every record, in primary-key order.
    pub fn all(&self) -> Vec<Record> {
        self.select(&Select::new())
    }

    /// Runs a query and returns independent copies of the matching records.
    pub fn select(&self, query: &Select) -> Vec<Record> {
        self.select_shared(query).into_iter().map(into_owned).collect()
    }

    /// Runs a query and returns the stored records without copying them.
    ///
    /// Shared records are immutable: later updates replace the stored
    /// pointer and never change a record already handed out.
    pub fn select_shared(&self, query: &Select) -> Vec<Arc<Record>> {
        let rows: Vec<Arc<Record>> = {
            let data = self.data.read();
            data.scan(query.filter.as_ref(), query.early_stop(), &self.span)
                .into_iter()
                .map(|(_, record)| Arc::clone(record))
                .collect()
        };
        let rows = order::sort_rows(rows, &query.order_by, query.top_k());
        query.finish(rows)
    }

    /// Applies `changes` to every record matching `condition` and returns how
    /// many were updated.
    ///
    /// Every updated record is validated before any is changed; a failure
    /// leaves the table untouched. Matching nothing is
    /// [`Error::RecordNotFound`].
    pub fn update(&self, changes: &Record, condition: &Condition) -> Result<usize> {
        if changes.contains(&self.primary_key) {
            return Err(CoreError::Validation(format!(
                "primary key field '{}' cannot be updated",
                self.primary_key
            ))
            .into());
        }

        let mut data = self.data.write();
        let mut staged = Vec::new();
        for (key, old) in data.scan(Some(condition), None, &self.span) {
            let mut new = Record::clone(old);
            new.apply(changes);
            if let Some(schema) = &self.schema {
                schema.validate(&new)?;
            }
            staged.push((key.clone(), Arc::clone(old), new));
        }
        if staged.is_empty() {
            return Err(Error::record_not_found(&self.name));
        }

        let keys: Vec<PrimaryKey> = staged.iter().map(|(key, _, _)| key.clone()).collect();
        for (key, old, new) in staged {
            data.relink(&key, &old, &new);
            data.records.insert(key, Arc::new(new));
        }
        self.lock_dirty().mark(&keys, ChangeKind::Upsert);
        drop(data);

        debug!(parent: &self.span, count = keys.len(), "updated records");
        self.notify();
        Ok(keys.len())
    }

    /// Deletes every record matching `condition` and returns how many were
    /// deleted. Matching nothing is [`Error::RecordNotFound`].
    pub fn delete(&self, condition: &Condition) -> Result<usize> {
        let mut data = self.data.write();
        let keys: Vec<PrimaryKey> = data
            .scan(Some(condition), None, &self.span)
            .into_iter()
            .map(|(key, _)| key.clone())
            .collect();
        if keys.is_empty() {
            return Err(Error::record_not_found(&self.name));
        }

        for key in &keys {
            if let Some(record) = data.records.remove(key) {
                data.unlink(key, &record);
            }
        }
        self.lock_dirty().mark(&keys, ChangeKind::Delete);
        drop(data);

        debug!(parent: &self.span, count = keys.len(), "deleted records");
        self.notify();
        Ok(keys.len())
    }

    /// Number of keys changed since the last acknowledged backup.
    pub fn pending_changes(&self) -> usize {
        self.lock_dirty().len()
    }

    fn lock_dirty(&self) -> MutexGuard<'_, DirtyTracker> {
        self.dirty.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        let listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(listener) = listener {
            listener(&self.name);
        }
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    pub(crate) fn header(&self) -> TableHeader {
        self.data.read().header(self)
    }

    /// Copies every record under the read lock.
    pub(crate) fn capture_full(&self) -> FullCapture {
        let data = self.data.read();
        let seq = self.lock_dirty().seq();
        FullCapture {
            header: data.header(self),
            seq,
            records: data.records.iter().map(|(k, r)| (k.clone(), Arc::clone(r))).collect(),
        }
    }

    /// Copies the changed keys and their current records under the read lock.
    pub(crate) fn capture_delta(&self) -> DeltaCapture {
        let data = self.data.read();
        let (seq, marks) = self.lock_dirty().capture();
        let mut upserts = Vec::new();
        let mut deletes = Vec::new();
        for (key, mark) in marks {
            match (mark.kind, data.records.get(&key)) {
                (ChangeKind::Upsert, Some(record)) => {
                    upserts.push((mark.seq, key, Arc::clone(record)));
                }
                _ => deletes.push((mark.seq, key)),
            }
        }
        DeltaCapture { header: data.header(self), seq, upserts, deletes }
    }

    /// Forgets changes captured at or before `seq`, once they are on disk.
    pub(crate) fn acknowledge(&self, seq: u64) {
        self.lock_dirty().acknowledge(seq);
    }

    /// Brings indexes and the auto-key counter in line with a backup header.
    pub(crate) fn apply_header(&self, header: &TableHeader) {
        let mut data = self.data.write();
        let wanted: BTreeMap<&str, IndexKind> =
            header.indexes.iter().map(|def| (def.field.as_str(), def.kind)).collect();
        data.indexes.retain(|field, index| wanted.get(field.as_str()) == Some(&index.kind()));
        for (field, kind) in wanted {
            if !data.indexes.contains_key(field) {
                let index = data.build_index(field, kind);
                data.indexes.insert(field.to_owned(), index);
            }
        }
        data.next_auto_pk = data.next_auto_pk.max(header.next_auto_pk);
    }

    /// Replays backed-up changes without validation or dirty marks.
    pub(crate) fn apply_restored(
        &self,
        upserts: impl IntoIterator<Item = (PrimaryKey, Record)>,
        deletes: impl IntoIterator<Item = PrimaryKey>,
        seq: u64,
    ) {
        let mut data = self.data.write();
        for (key, record) in upserts {
            match data.records.get(&key).map(Arc::clone) {
                Some(old) => data.relink(&key, &old, &record),
                None => data.link(&key, &record),
            }
            if let Some(supplied) = key.as_int() {
                data.next_auto_pk = data.next_auto_pk.max(supplied.saturating_add(1));
            }
            data.records.insert(key, Arc::new(record));
        }
        for key in deletes {
            if let Some(record) = data.records.remove(&key) {
                data.unlink(&key, &record);
            }
        }
        let mut dirty = self.lock_dirty();
        if dirty.seq() < seq {
            *dirty = DirtyTracker::starting_at(seq);
        }
    }
}

fn into_owned(record: Arc<Record>) -> Record {
    Arc::try_unwrap(record).unwrap_or_else(|shared| Record::clone(&shared))
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("primary_key", &self.primary_key)
            .field("schema", &self.schema)
            .field("records", &self.count())
            .finish_non_exhaustive()
    }
}
