//! Secondary indexes over a single record field.
//!
//! Two index kinds share the [`FieldIndex`] capability set:
//!
//! - [`HashIndex`]: value to key-set map. O(1) equality and `IN` probes.
//! - [`SortedIndex`]: ordered map. O(log n) equality and O(log n + k) range scans.
//!
//! Indexes hold entries only for records whose field is present and not
//! `Null`. A table keeps its indexes consistent with its records by calling
//! [`FieldIndex::insert`], [`FieldIndex::remove`] and [`FieldIndex::update`]
//! inside the same critical section as the record mutation.
//!
//! # Example
//!
//! ```
//! use std::ops::Bound;
//! use cellardb_core::{IndexKind, PrimaryKey, Value};
//!
//! let mut index = IndexKind::Sorted.build();
//! for (pk, age) in [(1, 30i64), (2, 10), (3, 50), (4, 20), (5, 40)] {
//!     index.insert(&Value::Int(age), &PrimaryKey::int(pk));
//! }
//!
//! let hits = index
//!     .lookup_range(Bound::Included(&Value::Int(20)), Bound::Included(&Value::Int(40)))
//!     .expect("sorted indexes support ranges");
//! assert_eq!(hits, vec![PrimaryKey::int(4), PrimaryKey::int(1), PrimaryKey::int(5)]);
//! ```

mod hash;
mod sorted;


use std::collections::BTreeSet;
use std::fmt;
use std::ops::Bound;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::record::PrimaryKey;
use crate::value::Value;

pub use hash::HashIndex;
pub use sorted::SortedIndex;

/// The kind of a field index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Hash index: equality and `IN` lookups.
    #[default]
    Hash,
    /// Sorted index: equality and range lookups.
    Sorted,
}

impl IndexKind {
    /// Builds an empty index of this kind.
    #[must_use]
    pub fn build(self) -> Box<dyn FieldIndex> {
        match self {
            Self::Hash => Box::new(HashIndex::new()),
            Self::Sorted => Box::new(SortedIndex::new()),
        }
    }

    /// The kind's name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::Sorted => "sorted",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndexKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "sorted" | "btree" => Ok(Self::Sorted),
            other => Err(CoreError::Validation(format!("unsupported index type '{other}'"))),
        }
    }
}

/// The capability set shared by every field index.
pub trait FieldIndex: fmt::Debug + Send + Sync {
    /// The kind of this index.
    fn kind(&self) -> IndexKind;

    /// Records that `pk` holds `value`.
    fn insert(&mut self, value: &Value, pk: &PrimaryKey);

    /// Forgets that `pk` holds `value`. Returns `true` if the entry existed.
    fn remove(&mut self, value: &Value, pk: &PrimaryKey) -> bool;

    /// Moves `pk` from `old` to `new` as one step.
    fn update(&mut self, old: &Value, new: &Value, pk: &PrimaryKey) {
        if old != new {
            self.remove(old, pk);
            self.insert(new, pk);
        }
    }

    /// Keys whose value equals `value`.
    fn lookup_equal(&self, value: &Value) -> BTreeSet<PrimaryKey>;

    /// Number of keys whose value equals `value`.
    fn count_equal(&self, value: &Value) -> usize;

    /// Returns `true` if any key holds `value`.
    fn contains(&self, value: &Value) -> bool {
        self.count_equal(value) > 0
    }

    /// Returns `true` if [`FieldIndex::lookup_range`] is supported.
    fn supports_range(&self) -> bool {
        false
    }

    /// Keys whose value lies between the bounds, ordered by value then key.
    ///
    /// Only values of the bounds' kind are returned. Returns `None` when the
    /// index cannot answer range queries.
    fn lookup_range(&self, _lo: Bound<&Value>, _hi: Bound<&Value>) -> Option<Vec<PrimaryKey>> {
        None
    }

    /// Counts the keys [`FieldIndex::lookup_range`] would return, stopping once
    /// the count exceeds `cap`.
    fn count_range(&self, _lo: Bound<&Value>, _hi: Bound<&Value>, _cap: usize) -> Option<usize> {
        None
    }

    /// Total number of (value, key) entries.
    fn len(&self) -> usize;

    /// Returns `true` if the index has no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct values.
    fn distinct_values(&self) -> usize;

    /// Removes every entry.
    fn clear(&mut self);
}

/// Selectivity statistics for an index, used when reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    /// The index kind.
    pub kind: IndexKind,
    /// Total entries.
    pub entries: usize,
    /// Distinct values.
    pub distinct_values: usize,
}

impl IndexStats {
    /// Collects statistics from an index.
    #[must_use]
    pub fn of(index: &dyn FieldIndex) -> Self {
        Self { kind: index.kind(), entries: index.len(), distinct_values: index.distinct_values() }
    }

    /// Average number of keys per distinct value (lower is more selective).
    #[must_use]
    pub fn selectivity(&self) -> f64 {
        if self.distinct_values == 0 {
            0.0
        } else {
            self.entries as f64 / self.distinct_values as f64
        }
    }
}
