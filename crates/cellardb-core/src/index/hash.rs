//! Hash index: value to key-set.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::{FieldIndex, IndexKind};
use crate::record::PrimaryKey;
use crate::value::Value;

/// An equality index backed by a hash map of value to key set.
///
/// Removing the last key for a value drops the bucket.
#[derive(Debug, Default)]
pub struct HashIndex {
    buckets: HashMap<Value, HashSet<PrimaryKey>>,
    len: usize,
}

impl HashIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FieldIndex for HashIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Hash
    }

    fn insert(&mut self, value: &Value, pk: &PrimaryKey) {
        if self.buckets.entry(value.clone()).or_default().insert(pk.clone()) {
            self.len += 1;
        }
    }

    fn remove(&mut self, value: &Value, pk: &PrimaryKey) -> bool {
        let Some(bucket) = self.buckets.get_mut(value) else {
            return false;
        };
        let removed = bucket.remove(pk);
        if bucket.is_empty() {
            self.buckets.remove(value);
        }
        if removed {
            self.len -= 1;
        }
        removed
    }

    fn lookup_equal(&self, value: &Value) -> BTreeSet<PrimaryKey> {
        self.buckets.get(value).map(|b| b.iter().cloned().collect()).unwrap_or_default()
    }

    fn count_equal(&self, value: &Value) -> usize {
        self.buckets.get(value).map_or(0, HashSet::len)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn distinct_values(&self) -> usize {
        self.buckets.len()
    }

    fn clear(&mut self) {
        self.buckets.clear();
        self.len = 0;
    }
}
