//! Sorted index: ordered value to key-set.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use super::{FieldIndex, IndexKind};
use crate::record::PrimaryKey;
use crate::value::{Value, ValueKind};

/// An ordered index supporting equality and range scans.
///
/// Range scans are restricted to the kind of their bounds: a scan over
/// numbers never yields strings, matching how predicates compare values.
#[derive(Debug, Default)]
pub struct SortedIndex {
    entries: BTreeMap<Value, BTreeSet<PrimaryKey>>,
    len: usize,
}

/// A range resolved to owned bounds within a single value kind.
struct KindRange {
    start: Bound<Value>,
    end: Bound<Value>,
    kind: ValueKind,
}

fn bound_value<'a>(bound: &Bound<&'a Value>) -> Option<&'a Value> {
    match bound {
        Bound::Included(v) | Bound::Excluded(v) => Some(v),
        Bound::Unbounded => None,
    }
}

fn resolve(lo: Bound<&Value>, hi: Bound<&Value>) -> Option<KindRange> {
    let kind = match (bound_value(&lo), bound_value(&hi)) {
        (Some(a), Some(b)) => {
            if a.kind() != b.kind() {
                return None;
            }
            match a.cmp(b) {
                std::cmp::Ordering::Greater => return None,
                std::cmp::Ordering::Equal
                    if matches!(lo, Bound::Excluded(_)) || matches!(hi, Bound::Excluded(_)) =>
                {
                    return None
                }
                _ => {}
            }
            a.kind()
        }
        (Some(a), None) | (None, Some(a)) => a.kind(),
        (None, None) => return None,
    };
    if !kind.is_orderable() {
        return None;
    }
    let start = match lo {
        Bound::Unbounded => Bound::Included(kind.floor()),
        other => other.cloned(),
    };
    Some(KindRange { start, end: hi.cloned(), kind })
}

impl SortedIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn scan(
        &self,
        lo: Bound<&Value>,
        hi: Bound<&Value>,
    ) -> impl Iterator<Item = &BTreeSet<PrimaryKey>> + '_ {
        let range = resolve(lo, hi);
        range.into_iter().flat_map(move |r| {
            let kind = r.kind;
            self.entries
                .range((r.start, r.end))
                .take_while(move |(value, _)| value.kind() == kind)
                .map(|(_, keys)| keys)
        })
    }

    /// The smallest indexed value.
    #[must_use]
    pub fn min_value(&self) -> Option<&Value> {
        self.entries.keys().next()
    }

    /// The largest indexed value.
    #[must_use]
    pub fn max_value(&self) -> Option<&Value> {
        self.entries.keys().next_back()
    }
}

impl FieldIndex for SortedIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Sorted
    }

    fn insert(&mut self, value: &Value, pk: &PrimaryKey) {
        if self.entries.entry(value.clone()).or_default().insert(pk.clone()) {
            self.len += 1;
        }
    }

    fn remove(&mut self, value: &Value, pk: &PrimaryKey) -> bool {
        let Some(keys) = self.entries.get_mut(value) else {
            return false;
        };
        let removed = keys.remove(pk);
        if keys.is_empty() {
            self.entries.remove(value);
        }
        if removed {
            self.len -= 1;
        }
        removed
    }

    fn lookup_equal(&self, value: &Value) -> BTreeSet<PrimaryKey> {
        self.entries.get(value).cloned().unwrap_or_default()
    }

    fn count_equal(&self, value: &Value) -> usize {
        self.entries.get(value).map_or(0, BTreeSet::len)
    }

    fn supports_range(&self) -> bool {
        true
    }

    fn lookup_range(&self, lo: Bound<&Value>, hi: Bound<&Value>) -> Option<Vec<PrimaryKey>> {
        Some(self.scan(lo, hi).flat_map(|keys| keys.iter().cloned()).collect())
    }

    fn count_range(&self, lo: Bound<&Value>, hi: Bound<&Value>, cap: usize) -> Option<usize> {
        let mut count = 0;
        for keys in self.scan(lo, hi) {
            count += keys.len();
            if count > cap {
                break;
            }
        }
        Some(count)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn distinct_values(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.len = 0;
    }
}
