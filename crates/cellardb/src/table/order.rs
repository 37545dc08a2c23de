//! Result ordering with bounded top-k selection.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use cellardb_core::{Record, Value};

use super::query::SortKey;

static NULL: Value = Value::Null;

/// Compares two records by the sort keys. Values of different kinds order
/// by kind rank; missing fields order as `Null`.
pub(crate) fn compare_records(a: &Record, b: &Record, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let left = a.get(&key.field).unwrap_or(&NULL);
        let right = b.get(&key.field).unwrap_or(&NULL);
        let ord = if key.descending { right.cmp(left) } else { left.cmp(right) };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// A row tagged with its input position, so equal rows keep input order.
struct Ranked<'k> {
    row: Arc<Record>,
    position: usize,
    keys: &'k [SortKey],
}

impl Ord for Ranked<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_records(&self.row, &other.row, self.keys).then(self.position.cmp(&other.position))
    }
}

impl PartialOrd for Ranked<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked<'_> {}

/// Orders rows by `keys`, stably.
///
/// With `top_k`, only the first `k` rows of the sorted order are kept, using
/// a bounded max-heap instead of sorting everything. The result is always a
/// prefix of the full stable sort.
pub(crate) fn sort_rows(
    mut rows: Vec<Arc<Record>>,
    keys: &[SortKey],
    top_k: Option<usize>,
) -> Vec<Arc<Record>> {
    if keys.is_empty() {
        return rows;
    }

    let Some(k) = top_k.filter(|k| *k < rows.len()) else {
        rows.sort_by(|a, b| compare_records(a, b, keys));
        return rows;
    };
    if k == 0 {
        return Vec::new();
    }

    let mut heap = BinaryHeap::with_capacity(k + 1);
    for (position, row) in rows.into_iter().enumerate() {
        let ranked = Ranked { row, position, keys };
        if heap.len() < k {
            heap.push(ranked);
        } else if heap.peek().is_some_and(|worst| ranked < *worst) {
            heap.pop();
            heap.push(ranked);
        }
    }
    heap.into_sorted_vec().into_iter().map(|ranked| ranked.row).collect()
}
