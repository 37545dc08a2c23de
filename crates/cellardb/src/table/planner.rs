//! Index selection for filtered reads and writes.
//!
//! The planner looks at the top level of a [`Condition`] and, where an index
//! can answer it, produces an [`AccessPath`] naming a candidate key set
//! smaller than the table. Candidates are always re-checked against the full
//! condition, so a plan only has to be a superset of the matches.
//!
//! | Condition                                | Index needed  |
//! |------------------------------------------|---------------|
//! | `field == v` (v not null), `field IN vs` | hash or sorted|
//! | `<`, `<=`, `>`, `>=`, `BETWEEN`          | sorted        |
//! | `AND`                                    | any conjunct  |
//! | `OR`                                     | every branch  |

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use cellardb_core::{CompareOp, Condition, FieldIndex, PrimaryKey, Value};

/// How a filtered operation finds its candidates.
#[derive(Debug)]
pub(crate) enum AccessPath<'a> {
    /// Probe one index for a single value.
    Equal { index: &'a dyn FieldIndex, value: &'a Value },
    /// Probe one index for each of several values.
    AnyOf { index: &'a dyn FieldIndex, values: &'a [Value] },
    /// One bounded scan of a sorted index.
    Range { index: &'a dyn FieldIndex, lo: Bound<&'a Value>, hi: Bound<&'a Value> },
    /// The union of several paths.
    Union(Vec<AccessPath<'a>>),
}

impl AccessPath<'_> {
    /// Number of candidates, counting at most a little past `cap`.
    pub(crate) fn estimate(&self, cap: usize) -> usize {
        match self {
            Self::Equal { index, value } => index.count_equal(value),
            Self::AnyOf { index, values } => {
                let mut total = 0usize;
                for value in *values {
                    total = total.saturating_add(index.count_equal(value));
                    if total > cap {
                        break;
                    }
                }
                total
            }
            Self::Range { index, lo, hi } => {
                index.count_range(*lo, *hi, cap).unwrap_or(usize::MAX)
            }
            Self::Union(paths) => {
                let mut total = 0usize;
                for path in paths {
                    total = total.saturating_add(path.estimate(cap.saturating_sub(total)));
                    if total > cap {
                        break;
                    }
                }
                total
            }
        }
    }

    /// Candidate keys in primary-key order.
    pub(crate) fn candidates(&self) -> BTreeSet<PrimaryKey> {
        match self {
            Self::Equal { index, value } => index.lookup_equal(value),
            Self::AnyOf { index, values } => {
                values.iter().flat_map(|value| index.lookup_equal(value)).collect()
            }
            Self::Range { index, lo, hi } => {
                index.lookup_range(*lo, *hi).unwrap_or_default().into_iter().collect()
            }
            Self::Union(paths) => paths.iter().flat_map(AccessPath::candidates).collect(),
        }
    }

    /// A short label for logs.
    pub(crate) const fn name(&self) -> &'static str {
        match self {
            Self::Equal { .. } => "index-equal",
            Self::AnyOf { .. } => "index-in",
            Self::Range { .. } => "index-range",
            Self::Union(_) => "index-union",
        }
    }
}

/// Chooses an access path for `condition`, or `None` for a full scan.
pub(crate) fn plan<'a>(
    condition: &'a Condition,
    indexes: &'a BTreeMap<String, Box<dyn FieldIndex>>,
) -> Option<AccessPath<'a>> {
    let index_on = |field: &str| indexes.get(field).map(AsRef::as_ref);
    let sorted_on = |field: &str| index_on(field).filter(|index| index.supports_range());

    match condition {
        // Indexes hold no nulls, and a missing field equals null.
        Condition::Compare { value: Value::Null, .. } => None,
        Condition::Compare { field, op, value } => {
            let (lo, hi) = match op {
                CompareOp::Eq => {
                    return index_on(field).map(|index| AccessPath::Equal { index, value })
                }
                CompareOp::Ne => return None,
                CompareOp::Lt => (Bound::Unbounded, Bound::Excluded(value)),
                CompareOp::Le => (Bound::Unbounded, Bound::Included(value)),
                CompareOp::Gt => (Bound::Excluded(value), Bound::Unbounded),
                CompareOp::Ge => (Bound::Included(value), Bound::Unbounded),
            };
            sorted_on(field).map(|index| AccessPath::Range { index, lo, hi })
        }
        Condition::In { field, values } => {
            if values.iter().any(Value::is_null) {
                return None;
            }
            index_on(field).map(|index| AccessPath::AnyOf { index, values })
        }
        Condition::Between { field, lo, hi } => sorted_on(field).map(|index| AccessPath::Range {
            index,
            lo: Bound::Included(lo),
            hi: Bound::Included(hi),
        }),
        Condition::And(conditions) => {
            let mut best: Option<(usize, AccessPath<'a>)> = None;
            for path in conditions.iter().filter_map(|c| plan(c, indexes)) {
                let cap = best.as_ref().map_or(usize::MAX, |(count, _)| *count);
                let count = path.estimate(cap);
                if count < cap || best.is_none() {
                    best = Some((count, path));
                }
            }
            best.map(|(_, path)| path)
        }
        Condition::Or(conditions) if !conditions.is_empty() => conditions
            .iter()
            .map(|c| plan(c, indexes))
            .collect::<Option<Vec<_>>>()
            .map(AccessPath::Union),
        _ => None,
    }
}
