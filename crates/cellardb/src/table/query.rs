//! Select options: filtering, ordering, paging and projection.

use std::collections::HashSet;
use std::sync::Arc;

use cellardb_core::{Condition, Record, Value};

/// One ordering key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// The field to order by. Missing fields order as `Null`.
    pub field: String,
    /// Descending instead of ascending.
    pub descending: bool,
}

impl SortKey {
    /// Ascending order on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), descending: false }
    }

    /// Descending order on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), descending: true }
    }

    /// Parses `"field"` (ascending) or `"-field"` (descending).
    pub fn parse(spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(field) => Self::desc(field),
            None => Self::asc(spec),
        }
    }
}

impl From<&str> for SortKey {
    fn from(spec: &str) -> Self {
        Self::parse(spec)
    }
}

/// Output columns: `(alias, source field)` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    columns: Vec<(String, String)>,
}

impl Projection {
    /// Keeps the named fields under their own names.
    pub fn fields<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        let columns = names
            .into_iter()
            .map(|name| {
                let name = name.into();
                (name.clone(), name)
            })
            .collect();
        Self { columns }
    }

    /// Renames fields: each pair is `(alias, source field)`.
    pub fn aliased<A: Into<String>, F: Into<String>>(
        pairs: impl IntoIterator<Item = (A, F)>,
    ) -> Self {
        Self { columns: pairs.into_iter().map(|(a, f)| (a.into(), f.into())).collect() }
    }

    /// Builds the projected record. Missing source fields become `Null`.
    pub fn apply(&self, record: &Record) -> Record {
        self.columns
            .iter()
            .map(|(alias, field)| (alias.clone(), record.get(field).cloned().unwrap_or(Value::Null)))
            .collect()
    }
}

/// Options for [`Table::select`](crate::Table::select).
///
/// # Example
///
/// ```
/// use cellardb::{Condition, Select};
///
/// let query = Select::new()
///     .filter(Condition::ge("age", 18i64))
///     .order_by(["-age", "name"])
///     .limit(10)
///     .columns(["name", "age"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Select {
    pub(crate) filter: Option<Condition>,
    pub(crate) order_by: Vec<SortKey>,
    pub(crate) limit: Option<usize>,
    pub(crate) offset: usize,
    pub(crate) distinct: bool,
    pub(crate) projection: Option<Projection>,
}

impl Select {
    /// Selects every record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects records matching `condition`.
    #[must_use]
    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(condition);
        self
    }

    /// Orders by field specs such as `"age"` or `"-age"`.
    #[must_use]
    pub fn order_by<K: Into<SortKey>>(mut self, keys: impl IntoIterator<Item = K>) -> Self {
        self.order_by = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Returns at most `limit` records.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` records.
    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Drops duplicate output records, keeping the first of each.
    #[must_use]
    pub const fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Projects onto the named fields.
    #[must_use]
    pub fn columns<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.projection = Some(Projection::fields(names));
        self
    }

    /// Projects with aliases: each pair is `(alias, source field)`.
    #[must_use]
    pub fn columns_as<A: Into<String>, F: Into<String>>(
        mut self,
        pairs: impl IntoIterator<Item = (A, F)>,
    ) -> Self {
        self.projection = Some(Projection::aliased(pairs));
        self
    }

    /// How many matches filtering can stop after, if ordering and
    /// de-duplication do not need the full set.
    pub(crate) fn early_stop(&self) -> Option<usize> {
        if self.order_by.is_empty() && !self.distinct {
            self.limit.map(|limit| limit.saturating_add(self.offset))
        } else {
            None
        }
    }

    /// The top-k bound, when ordering can use a bounded heap.
    pub(crate) fn top_k(&self) -> Option<usize> {
        if self.order_by.is_empty() || self.distinct {
            None
        } else {
            self.limit.map(|limit| limit.saturating_add(self.offset))
        }
    }

    /// Applies projection, de-duplication and paging to ordered rows.
    pub(crate) fn finish(&self, rows: Vec<Arc<Record>>) -> Vec<Arc<Record>> {
        let limit = self.limit.unwrap_or(usize::MAX);
        let project = |row: Arc<Record>| match &self.projection {
            Some(projection) => Arc::new(projection.apply(&row)),
            None => row,
        };

        if !self.distinct {
            return rows.into_iter().skip(self.offset).take(limit).map(project).collect();
        }

        let mut seen: HashSet<Arc<Record>> = HashSet::new();
        rows.into_iter()
            .map(project)
            .filter(|row| seen.insert(Arc::clone(row)))
            .skip(self.offset)
            .take(limit)
            .collect()
    }
}
