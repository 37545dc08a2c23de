//! Predicate trees for selecting records.
//!
//! A [`Condition`] is a tree of field tests combined with AND/OR/NOT. It is
//! evaluated against a [`Record`] by [`Condition::matches`], and query planners
//! pattern-match on its variants to pick an index.
//!
//! # Example
//!
//! ```
//! use cellardb_core::{Condition, Record};
//!
//! let adults_named_a = Condition::and([
//!     Condition::ge("age", 18i64),
//!     Condition::starts_with("name", "A"),
//! ]);
//!
//! assert!(adults_named_a.matches(&Record::new().with("name", "Ada").with("age", 36i64)));
//! assert!(!adults_named_a.matches(&Record::new().with("name", "Bob").with("age", 36i64)));
//! ```
//!
//! # Semantics
//!
//! - A missing field reads as `Null`, so `eq(field, Value::Null)` and `is_null`
//!   match records without the field.
//! - Ordering tests (`lt`, `le`, `gt`, `ge`, `between`) only hold between
//!   values of the same orderable kind; anything else is simply false.

use std::cmp::Ordering;
use std::fmt;

use crate::record::Record;
use crate::value::Value;

static NULL: Value = Value::Null;

/// A binary comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// Applies the operator to a field value and an operand.
    #[must_use]
    pub fn apply(self, left: &Value, right: &Value) -> bool {
        match self {
            Self::Eq => left == right,
            Self::Ne => left != right,
            Self::Lt => left.compare(right) == Some(Ordering::Less),
            Self::Le => matches!(left.compare(right), Some(Ordering::Less | Ordering::Equal)),
            Self::Gt => left.compare(right) == Some(Ordering::Greater),
            Self::Ge => matches!(left.compare(right), Some(Ordering::Greater | Ordering::Equal)),
        }
    }

    /// The operator's symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// A predicate over a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field compared to a value.
    Compare {
        /// The field name.
        field: String,
        /// The operator.
        op: CompareOp,
        /// The right-hand operand.
        value: Value,
    },
    /// Field equals one of the values.
    In {
        /// The field name.
        field: String,
        /// The accepted values.
        values: Vec<Value>,
    },
    /// Field lies in the closed range `[lo, hi]`.
    Between {
        /// The field name.
        field: String,
        /// Inclusive lower bound.
        lo: Value,
        /// Inclusive upper bound.
        hi: Value,
    },
    /// Field is missing or null.
    IsNull {
        /// The field name.
        field: String,
    },
    /// Field is present and not null.
    IsNotNull {
        /// The field name.
        field: String,
    },
    /// String field contains a substring, or list field contains an element.
    Contains {
        /// The field name.
        field: String,
        /// The substring or element.
        value: Value,
    },
    /// String field starts with a prefix.
    StartsWith {
        /// The field name.
        field: String,
        /// The prefix.
        prefix: String,
    },
    /// String field ends with a suffix.
    EndsWith {
        /// The field name.
        field: String,
        /// The suffix.
        suffix: String,
    },
    /// Negation.
    Not(Box<Condition>),
    /// All conditions hold. An empty `And` matches every record.
    And(Vec<Condition>),
    /// At least one condition holds. An empty `Or` matches nothing.
    Or(Vec<Condition>),
}

impl Condition {
    /// A condition matching every record.
    #[must_use]
    pub const fn all() -> Self {
        Self::And(Vec::new())
    }

    /// Creates a comparison.
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare { field: field.into(), op, value: value.into() }
    }

    /// `field == value`
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    /// `field != value`
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    /// `field < value`
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    /// `field <= value`
    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Le, value)
    }

    /// `field > value`
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    /// `field >= value`
    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ge, value)
    }

    /// Field equals any of the values.
    pub fn is_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In { field: field.into(), values: values.into_iter().map(Into::into).collect() }
    }

    /// `lo <= field <= hi`
    pub fn between(
        field: impl Into<String>,
        lo: impl Into<Value>,
        hi: impl Into<Value>,
    ) -> Self {
        Self::Between { field: field.into(), lo: lo.into(), hi: hi.into() }
    }

    /// Field is missing or null.
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::IsNull { field: field.into() }
    }

    /// Field is present and not null.
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::IsNotNull { field: field.into() }
    }

    /// Substring or list-membership test.
    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Contains { field: field.into(), value: value.into() }
    }

    /// String prefix test.
    pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::StartsWith { field: field.into(), prefix: prefix.into() }
    }

    /// String suffix test.
    pub fn ends_with(field: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self::EndsWith { field: field.into(), suffix: suffix.into() }
    }

    /// Conjunction of conditions.
    pub fn and(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self::And(conditions.into_iter().collect())
    }

    /// Disjunction of conditions.
    pub fn or(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self::Or(conditions.into_iter().collect())
    }

    /// Negation of a condition.
    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Self {
        Self::Not(Box::new(condition))
    }

    /// Combine this condition with another using AND.
    #[must_use]
    pub fn and_then(self, other: Condition) -> Self {
        match self {
            Self::And(mut conditions) => {
                conditions.push(other);
                Self::And(conditions)
            }
            _ => Self::And(vec![self, other]),
        }
    }

    /// Combine this condition with another using OR.
    #[must_use]
    pub fn or_else(self, other: Condition) -> Self {
        match self {
            Self::Or(mut conditions) => {
                conditions.push(other);
                Self::Or(conditions)
            }
            _ => Self::Or(vec![self, other]),
        }
    }

    /// Negate this condition.
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    /// Evaluates this condition against a record.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        let read = |field: &str| record.get(field).unwrap_or(&NULL);
        match self {
            Self::Compare { field, op, value } => op.apply(read(field), value),
            Self::In { field, values } => {
                let actual = read(field);
                values.iter().any(|v| v == actual)
            }
            Self::Between { field, lo, hi } => {
                let actual = read(field);
                matches!(actual.compare(lo), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(actual.compare(hi), Some(Ordering::Less | Ordering::Equal))
            }
            Self::IsNull { field } => read(field).is_null(),
            Self::IsNotNull { field } => !read(field).is_null(),
            Self::Contains { field, value } => match (read(field), value) {
                (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
                (Value::List(items), needle) => items.contains(needle),
                _ => false,
            },
            Self::StartsWith { field, prefix } => {
                read(field).as_str().is_some_and(|s| s.starts_with(prefix.as_str()))
            }
            Self::EndsWith { field, suffix } => {
                read(field).as_str().is_some_and(|s| s.ends_with(suffix.as_str()))
            }
            Self::Not(inner) => !inner.matches(record),
            Self::And(conditions) => conditions.iter().all(|c| c.matches(record)),
            Self::Or(conditions) => conditions.iter().any(|c| c.matches(record)),
        }
    }

    /// Collects the names of every field this condition reads.
    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Compare { field, .. }
            | Self::In { field, .. }
            | Self::Between { field, .. }
            | Self::IsNull { field }
            | Self::IsNotNull { field }
            | Self::Contains { field, .. }
            | Self::StartsWith { field, .. }
            | Self::EndsWith { field, .. } => out.push(field),
            Self::Not(inner) => inner.collect_fields(out),
            Self::And(conditions) | Self::Or(conditions) => {
                for c in conditions {
                    c.collect_fields(out);
                }
            }
        }
    }
}

impl std::ops::Not for Condition {
    type Output = Self;

    fn not(self) -> Self {
        self.negate()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[Condition], sep: &str) -> fmt::Result {
            write!(f, "(")?;
            for (i, c) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, " {sep} ")?;
                }
                write!(f, "{c}")?;
            }
            write!(f, ")")
        }

        match self {
            Self::Compare { field, op, value } => write!(f, "{field} {} {value}", op.symbol()),
            Self::In { field, values } => write!(f, "{field} IN {}", Value::List(values.clone())),
            Self::Between { field, lo, hi } => write!(f, "{field} BETWEEN {lo} AND {hi}"),
            Self::IsNull { field } => write!(f, "{field} IS NULL"),
            Self::IsNotNull { field } => write!(f, "{field} IS NOT NULL"),
            Self::Contains { field, value } => write!(f, "{field} CONTAINS {value}"),
            Self::StartsWith { field, prefix } => write!(f, "{field} STARTS WITH {prefix:?}"),
            Self::EndsWith { field, suffix } => write!(f, "{field} ENDS WITH {suffix:?}"),
            Self::Not(inner) => write!(f, "NOT {inner}"),
            Self::And(items) if items.is_empty() => write!(f, "TRUE"),
            Self::Or(items) if items.is_empty() => write!(f, "FALSE"),
            Self::And(items) => join(f, items, "AND"),
            Self::Or(items) => join(f, items, "OR"),
        }
    }
}
