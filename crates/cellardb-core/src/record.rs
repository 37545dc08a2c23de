//! Records and primary keys.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::value::{Value, ValueKind};

/// An ordered mapping of field name to [`Value`].
///
/// # Example
///
/// ```
/// use cellardb_core::{Record, Value};
///
/// let record = Record::new().with("name", "Alice").with("age", 30i64);
///
/// assert_eq!(record.get("name"), Some(&Value::from("Alice")));
/// assert_eq!(record.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: BTreeMap::new() }
    }

    /// Adds a field, returning the record for chaining.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Returns the value of a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    /// Removes a field, returning its value.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Returns `true` if the record has the field.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates fields in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    /// Iterates field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Overwrites this record's fields with every field of `changes`.
    pub fn apply(&mut self, changes: &Record) {
        for (field, value) in changes {
            self.fields.insert(field.clone(), value.clone());
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

impl From<BTreeMap<String, Value>> for Record {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }
}

impl From<Record> for BTreeMap<String, Value> {
    fn from(record: Record) -> Self {
        record.fields
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// The unique identifier of a record within a table.
///
/// A primary key is an integer or a string value. Integer keys order before
/// string keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct PrimaryKey(Value);

impl PrimaryKey {
    /// Creates a primary key, rejecting values that are neither integers nor strings.
    pub fn new(value: Value) -> Result<Self, CoreError> {
        match value {
            Value::Int(_) | Value::String(_) => Ok(Self(value)),
            // An integral float names the same key as its integer.
            Value::Float(f) if Value::Float(f) == Value::Int(f as i64) => {
                Ok(Self(Value::Int(f as i64)))
            }
            other => Err(CoreError::InvalidPrimaryKey(format!(
                "{other} ({}); keys must be int or string",
                other.type_name()
            ))),
        }
    }

    /// Creates an integer key.
    #[inline]
    #[must_use]
    pub const fn int(value: i64) -> Self {
        Self(Value::Int(value))
    }

    /// Creates a string key.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self(Value::String(value.into()))
    }

    /// The key as a value.
    #[inline]
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consumes the key, returning its value.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Returns the integer if this is an integer key.
    #[inline]
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        self.0.as_int()
    }

    /// Returns `true` if this is an integer key.
    #[must_use]
    pub fn is_int(&self) -> bool {
        self.0.kind() == ValueKind::Number
    }
}

impl TryFrom<Value> for PrimaryKey {
    type Error = CoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PrimaryKey> for Value {
    fn from(key: PrimaryKey) -> Self {
        key.0
    }
}

impl From<i64> for PrimaryKey {
    fn from(value: i64) -> Self {
        Self::int(value)
    }
}

impl From<&str> for PrimaryKey {
    fn from(value: &str) -> Self {
        Self::string(value)
    }
}

impl From<String> for PrimaryKey {
    fn from(value: String) -> Self {
        Self::string(value)
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
