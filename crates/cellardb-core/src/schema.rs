//! Optional per-table schemas.
//!
//! A [`Schema`] maps field names to a primitive [`FieldType`]. A table with a
//! schema rejects records that miss a declared field, carry a value of the
//! wrong type, or carry a field the schema does not declare.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use crate::value::Value;

/// The primitive type tag of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// UTF-8 string
    String,
    /// 64-bit integer
    Int,
    /// 64-bit float
    Float,
    /// Boolean
    Bool,
    /// List of values
    List,
    /// Map of values
    Map,
}

impl FieldType {
    /// Returns `true` if the value is of this type.
    ///
    /// Types are strict: an integer does not satisfy a float field.
    #[must_use]
    pub const fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::String, Value::String(_))
                | (Self::Int, Value::Int(_))
                | (Self::Float, Value::Float(_))
                | (Self::Bool, Value::Bool(_))
                | (Self::List, Value::List(_))
                | (Self::Map, Value::Map(_))
        )
    }

    /// The type name used in messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Map => "map",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FieldType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(Self::String),
            "int" | "integer" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "bool" | "boolean" => Ok(Self::Bool),
            "list" => Ok(Self::List),
            "map" | "dict" => Ok(Self::Map),
            other => Err(CoreError::Validation(format!("unknown field type '{other}'"))),
        }
    }
}

/// A mapping of field name to declared type.
///
/// # Example
///
/// ```
/// use cellardb_core::{FieldType, Record, Schema};
///
/// let schema = Schema::new().with_field("name", FieldType::String).with_field("age", FieldType::Int);
///
/// assert!(schema.validate(&Record::new().with("name", "Ada").with("age", 36i64)).is_ok());
/// assert!(schema.validate(&Record::new().with("name", "Ada").with("age", "old")).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: BTreeMap<String, FieldType>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub const fn new() -> Self {
        Self { fields: BTreeMap::new() }
    }

    /// Declares a field, returning the schema for chaining.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), field_type);
        self
    }

    /// Declares a field unless it is already declared.
    pub fn ensure_field(&mut self, name: &str, field_type: FieldType) {
        self.fields.entry(name.to_owned()).or_insert(field_type);
    }

    /// The declared type of a field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).copied()
    }

    /// Returns `true` if the field is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Declared field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Iterates declared fields and their types.
    pub fn iter(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.fields.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    /// Number of declared fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if no fields are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validates a record against this schema.
    ///
    /// Declared fields are checked first (presence, then type), then the
    /// record is checked for undeclared fields.
    pub fn validate(&self, record: &Record) -> CoreResult<()> {
        for (name, field_type) in &self.fields {
            let value = record.get(name).ok_or_else(|| CoreError::MissingField(name.clone()))?;
            if !field_type.matches(value) {
                return Err(CoreError::type_mismatch(
                    name.as_str(),
                    field_type.name(),
                    value.type_name(),
                ));
            }
        }
        if let Some(extra) = record.field_names().find(|name| !self.fields.contains_key(*name)) {
            return Err(CoreError::UndeclaredField(extra.to_owned()));
        }
        Ok(())
    }
}

impl<K: Into<String>> FromIterator<(K, FieldType)> for Schema {
    fn from_iter<I: IntoIterator<Item = (K, FieldType)>>(iter: I) -> Self {
        Self { fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect() }
    }
}
