//! Error types for the core crate.

use thiserror::Error;

/// Errors raised while validating records against a schema or building keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A field declared by the schema is absent from the record.
    #[error("field '{0}' is missing")]
    MissingField(String),

    /// A field holds a value of the wrong type.
    #[error("field '{field}' expects type {expected}, got {actual}")]
    TypeMismatch {
        /// The field name.
        field: String,
        /// The declared type.
        expected: String,
        /// The type of the supplied value.
        actual: String,
    },

    /// A record carries a field the schema does not declare.
    #[error("field '{0}' is not defined in the schema")]
    UndeclaredField(String),

    /// A primary key value is not usable as a key.
    #[error("invalid primary key: {0}")]
    InvalidPrimaryKey(String),

    /// A general validation error.
    #[error("validation error: {0}")]
    Validation(String),
}

impl CoreError {
    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch { field: field.into(), expected: expected.into(), actual: actual.into() }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
