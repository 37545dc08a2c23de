//! Error types for `CellarDB`.
//!
//! This module provides the [`enum@Error`] type returned by table and
//! database operations.

use cellardb_core::{CoreError, PrimaryKey};
use cellardb_storage::StorageError;
use thiserror::Error;

use crate::backup::BackupError;

/// Errors that can occur when using `CellarDB`.
#[derive(Debug, Error)]
pub enum Error {
    /// An insert used a primary key that is already live.
    #[error("duplicate primary key {key} in table '{table}'")]
    DuplicateKey {
        /// The table name.
        table: String,
        /// The colliding key.
        key: PrimaryKey,
    },

    /// An update or delete matched no records.
    #[error("no records match in table '{table}'")]
    RecordNotFound {
        /// The table name.
        table: String,
    },

    /// The named table does not exist.
    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// A table with this name already exists.
    #[error("table '{0}' already exists")]
    DuplicateTable(String),

    /// A record failed schema validation.
    #[error("schema validation failed: {0}")]
    SchemaValidation(#[from] CoreError),

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A storage error occurred while saving or loading.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A backup or restore failed.
    #[error("backup error: {0}")]
    Backup(#[from] BackupError),

    /// Configuration was rejected, e.g. an unparsable log filter.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns `true` if retrying the same call unchanged may succeed.
    ///
    /// Validation and key errors are deterministic; storage errors may be
    /// transient.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Backup(_))
    }

    /// Returns `true` if this is a schema validation error.
    #[must_use]
    pub const fn is_validation_error(&self) -> bool {
        matches!(self, Self::SchemaValidation(_))
    }

    /// Returns `true` if this is a storage error.
    #[must_use]
    pub const fn is_storage_error(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Create a duplicate key error.
    #[must_use]
    pub fn duplicate_key(table: impl Into<String>, key: PrimaryKey) -> Self {
        Self::DuplicateKey { table: table.into(), key }
    }

    /// Create a record not found error.
    #[must_use]
    pub fn record_not_found(table: impl Into<String>) -> Self {
        Self::RecordNotFound { table: table.into() }
    }

    /// Create an invalid input error.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// A specialized `Result` type for `CellarDB` operations.
pub type Result<T> = std::result::Result<T, Error>;
