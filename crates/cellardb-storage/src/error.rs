//! Error types for snapshot encoding and file handling.

use std::io;

use thiserror::Error;

/// Errors that can occur while writing or reading snapshot files.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred while reading or writing snapshot data.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A record could not be decoded.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The file is not a snapshot, or its layout is corrupted.
    #[error("invalid snapshot format: {0}")]
    InvalidFormat(String),

    /// The snapshot was written by a newer format version.
    #[error("unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    /// A binary frame failed its checksum.
    #[error("checksum mismatch in frame {frame}: expected {expected:#010x}, got {actual:#010x}")]
    Checksum {
        /// Index of the failing frame.
        frame: u64,
        /// The stored checksum.
        expected: u32,
        /// The checksum of the data read.
        actual: u32,
    },

    /// The snapshot ends before its end marker.
    #[error("incomplete snapshot: {0}")]
    Incomplete(String),

    /// A record is structurally valid but out of place.
    #[error("malformed record at line {line}: {message}")]
    MalformedRecord {
        /// The line (or frame) number.
        line: u64,
        /// What is wrong with it.
        message: String,
    },
}

impl StorageError {
    /// Creates an incomplete-snapshot error.
    pub fn incomplete(msg: impl Into<String>) -> Self {
        Self::Incomplete(msg.into())
    }

    /// Creates a malformed-record error.
    pub fn malformed_record(line: u64, message: impl Into<String>) -> Self {
        Self::MalformedRecord { line, message: message.into() }
    }

    /// Returns `true` if the error means the file content is damaged or truncated,
    /// as opposed to an environment failure.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::InvalidFormat(_)
                | Self::Checksum { .. }
                | Self::Incomplete(_)
                | Self::MalformedRecord { .. }
                | Self::Deserialization(_)
        )
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
