//! Integration tests for `CellarDB`.
//!
//! These tests drive the public API end to end: tables and queries on a
//! [`cellardb::Database`], concurrent access, the backup scheduler and
//! restoring from backup files.

pub mod backup;
pub mod concurrency;
pub mod crud;
pub mod queries;
pub mod restore;
