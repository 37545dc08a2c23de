//! `CellarDB` Core
//!
//! This crate provides the data model shared by every `CellarDB` crate.
//!
//! # Overview
//!
//! - **Values**: [`Value`], the field value enum with a total order usable as an index key
//! - **Records**: [`Record`], an ordered field map, and [`PrimaryKey`]
//! - **Schemas**: [`Schema`] and [`FieldType`] for optional per-table validation
//! - **Predicates**: [`Condition`], the tree evaluated by queries and consulted by planners
//! - **Indexes**: the [`FieldIndex`] trait with [`HashIndex`] and [`SortedIndex`]
//!
//! # Example
//!
//! ```
//! use cellardb_core::{Condition, FieldType, Record, Schema};
//!
//! let schema = Schema::new().with_field("id", FieldType::Int).with_field("name", FieldType::String);
//! let record = Record::new().with("id", 1i64).with("name", "Alice");
//!
//! assert!(schema.validate(&record).is_ok());
//! assert!(Condition::eq("name", "Alice").matches(&record));
//! ```

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod condition;
pub mod error;
pub mod index;
pub mod record;
pub mod schema;
pub mod value;

pub use condition::{CompareOp, Condition};
pub use error::{CoreError, CoreResult};
pub use index::{FieldIndex, HashIndex, IndexKind, IndexStats, SortedIndex};
pub use record::{PrimaryKey, Record};
pub use schema::{FieldType, Schema};
pub use value::{Value, ValueKind};
