//! Property-based and random-operation tests.
//!
//! An indexed table is checked against a plain `BTreeMap` model: every
//! query must return what a filter-and-sort over the model returns.

pub mod operations;
pub mod properties;
