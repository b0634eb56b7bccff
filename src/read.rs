//! Read operations.
//!
//! Queries against a table or one of its secondary indexes, and the batch reads behind
//! [`crate::Table::batch_get`].

/// Ordering and de-duplication of batch reads.
pub(crate) mod batch_get;

/// Store-level read requests and pages.
pub mod common;

/// Key-condition queries with cursors.
pub mod query;
