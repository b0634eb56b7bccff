#![deny(missing_docs)]

//! # DynamoDB Resource
//!
//! Schema-governed, typed access to DynamoDB tables.
//!
//! ## Overview
//!
//! Every table is described by a JSON Schema document which names its primary key, declares
//! its secondary indexes and constrains the items it may hold. On top of that the crate:
//! - validates every item and partial update against the table schema before it is written
//! - flattens nested updates into attribute paths and compiles them into update expressions
//! - recovers from updates below missing maps by retrying with parent-level writes
//! - converts numbers exactly between JSON and the store, integers included
//!
//! ## Quick Example
//!
//! ```no_run
//! use dynamodb_resource::{Resource, ResourceConfig};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), dynamodb_resource::Error> {
//! let resource = Resource::from_config(ResourceConfig::from_env()?).await;
//! let table = resource.table("TableForTests")?;
//!
//! // Creates `some_dict` when the item has no such map yet.
//! let new_data = json!({"some_dict": {"key2": 3}});
//! let options = dynamodb_resource::table::UpdateOptions {
//!     set_new_attribute_if_not_existent: true,
//!     ..Default::default()
//! };
//! table
//!     .update_attribute("key1", new_data.as_object().cloned().unwrap_or_default(), options)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`mod@common`] - Attribute paths, keys, conditions and number conversion
//! - [`mod@read`] - Queries and batch reads
//! - [`mod@write`] - Update expressions and write return values
//! - [`mod@table`] - The table facade every operation goes through
//! - [`mod@schema`] - Table schemas and validation

/// Common utilities for keys, attribute paths, conditions and attribute selection.
pub mod common;

/// Resource configuration read from the environment.
pub mod config;

/// Errors returned by table operations.
pub mod error;

/// Queries, key conditions and batch reads.
pub mod read;

/// Cache of table facades sharing one store client.
pub mod resource;

/// Table schemas, validation and key discovery.
pub mod schema;

/// The store seam and its DynamoDB implementation.
pub mod store;

/// The table facade every operation goes through.
pub mod table;

/// Update expressions, write orchestration and return values.
pub mod write;

#[cfg(test)]
mod testing;

pub use config::ResourceConfig;
pub use error::{Error, Result};
pub use resource::Resource;
pub use table::Table;
