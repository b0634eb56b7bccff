//! Boundary to the key-value store.
//!
//! Table operations only talk to a [`Store`]; [`aws_sdk_dynamodb::Client`] implements it in
//! [`dynamodb`].

/// [`Store`] implementation for the DynamoDB client.
pub mod dynamodb;

use crate::{read, write};

use async_trait::async_trait;
use aws_sdk_dynamodb::types;
use std::{collections, fmt};

/// An item in the store's own representation.
pub type StoreItem = collections::HashMap<String, types::AttributeValue>;

/// Boxed error of the underlying client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Message of the store when an update writes below a map that does not exist.
const INVALID_DOCUMENT_PATH: &str =
    "document path provided in the update expression is invalid for update";

/// Message of the store when an expression reads an attribute that does not exist.
const MISSING_ATTRIBUTE: &str =
    "provided expression refers to an attribute that does not exist in the item";

/// Failures reported by the store, kept as the store described them.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A condition expression evaluated to false.
    #[error("conditional check failed: {message}")]
    ConditionalCheckFailed {
        /// The store's message.
        message: String,
    },
    /// The store rejected the request as malformed for the current item.
    #[error("validation failed: {message}")]
    Validation {
        /// The store's message.
        message: String,
    },
    /// Any other service error.
    #[error("{code}: {message}")]
    Service {
        /// The store's error code.
        code: String,
        /// The store's message.
        message: String,
    },
    /// The request could not be built or sent.
    #[error("store request failed: {0}")]
    Request(#[source] BoxError),
}

impl StoreError {
    /// Whether the store refused an update because a path it writes or reads is missing.
    pub fn is_missing_document_path(&self) -> bool {
        match self {
            Self::Validation { message } => {
                message.contains(INVALID_DOCUMENT_PATH) || message.contains(MISSING_ATTRIBUTE)
            }
            _ => false,
        }
    }
}

/// The store operations table operations are built from.
///
/// Every call addresses one physical table and performs a single round trip, apart from
/// the batch calls which page through the store's batch limits.
#[async_trait]
pub trait Store: Send + Sync + fmt::Debug {
    /// Read one item; `None` when absent.
    async fn get_item(
        &self,
        table_name: &str,
        key: StoreItem,
    ) -> Result<Option<StoreItem>, StoreError>;

    /// Write a whole item, under the request's condition.
    async fn put_item(&self, request: write::common::PutRequest) -> Result<(), StoreError>;

    /// Update one item and return the attributes asked for by the request.
    async fn update_item(
        &self,
        request: write::common::UpdateRequest,
    ) -> Result<Option<StoreItem>, StoreError>;

    /// Delete one item and return it as it was; `None` when it was absent.
    async fn delete_item(
        &self,
        table_name: &str,
        key: StoreItem,
    ) -> Result<Option<StoreItem>, StoreError>;

    /// Read one page of a query.
    async fn query(
        &self,
        request: read::common::QueryRequest,
    ) -> Result<read::common::StorePage, StoreError>;

    /// Read one page of a full-table scan.
    async fn scan(
        &self,
        table_name: &str,
        exclusive_start_key: Option<StoreItem>,
    ) -> Result<read::common::StorePage, StoreError>;

    /// Read many items by key, in no particular order; absent keys are skipped.
    async fn batch_get_item(
        &self,
        table_name: &str,
        keys: Vec<StoreItem>,
    ) -> Result<Vec<StoreItem>, StoreError>;

    /// Delete many items by key.
    async fn batch_delete(&self, table_name: &str, keys: Vec<StoreItem>) -> Result<(), StoreError>;

    /// Describe the table.
    async fn describe_table(&self, table_name: &str)
    -> Result<types::TableDescription, StoreError>;
}
