use crate::store;

use aws_sdk_dynamodb::types;
use std::collections;

/// One query against a table or one of its secondary indexes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryRequest {
    /// Key to continue a previous page from.
    pub exclusive_start_key: Option<store::StoreItem>,
    /// Name placeholders of the key condition and projection.
    pub expression_attribute_names: collections::HashMap<String, String>,
    /// Value placeholders of the key condition.
    pub expression_attribute_values: collections::HashMap<String, types::AttributeValue>,
    /// Secondary index to query, the base table otherwise.
    pub index_name: Option<String>,
    /// The compiled key condition.
    pub key_condition_expression: String,
    /// Maximum number of items to evaluate.
    pub limit: Option<i32>,
    /// Attributes to return, all otherwise.
    pub projection_expression: Option<String>,
    /// Ascending sort key order unless `Some(false)`.
    pub scan_index_forward: Option<bool>,
    /// Physical table name.
    pub table_name: String,
}

/// One page of a query or scan, as the store returns it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StorePage {
    /// Items of the page.
    pub items: Vec<store::StoreItem>,
    /// Where the next page starts, if there is one.
    pub last_evaluated_key: Option<store::StoreItem>,
}
