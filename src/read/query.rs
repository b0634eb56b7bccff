use crate::{
    common::{self, condition, key, number, selection},
    error::{Error, Result},
    read, store,
};

use serde_json::{Map, Value};

/// Where a paginated read stopped; pass it back to continue.
///
/// Opaque to callers: it holds the store's last evaluated key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cursor(pub(crate) store::StoreItem);

/// Query on one partition of a table or of one of its secondary indexes.
///
/// ```rust
/// use dynamodb_resource::{common::condition::Condition, read::query::Query};
/// use serde_json::json;
///
/// let query = Query {
///     index_name: Some("some_index".to_string()),
///     partition_value: json!("user"),
///     sort_key_condition: Some(Condition::BeginsWith("2024-".to_string())),
///     limit: Some(10),
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    /// Secondary index to query, the table itself otherwise.
    pub index_name: Option<String>,
    /// Value of the partition key.
    pub partition_value: Value,
    /// Optional condition on the sort key.
    pub sort_key_condition: Option<condition::Condition<Value>>,
    /// Attributes to return, all when empty.
    pub projection: selection::Projection,
    /// Continue after a previous page.
    pub cursor: Option<Cursor>,
    /// Maximum number of items the store evaluates for this page.
    pub limit: Option<i32>,
    /// Ascending sort key order unless `Some(false)`.
    pub scan_index_forward: Option<bool>,
}

/// One page of query results.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryPage {
    /// Items of the page, with native numbers.
    pub items: Vec<Map<String, Value>>,
    /// Where the next page starts; `None` on the last page.
    pub cursor: Option<Cursor>,
}

impl Query {
    /// Compile the key condition against the key shape of the queried table or index.
    pub(crate) fn into_request(
        self,
        shape: &key::KeyShape,
        table: &str,
        table_name: String,
    ) -> Result<read::common::QueryRequest> {
        let mut keys = vec![condition::KeyCondition {
            condition: condition::Condition::Equals(self.partition_value),
            name: shape.partition().to_string(),
        }];
        if let Some(sort_key_condition) = self.sort_key_condition {
            let Some(sort) = shape.sort() else {
                return Err(Error::WrongPrimaryKey {
                    table: table.to_string(),
                    required: vec![shape.partition().to_string()],
                    given: vec![shape.partition().to_string(), "sort key condition".to_string()],
                });
            };
            keys.push(condition::KeyCondition {
                condition: sort_key_condition,
                name: sort.to_string(),
            });
        }
        let mut request = read::common::QueryRequest {
            exclusive_start_key: self.cursor.map(|cursor| cursor.0),
            index_name: self.index_name,
            limit: self.limit,
            scan_index_forward: self.scan_index_forward,
            table_name,
            ..Default::default()
        };
        request.key_condition_expression = condition::KeyCondition::get_expression_operation(keys)?
            .merge_into(
                &mut request.expression_attribute_names,
                &mut request.expression_attribute_values,
            );
        if !self.projection.is_empty() {
            let projection = common::ExpressionInput::from(self.projection);
            request.projection_expression = Some(projection.merge_into(
                &mut request.expression_attribute_names,
                &mut request.expression_attribute_values,
            ));
        }
        Ok(request)
    }
}

impl TryFrom<read::common::StorePage> for QueryPage {
    type Error = serde_dynamo::Error;

    fn try_from(page: read::common::StorePage) -> serde_dynamo::Result<Self> {
        let items = page
            .items
            .into_iter()
            .map(number::to_native_item)
            .collect::<serde_dynamo::Result<_>>()?;
        Ok(Self {
            items,
            cursor: page.last_evaluated_key.map(Cursor),
        })
    }
}
