use crate::{common, store};

use aws_sdk_dynamodb::types;
use std::collections;

/// Expression parts shared by conditional writes.
///
/// Holds the resolved condition expression and the placeholder maps of every expression the
/// write carries, ready for the store call. Empty maps are not sent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteInput {
    /// Condition that must hold for the write to commit.
    pub condition_expression: Option<String>,
    /// Name placeholders of all expressions of the write.
    pub expression_attribute_names: collections::HashMap<String, String>,
    /// Value placeholders of all expressions of the write.
    pub expression_attribute_values: collections::HashMap<String, types::AttributeValue>,
    /// Which attributes the store returns.
    pub return_values: Option<types::ReturnValue>,
    /// Physical table name.
    pub table_name: String,
}

impl WriteInput {
    /// Merge an expression operation into this write operation.
    pub(crate) fn merge_expression(&mut self, operation: common::ExpressionInput) -> String {
        operation.merge_into(
            &mut self.expression_attribute_names,
            &mut self.expression_attribute_values,
        )
    }

    /// Set the condition from an optional compiled condition.
    pub(crate) fn with_condition(mut self, condition: Option<common::ExpressionInput>) -> Self {
        self.condition_expression = condition.map(|condition| self.merge_expression(condition));
        self
    }
}

/// A conditional put.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PutRequest {
    /// The full item.
    pub item: store::StoreItem,
    /// Condition and placeholders.
    pub write_input: WriteInput,
}

/// A conditional update of one item.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateRequest {
    /// Primary key of the item.
    pub key: store::StoreItem,
    /// The compiled update expression.
    pub update_expression: String,
    /// Condition, placeholders and return values.
    pub write_input: WriteInput,
}

/// apply common write operation settings to a builder
#[macro_export]
macro_rules! apply_write_operation {
    ($builder:expr, $write_operation:expr) => {{
        let write_operation = $write_operation;
        $builder
            .set_condition_expression(write_operation.condition_expression)
            .set_expression_attribute_names(
                (!write_operation.expression_attribute_names.is_empty())
                    .then_some(write_operation.expression_attribute_names),
            )
            .set_expression_attribute_values(
                (!write_operation.expression_attribute_values.is_empty())
                    .then_some(write_operation.expression_attribute_values),
            )
            .table_name(write_operation.table_name)
    }};
}
