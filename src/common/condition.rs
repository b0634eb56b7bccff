use crate::common::{self, path};

use aws_sdk_dynamodb::types;
use serde::Serialize;
use serde_dynamo::{Result, to_attribute_value};
use serde_json::Value;
use std::collections;

/// Joins conditions; conditions only compose conjunctively.
pub(crate) const CONJUNCTION: &str = " and ";

/// Condition types for DynamoDB expressions.
///
/// ```rust
/// use dynamodb_resource::common::condition;
///
/// let eq = condition::Condition::Equals("value".to_string());
/// let gt = condition::Condition::GreaterThan(100);
/// let null: condition::Condition<String> = condition::Condition::Null;
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum Condition<T> {
    /// Checks if an attribute begins with a specified prefix (string types only).
    BeginsWith(String),
    /// Checks if an attribute value is between two values (inclusive).
    Between(T, T),
    /// Checks if an attribute contains a specified value.
    Contains(T),
    /// Checks if an attribute value equals a specified value.
    Equals(T),
    /// Checks if an attribute value is greater than a specified value.
    GreaterThan(T),
    /// Checks if an attribute value is greater than or equal to a specified value.
    GreaterThanOrEqual(T),
    /// Checks if an attribute value is in a list of specified values.
    In(Vec<T>),
    /// Checks if an attribute value is less than a specified value.
    LessThan(T),
    /// Checks if an attribute value is less than or equal to a specified value.
    LessThanOrEqual(T),
    /// Checks if an attribute value does not equal a specified value.
    NotEqual(T),
    /// Checks if an attribute exists.
    NotNull,
    /// Checks if an attribute does not exist.
    Null,
}

fn next_value_placeholder(index: &mut usize) -> String {
    let placeholder = format!(":v{index}");
    *index += 1;
    placeholder
}

impl<T: Serialize> Condition<T> {
    fn get_expression(
        self,
        key_placeholder: &str,
        index: &mut usize,
    ) -> Result<(String, collections::HashMap<String, types::AttributeValue>)> {
        let mut expression_attribute_values = collections::HashMap::new();
        let mut comparison = |operator: &str, value: T, index: &mut usize| -> Result<String> {
            let value = to_attribute_value(value)?;
            let value_placeholder = next_value_placeholder(index);
            let expression = format!("{key_placeholder} {operator} {value_placeholder}");
            expression_attribute_values.insert(value_placeholder, value);
            Ok(expression)
        };
        let expression = match self {
            Self::Equals(value) => comparison("=", value, index)?,
            Self::GreaterThan(value) => comparison(">", value, index)?,
            Self::GreaterThanOrEqual(value) => comparison(">=", value, index)?,
            Self::LessThan(value) => comparison("<", value, index)?,
            Self::LessThanOrEqual(value) => comparison("<=", value, index)?,
            Self::NotEqual(value) => comparison("<>", value, index)?,
            Self::BeginsWith(prefix) => {
                let value_placeholder = next_value_placeholder(index);
                let expression = format!("begins_with({key_placeholder}, {value_placeholder})");
                expression_attribute_values
                    .insert(value_placeholder, types::AttributeValue::S(prefix));
                expression
            }
            Self::Between(value1, value2) => {
                let value1 = to_attribute_value(value1)?;
                let value2 = to_attribute_value(value2)?;
                let value_placeholder_1 = next_value_placeholder(index);
                let value_placeholder_2 = next_value_placeholder(index);
                let expression = format!(
                    "{key_placeholder} BETWEEN {value_placeholder_1} AND {value_placeholder_2}"
                );
                expression_attribute_values.insert(value_placeholder_1, value1);
                expression_attribute_values.insert(value_placeholder_2, value2);
                expression
            }
            Self::Contains(value) => {
                let value = to_attribute_value(value)?;
                let value_placeholder = next_value_placeholder(index);
                let expression = format!("contains({key_placeholder}, {value_placeholder})");
                expression_attribute_values.insert(value_placeholder, value);
                expression
            }
            Self::In(values) => {
                let mut placeholders = Vec::with_capacity(values.len());
                for value in values {
                    let value = to_attribute_value(value)?;
                    let placeholder = next_value_placeholder(index);
                    expression_attribute_values.insert(placeholder.clone(), value);
                    placeholders.push(placeholder);
                }
                let placeholders = placeholders.join(", ");
                format!("{key_placeholder} IN ({placeholders})")
            }
            Self::NotNull => format!("attribute_exists({key_placeholder})"),
            Self::Null => format!("attribute_not_exists({key_placeholder})"),
        };
        Ok((expression, expression_attribute_values))
    }
}

/// Condition applied to a top-level attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyCondition<T> {
    /// The condition to apply to the attribute.
    pub condition: Condition<T>,
    /// The name of the attribute to apply the condition to.
    pub name: String,
}

impl<T: Serialize> KeyCondition<T> {
    /// Compile conjunctive conditions with `#n<i>` name and `:v<i>` value placeholders.
    pub(crate) fn get_expression_operation(keys: Vec<Self>) -> Result<common::ExpressionInput> {
        let mut expressions = Vec::with_capacity(keys.len());
        let mut expression_attribute_names: collections::HashMap<String, String> =
            collections::HashMap::with_capacity(keys.len());
        let mut expression_attribute_values = collections::HashMap::new();
        let mut index = 0;
        for key in keys {
            let placeholder = match expression_attribute_names
                .iter()
                .find(|(_, name)| **name == key.name)
            {
                Some((placeholder, _)) => placeholder.clone(),
                None => format!("#n{}", expression_attribute_names.len()),
            };
            let (expression, condition_expression_attribute_values) =
                key.condition.get_expression(&placeholder, &mut index)?;
            expressions.push(expression);
            expression_attribute_names.insert(placeholder, key.name);
            expression_attribute_values.extend(condition_expression_attribute_values);
        }
        let operation = common::ExpressionInput {
            expression: expressions.join(CONJUNCTION),
            expression_attribute_names,
            expression_attribute_values,
        };
        Ok(operation)
    }
}

/// Entry point for caller conditions on one attribute.
///
/// ```rust
/// use dynamodb_resource::common::condition::Attr;
///
/// let condition = Attr::new("some_int").eq(0).and(Attr::new("some_string").exists());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Attr(String);

impl Attr {
    /// Condition builder for the attribute `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    fn condition(self, condition: Condition<Value>) -> ConditionSet {
        ConditionSet(vec![KeyCondition {
            condition,
            name: self.0,
        }])
    }

    /// `name = value`
    pub fn eq(self, value: impl Into<Value>) -> ConditionSet {
        self.condition(Condition::Equals(value.into()))
    }

    /// `name <> value`
    pub fn ne(self, value: impl Into<Value>) -> ConditionSet {
        self.condition(Condition::NotEqual(value.into()))
    }

    /// `name < value`
    pub fn lt(self, value: impl Into<Value>) -> ConditionSet {
        self.condition(Condition::LessThan(value.into()))
    }

    /// `name <= value`
    pub fn lte(self, value: impl Into<Value>) -> ConditionSet {
        self.condition(Condition::LessThanOrEqual(value.into()))
    }

    /// `name > value`
    pub fn gt(self, value: impl Into<Value>) -> ConditionSet {
        self.condition(Condition::GreaterThan(value.into()))
    }

    /// `name >= value`
    pub fn gte(self, value: impl Into<Value>) -> ConditionSet {
        self.condition(Condition::GreaterThanOrEqual(value.into()))
    }

    /// `name BETWEEN low AND high`
    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> ConditionSet {
        self.condition(Condition::Between(low.into(), high.into()))
    }

    /// `begins_with(name, prefix)`
    pub fn begins_with(self, prefix: impl Into<String>) -> ConditionSet {
        self.condition(Condition::BeginsWith(prefix.into()))
    }

    /// `contains(name, value)`
    pub fn contains(self, value: impl Into<Value>) -> ConditionSet {
        self.condition(Condition::Contains(value.into()))
    }

    /// `name IN (values..)`
    pub fn is_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> ConditionSet {
        self.condition(Condition::In(values.into_iter().map(Into::into).collect()))
    }

    /// `attribute_exists(name)`
    pub fn exists(self) -> ConditionSet {
        self.condition(Condition::NotNull)
    }

    /// `attribute_not_exists(name)`
    pub fn not_exists(self) -> ConditionSet {
        self.condition(Condition::Null)
    }
}

/// Caller conditions, all of which must hold.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConditionSet(Vec<KeyCondition<Value>>);

impl ConditionSet {
    /// Require `other` as well.
    pub fn and(mut self, other: ConditionSet) -> Self {
        self.0.extend(other.0);
        self
    }

    /// The conditions in this set.
    pub fn conditions(&self) -> &[KeyCondition<Value>] {
        &self.0
    }

    pub(crate) fn compile(self) -> Result<Option<common::ExpressionInput>> {
        if self.0.is_empty() {
            return Ok(None);
        }
        KeyCondition::get_expression_operation(self.0).map(Some)
    }
}

impl From<KeyCondition<Value>> for ConditionSet {
    fn from(condition: KeyCondition<Value>) -> Self {
        Self(vec![condition])
    }
}

/// Combine existence guards over already-placeholdered paths with a compiled caller condition.
///
/// Paths render through `names`, the update's own placeholders, so every key step must have
/// been assigned there. The caller condition keeps its own `#n`/`:v` placeholders. Returns
/// `None` when there is nothing to check.
pub(crate) fn build_conditions(
    existing: &[path::AttributePath],
    missing: &[path::AttributePath],
    names: &common::NamePlaceholders,
    direct: Option<common::ExpressionInput>,
) -> Option<common::ExpressionInput> {
    let guards: Vec<_> = existing
        .iter()
        .map(|path| format!("attribute_exists({})", names.render(path)))
        .chain(
            missing
                .iter()
                .map(|path| format!("attribute_not_exists({})", names.render(path))),
        )
        .collect();
    let guards = common::ExpressionInput {
        expression: guards.join(CONJUNCTION),
        ..Default::default()
    };
    let operation =
        common::ExpressionInput::merge(CONJUNCTION, std::iter::once(guards).chain(direct).collect());
    if operation.expression.is_empty() {
        None
    } else {
        Some(operation)
    }
}
