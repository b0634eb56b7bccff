use crate::{
    common::number,
    error::{Error, Result},
};

use aws_sdk_dynamodb::types;
use indexmap::IndexMap;
use serde::Serialize;
use serde_dynamo::to_attribute_value;
use serde_json::{Map, Value};
use std::{collections, fmt};

/// Key component.
///
/// ```rust
/// use dynamodb_resource::common::key;
///
/// let key = key::Key {
///     name: "id".to_string(),
///     value: "1".to_string(),
/// };
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Key<T> {
    /// The attribute name of the key.
    pub name: String,
    /// The value of the key.
    pub value: T,
}

/// Primary key (partition key and optional sort key), checked against a table's key shape.
///
/// ```rust
/// use dynamodb_resource::common::key;
///
/// let keys = key::Keys {
///     partition_key: key::Key {
///         name: "id".to_string(),
///         value: "1".to_string(),
///     },
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Keys<T> {
    /// The partition key (required).
    pub partition_key: Key<T>,
    /// The sort key (optional, only for tables with composite primary keys).
    pub sort_key: Option<Key<T>>,
}

impl<T: Serialize> TryFrom<Keys<T>> for collections::HashMap<String, types::AttributeValue> {
    type Error = serde_dynamo::Error;

    fn try_from(key: Keys<T>) -> serde_dynamo::Result<Self> {
        let partition_key_value = to_attribute_value(key.partition_key.value)?;
        let mut keys = Self::from([(key.partition_key.name, partition_key_value)]);
        if let Some(sort_key) = key.sort_key {
            let sort_key_value = to_attribute_value(sort_key.value)?;
            keys.insert(sort_key.name, sort_key_value);
        }
        Ok(keys)
    }
}

impl Keys<Value> {
    /// The key as an item fragment.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(
            self.partition_key.name.clone(),
            self.partition_key.value.clone(),
        );
        if let Some(sort_key) = &self.sort_key {
            map.insert(sort_key.name.clone(), sort_key.value.clone());
        }
        map
    }

    /// The key values in key order, used to index batch results.
    pub fn to_tuple(&self) -> KeyTuple {
        let components = std::iter::once(&self.partition_key)
            .chain(self.sort_key.as_ref())
            .map(|key| tuple_component(&key.value))
            .collect();
        KeyTuple(components)
    }
}

/// One key value as a [`KeyTuple`] component.
///
/// Numbers go through their stored form first, so `1.0` and `1` give the same component.
pub(crate) fn tuple_component(value: &Value) -> String {
    let value = match value {
        Value::Number(_) => number::to_exact(value.clone())
            .and_then(number::to_native)
            .unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    };
    match value {
        Value::String(string) => string,
        other => other.to_string(),
    }
}

impl fmt::Display for Keys<Value> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.to_map()))
    }
}

/// Key values of one item in key order: `(partition,)` or `(partition, sort)`.
///
/// Numbers are normalized through their stored form; other non-string values are rendered as JSON.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct KeyTuple(pub Vec<String>);

/// Primary key as supplied by callers, before it is checked against a table.
///
/// ```rust
/// use dynamodb_resource::common::key::PrimaryKey;
///
/// let partition_only = PrimaryKey::from("some_identification_string");
/// let composite = PrimaryKey::from(("user", 42));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum PrimaryKey {
    /// A bare value, the partition key of a single-attribute key.
    Scalar(Value),
    /// A (partition, sort) pair.
    Pair(Value, Value),
    /// Key attribute names to values.
    Mapping(IndexMap<String, Value>),
}

impl From<&str> for PrimaryKey {
    fn from(value: &str) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<String> for PrimaryKey {
    fn from(value: String) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<i64> for PrimaryKey {
    fn from(value: i64) -> Self {
        Self::Scalar(value.into())
    }
}

impl<A: Into<Value>, B: Into<Value>> From<(A, B)> for PrimaryKey {
    fn from((partition, sort): (A, B)) -> Self {
        Self::Pair(partition.into(), sort.into())
    }
}

impl From<IndexMap<String, Value>> for PrimaryKey {
    fn from(mapping: IndexMap<String, Value>) -> Self {
        Self::Mapping(mapping)
    }
}

impl From<Map<String, Value>> for PrimaryKey {
    fn from(mapping: Map<String, Value>) -> Self {
        Self::Mapping(mapping.into_iter().collect())
    }
}

impl From<Value> for PrimaryKey {
    /// Objects become mappings, two-element arrays pairs, everything else a scalar.
    fn from(value: Value) -> Self {
        match value {
            Value::Object(mapping) => mapping.into(),
            Value::Array(pair) if pair.len() == 2 => {
                let mut pair = pair.into_iter();
                match (pair.next(), pair.next()) {
                    (Some(partition), Some(sort)) => Self::Pair(partition, sort),
                    _ => Self::Scalar(Value::Null),
                }
            }
            other => Self::Scalar(other),
        }
    }
}

/// Key attributes of a table or secondary index.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KeyShape {
    /// Partition key only.
    Partition(String),
    /// Partition and sort key.
    Composite {
        /// Partition key attribute.
        partition: String,
        /// Sort key attribute.
        sort: String,
    },
}

impl KeyShape {
    /// Shape from the ordered key attribute names; `None` unless one or two names are given.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Option<Self> {
        match names {
            [partition] => Some(Self::Partition(partition.as_ref().to_string())),
            [partition, sort] => Some(Self::Composite {
                partition: partition.as_ref().to_string(),
                sort: sort.as_ref().to_string(),
            }),
            _ => None,
        }
    }

    /// Key attribute names, partition first.
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::Partition(partition) => vec![partition],
            Self::Composite { partition, sort } => vec![partition, sort],
        }
    }

    /// Partition key attribute.
    pub fn partition(&self) -> &str {
        match self {
            Self::Partition(partition) | Self::Composite { partition, .. } => partition,
        }
    }

    /// Sort key attribute, if any.
    pub fn sort(&self) -> Option<&str> {
        match self {
            Self::Partition(_) => None,
            Self::Composite { sort, .. } => Some(sort),
        }
    }

    fn required(&self) -> Vec<String> {
        self.names().into_iter().map(str::to_string).collect()
    }

    /// Check a caller key against this shape.
    ///
    /// A scalar is the partition key of a single-attribute key, a pair is (partition, sort) of
    /// a composite key, a mapping must name exactly the key attributes with non-null values.
    pub fn normalize(&self, table: &str, key: PrimaryKey) -> Result<Keys<Value>> {
        match (self, key) {
            (Self::Partition(partition), PrimaryKey::Scalar(value)) if !value.is_null() => {
                Ok(Keys {
                    partition_key: Key {
                        name: partition.clone(),
                        value,
                    },
                    sort_key: None,
                })
            }
            (Self::Composite { partition, sort }, PrimaryKey::Pair(partition_value, sort_value))
                if !partition_value.is_null() && !sort_value.is_null() =>
            {
                Ok(Keys {
                    partition_key: Key {
                        name: partition.clone(),
                        value: partition_value,
                    },
                    sort_key: Some(Key {
                        name: sort.clone(),
                        value: sort_value,
                    }),
                })
            }
            (Self::Composite { sort, .. }, PrimaryKey::Scalar(_)) => Err(Error::MissingPrimaryKey {
                table: table.to_string(),
                required: self.required(),
                missing: vec![sort.clone()],
            }),
            (_, PrimaryKey::Mapping(mut mapping)) => {
                let missing: Vec<String> = self
                    .names()
                    .into_iter()
                    .filter(|name| mapping.get(*name).is_none_or(Value::is_null))
                    .map(str::to_string)
                    .collect();
                if !missing.is_empty() {
                    return Err(Error::MissingPrimaryKey {
                        table: table.to_string(),
                        required: self.required(),
                        missing,
                    });
                }
                if mapping.len() > self.names().len() {
                    return Err(Error::WrongPrimaryKey {
                        table: table.to_string(),
                        required: self.required(),
                        given: mapping.into_keys().collect(),
                    });
                }
                let mut take = |name: &str| Key {
                    name: name.to_string(),
                    value: mapping.shift_remove(name).unwrap_or(Value::Null),
                };
                let partition_key = take(self.partition());
                let sort_key = self.sort().map(&mut take);
                Ok(Keys {
                    partition_key,
                    sort_key,
                })
            }
            (_, key) => Err(Error::WrongPrimaryKey {
                table: table.to_string(),
                required: self.required(),
                given: match key {
                    PrimaryKey::Scalar(value) => vec![value.to_string()],
                    PrimaryKey::Pair(partition, sort) => {
                        vec![partition.to_string(), sort.to_string()]
                    }
                    PrimaryKey::Mapping(mapping) => mapping.into_keys().collect(),
                },
            }),
        }
    }

    /// Key attributes of a stored item.
    pub(crate) fn project_store_item(
        &self,
        item: &collections::HashMap<String, types::AttributeValue>,
    ) -> collections::HashMap<String, types::AttributeValue> {
        self.names()
            .into_iter()
            .filter_map(|name| Some((name.to_string(), item.get(name)?.clone())))
            .collect()
    }
}
