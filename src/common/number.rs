use aws_sdk_dynamodb::{primitives::Blob, types};
use base64::{Engine, engine::general_purpose::STANDARD};
use indexmap::IndexSet;
use serde::de::Error as _;
use serde_dynamo::{Error, Result, to_attribute_value};
use serde_json::{Map, Number, Value};
use std::collections;

/// Largest integer an `f64` represents exactly.
const MAX_EXACT_FLOAT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Convert a host value into the store's exact representation.
///
/// Numbers are written through their shortest round-trip string form, so `0.1` is stored as
/// `"0.1"` rather than the binary expansion of the float. Integral values are not coerced
/// here; [`to_native`] turns them into integers on the way back.
///
/// ```rust
/// use aws_sdk_dynamodb::types::AttributeValue;
/// use dynamodb_resource::common::number;
/// use serde_json::json;
///
/// let exact = number::to_exact(json!(1.2443)).unwrap();
/// assert_eq!(exact, AttributeValue::N("1.2443".to_string()));
/// ```
pub fn to_exact(value: Value) -> Result<types::AttributeValue> {
    to_attribute_value(value)
}

/// Convert a whole item.
pub fn to_exact_item(
    item: Map<String, Value>,
) -> Result<collections::HashMap<String, types::AttributeValue>> {
    item.into_iter()
        .map(|(name, value)| Ok((name, to_exact(value)?)))
        .collect()
}

/// Convert a store value back into a host value.
///
/// Decimals without a fractional part become integers, other decimals become floats. String
/// and number sets become arrays, binary values become base64 strings.
///
/// ```rust
/// use aws_sdk_dynamodb::types::AttributeValue;
/// use dynamodb_resource::common::number;
/// use serde_json::json;
///
/// let native = number::to_native(AttributeValue::N("3.0".to_string())).unwrap();
/// assert_eq!(native, json!(3));
/// ```
pub fn to_native(value: types::AttributeValue) -> Result<Value> {
    let value = match value {
        types::AttributeValue::B(blob) => Value::String(STANDARD.encode(blob.into_inner())),
        types::AttributeValue::Bool(boolean) => Value::Bool(boolean),
        types::AttributeValue::Bs(blobs) => Value::Array(
            blobs
                .into_iter()
                .map(|blob| Value::String(STANDARD.encode(blob.into_inner())))
                .collect(),
        ),
        types::AttributeValue::L(values) => Value::Array(
            values
                .into_iter()
                .map(to_native)
                .collect::<Result<_>>()?,
        ),
        types::AttributeValue::M(map) => Value::Object(to_native_item(map)?),
        types::AttributeValue::N(number) => Value::Number(parse_number(&number)?),
        types::AttributeValue::Ns(numbers) => Value::Array(
            numbers
                .iter()
                .map(|number| parse_number(number).map(Value::Number))
                .collect::<Result<_>>()?,
        ),
        types::AttributeValue::Null(_) => Value::Null,
        types::AttributeValue::S(string) => Value::String(string),
        types::AttributeValue::Ss(strings) => {
            Value::Array(strings.into_iter().map(Value::String).collect())
        }
        other => return Err(Error::custom(format!("unsupported store value {other:?}"))),
    };
    Ok(value)
}

/// Convert a whole store item.
pub fn to_native_item(
    item: collections::HashMap<String, types::AttributeValue>,
) -> Result<Map<String, Value>> {
    let mut names: Vec<_> = item.into_iter().collect();
    names.sort_by(|(left, _), (right, _)| left.cmp(right));
    names
        .into_iter()
        .map(|(name, value)| Ok((name, to_native(value)?)))
        .collect()
}

/// Convert an array into a store set: strings give a string set, numbers a number set.
///
/// Duplicates are dropped. The store has no empty sets, so an empty array is rejected, as is
/// an array mixing strings and numbers.
pub fn to_set(value: Value) -> Result<types::AttributeValue> {
    let elements = match value {
        Value::Array(elements) => elements,
        other => return Err(Error::custom(format!("expected an array for a set, got {other}"))),
    };
    match elements.first() {
        None => Err(Error::custom("the store does not accept empty sets")),
        Some(Value::String(_)) => elements
            .into_iter()
            .map(|element| match element {
                Value::String(string) => Ok(string),
                other => Err(Error::custom(format!("mixed set element {other}"))),
            })
            .collect::<Result<IndexSet<_>>>()
            .map(|strings| types::AttributeValue::Ss(strings.into_iter().collect())),
        Some(Value::Number(_)) => elements
            .into_iter()
            .map(|element| match element {
                Value::Number(number) => Ok(number.to_string()),
                other => Err(Error::custom(format!("mixed set element {other}"))),
            })
            .collect::<Result<IndexSet<_>>>()
            .map(|numbers| types::AttributeValue::Ns(numbers.into_iter().collect())),
        Some(other) => Err(Error::custom(format!("unsupported set element {other}"))),
    }
}

/// Decode a base64 string into a store binary value.
pub(crate) fn to_blob(encoded: &str) -> Result<types::AttributeValue> {
    STANDARD
        .decode(encoded)
        .map(|bytes| types::AttributeValue::B(Blob::new(bytes)))
        .map_err(Error::custom)
}

/// Decode base64 strings into a store binary set.
pub(crate) fn to_blob_set(value: Value) -> Result<types::AttributeValue> {
    let elements = match value {
        Value::Array(elements) if !elements.is_empty() => elements,
        other => return Err(Error::custom(format!("expected a non-empty array for a set, got {other}"))),
    };
    elements
        .iter()
        .map(|element| match element {
            Value::String(encoded) => STANDARD.decode(encoded).map(Blob::new).map_err(Error::custom),
            other => Err(Error::custom(format!("expected a base64 string, got {other}"))),
        })
        .collect::<Result<Vec<_>>>()
        .map(types::AttributeValue::Bs)
}

fn parse_number(number: &str) -> Result<Number> {
    if let Ok(integer) = number.parse::<i64>() {
        return Ok(integer.into());
    }
    if let Ok(integer) = number.parse::<u64>() {
        return Ok(integer.into());
    }
    let float: f64 = number.parse().map_err(Error::custom)?;
    if float.fract() == 0.0 && float.abs() < MAX_EXACT_FLOAT_INTEGER {
        return Ok((float as i64).into());
    }
    Number::from_f64(float).ok_or_else(|| Error::custom(format!("invalid number {number}")))
}
