//! Table schemas.
//!
//! A table's schema constrains the items it holds, names its primary key and declares its
//! secondary indexes. [`JsonSchema`] reads all of it from one JSON Schema (draft 7) document;
//! any other source can plug in through [`SchemaValidator`].
//!
//! Besides the JSON Schema types, four store types are understood: `bytes` (a base64
//! string), and `stringSet`, `numberSet` and `bytesSet` (arrays of unique strings, numbers
//! and base64 strings). Values declared with those types are written to the store as
//! binaries and sets instead of strings and lists.

use crate::{
    common::{number, path},
    store,
};

use aws_sdk_dynamodb::types;
use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use std::{fmt, fs, sync::Arc};

/// Bound on chained `$ref` lookups.
const MAX_REF_DEPTH: usize = 32;

/// Marks a node rewritten from a store type, holding the declared type name.
const STORE_TYPE: &str = "x-dynamodb-type";

/// Keywords whose values are data rather than schemas.
const DATA_KEYWORDS: [&str; 5] = ["$infrastructure", "const", "default", "enum", "examples"];

/// Which validator rejected a value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidatorKind {
    /// `type`
    Type,
    /// `required`
    Required,
    /// `additionalProperties`
    AdditionalProperties,
    /// `enum`
    Enum,
    /// `minItems`
    MinItems,
    /// `maxItems`
    MaxItems,
    /// Any other keyword, such as `minimum`, `pattern` or `anyOf`.
    Other,
}

/// The first violation found in a validated value.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Validator that failed.
    pub kind: ValidatorKind,
    /// What failed, worded after the JSON Schema reference validator.
    pub message: String,
    /// Absolute location of the offending value in the item.
    pub path: Vec<String>,
    /// Allowed values of the offending node, for type errors on enumerations.
    pub enum_values: Vec<Value>,
}

impl ValidationError {
    pub(crate) fn new(kind: ValidatorKind, message: String, location: Vec<String>) -> Self {
        Self {
            kind,
            message,
            path: location,
            enum_values: Vec::new(),
        }
    }
}

/// How a payload is checked before it reaches the store.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationMode {
    /// A whole item: every constraint applies.
    Put,
    /// A partial tree merged into an item: required properties are not enforced.
    Update,
    /// Paths to drop: no value is checked, but required attributes may not be removed.
    Remove,
}

/// Source of truth for the shape of a table's items.
pub trait SchemaValidator: Send + Sync + fmt::Debug {
    /// Check a whole item.
    fn validate(&self, item: &Value) -> Result<(), ValidationError>;

    /// Check a partial item, ignoring required properties.
    fn validate_sub_part(&self, partial: &Value) -> Result<(), ValidationError>;

    /// Required properties of the object at `path`.
    fn required_at(&self, path: &path::AttributePath) -> Vec<String>;

    /// Attribute names of the primary key, partition first.
    fn primary_key(&self) -> Vec<String>;

    /// Key attribute names of each secondary index, partition first.
    fn indexes(&self) -> IndexMap<String, Vec<String>>;

    /// Store representation of the value written at `path`.
    fn store_value(
        &self,
        path: &path::AttributePath,
        value: Value,
    ) -> serde_dynamo::Result<types::AttributeValue> {
        let _ = path;
        number::to_exact(value)
    }

    /// Store representation of a whole item.
    fn store_item(&self, item: Map<String, Value>) -> serde_dynamo::Result<store::StoreItem> {
        item.into_iter()
            .map(|(name, value)| {
                let attribute_path = path::AttributePath::from(name.as_str());
                Ok((name, self.store_value(&attribute_path, value)?))
            })
            .collect()
    }
}

/// A table schema held as a JSON Schema document, compiled with [`jsonschema`].
///
/// The primary key is read from `default` (an array of attribute names) or, failing that,
/// from `$infrastructure.KeySchema`. Secondary indexes are read from
/// `$infrastructure.GlobalSecondaryIndexes` and `$infrastructure.LocalSecondaryIndexes`.
///
/// ```rust
/// use dynamodb_resource::schema::{JsonSchema, SchemaValidator};
/// use serde_json::json;
///
/// # fn main() -> Result<(), dynamodb_resource::Error> {
/// let schema = JsonSchema::new(json!({
///     "type": "object",
///     "default": ["id"],
///     "properties": {
///         "id": {"type": "string", "pattern": "^[a-z]+$"},
///         "tags": {"type": "stringSet"}
///     },
///     "required": ["id"]
/// }))?;
/// assert_eq!(schema.primary_key(), vec!["id".to_string()]);
/// assert!(schema.validate(&json!({"id": "a", "tags": ["x"]})).is_ok());
/// assert!(schema.validate(&json!({"tags": ["x"]})).is_err());
/// assert!(schema.validate(&json!({"id": "A1"})).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct JsonSchema {
    document: Value,
    /// The document with store types rewritten, as the validators were compiled from it.
    compiled: Value,
    full: Arc<jsonschema::Validator>,
    partial: Arc<jsonschema::Validator>,
}

impl fmt::Debug for JsonSchema {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("JsonSchema")
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

impl PartialEq for JsonSchema {
    fn eq(&self, other: &Self) -> bool {
        self.document == other.document
    }
}

impl JsonSchema {
    /// Compile a schema document.
    ///
    /// Fails with [`crate::Error::Schema`] when the document is not a valid draft 7 schema.
    pub fn new(document: Value) -> crate::Result<Self> {
        let table = document
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self::compile(table, document)
    }

    /// Read and compile a schema document from a JSON file named after its table.
    pub fn from_path(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let table = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content = fs::read_to_string(path).map_err(|error| crate::Error::Schema {
            table: table.clone(),
            message: format!("cannot read {}: {error}", path.display()),
        })?;
        let document = serde_json::from_str(&content).map_err(|error| crate::Error::Schema {
            table: table.clone(),
            message: error.to_string(),
        })?;
        Self::compile(table, document)
    }

    fn compile(table: String, document: Value) -> crate::Result<Self> {
        let build = |keep_required| {
            let mut rewritten = document.clone();
            rewrite(&mut rewritten, keep_required);
            jsonschema::draft7::new(&rewritten)
                .map(|validator| (rewritten, Arc::new(validator)))
                .map_err(|error| crate::Error::Schema {
                    table: table.clone(),
                    message: error.to_string(),
                })
        };
        let (compiled, full) = build(true)?;
        let (_, partial) = build(false)?;
        Ok(Self {
            document,
            compiled,
            full,
            partial,
        })
    }

    /// The schema document.
    pub fn document(&self) -> &Value {
        &self.document
    }

    fn infrastructure(&self) -> Option<&Map<String, Value>> {
        self.document.get("$infrastructure")?.as_object()
    }

    /// Follow local `$ref`s until a node without one.
    fn resolve<'a>(&'a self, mut node: &'a Value) -> Option<&'a Value> {
        for _ in 0..MAX_REF_DEPTH {
            match node.get("$ref").and_then(Value::as_str) {
                Some(reference) => {
                    let pointer = reference.strip_prefix('#')?;
                    node = self.document.pointer(pointer)?;
                }
                None => return Some(node),
            }
        }
        None
    }

    /// Schema of the value found at `path`, if the document describes it.
    fn sub_schema(&self, path: &path::AttributePath) -> Option<&Value> {
        let mut node = self.resolve(&self.document)?;
        for step in path.steps() {
            node = match step {
                path::PathStep::Key(name) => child_schema(node, name)?,
                path::PathStep::Index(_) => node.get("items")?,
            };
            node = self.resolve(node)?;
        }
        Some(node)
    }

    fn check(
        &self,
        validator: &jsonschema::Validator,
        instance: &Value,
    ) -> Result<(), ValidationError> {
        let errors: Vec<_> = validator.iter_errors(instance).collect();
        let first = errors
            .iter()
            .find(|error| error.schema_path.to_string().ends_with("/type"))
            .or_else(|| errors.first());
        match first {
            None => Ok(()),
            Some(error) => Err(self.describe(
                instance,
                &error.instance_path.to_string(),
                &error.schema_path.to_string(),
                error.to_string(),
            )),
        }
    }

    /// Nodes of the compiled document along a schema path, the root first.
    fn schema_nodes(&self, steps: &[String]) -> Option<Vec<&Value>> {
        let mut nodes = vec![&self.compiled];
        for step in steps {
            let node = *nodes.last()?;
            let reference = node.get("$ref").and_then(Value::as_str);
            let next = match (node, reference) {
                (_, Some(reference)) if step == "$ref" => {
                    self.compiled.pointer(reference.strip_prefix('#')?)?
                }
                (Value::Object(object), Some(reference)) if !object.contains_key(step) => self
                    .compiled
                    .pointer(reference.strip_prefix('#')?)?
                    .get(step)?,
                (Value::Object(object), _) => object.get(step)?,
                (Value::Array(elements), _) => elements.get(step.parse::<usize>().ok()?)?,
                _ => return None,
            };
            nodes.push(next);
        }
        Some(nodes)
    }

    /// Reword a validator error after the reference validator.
    fn describe(
        &self,
        instance: &Value,
        instance_pointer: &str,
        schema_pointer: &str,
        fallback: String,
    ) -> ValidationError {
        let location = segments(instance_pointer);
        let steps = segments(schema_pointer);
        let other = |location| ValidationError::new(ValidatorKind::Other, fallback, location);
        let Some(nodes) = self.schema_nodes(&steps) else {
            return other(location);
        };
        let Some(keyword) = steps.last() else {
            return other(location);
        };
        let value = instance.pointer(instance_pointer).unwrap_or(&Value::Null);

        let store_typed = steps.iter().enumerate().rev().find_map(|(position, step)| {
            let declared = nodes[position].get(STORE_TYPE)?.as_str()?;
            ["type", "items", "uniqueItems"]
                .contains(&step.as_str())
                .then_some((position, declared))
        });
        if let Some((position, declared)) = store_typed {
            let (location, value) = if steps[position] == "items" {
                let parent = instance_pointer
                    .rsplit_once('/')
                    .map_or("", |(parent, _)| parent);
                (
                    segments(parent),
                    instance.pointer(parent).unwrap_or(&Value::Null),
                )
            } else {
                (location, value)
            };
            return type_error(value, &[declared], nodes[position], location);
        }

        let node = nodes[nodes.len() - 1];
        let parent = nodes[nodes.len().saturating_sub(2)];
        match keyword.as_str() {
            "type" => type_error(value, &type_names(node), parent, location),
            "required" => {
                let missing = node
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_str)
                    .find(|name| value.get(*name).is_none())
                    .unwrap_or_default();
                ValidationError::new(
                    ValidatorKind::Required,
                    format!("'{missing}' is a required property"),
                    location,
                )
            }
            "additionalProperties" => {
                let properties = parent.get("properties").and_then(Value::as_object);
                let unexpected: Vec<_> = value
                    .as_object()
                    .into_iter()
                    .flat_map(Map::keys)
                    .filter(|name| !properties.is_some_and(|properties| properties.contains_key(*name)))
                    .map(|name| format!("'{name}'"))
                    .collect();
                let verb = if unexpected.len() == 1 { "was" } else { "were" };
                ValidationError::new(
                    ValidatorKind::AdditionalProperties,
                    format!(
                        "Additional properties are not allowed ({} {verb} unexpected)",
                        unexpected.join(", ")
                    ),
                    location,
                )
            }
            "enum" => {
                let allowed = node
                    .as_array()
                    .into_iter()
                    .flatten()
                    .map(repr)
                    .collect::<Vec<_>>()
                    .join(", ");
                ValidationError::new(
                    ValidatorKind::Enum,
                    format!("{} is not one of [{allowed}]", repr(value)),
                    location,
                )
            }
            "minItems" => {
                let qualifier = if value.as_array().is_some_and(Vec::is_empty) {
                    "should be non-empty"
                } else {
                    "is too short"
                };
                ValidationError::new(
                    ValidatorKind::MinItems,
                    format!("{} {qualifier}", repr(value)),
                    location,
                )
            }
            "maxItems" => ValidationError::new(
                ValidatorKind::MaxItems,
                format!("{} is too long", repr(value)),
                location,
            ),
            _ => other(location),
        }
    }

    fn convert(
        &self,
        node: Option<&Value>,
        value: Value,
    ) -> serde_dynamo::Result<types::AttributeValue> {
        let node = node.and_then(|node| self.resolve(node));
        let declared = node.and_then(|node| node.get("type")).and_then(Value::as_str);
        match (declared, value) {
            (Some("stringSet" | "numberSet"), value @ Value::Array(_)) => number::to_set(value),
            (Some("bytesSet"), value @ Value::Array(_)) => number::to_blob_set(value),
            (Some("bytes"), Value::String(encoded)) => number::to_blob(&encoded),
            (_, Value::Object(object)) => object
                .into_iter()
                .map(|(name, value)| {
                    let child = node.and_then(|node| child_schema(node, &name));
                    Ok((name, self.convert(child, value)?))
                })
                .collect::<serde_dynamo::Result<_>>()
                .map(types::AttributeValue::M),
            (_, Value::Array(elements)) => elements
                .into_iter()
                .map(|element| self.convert(node.and_then(|node| node.get("items")), element))
                .collect::<serde_dynamo::Result<_>>()
                .map(types::AttributeValue::L),
            (_, value) => number::to_exact(value),
        }
    }
}

impl SchemaValidator for JsonSchema {
    fn validate(&self, item: &Value) -> Result<(), ValidationError> {
        self.check(&self.full, item)
    }

    fn validate_sub_part(&self, partial: &Value) -> Result<(), ValidationError> {
        self.check(&self.partial, partial)
    }

    fn required_at(&self, path: &path::AttributePath) -> Vec<String> {
        self.sub_schema(path)
            .and_then(|node| node.get("required"))
            .and_then(Value::as_array)
            .map(|required| {
                required
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn primary_key(&self) -> Vec<String> {
        if let Some(Value::Array(names)) = self.document.get("default") {
            return names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
        self.infrastructure()
            .and_then(|infrastructure| infrastructure.get("KeySchema"))
            .map(key_names)
            .unwrap_or_default()
    }

    fn indexes(&self) -> IndexMap<String, Vec<String>> {
        let Some(infrastructure) = self.infrastructure() else {
            return IndexMap::new();
        };
        ["GlobalSecondaryIndexes", "LocalSecondaryIndexes"]
            .into_iter()
            .filter_map(|section| infrastructure.get(section)?.as_array())
            .flatten()
            .filter_map(|index| {
                let name = index.get("IndexName")?.as_str()?;
                Some((name.to_string(), key_names(index.get("KeySchema")?)))
            })
            .collect()
    }

    fn store_value(
        &self,
        path: &path::AttributePath,
        value: Value,
    ) -> serde_dynamo::Result<types::AttributeValue> {
        self.convert(self.sub_schema(path), value)
    }
}

/// JSON type and element type a store type is checked as.
fn store_type(name: &str) -> Option<(&'static str, Option<&'static str>)> {
    match name {
        "bytes" => Some(("string", None)),
        "stringSet" | "bytesSet" => Some(("array", Some("string"))),
        "numberSet" => Some(("array", Some("number"))),
        _ => None,
    }
}

/// Replace the store types with the draft 7 schemas they are checked as.
///
/// Without `keep_required`, `required` is dropped everywhere.
fn rewrite(node: &mut Value, keep_required: bool) {
    match node {
        Value::Object(object) => {
            if !keep_required && object.get("required").is_some_and(Value::is_array) {
                object.remove("required");
            }
            let declared = match object.get("type") {
                Some(Value::String(name)) => store_type(name).map(|shape| (name.clone(), shape)),
                _ => None,
            };
            if let Some((name, (base, items))) = declared {
                object.insert("type".to_string(), Value::from(base));
                if let Some(items) = items {
                    object.insert("items".to_string(), json!({"type": items}));
                    object.insert("uniqueItems".to_string(), Value::Bool(true));
                }
                object.insert(STORE_TYPE.to_string(), Value::String(name));
            } else if let Some(Value::Array(names)) = object.get_mut("type") {
                let mut bases: Vec<Value> = Vec::with_capacity(names.len());
                for name in names.iter() {
                    let base = match name.as_str().and_then(store_type) {
                        Some((base, _)) => Value::from(base),
                        None => name.clone(),
                    };
                    if !bases.contains(&base) {
                        bases.push(base);
                    }
                }
                *names = bases;
            }
            for (keyword, value) in object.iter_mut() {
                if !DATA_KEYWORDS.contains(&keyword.as_str()) {
                    rewrite(value, keep_required);
                }
            }
        }
        Value::Array(elements) => {
            for element in elements {
                rewrite(element, keep_required);
            }
        }
        _ => {}
    }
}

/// Unescaped segments of a JSON pointer.
fn segments(pointer: &str) -> Vec<String> {
    pointer
        .split('/')
        .skip(1)
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect()
}

fn type_error(
    value: &Value,
    names: &[&str],
    node: &Value,
    location: Vec<String>,
) -> ValidationError {
    let quoted = names
        .iter()
        .map(|name| format!("'{name}'"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut error = ValidationError::new(
        ValidatorKind::Type,
        format!("{} is not of type {quoted}", repr(value)),
        location,
    );
    if let Some(Value::Array(enum_values)) = node.get("enum") {
        error.enum_values = enum_values.clone();
    }
    error
}

fn child_schema<'a>(node: &'a Value, name: &str) -> Option<&'a Value> {
    node.get("properties")
        .and_then(|properties| properties.get(name))
        .or_else(|| node.get("additionalProperties").filter(|additional| additional.is_object()))
}

/// Partition then sort attribute of a `KeySchema` array.
fn key_names(key_schema: &Value) -> Vec<String> {
    let elements = key_schema.as_array().map(Vec::as_slice).unwrap_or_default();
    let named = |key_type: &str| {
        elements.iter().find_map(|element| {
            (element.get("KeyType")?.as_str()? == key_type)
                .then(|| element.get("AttributeName")?.as_str().map(str::to_string))
                .flatten()
        })
    };
    named("HASH").into_iter().chain(named("RANGE")).collect()
}

fn type_names(expected: &Value) -> Vec<&str> {
    match expected {
        Value::String(name) => vec![name.as_str()],
        Value::Array(names) => names.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

/// Render a value the way validation messages quote it.
fn repr(value: &Value) -> String {
    match value {
        Value::String(string) => format!("'{string}'"),
        other => other.to_string(),
    }
}
