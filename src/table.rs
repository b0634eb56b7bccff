//! Table facade.
//!
//! A [`Table`] binds a logical table name to its key shape, secondary indexes, schema and
//! store, and exposes every item operation of the crate.

use crate::{
    common::{condition, key, number, path},
    error::{Error, Result},
    read::{self, query},
    schema::{self, SchemaValidator, ValidationMode},
    store::{Store, StoreError, StoreItem},
    write::{
        self,
        orchestrator::{Guards, Write},
        returns::ReturnShape,
        update_expression::{UpdateMode, UpdatePlan},
    },
};

use aws_sdk_dynamodb::types;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::{Arc, OnceLock};

/// Options of the attribute updates.
///
/// ```rust
/// use dynamodb_resource::{
///     common::condition::Attr,
///     table::UpdateOptions,
///     write::returns::ReturnShape,
/// };
///
/// let options = UpdateOptions {
///     condition: Some(Attr::new("some_int").eq(42)),
///     returns: ReturnShape::UpdatedNew,
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateOptions {
    /// Create the item from the key and the new data when it does not exist.
    pub create_item_if_non_existent: bool,
    /// Let [`Table::update_attribute`] and [`Table::update_append_list`] write attributes that
    /// are not set yet.
    pub set_new_attribute_if_not_existent: bool,
    /// Let [`Table::add_new_attribute`] overwrite attributes that are already set.
    pub update_if_existent: bool,
    /// Caller condition that must hold for the update to commit.
    pub condition: Option<condition::ConditionSet>,
    /// What the update hands back.
    pub returns: ReturnShape,
}

/// Options of the attribute removals.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoveOptions {
    /// Caller condition that must hold for the removal to commit.
    pub condition: Option<condition::ConditionSet>,
    /// What the removal hands back; the removed values by default.
    pub returns: ReturnShape,
}

impl Default for RemoveOptions {
    fn default() -> Self {
        Self {
            condition: None,
            returns: ReturnShape::Deleted,
        }
    }
}

/// One logical table.
///
/// ```rust,no_run
/// use dynamodb_resource::{Resource, ResourceConfig, table::UpdateOptions};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), dynamodb_resource::Error> {
/// let resource = Resource::from_config(ResourceConfig::from_env()?).await;
/// let table = resource.table("TableForTests")?;
/// table
///     .update_attribute(
///         "some_identification_string",
///         json!({"some_dict": {"key1": "new_value"}}).as_object().cloned().unwrap_or_default(),
///         UpdateOptions::default(),
///     )
///     .await?;
/// let item = table.get("some_identification_string").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Table {
    pub(crate) name: String,
    pub(crate) physical_name: String,
    pub(crate) key_shape: key::KeyShape,
    pub(crate) schema: Arc<dyn SchemaValidator>,
    pub(crate) store: Arc<dyn Store>,
    indexes: OnceLock<IndexMap<String, key::KeyShape>>,
}

impl Table {
    /// Bind a table to its schema and store.
    ///
    /// Fails when the schema does not declare a primary key of one or two attributes.
    pub fn new(
        name: impl Into<String>,
        physical_name: impl Into<String>,
        schema: Arc<dyn SchemaValidator>,
        store: Arc<dyn Store>,
    ) -> Result<Self> {
        let name = name.into();
        let primary_key = schema.primary_key();
        let key_shape = key::KeyShape::from_names(&primary_key).ok_or_else(|| Error::Schema {
            table: name.clone(),
            message: format!("primary key must have one or two attributes, got {primary_key:?}"),
        })?;
        Ok(Self {
            name,
            physical_name: physical_name.into(),
            key_shape,
            schema,
            store,
            indexes: OnceLock::new(),
        })
    }

    /// Logical name of the table.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the table in the store.
    pub fn physical_name(&self) -> &str {
        &self.physical_name
    }

    /// Key attributes of the table.
    pub fn key_shape(&self) -> &key::KeyShape {
        &self.key_shape
    }

    /// Key shape of a secondary index.
    pub fn index_shape(&self, index_name: &str) -> Result<&key::KeyShape> {
        self.indexes
            .get_or_init(|| {
                self.schema
                    .indexes()
                    .into_iter()
                    .filter_map(|(name, names)| Some((name, key::KeyShape::from_names(&names)?)))
                    .collect()
            })
            .get(index_name)
            .ok_or_else(|| Error::UnknownIndex {
                table: self.name.clone(),
                index: index_name.to_string(),
            })
    }

    fn keys(&self, key: impl Into<key::PrimaryKey>) -> Result<key::Keys<Value>> {
        self.key_shape.normalize(&self.name, key.into())
    }

    fn not_found(&self, keys: &key::Keys<Value>) -> Error {
        Error::NotFound {
            table: self.name.clone(),
            key: keys.to_string(),
        }
    }

    /// Check a payload before anything reaches the store.
    ///
    /// `paths` are the paths a removal drops; the other modes check `payload`.
    fn validate(
        &self,
        mode: ValidationMode,
        paths: &[path::AttributePath],
        payload: &Value,
    ) -> Result<()> {
        let invalid = |source| Error::Validation {
            table: self.name.clone(),
            mode,
            source,
        };
        match mode {
            ValidationMode::Put => self.schema.validate(payload).map_err(invalid),
            ValidationMode::Update => {
                let given: Vec<String> = self
                    .key_shape
                    .names()
                    .into_iter()
                    .filter(|name| payload.get(*name).is_some())
                    .map(str::to_string)
                    .collect();
                if !given.is_empty() {
                    return Err(Error::WrongPrimaryKey {
                        table: self.name.clone(),
                        required: self.key_shape.names().into_iter().map(str::to_string).collect(),
                        given,
                    });
                }
                self.schema.validate_sub_part(payload).map_err(invalid)
            }
            ValidationMode::Remove => {
                for (position, removed) in paths.iter().enumerate() {
                    if let Some(overlapping) =
                        paths[position + 1..].iter().find(|other| removed.conflicts_with(other))
                    {
                        return Err(invalid(schema::ValidationError {
                            kind: schema::ValidatorKind::Other,
                            message: format!("paths {removed} and {overlapping} overlap"),
                            path: Vec::new(),
                            enum_values: Vec::new(),
                        }));
                    }
                    let Some(attribute) = removed.last_key() else {
                        continue;
                    };
                    let parent = removed.parent();
                    let required = (parent.is_empty()
                        && self.key_shape.names().contains(&attribute))
                        || self.schema.required_at(&parent).iter().any(|name| name == attribute);
                    if required {
                        return Err(invalid(schema::ValidationError::new(
                            schema::ValidatorKind::Required,
                            format!("{attribute} is a required attribute in {parent}"),
                            removed
                                .steps()
                                .iter()
                                .map(|step| match step {
                                    path::PathStep::Key(name) => name.clone(),
                                    path::PathStep::Index(position) => position.to_string(),
                                })
                                .collect(),
                        )));
                    }
                }
                Ok(())
            }
        }
    }

    /// Read one item.
    #[tracing::instrument(name = "dynamodb_resource.get", skip_all, fields(table = %self.name), err)]
    pub async fn get(&self, key: impl Into<key::PrimaryKey>) -> Result<Map<String, Value>> {
        let keys = self.keys(key)?;
        let item = self
            .store
            .get_item(&self.physical_name, StoreItem::try_from(keys.clone())?)
            .await?;
        match item {
            Some(item) => Ok(number::to_native_item(item)?),
            None => Err(self.not_found(&keys)),
        }
    }

    /// Description of the table as the store reports it.
    #[tracing::instrument(name = "dynamodb_resource.describe", skip_all, fields(table = %self.name), err)]
    pub async fn describe(&self) -> Result<types::TableDescription> {
        Ok(self.store.describe_table(&self.physical_name).await?)
    }

    /// Write a whole item.
    ///
    /// Without `overwrite` the item must not exist yet.
    #[tracing::instrument(name = "dynamodb_resource.put", skip_all, fields(table = %self.name), err)]
    pub async fn put(&self, item: Map<String, Value>, overwrite: bool) -> Result<()> {
        self.insert(item, overwrite).await.map(|_| ())
    }

    /// Validate and write a whole item, returning it as stored.
    pub(crate) async fn insert(
        &self,
        item: Map<String, Value>,
        overwrite: bool,
    ) -> Result<StoreItem> {
        self.validate(ValidationMode::Put, &[], &Value::Object(item.clone()))?;
        let key_attributes: IndexMap<String, Value> = self
            .key_shape
            .names()
            .into_iter()
            .filter_map(|name| Some((name.to_string(), item.get(name)?.clone())))
            .collect();
        self.key_shape
            .normalize(&self.name, key::PrimaryKey::Mapping(key_attributes))?;
        let stored = self.schema.store_item(item.clone())?;
        let mut write_input = write::common::WriteInput {
            table_name: self.physical_name.clone(),
            ..Default::default()
        };
        if !overwrite {
            let mut names = crate::common::NamePlaceholders::default();
            let key_paths: Vec<_> = self
                .key_shape
                .names()
                .into_iter()
                .map(path::AttributePath::from)
                .collect();
            for key_path in &key_paths {
                names.assign_path(key_path);
            }
            write_input.expression_attribute_names = names.expression_attribute_names();
            write_input = write_input.with_condition(condition::build_conditions(
                &[],
                &key_paths,
                &names,
                None,
            ));
        }
        let request = write::common::PutRequest {
            item: stored.clone(),
            write_input,
        };
        match self.store.put_item(request).await {
            Ok(()) => Ok(stored),
            Err(StoreError::ConditionalCheckFailed { .. }) => Err(Error::AlreadyExists {
                table: self.name.clone(),
                item: Value::Object(item).to_string(),
            }),
            Err(error) => Err(error.into()),
        }
    }

    /// Delete one item.
    ///
    /// With `require_exists`, deleting an absent item fails with [`Error::NotFound`].
    #[tracing::instrument(name = "dynamodb_resource.delete", skip_all, fields(table = %self.name), err)]
    pub async fn delete(&self, key: impl Into<key::PrimaryKey>, require_exists: bool) -> Result<()> {
        let keys = self.keys(key)?;
        let old = self
            .store
            .delete_item(&self.physical_name, StoreItem::try_from(keys.clone())?)
            .await?;
        if old.is_none() && require_exists {
            return Err(self.not_found(&keys));
        }
        Ok(())
    }

    /// Delete one item and return it as it was.
    #[tracing::instrument(name = "dynamodb_resource.get_and_delete", skip_all, fields(table = %self.name), err)]
    pub async fn get_and_delete(
        &self,
        key: impl Into<key::PrimaryKey>,
    ) -> Result<Map<String, Value>> {
        let keys = self.keys(key)?;
        let old = self
            .store
            .delete_item(&self.physical_name, StoreItem::try_from(keys.clone())?)
            .await?;
        match old {
            Some(item) => Ok(number::to_native_item(item)?),
            None => Err(self.not_found(&keys)),
        }
    }

    async fn update(
        &self,
        key: key::PrimaryKey,
        mode: UpdateMode,
        new_data: Map<String, Value>,
        append: bool,
        guards: Guards,
        options: UpdateOptions,
    ) -> Result<Option<Value>> {
        let keys = self.keys(key)?;
        let (paths, values) = path::flatten(&new_data);
        let new_data = Value::Object(new_data);
        self.validate(ValidationMode::Update, &[], &new_data)?;
        if paths.is_empty() {
            return Err(Error::EmptyUpdate {
                table: self.name.clone(),
            });
        }
        Write {
            table: self,
            keys,
            mode,
            leaves: UpdatePlan::leaves(paths, values, append),
            new_data,
            guards,
            condition: options.condition,
            returns: options.returns,
        }
        .run()
        .await
    }

    /// Set attributes of an existing item.
    ///
    /// Every written path must already be set, unless
    /// [`UpdateOptions::set_new_attribute_if_not_existent`]; missing intermediate maps are then
    /// created.
    #[tracing::instrument(name = "dynamodb_resource.update_attribute", skip_all, fields(table = %self.name), err)]
    pub async fn update_attribute(
        &self,
        key: impl Into<key::PrimaryKey>,
        new_data: Map<String, Value>,
        options: UpdateOptions,
    ) -> Result<Option<Value>> {
        let guards = Guards {
            require_present: !options.set_new_attribute_if_not_existent,
            require_missing: false,
            create_if_missing: options.create_item_if_non_existent,
        };
        self.update(key.into(), UpdateMode::Set, new_data, false, guards, options)
            .await
    }

    /// Set attributes that are not set yet.
    ///
    /// Fails with [`Error::AttributeAlreadyExists`] when one is, unless
    /// [`UpdateOptions::update_if_existent`].
    #[tracing::instrument(name = "dynamodb_resource.add_new_attribute", skip_all, fields(table = %self.name), err)]
    pub async fn add_new_attribute(
        &self,
        key: impl Into<key::PrimaryKey>,
        new_data: Map<String, Value>,
        options: UpdateOptions,
    ) -> Result<Option<Value>> {
        let guards = Guards {
            require_present: false,
            require_missing: !options.update_if_existent,
            create_if_missing: options.create_item_if_non_existent,
        };
        self.update(key.into(), UpdateMode::Set, new_data, false, guards, options)
            .await
    }

    /// Append the given lists to the lists already stored at their paths.
    ///
    /// Not idempotent: retrying after an ambiguous failure may append twice.
    #[tracing::instrument(name = "dynamodb_resource.update_append_list", skip_all, fields(table = %self.name), err)]
    pub async fn update_append_list(
        &self,
        key: impl Into<key::PrimaryKey>,
        new_data: Map<String, Value>,
        options: UpdateOptions,
    ) -> Result<Option<Value>> {
        let guards = Guards {
            require_present: !options.set_new_attribute_if_not_existent,
            require_missing: false,
            create_if_missing: options.create_item_if_non_existent,
        };
        self.update(key.into(), UpdateMode::Set, new_data, true, guards, options)
            .await
    }

    /// Add elements to the sets at the given paths, creating the sets when absent.
    #[tracing::instrument(name = "dynamodb_resource.update_add_set", skip_all, fields(table = %self.name), err)]
    pub async fn update_add_set(
        &self,
        key: impl Into<key::PrimaryKey>,
        new_data: Map<String, Value>,
        options: UpdateOptions,
    ) -> Result<Option<Value>> {
        self.update(
            key.into(),
            UpdateMode::AddToSet,
            new_data,
            false,
            Guards::default(),
            options,
        )
        .await
    }

    /// Drop elements from the sets at the given paths.
    #[tracing::instrument(name = "dynamodb_resource.remove_from_set", skip_all, fields(table = %self.name), err)]
    pub async fn remove_from_set(
        &self,
        key: impl Into<key::PrimaryKey>,
        new_data: Map<String, Value>,
        options: UpdateOptions,
    ) -> Result<Option<Value>> {
        self.update(
            key.into(),
            UpdateMode::DeleteFromSet,
            new_data,
            false,
            Guards::default(),
            options,
        )
        .await
    }

    /// Remove one attribute.
    pub async fn remove_attribute(
        &self,
        key: impl Into<key::PrimaryKey>,
        attribute: impl Into<path::AttributePath>,
        options: RemoveOptions,
    ) -> Result<Option<Value>> {
        self.remove_attributes(key, vec![attribute.into()], options)
            .await
    }

    /// Remove attributes; attributes their parent requires cannot be removed.
    #[tracing::instrument(name = "dynamodb_resource.remove_attributes", skip_all, fields(table = %self.name), err)]
    pub async fn remove_attributes(
        &self,
        key: impl Into<key::PrimaryKey>,
        paths: Vec<path::AttributePath>,
        options: RemoveOptions,
    ) -> Result<Option<Value>> {
        let keys = self.keys(key)?;
        if paths.is_empty() {
            return Err(Error::EmptyUpdate {
                table: self.name.clone(),
            });
        }
        self.validate(ValidationMode::Remove, &paths, &Value::Null)?;
        let count = paths.len();
        Write {
            table: self,
            keys,
            mode: UpdateMode::Remove,
            new_data: Value::Null,
            leaves: UpdatePlan::leaves(paths, vec![Value::Null; count], false),
            guards: Guards::default(),
            condition: options.condition,
            returns: options.returns,
        }
        .run()
        .await
    }

    /// Remove the entry at `position` of the list at `attribute` and return it.
    ///
    /// Fails with [`Error::IndexOutOfRange`] when the list has no such position.
    #[tracing::instrument(name = "dynamodb_resource.remove_entry_in_list", skip_all, fields(table = %self.name), err)]
    pub async fn remove_entry_in_list(
        &self,
        key: impl Into<key::PrimaryKey>,
        attribute: impl Into<path::AttributePath>,
        position: usize,
        condition: Option<condition::ConditionSet>,
    ) -> Result<Value> {
        let keys = self.keys(key)?;
        let list = attribute.into();
        let entry = list.clone().index(position);
        let old = self
            .remove_attributes(
                keys.to_map(),
                vec![entry.clone()],
                RemoveOptions {
                    condition,
                    returns: ReturnShape::AllOld,
                },
            )
            .await?;
        match old.as_ref().and_then(|old| path::walk(old, &entry)) {
            Some(value) => Ok(value.clone()),
            None => Err(Error::IndexOutOfRange {
                table: self.name.clone(),
                key: keys.to_string(),
                path: list.to_string(),
                position,
            }),
        }
    }

    /// Read one page of a query on the table or one of its secondary indexes.
    #[tracing::instrument(name = "dynamodb_resource.query", skip_all, fields(table = %self.name), err)]
    pub async fn query(&self, query: query::Query) -> Result<query::QueryPage> {
        let shape = match &query.index_name {
            Some(index_name) => self.index_shape(index_name)?,
            None => &self.key_shape,
        };
        let request = query.into_request(shape, &self.name, self.physical_name.clone())?;
        let page = self.store.query(request).await?;
        Ok(query::QueryPage::try_from(page)?)
    }

    /// All items of a secondary index under one index key, following every page.
    ///
    /// The key follows the index's own key shape.
    #[tracing::instrument(name = "dynamodb_resource.index_get", skip_all, fields(table = %self.name), err)]
    pub async fn index_get(
        &self,
        index_name: &str,
        key: impl Into<key::PrimaryKey>,
    ) -> Result<Vec<Map<String, Value>>> {
        let keys = self.index_shape(index_name)?.normalize(&self.name, key.into())?;
        let mut items = Vec::new();
        let mut cursor = None;
        loop {
            let page = self
                .query(query::Query {
                    index_name: Some(index_name.to_string()),
                    partition_value: keys.partition_key.value.clone(),
                    sort_key_condition: keys
                        .sort_key
                        .as_ref()
                        .map(|sort_key| condition::Condition::Equals(sort_key.value.clone())),
                    cursor,
                    ..Default::default()
                })
                .await?;
            items.extend(page.items);
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(items),
            }
        }
    }

    async fn scan_store(&self) -> Result<Vec<StoreItem>> {
        let mut items = Vec::new();
        let mut exclusive_start_key = None;
        loop {
            let page: read::common::StorePage = self
                .store
                .scan(&self.physical_name, exclusive_start_key)
                .await?;
            items.extend(page.items);
            match page.last_evaluated_key {
                Some(next) => exclusive_start_key = Some(next),
                None => return Ok(items),
            }
        }
    }

    /// Every item of the table.
    #[tracing::instrument(name = "dynamodb_resource.scan", skip_all, fields(table = %self.name), err)]
    pub async fn scan(&self) -> Result<Vec<Map<String, Value>>> {
        Ok(self
            .scan_store()
            .await?
            .into_iter()
            .map(number::to_native_item)
            .collect::<serde_dynamo::Result<_>>()?)
    }

    /// Delete every item of the table, returning how many were deleted.
    #[tracing::instrument(name = "dynamodb_resource.truncate", skip_all, fields(table = %self.name), err)]
    pub async fn truncate(&self) -> Result<usize> {
        let keys: Vec<_> = self
            .scan_store()
            .await?
            .iter()
            .map(|item| self.key_shape.project_store_item(item))
            .collect();
        let count = keys.len();
        if count > 0 {
            self.store.batch_delete(&self.physical_name, keys).await?;
        }
        tracing::info!(table = %self.name, count, "truncated");
        Ok(count)
    }

    /// Items under the given keys, in the order of the keys; absent keys are skipped.
    pub async fn batch_get<K: Into<key::PrimaryKey>>(
        &self,
        keys: impl IntoIterator<Item = K>,
    ) -> Result<Vec<Map<String, Value>>> {
        Ok(self.batch_get_keyed(keys).await?.into_values().collect())
    }

    /// Items under the given keys, keyed by primary-key tuple in the order of the keys.
    #[tracing::instrument(name = "dynamodb_resource.batch_get", skip_all, fields(table = %self.name), err)]
    pub async fn batch_get_keyed<K: Into<key::PrimaryKey>>(
        &self,
        keys: impl IntoIterator<Item = K>,
    ) -> Result<IndexMap<key::KeyTuple, Map<String, Value>>> {
        let keys = keys
            .into_iter()
            .map(|key| self.keys(key))
            .collect::<Result<Vec<_>>>()?;
        if keys.is_empty() {
            return Ok(IndexMap::new());
        }
        let store_keys = read::batch_get::unique_store_keys(&keys)?;
        let items = self
            .store
            .batch_get_item(&self.physical_name, store_keys)
            .await?;
        Ok(read::batch_get::arrange(&self.key_shape, &keys, items)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        common::condition::Attr,
        schema::ValidatorKind,
        testing::{Call, Reply, ScriptedStore},
    };

    use rstest::rstest;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    fn stored(value: Value) -> StoreItem {
        number::to_exact_item(map(value)).unwrap()
    }

    fn conditional() -> StoreError {
        StoreError::ConditionalCheckFailed {
            message: "The conditional request failed".to_string(),
        }
    }

    #[tokio::test]
    async fn test_get() {
        let (table, store) = ScriptedStore::table(vec![Reply::Item(Some(
            json!({"primary_partition_key": "a", "some_float": 1.0}),
        ))]);
        let item = table.get("a").await.unwrap();
        assert_eq!(item, map(json!({"primary_partition_key": "a", "some_float": 1})));
        assert_eq!(
            store.calls(),
            vec![Call::GetItem(stored(json!({"primary_partition_key": "a"})))]
        );
    }

    #[tokio::test]
    async fn test_get_absent() {
        let (table, _) = ScriptedStore::table(vec![Reply::Item(None)]);
        let error = table.get("a").await.unwrap_err();
        assert_eq!(error.status_code(), 404);
        assert_eq!(error.body(), r#"{"primary_partition_key":"a"} not found in TableForTests"#);
    }

    #[tokio::test]
    async fn test_get_with_wrong_key() {
        let (table, store) = ScriptedStore::table(vec![]);
        let error = table.get(("a", "b")).await.unwrap_err();
        assert!(matches!(error, Error::WrongPrimaryKey { .. }));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_put_guards_against_existing_item() {
        let (table, store) = ScriptedStore::table(vec![Reply::Put, Reply::Failed(conditional())]);
        let item = map(json!({"primary_partition_key": "a", "some_int": 1}));
        table.put(item.clone(), false).await.unwrap();
        let error = table.put(item, false).await.unwrap_err();
        assert!(matches!(error, Error::AlreadyExists { .. }));
        let Call::PutItem(request) = &store.calls()[0] else {
            panic!("expected a put")
        };
        assert_eq!(
            request.write_input.condition_expression.as_deref(),
            Some("attribute_not_exists(#AA)")
        );
        assert_eq!(request.write_input.table_name, "TEST-TableForTests");
    }

    #[tokio::test]
    async fn test_put_overwrite_has_no_condition() {
        let (table, store) = ScriptedStore::table(vec![Reply::Put]);
        table
            .put(map(json!({"primary_partition_key": "a", "some_int": 1})), true)
            .await
            .unwrap();
        let Call::PutItem(request) = &store.calls()[0] else {
            panic!("expected a put")
        };
        assert_eq!(request.write_input.condition_expression, None);
        assert!(request.write_input.expression_attribute_names.is_empty());
    }

    #[rstest]
    #[case::missing_required(json!({"primary_partition_key": "a"}), ValidatorKind::Required)]
    #[case::wrong_type(
        json!({"primary_partition_key": "a", "some_int": "x"}),
        ValidatorKind::Type
    )]
    #[case::additional_property(
        json!({"primary_partition_key": "a", "some_int": 1, "unknown": 1}),
        ValidatorKind::AdditionalProperties
    )]
    #[tokio::test]
    async fn test_put_validates(#[case] item: Value, #[case] expected: ValidatorKind) {
        let (table, store) = ScriptedStore::table(vec![]);
        let error = table.put(map(item), false).await.unwrap_err();
        assert!(matches!(error, Error::Validation { ref source, .. } if source.kind == expected));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_put_type_error_body() {
        let (table, _) = ScriptedStore::table(vec![]);
        let error = table
            .put(
                map(json!({"primary_partition_key": "a", "some_int": "not a number"})),
                false,
            )
            .await
            .unwrap_err();
        assert_eq!(error.status_code(), 415);
        assert_eq!(
            error.body(),
            "Wrong value type in TableForTests for key=some_int:\n'not a number' is not of type 'integer'."
        );
    }

    #[tokio::test]
    async fn test_update_creating_incomplete_item_is_rejected() {
        let (table, store) =
            ScriptedStore::table(vec![Reply::Failed(conditional()), Reply::Item(None)]);
        let error = table
            .update_attribute(
                "a",
                map(json!({"some_string": "x"})),
                UpdateOptions {
                    create_item_if_non_existent: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            Error::Validation { ref source, .. } if source.kind == ValidatorKind::Required
        ));
        assert_eq!(error.status_code(), 400);
        assert!(
            store
                .calls()
                .iter()
                .all(|call| !matches!(call, Call::PutItem(_)))
        );
    }

    #[tokio::test]
    async fn test_put_writes_declared_sets() {
        let (table, store) = ScriptedStore::table(vec![Reply::Put]);
        table
            .put(
                map(json!({"primary_partition_key": "a", "some_int": 1, "string_set": ["x", "y"]})),
                true,
            )
            .await
            .unwrap();
        let Call::PutItem(request) = &store.calls()[0] else {
            panic!("expected a put")
        };
        assert_eq!(
            request.item["string_set"],
            types::AttributeValue::Ss(vec!["x".to_string(), "y".to_string()])
        );
    }

    #[tokio::test]
    async fn test_update_rejects_key_attributes() {
        let (table, store) = ScriptedStore::table(vec![]);
        let error = table
            .update_attribute(
                "a",
                map(json!({"primary_partition_key": "b"})),
                UpdateOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, Error::WrongPrimaryKey { .. }));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_rejects_empty_data() {
        let (table, _) = ScriptedStore::table(vec![]);
        let error = table
            .update_attribute("a", Map::new(), UpdateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(error, Error::EmptyUpdate { .. }));
    }

    #[tokio::test]
    async fn test_update_validates_sub_part() {
        let (table, store) = ScriptedStore::table(vec![]);
        let error = table
            .update_attribute(
                "a",
                map(json!({"some_dict": {"key2": "x"}})),
                UpdateOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(error.status_code(), 415);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_attribute_with_condition() {
        let (table, store) = ScriptedStore::table(vec![Reply::Updated(None)]);
        table
            .update_attribute(
                "a",
                map(json!({"some_float": 1.0})),
                UpdateOptions {
                    condition: Some(Attr::new("some_int").eq(42)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let Call::UpdateItem(request) = &store.calls()[0] else {
            panic!("expected an update")
        };
        assert_eq!(request.update_expression, "set #AA = :aa");
        assert_eq!(
            request.write_input.condition_expression.as_deref(),
            Some("attribute_exists(#AB) and attribute_exists(#AA) and #n0 = :v0")
        );
        assert_eq!(
            request.write_input.expression_attribute_values[":v0"],
            types::AttributeValue::N("42".to_string())
        );
    }

    #[tokio::test]
    async fn test_add_new_attribute_guards_missing() {
        let (table, store) = ScriptedStore::table(vec![Reply::Updated(None)]);
        table
            .add_new_attribute("a", map(json!({"some_string": "x"})), UpdateOptions::default())
            .await
            .unwrap();
        let Call::UpdateItem(request) = &store.calls()[0] else {
            panic!("expected an update")
        };
        assert_eq!(
            request.write_input.condition_expression.as_deref(),
            Some("attribute_exists(#AB) and attribute_not_exists(#AA)")
        );
    }

    #[tokio::test]
    async fn test_update_append_list() {
        let (table, store) = ScriptedStore::table(vec![Reply::Updated(None)]);
        table
            .update_append_list("a", map(json!({"tags": ["b"]})), UpdateOptions::default())
            .await
            .unwrap();
        let Call::UpdateItem(request) = &store.calls()[0] else {
            panic!("expected an update")
        };
        assert_eq!(request.update_expression, "set #AA = list_append(#AA, :aa)");
    }

    #[rstest]
    #[case::add(true, "add #AA :aa")]
    #[case::delete(false, "delete #AA :aa")]
    #[tokio::test]
    async fn test_set_operations(#[case] add: bool, #[case] expected: &str) {
        let (table, store) = ScriptedStore::table(vec![Reply::Updated(None)]);
        let new_data = map(json!({"string_set": ["x"]}));
        if add {
            table
                .update_add_set("a", new_data, UpdateOptions::default())
                .await
                .unwrap();
        } else {
            table
                .remove_from_set("a", new_data, UpdateOptions::default())
                .await
                .unwrap();
        }
        let Call::UpdateItem(request) = &store.calls()[0] else {
            panic!("expected an update")
        };
        assert_eq!(request.update_expression, expected);
        assert_eq!(
            request.write_input.expression_attribute_values[":aa"],
            types::AttributeValue::Ss(vec!["x".to_string()])
        );
    }

    #[tokio::test]
    async fn test_remove_attribute_returns_removed_value() {
        let (table, store) = ScriptedStore::table(vec![Reply::Updated(Some(stored(json!({
            "primary_partition_key": "a",
            "some_int": 1,
            "some_dict": {"key1": "value1", "key2": 2}
        }))))]);
        let removed = table
            .remove_attribute(
                "a",
                path::AttributePath::from(["some_dict", "key1"]),
                RemoveOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(removed, Some(json!("value1")));
        let Call::UpdateItem(request) = &store.calls()[0] else {
            panic!("expected an update")
        };
        assert_eq!(request.update_expression, "remove #AA.#AB");
        assert_eq!(
            request.write_input.return_values,
            Some(types::ReturnValue::AllOld)
        );
    }

    #[rstest]
    #[case::required_top_level(path::AttributePath::from("some_int"), "some_int", "")]
    #[case::key_attribute(
        path::AttributePath::from("primary_partition_key"),
        "primary_partition_key",
        ""
    )]
    #[case::required_nested(
        path::AttributePath::from(["some_dict", "key2"]),
        "key2",
        "some_dict"
    )]
    #[tokio::test]
    async fn test_remove_required_attribute(
        #[case] removed: path::AttributePath,
        #[case] attribute: &str,
        #[case] parent: &str,
    ) {
        let (table, store) = ScriptedStore::table(vec![]);
        let error = table
            .remove_attribute("a", removed, RemoveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            Error::Validation { ref source, .. } if source.kind == schema::ValidatorKind::Required
        ));
        assert_eq!(error.status_code(), 400);
        assert_eq!(
            error.body(),
            format!(
                "{attribute} is a required attribute in {parent} for table TableForTests and cannot be removed"
            )
        );
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_remove_overlapping_paths() {
        let (table, store) = ScriptedStore::table(vec![]);
        let error = table
            .remove_attributes(
                "a",
                vec![
                    path::AttributePath::from("tags"),
                    path::AttributePath::from("tags").index(0),
                ],
                RemoveOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Validation { .. }));
        assert!(store.calls().is_empty());
    }

    #[rstest]
    #[case::present(json!({"primary_partition_key": "a", "tags": ["x", "y"]}), Ok(json!("y")))]
    #[case::stored_null(json!({"primary_partition_key": "a", "tags": ["x", null]}), Ok(json!(null)))]
    #[case::out_of_range(json!({"primary_partition_key": "a", "tags": ["x"]}), Err(416))]
    #[tokio::test]
    async fn test_remove_entry_in_list(
        #[case] old: Value,
        #[case] expected: std::result::Result<Value, u16>,
    ) {
        let (table, store) = ScriptedStore::table(vec![Reply::Updated(Some(stored(old)))]);
        let removed = table
            .remove_entry_in_list("a", "tags", 1, None)
            .await
            .map_err(|error| error.status_code());
        assert_eq!(removed, expected);
        let Call::UpdateItem(request) = &store.calls()[0] else {
            panic!("expected an update")
        };
        assert_eq!(request.update_expression, "remove #AA[1]");
    }

    #[tokio::test]
    async fn test_delete() {
        let (table, _) = ScriptedStore::table(vec![Reply::Deleted(None), Reply::Deleted(None)]);
        table.delete("a", false).await.unwrap();
        let error = table.delete("a", true).await.unwrap_err();
        assert!(matches!(error, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let (table, _) = ScriptedStore::table(vec![Reply::Deleted(Some(
            json!({"primary_partition_key": "a", "some_int": 3}),
        ))]);
        assert_eq!(
            table.get_and_delete("a").await.unwrap(),
            map(json!({"primary_partition_key": "a", "some_int": 3}))
        );
    }

    #[tokio::test]
    async fn test_query_unknown_index() {
        let (table, store) = ScriptedStore::table(vec![]);
        let error = table
            .query(query::Query {
                index_name: Some("missing".to_string()),
                partition_value: json!("a"),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(error, Error::UnknownIndex { .. }));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_index_get_follows_pages() {
        let first = stored(json!({"primary_partition_key": "a", "some_string": "s", "some_int": 1}));
        let second = stored(json!({"primary_partition_key": "b", "some_string": "s", "some_int": 1}));
        let (table, store) = ScriptedStore::table(vec![
            Reply::Page(read::common::StorePage {
                items: vec![first.clone()],
                last_evaluated_key: Some(first),
            }),
            Reply::Page(read::common::StorePage {
                items: vec![second],
                last_evaluated_key: None,
            }),
        ]);
        let items = table.index_get("some_index", ("s", 1)).await.unwrap();
        assert_eq!(items.len(), 2);
        let queries: Vec<_> = store
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Query(request) => Some(request),
                _ => None,
            })
            .collect();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].key_condition_expression, "#n0 = :v0 and #n1 = :v1");
        assert_eq!(queries[0].index_name.as_deref(), Some("some_index"));
        assert!(queries[0].exclusive_start_key.is_none());
        assert!(queries[1].exclusive_start_key.is_some());
    }

    #[tokio::test]
    async fn test_batch_get() {
        let (table, store) = ScriptedStore::table(vec![Reply::Items(vec![
            stored(json!({"primary_partition_key": "b", "some_int": 2})),
            stored(json!({"primary_partition_key": "a", "some_int": 1})),
        ])]);
        let keyed = table
            .batch_get_keyed(vec![
                key::PrimaryKey::from("a"),
                key::PrimaryKey::from(json!({"primary_partition_key": "b"})),
                key::PrimaryKey::from("a"),
            ])
            .await
            .unwrap();
        assert_eq!(
            keyed.keys().cloned().collect::<Vec<_>>(),
            vec![
                key::KeyTuple(vec!["a".to_string()]),
                key::KeyTuple(vec!["b".to_string()]),
            ]
        );
        let Call::BatchGetItem(keys) = &store.calls()[0] else {
            panic!("expected a batch get")
        };
        assert_eq!(keys.len(), 2);
    }

    #[tokio::test]
    async fn test_scan_and_truncate() {
        let item = stored(json!({"primary_partition_key": "a", "some_int": 1}));
        let (table, store) = ScriptedStore::table(vec![
            Reply::Page(read::common::StorePage {
                items: vec![item.clone()],
                last_evaluated_key: None,
            }),
            Reply::Page(read::common::StorePage {
                items: vec![item],
                last_evaluated_key: None,
            }),
            Reply::Done,
        ]);
        assert_eq!(table.scan().await.unwrap().len(), 1);
        assert_eq!(table.truncate().await.unwrap(), 1);
        assert_eq!(
            store.calls().last(),
            Some(&Call::BatchDelete(vec![stored(
                json!({"primary_partition_key": "a"})
            )]))
        );
    }

    #[tokio::test]
    async fn test_describe() {
        let (table, _) = ScriptedStore::table(vec![]);
        let description = table.describe().await.unwrap();
        assert_eq!(description.table_name(), Some("TEST-TableForTests"));
    }
}
