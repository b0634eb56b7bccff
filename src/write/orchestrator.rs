use crate::{
    common::{self, condition, key, number, path},
    error::{Error, Result},
    store::{StoreError, StoreItem},
    table::Table,
    write::{
        common::{UpdateRequest, WriteInput},
        returns::ReturnShape,
        update_expression::{UpdateMode, UpdatePlan},
    },
};

use serde_json::Value;

/// Structural preconditions of an update.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct Guards {
    /// Every touched path must already be set.
    pub(crate) require_present: bool,
    /// No touched path may already be set.
    pub(crate) require_missing: bool,
    /// An absent item is created from the key and the new data.
    pub(crate) create_if_missing: bool,
}

/// One conditional update of a single item, with its recovery paths.
#[derive(Debug)]
pub(crate) struct Write<'a> {
    pub(crate) table: &'a Table,
    pub(crate) keys: key::Keys<Value>,
    pub(crate) mode: UpdateMode,
    /// The tree the leaves were flattened from; `Null` for removals.
    pub(crate) new_data: Value,
    pub(crate) leaves: Vec<path::Leaf>,
    pub(crate) guards: Guards,
    pub(crate) condition: Option<condition::ConditionSet>,
    pub(crate) returns: ReturnShape,
}

#[derive(Debug)]
enum State {
    Attempt(UpdateRequest),
    RecoverPaths,
    Retry(UpdateRequest),
    Disambiguate,
    Create,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::Attempt(_) => "attempt",
            Self::RecoverPaths => "recover_paths",
            Self::Retry(_) => "retry",
            Self::Disambiguate => "disambiguate",
            Self::Create => "create",
        }
    }
}

impl Write<'_> {
    /// Run the update to completion and decode what the caller asked back.
    pub(crate) async fn run(self) -> Result<Option<Value>> {
        let key = StoreItem::try_from(self.keys.clone())?;
        let paths: Vec<_> = self.leaves.iter().map(|leaf| leaf.path.clone()).collect();
        let append: Vec<_> = self.leaves.iter().map(|leaf| leaf.append).collect();
        let direct = match self.condition.clone() {
            Some(condition) => condition.compile()?,
            None => None,
        };
        let plan = UpdatePlan::compile(self.mode, self.leaves.clone(), self.table.schema.as_ref())?;
        let mut guarded = plan.paths.clone();
        let mut state = State::Attempt(self.request(plan, key.clone(), direct.clone()));
        loop {
            tracing::debug!(table = %self.table.name, state = state.name(), "write transition");
            state = match state {
                State::Attempt(request) => match self.table.store.update_item(request).await {
                    Ok(attributes) => return Ok(self.returns.decode(attributes, &paths)?),
                    Err(error)
                        if error.is_missing_document_path()
                            && !self.guards.require_present
                            && matches!(self.mode, UpdateMode::Set | UpdateMode::AddToSet) =>
                    {
                        State::RecoverPaths
                    }
                    Err(StoreError::ConditionalCheckFailed { .. }) => State::Disambiguate,
                    Err(error) if error.is_missing_document_path() => {
                        return Err(self.not_exists(&guarded));
                    }
                    Err(error) => return Err(error.into()),
                },
                State::RecoverPaths => match self.read(&key).await? {
                    None => self.on_absent()?,
                    Some(item) => {
                        let leaves = path::find_new_paths(&item, &self.new_data, &paths, &append);
                        // Cut paths are written whole; intact ones keep their clause.
                        let (kept, created): (Vec<_>, Vec<_>) = leaves
                            .into_iter()
                            .partition(|leaf| {
                                self.mode != UpdateMode::Set && paths.contains(&leaf.path)
                            });
                        tracing::info!(
                            table = %self.table.name,
                            paths = created.len(),
                            "creating missing intermediate paths"
                        );
                        let plan = UpdatePlan::compile_clauses(
                            vec![(UpdateMode::Set, created), (self.mode, kept)],
                            self.table.schema.as_ref(),
                        )?;
                        guarded = plan.paths.clone();
                        State::Retry(self.request(plan, key.clone(), direct.clone()))
                    }
                },
                State::Retry(request) => match self.table.store.update_item(request).await {
                    Ok(attributes) => return Ok(self.returns.decode(attributes, &paths)?),
                    Err(StoreError::ConditionalCheckFailed { .. }) => State::Disambiguate,
                    Err(error) => return Err(error.into()),
                },
                State::Disambiguate => {
                    if direct.is_some() {
                        return Err(Error::ConditionalCheckFailed {
                            table: self.table.name.clone(),
                            key: self.keys.to_string(),
                        });
                    }
                    match self.read(&key).await? {
                        None => self.on_absent()?,
                        Some(item) => return Err(self.violated_guard(&item, &guarded)),
                    }
                }
                State::Create => return self.create(&paths).await,
            };
        }
    }

    /// Attach the key, the structural guards and the caller condition to a compiled plan.
    fn request(
        &self,
        plan: UpdatePlan,
        key: StoreItem,
        direct: Option<common::ExpressionInput>,
    ) -> UpdateRequest {
        let UpdatePlan {
            expression,
            expression_attribute_values,
            mut names,
            paths,
        } = plan;
        let mut existing: Vec<_> = self
            .table
            .key_shape
            .names()
            .into_iter()
            .map(path::AttributePath::from)
            .collect();
        for key_path in &existing {
            names.assign_path(key_path);
        }
        if self.guards.require_present {
            existing.extend(paths.iter().cloned());
        }
        let missing = if self.guards.require_missing {
            paths
        } else {
            Vec::new()
        };
        let condition = condition::build_conditions(&existing, &missing, &names, direct);
        let write_input = WriteInput {
            expression_attribute_names: names.expression_attribute_names(),
            expression_attribute_values,
            return_values: Some(self.returns.return_value()),
            table_name: self.table.physical_name.clone(),
            ..Default::default()
        }
        .with_condition(condition);
        UpdateRequest {
            key,
            update_expression: expression,
            write_input,
        }
    }

    async fn read(&self, key: &StoreItem) -> Result<Option<Value>> {
        let item = self
            .table
            .store
            .get_item(&self.table.physical_name, key.clone())
            .await?;
        Ok(item
            .map(number::to_native_item)
            .transpose()?
            .map(Value::Object))
    }

    fn on_absent(&self) -> Result<State> {
        if self.guards.create_if_missing && self.mode == UpdateMode::Set {
            Ok(State::Create)
        } else {
            Err(Error::NotFound {
                table: self.table.name.clone(),
                key: self.keys.to_string(),
            })
        }
    }

    fn violated_guard(&self, item: &Value, guarded: &[path::AttributePath]) -> Error {
        let (present, absent): (Vec<_>, Vec<_>) = guarded
            .iter()
            .partition(|path| path::walk(item, path).is_some());
        if self.guards.require_missing && !present.is_empty() {
            return Error::AttributeAlreadyExists {
                table: self.table.name.clone(),
                key: self.keys.to_string(),
                paths: present.iter().map(ToString::to_string).collect(),
            };
        }
        if self.guards.require_present && !absent.is_empty() {
            return self.not_exists(&absent.into_iter().cloned().collect::<Vec<_>>());
        }
        Error::ConditionalCheckFailed {
            table: self.table.name.clone(),
            key: self.keys.to_string(),
        }
    }

    fn not_exists(&self, paths: &[path::AttributePath]) -> Error {
        Error::AttributeNotExists {
            table: self.table.name.clone(),
            key: self.keys.to_string(),
            paths: paths.iter().map(ToString::to_string).collect(),
        }
    }

    /// Put a new item built from the key and the top level of the new data.
    async fn create(&self, paths: &[path::AttributePath]) -> Result<Option<Value>> {
        let mut item = self.keys.to_map();
        if let Value::Object(new_data) = &self.new_data {
            for (name, value) in new_data {
                item.entry(name.clone()).or_insert_with(|| value.clone());
            }
        }
        tracing::info!(table = %self.table.name, key = %self.keys, "creating absent item");
        let stored = self.table.insert(item, false).await?;
        if !self.returns.wants_new() {
            return Ok(None);
        }
        Ok(self.returns.decode(Some(stored), paths)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        common::condition::Attr,
        testing::{Call, Reply, ScriptedStore},
    };

    use aws_sdk_dynamodb::types;
    use rstest::rstest;
    use serde_json::json;

    fn missing_path() -> StoreError {
        StoreError::Validation {
            message: "The document path provided in the update expression is invalid for update"
                .to_string(),
        }
    }

    fn conditional() -> StoreError {
        StoreError::ConditionalCheckFailed {
            message: "The conditional request failed".to_string(),
        }
    }

    fn keys() -> key::Keys<Value> {
        key::Keys {
            partition_key: key::Key {
                name: "primary_partition_key".to_string(),
                value: json!("a"),
            },
            sort_key: None,
        }
    }

    fn set_write(table: &Table, new_data: Value, guards: Guards) -> Write<'_> {
        let Value::Object(tree) = &new_data else {
            panic!("expected an object")
        };
        let (paths, values) = path::flatten(tree);
        Write {
            table,
            keys: keys(),
            mode: UpdateMode::Set,
            leaves: UpdatePlan::leaves(paths, values, false),
            new_data,
            guards,
            condition: None,
            returns: ReturnShape::None,
        }
    }

    fn updates(store: &ScriptedStore) -> Vec<UpdateRequest> {
        store
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::UpdateItem(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_attempt_success() {
        let (table, store) = ScriptedStore::table(vec![Reply::Updated(None)]);
        let write = set_write(
            &table,
            json!({"some_dict": {"key1": "x"}}),
            Guards {
                require_present: true,
                ..Default::default()
            },
        );
        assert_eq!(write.run().await.unwrap(), None);
        let requests = updates(&store);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].update_expression, "set #AA.#AB = :aa");
        assert_eq!(
            requests[0].write_input.condition_expression.as_deref(),
            Some("attribute_exists(#AC) and attribute_exists(#AA.#AB)")
        );
        assert_eq!(
            requests[0].write_input.expression_attribute_names["#AC"],
            "primary_partition_key"
        );
    }

    #[tokio::test]
    async fn test_recover_missing_intermediate_paths() {
        let (table, store) = ScriptedStore::table(vec![
            Reply::Failed(missing_path()),
            Reply::Item(Some(json!({"primary_partition_key": "a", "some_dict": {}}))),
            Reply::Updated(None),
        ]);
        let write = set_write(
            &table,
            json!({"some_dict": {"nested": {"deep": 1}}}),
            Guards::default(),
        );
        assert_eq!(write.run().await.unwrap(), None);
        let requests = updates(&store);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].update_expression, "set #AA.#AB.#AC = :aa");
        assert_eq!(requests[1].update_expression, "set #AA.#AB = :aa");
        assert_eq!(
            requests[1].write_input.expression_attribute_values[":aa"],
            number::to_exact(json!({"deep": 1})).unwrap()
        );
    }

    #[tokio::test]
    async fn test_recover_missing_parent_of_added_set() {
        let (table, store) = ScriptedStore::table(vec![
            Reply::Failed(missing_path()),
            Reply::Item(Some(json!({"primary_partition_key": "a", "string_set": ["z"]}))),
            Reply::Updated(None),
        ]);
        let mut write = set_write(
            &table,
            json!({"some_dict": {"key3": ["x"]}, "string_set": ["y"]}),
            Guards::default(),
        );
        write.mode = UpdateMode::AddToSet;
        assert_eq!(write.run().await.unwrap(), None);
        let requests = updates(&store);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].update_expression, "add #AA.#AB :aa, #AC :ab");
        assert_eq!(requests[1].update_expression, "set #AA = :aa add #AB :ab");
        assert_eq!(
            requests[1].write_input.expression_attribute_names["#AA"],
            "some_dict"
        );
        assert_eq!(
            requests[1].write_input.expression_attribute_values[":ab"],
            types::AttributeValue::Ss(vec!["y".to_string()])
        );
        assert!(matches!(store.calls()[1], Call::GetItem(_)));
    }

    #[tokio::test]
    async fn test_recover_on_absent_item_creates_it() {
        let (table, store) = ScriptedStore::table(vec![
            Reply::Failed(missing_path()),
            Reply::Item(None),
            Reply::Put,
        ]);
        let write = set_write(
            &table,
            json!({"some_int": 1}),
            Guards {
                create_if_missing: true,
                ..Default::default()
            },
        );
        assert_eq!(write.run().await.unwrap(), None);
        let put = store
            .calls()
            .into_iter()
            .find_map(|call| match call {
                Call::PutItem(request) => Some(request),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            number::to_native_item(put.item).unwrap(),
            json!({"primary_partition_key": "a", "some_int": 1})
                .as_object()
                .cloned()
                .unwrap()
        );
        assert_eq!(
            put.write_input.condition_expression.as_deref(),
            Some("attribute_not_exists(#AA)")
        );
    }

    #[tokio::test]
    async fn test_absent_item_without_create_is_not_found() {
        let (table, _) = ScriptedStore::table(vec![Reply::Failed(conditional()), Reply::Item(None)]);
        let error = set_write(&table, json!({"some_int": 1}), Guards::default())
            .run()
            .await
            .unwrap_err();
        assert!(matches!(error, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_created_item_is_validated() {
        let (table, store) = ScriptedStore::table(vec![Reply::Failed(conditional()), Reply::Item(None)]);
        let error = set_write(
            &table,
            json!({"some_float": 1.5}),
            Guards {
                create_if_missing: true,
                ..Default::default()
            },
        )
        .run()
        .await
        .unwrap_err();
        assert!(matches!(error, Error::Validation { .. }));
        assert!(
            !store
                .calls()
                .iter()
                .any(|call| matches!(call, Call::PutItem(_)))
        );
    }

    #[rstest]
    #[case::already_exists(
        Guards { require_missing: true, ..Default::default() },
        json!({"primary_partition_key": "a", "some_int": 3}),
        "AttributeAlreadyExists"
    )]
    #[case::not_exists(
        Guards { require_present: true, ..Default::default() },
        json!({"primary_partition_key": "a"}),
        "AttributeNotExists"
    )]
    #[tokio::test]
    async fn test_disambiguate_guards(
        #[case] guards: Guards,
        #[case] stored: Value,
        #[case] expected: &str,
    ) {
        let (table, _) =
            ScriptedStore::table(vec![Reply::Failed(conditional()), Reply::Item(Some(stored))]);
        let error = set_write(&table, json!({"some_int": 1}), guards)
            .run()
            .await
            .unwrap_err();
        let matched = match &error {
            Error::AttributeAlreadyExists { paths, .. } => {
                assert_eq!(paths, &vec!["some_int".to_string()]);
                "AttributeAlreadyExists"
            }
            Error::AttributeNotExists { paths, .. } => {
                assert_eq!(paths, &vec!["some_int".to_string()]);
                "AttributeNotExists"
            }
            other => panic!("unexpected error {other:?}"),
        };
        assert_eq!(matched, expected);
    }

    #[tokio::test]
    async fn test_direct_condition_failure_skips_read() {
        let (table, store) = ScriptedStore::table(vec![Reply::Failed(conditional())]);
        let mut write = set_write(&table, json!({"some_float": 1.0}), Guards::default());
        write.condition = Some(Attr::new("some_int").eq(0));
        let error = write.run().await.unwrap_err();
        assert!(matches!(error, Error::ConditionalCheckFailed { .. }));
        assert_eq!(store.calls().len(), 1);
        let requests = updates(&store);
        assert_eq!(
            requests[0].write_input.condition_expression.as_deref(),
            Some("attribute_exists(#AB) and #n0 = :v0")
        );
    }

    #[tokio::test]
    async fn test_missing_path_with_required_presence() {
        let (table, _) = ScriptedStore::table(vec![Reply::Failed(missing_path())]);
        let error = set_write(
            &table,
            json!({"some_dict": {"key1": "x"}}),
            Guards {
                require_present: true,
                ..Default::default()
            },
        )
        .run()
        .await
        .unwrap_err();
        assert!(matches!(error, Error::AttributeNotExists { .. }));
    }

    #[tokio::test]
    async fn test_other_store_errors_propagate() {
        let (table, _) = ScriptedStore::table(vec![Reply::Failed(StoreError::Service {
            code: "ProvisionedThroughputExceededException".to_string(),
            message: "slow down".to_string(),
        })]);
        let error = set_write(&table, json!({"some_int": 1}), Guards::default())
            .run()
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            Error::Store(StoreError::Service { ref code, .. })
                if code == "ProvisionedThroughputExceededException"
        ));
    }

    #[tokio::test]
    async fn test_updated_new_walks_touched_path() {
        let stored = number::to_exact_item(
            json!({"some_dict": {"key1": "x"}})
                .as_object()
                .cloned()
                .unwrap(),
        )
        .unwrap();
        let (table, _) = ScriptedStore::table(vec![Reply::Updated(Some(stored))]);
        let mut write = set_write(&table, json!({"some_dict": {"key1": "x"}}), Guards::default());
        write.returns = ReturnShape::UpdatedNew;
        assert_eq!(write.run().await.unwrap(), Some(json!("x")));
    }
}
