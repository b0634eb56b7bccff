use crate::{
    read,
    store::{Store, StoreError, StoreItem},
    write,
};

use async_trait::async_trait;
use aws_sdk_dynamodb::{
    Client,
    error::{BuildError, DisplayErrorContext, ProvideErrorMetadata, SdkError},
    types,
};
use std::{collections, error};

/// Most keys one batch get may carry.
const BATCH_GET_LIMIT: usize = 100;

/// Most requests one batch write may carry.
const BATCH_WRITE_LIMIT: usize = 25;

/// Rounds spent re-sending unprocessed batch entries before giving up.
const MAX_BATCH_ROUNDS: usize = 8;

fn into_store_error<E>(sdk_error: SdkError<E>) -> StoreError
where
    E: ProvideErrorMetadata + error::Error + 'static,
{
    let message = sdk_error.message().unwrap_or_default().to_string();
    match sdk_error.code() {
        Some("ConditionalCheckFailedException") => StoreError::ConditionalCheckFailed { message },
        Some("ValidationException") => StoreError::Validation { message },
        Some(code) => StoreError::Service {
            code: code.to_string(),
            message,
        },
        None => StoreError::Request(DisplayErrorContext(&sdk_error).to_string().into()),
    }
}

fn from_build_error(build_error: BuildError) -> StoreError {
    StoreError::Request(Box::new(build_error))
}

fn unprocessed(table_name: &str, code: &str, left: usize) -> StoreError {
    StoreError::Service {
        code: code.to_string(),
        message: format!("{left} entries of {table_name} still unprocessed after {MAX_BATCH_ROUNDS} rounds"),
    }
}

#[async_trait]
impl Store for Client {
    async fn get_item(
        &self,
        table_name: &str,
        key: StoreItem,
    ) -> Result<Option<StoreItem>, StoreError> {
        let output = self
            .get_item()
            .table_name(table_name)
            .set_key(Some(key))
            .consistent_read(true)
            .send()
            .await
            .map_err(into_store_error)?;
        Ok(output.item)
    }

    async fn put_item(&self, request: write::common::PutRequest) -> Result<(), StoreError> {
        let builder = self.put_item().set_item(Some(request.item));
        crate::apply_write_operation!(builder, request.write_input)
            .send()
            .await
            .map_err(into_store_error)?;
        Ok(())
    }

    async fn update_item(
        &self,
        request: write::common::UpdateRequest,
    ) -> Result<Option<StoreItem>, StoreError> {
        let builder = self
            .update_item()
            .set_key(Some(request.key))
            .update_expression(request.update_expression)
            .set_return_values(request.write_input.return_values.clone());
        let output = crate::apply_write_operation!(builder, request.write_input)
            .send()
            .await
            .map_err(into_store_error)?;
        Ok(output.attributes)
    }

    async fn delete_item(
        &self,
        table_name: &str,
        key: StoreItem,
    ) -> Result<Option<StoreItem>, StoreError> {
        let output = self
            .delete_item()
            .table_name(table_name)
            .set_key(Some(key))
            .return_values(types::ReturnValue::AllOld)
            .send()
            .await
            .map_err(into_store_error)?;
        Ok(output.attributes)
    }

    async fn query(
        &self,
        request: read::common::QueryRequest,
    ) -> Result<read::common::StorePage, StoreError> {
        let output = self
            .query()
            .set_exclusive_start_key(request.exclusive_start_key)
            .set_expression_attribute_names(
                (!request.expression_attribute_names.is_empty())
                    .then_some(request.expression_attribute_names),
            )
            .set_expression_attribute_values(
                (!request.expression_attribute_values.is_empty())
                    .then_some(request.expression_attribute_values),
            )
            .set_index_name(request.index_name)
            .key_condition_expression(request.key_condition_expression)
            .set_limit(request.limit)
            .set_projection_expression(request.projection_expression)
            .set_scan_index_forward(request.scan_index_forward)
            .table_name(request.table_name)
            .send()
            .await
            .map_err(into_store_error)?;
        Ok(read::common::StorePage {
            items: output.items.unwrap_or_default(),
            last_evaluated_key: output.last_evaluated_key.filter(|key| !key.is_empty()),
        })
    }

    async fn scan(
        &self,
        table_name: &str,
        exclusive_start_key: Option<StoreItem>,
    ) -> Result<read::common::StorePage, StoreError> {
        let output = self
            .scan()
            .table_name(table_name)
            .set_exclusive_start_key(exclusive_start_key)
            .send()
            .await
            .map_err(into_store_error)?;
        Ok(read::common::StorePage {
            items: output.items.unwrap_or_default(),
            last_evaluated_key: output.last_evaluated_key.filter(|key| !key.is_empty()),
        })
    }

    async fn batch_get_item(
        &self,
        table_name: &str,
        keys: Vec<StoreItem>,
    ) -> Result<Vec<StoreItem>, StoreError> {
        let mut items = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(BATCH_GET_LIMIT) {
            let mut pending = chunk.to_vec();
            let mut rounds = 0;
            while !pending.is_empty() {
                if rounds == MAX_BATCH_ROUNDS {
                    return Err(unprocessed(table_name, "UnprocessedKeys", pending.len()));
                }
                rounds += 1;
                let keys_and_attributes = types::KeysAndAttributes::builder()
                    .set_keys(Some(pending))
                    .consistent_read(true)
                    .build()
                    .map_err(from_build_error)?;
                let mut output = self
                    .batch_get_item()
                    .request_items(table_name, keys_and_attributes)
                    .send()
                    .await
                    .map_err(into_store_error)?;
                if let Some(responses) = output.responses.as_mut() {
                    items.extend(responses.remove(table_name).unwrap_or_default());
                }
                pending = output
                    .unprocessed_keys
                    .and_then(|mut unprocessed_keys| unprocessed_keys.remove(table_name))
                    .map(|keys_and_attributes| keys_and_attributes.keys)
                    .unwrap_or_default();
                if !pending.is_empty() {
                    tracing::debug!(table = table_name, left = pending.len(), "re-requesting unprocessed keys");
                }
            }
        }
        Ok(items)
    }

    async fn batch_delete(&self, table_name: &str, keys: Vec<StoreItem>) -> Result<(), StoreError> {
        for chunk in keys.chunks(BATCH_WRITE_LIMIT) {
            let mut pending = chunk
                .iter()
                .map(|key| {
                    let delete_request = types::DeleteRequest::builder()
                        .set_key(Some(key.clone()))
                        .build()
                        .map_err(from_build_error)?;
                    Ok(types::WriteRequest::builder()
                        .delete_request(delete_request)
                        .build())
                })
                .collect::<Result<Vec<_>, StoreError>>()?;
            let mut rounds = 0;
            while !pending.is_empty() {
                if rounds == MAX_BATCH_ROUNDS {
                    return Err(unprocessed(table_name, "UnprocessedItems", pending.len()));
                }
                rounds += 1;
                let output = self
                    .batch_write_item()
                    .set_request_items(Some(collections::HashMap::from([(
                        table_name.to_string(),
                        pending,
                    )])))
                    .send()
                    .await
                    .map_err(into_store_error)?;
                pending = output
                    .unprocessed_items
                    .and_then(|mut unprocessed_items| unprocessed_items.remove(table_name))
                    .unwrap_or_default();
                if !pending.is_empty() {
                    tracing::debug!(table = table_name, left = pending.len(), "re-sending unprocessed deletes");
                }
            }
        }
        Ok(())
    }

    async fn describe_table(
        &self,
        table_name: &str,
    ) -> Result<types::TableDescription, StoreError> {
        let output = self
            .describe_table()
            .table_name(table_name)
            .send()
            .await
            .map_err(into_store_error)?;
        output.table.ok_or_else(|| StoreError::Service {
            code: "ResourceNotFoundException".to_string(),
            message: format!("no description returned for {table_name}"),
        })
    }
}
