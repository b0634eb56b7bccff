//! Scripted in-memory store for unit tests.

use crate::{
    common::number,
    read::common::{QueryRequest, StorePage},
    schema::JsonSchema,
    store::{Store, StoreError, StoreItem},
    table::Table,
    write::common::{PutRequest, UpdateRequest},
};

use async_trait::async_trait;
use aws_sdk_dynamodb::types;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::{collections, sync::Arc};

/// One store call, as received.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Call {
    GetItem(StoreItem),
    PutItem(PutRequest),
    UpdateItem(UpdateRequest),
    DeleteItem(StoreItem),
    Query(QueryRequest),
    Scan(Option<StoreItem>),
    BatchGetItem(Vec<StoreItem>),
    BatchDelete(Vec<StoreItem>),
}

/// The answer to the next store call.
#[derive(Debug)]
pub(crate) enum Reply {
    /// `get_item` finds this item, written as JSON.
    Item(Option<Value>),
    /// `update_item` returns these attributes.
    Updated(Option<StoreItem>),
    /// `put_item` succeeds.
    Put,
    /// `delete_item` finds this item, written as JSON.
    Deleted(Option<Value>),
    /// `query` or `scan` returns this page.
    Page(StorePage),
    /// `batch_get_item` returns these items.
    Items(Vec<StoreItem>),
    /// `batch_delete` succeeds.
    Done,
    /// The call fails.
    Failed(StoreError),
}

#[derive(Debug, Default)]
pub(crate) struct ScriptedStore {
    replies: Mutex<collections::VecDeque<Reply>>,
    calls: Mutex<Vec<Call>>,
}

pub(crate) fn test_schema() -> JsonSchema {
    JsonSchema::new(json!({
        "title": "TableForTests",
        "type": "object",
        "default": ["primary_partition_key"],
        "properties": {
            "primary_partition_key": {"type": "string"},
            "some_int": {"type": "integer"},
            "some_float": {"type": "number"},
            "some_string": {"type": "string"},
            "some_dict": {
                "type": "object",
                "properties": {
                    "key1": {"type": "string"},
                    "key2": {"type": "number"}
                },
                "required": ["key2"]
            },
            "tags": {"type": "array", "items": {"type": "string"}},
            "string_set": {"type": "stringSet"}
        },
        "required": ["primary_partition_key", "some_int"],
        "additionalProperties": false,
        "$infrastructure": {
            "KeySchema": [{"AttributeName": "primary_partition_key", "KeyType": "HASH"}],
            "GlobalSecondaryIndexes": [
                {
                    "IndexName": "some_index",
                    "KeySchema": [
                        {"AttributeName": "some_string", "KeyType": "HASH"},
                        {"AttributeName": "some_int", "KeyType": "RANGE"}
                    ]
                }
            ]
        }
    }))
    .expect("test schema compiles")
}

fn stored(item: Option<Value>) -> Option<StoreItem> {
    item.map(|item| match item {
        Value::Object(item) => number::to_exact_item(item).expect("scripted item converts"),
        other => panic!("scripted item must be an object, got {other}"),
    })
}

impl ScriptedStore {
    pub(crate) fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::default(),
        }
    }

    /// `TableForTests` over a store answering with `replies`, in order.
    pub(crate) fn table(replies: Vec<Reply>) -> (Table, Arc<Self>) {
        let store = Arc::new(Self::new(replies));
        let table = Table::new(
            "TableForTests",
            "TEST-TableForTests",
            Arc::new(test_schema()),
            store.clone(),
        )
        .expect("test schema declares a primary key");
        (table, store)
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn next(&self, call: Call) -> Reply {
        let reply = self.replies.lock().pop_front();
        self.calls.lock().push(call.clone());
        reply.unwrap_or_else(|| panic!("no scripted reply left for {call:?}"))
    }
}

fn unexpected<T>(reply: Reply) -> Result<T, StoreError> {
    match reply {
        Reply::Failed(error) => Err(error),
        other => panic!("reply {other:?} does not fit the call"),
    }
}

#[async_trait]
impl Store for ScriptedStore {
    async fn get_item(
        &self,
        _table_name: &str,
        key: StoreItem,
    ) -> Result<Option<StoreItem>, StoreError> {
        match self.next(Call::GetItem(key)) {
            Reply::Item(item) => Ok(stored(item)),
            other => unexpected(other),
        }
    }

    async fn put_item(&self, request: PutRequest) -> Result<(), StoreError> {
        match self.next(Call::PutItem(request)) {
            Reply::Put => Ok(()),
            other => unexpected(other),
        }
    }

    async fn update_item(&self, request: UpdateRequest) -> Result<Option<StoreItem>, StoreError> {
        match self.next(Call::UpdateItem(request)) {
            Reply::Updated(attributes) => Ok(attributes),
            other => unexpected(other),
        }
    }

    async fn delete_item(
        &self,
        _table_name: &str,
        key: StoreItem,
    ) -> Result<Option<StoreItem>, StoreError> {
        match self.next(Call::DeleteItem(key)) {
            Reply::Deleted(item) => Ok(stored(item)),
            other => unexpected(other),
        }
    }

    async fn query(&self, request: QueryRequest) -> Result<StorePage, StoreError> {
        match self.next(Call::Query(request)) {
            Reply::Page(page) => Ok(page),
            other => unexpected(other),
        }
    }

    async fn scan(
        &self,
        _table_name: &str,
        exclusive_start_key: Option<StoreItem>,
    ) -> Result<StorePage, StoreError> {
        match self.next(Call::Scan(exclusive_start_key)) {
            Reply::Page(page) => Ok(page),
            other => unexpected(other),
        }
    }

    async fn batch_get_item(
        &self,
        _table_name: &str,
        keys: Vec<StoreItem>,
    ) -> Result<Vec<StoreItem>, StoreError> {
        match self.next(Call::BatchGetItem(keys)) {
            Reply::Items(items) => Ok(items),
            other => unexpected(other),
        }
    }

    async fn batch_delete(&self, _table_name: &str, keys: Vec<StoreItem>) -> Result<(), StoreError> {
        match self.next(Call::BatchDelete(keys)) {
            Reply::Done => Ok(()),
            other => unexpected(other),
        }
    }

    async fn describe_table(
        &self,
        table_name: &str,
    ) -> Result<types::TableDescription, StoreError> {
        Ok(types::TableDescription::builder().table_name(table_name).build())
    }
}
