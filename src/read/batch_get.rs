use crate::{
    common::{key, number},
    store,
};

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};

/// Store keys of a batch read, without repeats; the store rejects duplicate keys.
pub(crate) fn unique_store_keys(
    keys: &[key::Keys<Value>],
) -> serde_dynamo::Result<Vec<store::StoreItem>> {
    let mut seen = IndexSet::with_capacity(keys.len());
    keys.iter()
        .filter(|keys| seen.insert(keys.to_tuple()))
        .map(|keys| store::StoreItem::try_from(keys.clone()))
        .collect()
}

fn key_tuple(shape: &key::KeyShape, item: &Map<String, Value>) -> key::KeyTuple {
    let components = shape
        .names()
        .into_iter()
        .map(|name| key::tuple_component(item.get(name).unwrap_or(&Value::Null)))
        .collect();
    key::KeyTuple(components)
}

/// Fetched items keyed by primary-key tuple, in the order the keys were requested.
///
/// Keys without an item are left out.
pub(crate) fn arrange(
    shape: &key::KeyShape,
    keys: &[key::Keys<Value>],
    items: Vec<store::StoreItem>,
) -> serde_dynamo::Result<IndexMap<key::KeyTuple, Map<String, Value>>> {
    let mut fetched = items
        .into_iter()
        .map(|item| {
            let item = number::to_native_item(item)?;
            Ok((key_tuple(shape, &item), item))
        })
        .collect::<serde_dynamo::Result<IndexMap<_, _>>>()?;
    let mut arranged = IndexMap::with_capacity(fetched.len());
    for keys in keys {
        let tuple = keys.to_tuple();
        if let Some(item) = fetched.shift_remove(&tuple) {
            arranged.insert(tuple, item);
        }
    }
    Ok(arranged)
}
