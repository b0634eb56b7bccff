use crate::{
    common::{number, path},
    store,
};

use aws_sdk_dynamodb::types;
use serde_json::Value;

/// What a write hands back.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ReturnShape {
    /// Nothing.
    #[default]
    None,
    /// The whole item before the write.
    AllOld,
    /// The whole item after the write.
    AllNew,
    /// The touched values before the write, shaped like [`ReturnShape::Deleted`].
    UpdatedOld,
    /// The touched values after the write, shaped like [`ReturnShape::Deleted`].
    UpdatedNew,
    /// The removed values: a bare value for a single path, a list in path order otherwise.
    Deleted,
}

impl ReturnShape {
    /// Return values to request from the store.
    ///
    /// Removed values are cut out of the whole old item, since the store's own projection
    /// stops at list positions.
    pub(crate) fn return_value(self) -> types::ReturnValue {
        match self {
            Self::None => types::ReturnValue::None,
            Self::AllOld | Self::Deleted => types::ReturnValue::AllOld,
            Self::AllNew => types::ReturnValue::AllNew,
            Self::UpdatedOld => types::ReturnValue::UpdatedOld,
            Self::UpdatedNew => types::ReturnValue::UpdatedNew,
        }
    }

    /// Whether the item after the write is wanted, as opposed to the one before.
    pub(crate) fn wants_new(self) -> bool {
        matches!(self, Self::AllNew | Self::UpdatedNew)
    }

    /// Shape the store's answer for the caller.
    pub(crate) fn decode(
        self,
        attributes: Option<store::StoreItem>,
        paths: &[path::AttributePath],
    ) -> serde_dynamo::Result<Option<Value>> {
        let item = match (self, attributes) {
            (Self::None, _) => return Ok(None),
            (_, Some(attributes)) => Value::Object(number::to_native_item(attributes)?),
            (_, None) => Value::Object(Default::default()),
        };
        let decoded = match self {
            Self::None => None,
            Self::AllOld | Self::AllNew => Some(item),
            Self::UpdatedOld | Self::UpdatedNew | Self::Deleted => Some(touched(&item, paths)),
        };
        Ok(decoded)
    }
}

/// The values at `paths`, `null` where absent; one path yields its bare value.
fn touched(item: &Value, paths: &[path::AttributePath]) -> Value {
    let mut values = paths
        .iter()
        .map(|path| path::walk(item, path).cloned().unwrap_or(Value::Null));
    match (paths.len(), values.next()) {
        (1, Some(value)) => value,
        (_, first) => Value::Array(first.into_iter().chain(values).collect()),
    }
}
