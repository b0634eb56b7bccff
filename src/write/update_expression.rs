use crate::{
    common::{self, number, path},
    schema,
};

use aws_sdk_dynamodb::types;
use serde_dynamo::Result;
use std::{collections, ops};

/// What an update does to each of its paths.
///
/// One compiled expression carries exactly one clause keyword.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpdateMode {
    /// `set ref = :val`, or `set ref = list_append(ref, :val)` for append leaves.
    Set,
    /// `add ref :val` with a string or number set.
    AddToSet,
    /// `remove ref`, where `ref` may end in a list position.
    Remove,
    /// `delete ref :val` with the set elements to drop.
    DeleteFromSet,
}

impl ops::Deref for UpdateMode {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Set => "set ",
            Self::AddToSet => "add ",
            Self::Remove => "remove ",
            Self::DeleteFromSet => "delete ",
        }
    }
}

impl UpdateMode {
    fn get_clause(
        self,
        reference: String,
        value_placeholder: &str,
        leaf: path::Leaf,
        schema: &dyn schema::SchemaValidator,
    ) -> Result<(String, Option<types::AttributeValue>)> {
        let clause = match self {
            Self::Set if leaf.append => (
                format!("{reference} = list_append({reference}, {value_placeholder})"),
                Some(schema.store_value(&leaf.path, leaf.value)?),
            ),
            Self::Set => (
                format!("{reference} = {value_placeholder}"),
                Some(schema.store_value(&leaf.path, leaf.value)?),
            ),
            Self::AddToSet | Self::DeleteFromSet => {
                let value = match schema.store_value(&leaf.path, leaf.value.clone())? {
                    value @ (types::AttributeValue::Ss(_)
                    | types::AttributeValue::Ns(_)
                    | types::AttributeValue::Bs(_)) => value,
                    _ => number::to_set(leaf.value)?,
                };
                (format!("{reference} {value_placeholder}"), Some(value))
            }
            Self::Remove => (reference, None),
        };
        Ok(clause)
    }
}

/// A compiled update expression with its placeholders.
///
/// Name placeholders (`#AA`, ..) and value placeholders (`:aa`, ..) are counted separately,
/// both in traversal order of the leaves. Values are converted to their store types through
/// the table schema.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct UpdatePlan {
    pub(crate) expression: String,
    pub(crate) expression_attribute_values: collections::HashMap<String, types::AttributeValue>,
    pub(crate) names: common::NamePlaceholders,
    pub(crate) paths: Vec<path::AttributePath>,
}

impl UpdatePlan {
    pub(crate) fn compile(
        mode: UpdateMode,
        leaves: Vec<path::Leaf>,
        schema: &dyn schema::SchemaValidator,
    ) -> Result<Self> {
        Self::compile_clauses(vec![(mode, leaves)], schema)
    }

    /// Compile several clauses into one expression, sharing the placeholder counters.
    ///
    /// Clauses without leaves are left out.
    pub(crate) fn compile_clauses(
        groups: Vec<(UpdateMode, Vec<path::Leaf>)>,
        schema: &dyn schema::SchemaValidator,
    ) -> Result<Self> {
        let mut names = common::NamePlaceholders::default();
        let mut expression_attribute_values = collections::HashMap::new();
        let mut expressions = Vec::with_capacity(groups.len());
        let mut paths = Vec::new();
        for (mode, leaves) in groups {
            if leaves.is_empty() {
                continue;
            }
            let mut clauses = Vec::with_capacity(leaves.len());
            for leaf in leaves {
                let reference = names.assign_path(&leaf.path);
                let value_placeholder = format!(
                    ":{}",
                    common::placeholder_token(expression_attribute_values.len())
                );
                paths.push(leaf.path.clone());
                let (clause, value) =
                    mode.get_clause(reference, &value_placeholder, leaf, schema)?;
                if let Some(value) = value {
                    expression_attribute_values.insert(value_placeholder, value);
                }
                clauses.push(clause);
            }
            expressions.push(format!("{}{}", &*mode, clauses.join(", ")));
        }
        let plan = Self {
            expression: expressions.join(" "),
            expression_attribute_values,
            names,
            paths,
        };
        Ok(plan)
    }

    /// Leaves of a flattened tree, all with the same append flag.
    pub(crate) fn leaves(
        paths: Vec<path::AttributePath>,
        values: Vec<serde_json::Value>,
        append: bool,
    ) -> Vec<path::Leaf> {
        paths
            .into_iter()
            .zip(values)
            .map(|(path, value)| path::Leaf {
                path,
                value,
                append,
            })
            .collect()
    }
}
