//! Common utilities for DynamoDB operations.
//!
//! This module provides shared types and utilities used across read and write operations,
//! including key handling, attribute paths, condition expressions, numeric conversion and
//! attribute selection.

/// Condition expression building for conditional writes and key conditions.
pub mod condition;

/// Key shapes and primary key normalization.
pub mod key;

/// Conversion between host JSON values and exact store values.
pub mod number;

/// Attribute paths and the nested-tree flattener.
pub mod path;

/// Attribute selection for projection expressions.
pub mod selection;

use aws_sdk_dynamodb::types;
use indexmap::IndexMap;
use std::collections;

/// Letters available for placeholder tokens.
const ALPHABET_LEN: usize = 26;

/// Separator between the placeholders of one attribute path.
pub(crate) const PATH_SEPARATOR: &str = ".";

/// Token for the `index`-th placeholder: `aa, ab, .., zz, aaa, ..`.
///
/// Two letters cover the first 676 tokens; every further block widens the token by one
/// letter, so distinct indexes never share a token.
pub(crate) fn placeholder_token(mut index: usize) -> String {
    let mut width = 2;
    let mut capacity = ALPHABET_LEN * ALPHABET_LEN;
    while index >= capacity {
        index -= capacity;
        width += 1;
        capacity *= ALPHABET_LEN;
    }
    let mut letters = vec!['a'; width];
    for slot in letters.iter_mut().rev() {
        *slot = char::from(b'a' + (index % ALPHABET_LEN) as u8);
        index /= ALPHABET_LEN;
    }
    letters.into_iter().collect()
}

/// Name placeholders of one compiled expression.
///
/// Attribute names map to `#AA`, `#AB`, .. in first-seen order; the same name always gets
/// the same placeholder.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct NamePlaceholders {
    placeholders: IndexMap<String, String>,
}

impl NamePlaceholders {
    /// Placeholder for `name`, assigning the next free one on first sight.
    pub(crate) fn assign(&mut self, name: &str) -> String {
        if let Some(placeholder) = self.placeholders.get(name) {
            return placeholder.clone();
        }
        let token = placeholder_token(self.placeholders.len()).to_uppercase();
        let placeholder = format!("#{token}");
        self.placeholders
            .insert(name.to_string(), placeholder.clone());
        placeholder
    }

    /// Placeholder previously assigned to `name`.
    ///
    /// # Panics
    ///
    /// Panics when `name` was never assigned: the expression and its conditions were built
    /// from different paths.
    pub(crate) fn lookup(&self, name: &str) -> &str {
        match self.placeholders.get(name) {
            Some(placeholder) => placeholder,
            None => panic!("attribute name {name:?} has no placeholder in this expression"),
        }
    }

    /// Render a path with the placeholders of its key steps and literal list indexes.
    pub(crate) fn render(&self, path: &path::AttributePath) -> String {
        let mut rendered = String::new();
        for step in path.steps() {
            match step {
                path::PathStep::Key(name) => {
                    if !rendered.is_empty() {
                        rendered.push_str(PATH_SEPARATOR);
                    }
                    rendered.push_str(self.lookup(name));
                }
                path::PathStep::Index(position) => {
                    rendered.push_str(&format!("[{position}]"));
                }
            }
        }
        rendered
    }

    /// Assign placeholders for every key step of `path` and render it.
    pub(crate) fn assign_path(&mut self, path: &path::AttributePath) -> String {
        for step in path.steps() {
            if let path::PathStep::Key(name) = step {
                self.assign(name);
            }
        }
        self.render(path)
    }

    /// Placeholder to attribute name, the direction the store expects.
    pub(crate) fn expression_attribute_names(&self) -> collections::HashMap<String, String> {
        self.placeholders
            .iter()
            .map(|(name, placeholder)| (placeholder.clone(), name.clone()))
            .collect()
    }
}

fn get_expression(left: String, operator: &str, right: String) -> String {
    if left.is_empty() {
        right
    } else if right.is_empty() {
        left
    } else {
        format!("{left}{operator}{right}")
    }
}

/// expression operation
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ExpressionInput {
    pub(crate) expression: String,
    pub(crate) expression_attribute_names: collections::HashMap<String, String>,
    pub(crate) expression_attribute_values: collections::HashMap<String, types::AttributeValue>,
}

impl ExpressionInput {
    pub(crate) fn merge(operator: &str, items: Vec<Self>) -> Self {
        let mut operation = Self::default();
        for item in items {
            operation
                .expression_attribute_names
                .extend(item.expression_attribute_names);
            operation
                .expression_attribute_values
                .extend(item.expression_attribute_values);
            operation.expression = get_expression(operation.expression, operator, item.expression);
        }
        operation
    }

    pub(crate) fn merge_into(
        self,
        names: &mut collections::HashMap<String, String>,
        values: &mut collections::HashMap<String, types::AttributeValue>,
    ) -> String {
        names.extend(self.expression_attribute_names);
        values.extend(self.expression_attribute_values);
        self.expression
    }
}
