use serde_json::{Map, Value};
use std::fmt;

/// One step of an attribute path.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum PathStep {
    /// A map key.
    Key(String),
    /// A position inside a list.
    Index(usize),
}

/// Ordered steps from the item root to one leaf or subtree.
///
/// ```rust
/// use dynamodb_resource::common::path::AttributePath;
///
/// let path = AttributePath::from(["some_dict", "key1"]);
/// assert_eq!(path.to_string(), "some_dict.key1");
///
/// let entry = AttributePath::from(["some_array"]).index(2);
/// assert_eq!(entry.to_string(), "some_array[2]");
/// ```
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct AttributePath(Vec<PathStep>);

impl AttributePath {
    /// Extend the path with a map key.
    pub fn key(mut self, name: impl Into<String>) -> Self {
        self.0.push(PathStep::Key(name.into()));
        self
    }

    /// Extend the path with a list position.
    pub fn index(mut self, position: usize) -> Self {
        self.0.push(PathStep::Index(position));
        self
    }

    /// The steps of the path.
    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the path addresses the item root.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The first `len` steps.
    pub fn prefix(&self, len: usize) -> Self {
        Self(self.0[..len.min(self.0.len())].to_vec())
    }

    /// The path without its last step.
    pub fn parent(&self) -> Self {
        self.prefix(self.0.len().saturating_sub(1))
    }

    /// The last step when it is a map key.
    pub fn last_key(&self) -> Option<&str> {
        match self.0.last() {
            Some(PathStep::Key(name)) => Some(name),
            _ => None,
        }
    }

    /// Two paths conflict when one is a prefix of the other.
    pub fn conflicts_with(&self, other: &Self) -> bool {
        let len = self.0.len().min(other.0.len());
        self.0[..len] == other.0[..len]
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, step) in self.0.iter().enumerate() {
            match step {
                PathStep::Key(name) if position == 0 => write!(f, "{name}")?,
                PathStep::Key(name) => write!(f, ".{name}")?,
                PathStep::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

impl From<&str> for AttributePath {
    fn from(name: &str) -> Self {
        Self::default().key(name)
    }
}

impl From<String> for AttributePath {
    fn from(name: String) -> Self {
        Self::default().key(name)
    }
}

impl<const N: usize> From<[&str; N]> for AttributePath {
    fn from(names: [&str; N]) -> Self {
        names.into_iter().fold(Self::default(), Self::key)
    }
}

impl From<Vec<String>> for AttributePath {
    fn from(names: Vec<String>) -> Self {
        names.into_iter().fold(Self::default(), Self::key)
    }
}

impl From<Vec<PathStep>> for AttributePath {
    fn from(steps: Vec<PathStep>) -> Self {
        Self(steps)
    }
}

/// Flatten a nested tree into one (path, value) pair per leaf, depth first in key order.
///
/// Non-empty maps are traversed; everything else (scalars, lists, empty maps) is a leaf.
pub fn flatten(tree: &Map<String, Value>) -> (Vec<AttributePath>, Vec<Value>) {
    let mut paths = Vec::new();
    let mut values = Vec::new();
    flatten_recursive(tree, &AttributePath::default(), &mut paths, &mut values);
    (paths, values)
}

fn flatten_recursive(
    tree: &Map<String, Value>,
    prefix: &AttributePath,
    paths: &mut Vec<AttributePath>,
    values: &mut Vec<Value>,
) {
    for (key, value) in tree {
        let path = prefix.clone().key(key);
        match value {
            Value::Object(children) if !children.is_empty() => {
                flatten_recursive(children, &path, paths, values)
            }
            _ => {
                paths.push(path);
                values.push(value.clone());
            }
        }
    }
}

/// Rebuild a tree from flattened (path, value) pairs.
pub fn unflatten(paths: &[AttributePath], values: &[Value]) -> Map<String, Value> {
    let mut tree = Map::new();
    for (path, value) in paths.iter().zip(values) {
        insert(&mut tree, path, value.clone());
    }
    tree
}

/// Set `value` at `path`, creating intermediate maps.
///
/// Only key steps are followed; a path with a list position is left untouched.
pub fn insert(tree: &mut Map<String, Value>, path: &AttributePath, value: Value) {
    let Some((last, parents)) = path.steps().split_last() else {
        return;
    };
    let mut node = tree;
    for step in parents {
        let PathStep::Key(name) = step else {
            return;
        };
        let child = node
            .entry(name.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !child.is_object() {
            *child = Value::Object(Map::new());
        }
        let Value::Object(map) = child else {
            return;
        };
        node = map;
    }
    if let PathStep::Key(name) = last {
        node.insert(name.clone(), value);
    }
}

/// Value at `path`, if every step exists.
pub fn walk<'a>(value: &'a Value, path: &AttributePath) -> Option<&'a Value> {
    path.steps()
        .iter()
        .try_fold(value, |node, step| match step {
            PathStep::Key(name) => node.get(name.as_str()),
            PathStep::Index(position) => node.get(*position),
        })
}

/// One leaf of an update: where to write, what, and whether to append to a list there.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Leaf {
    pub(crate) path: AttributePath,
    pub(crate) value: Value,
    pub(crate) append: bool,
}

/// Diff `new_data` against the stored `item` to find the shallowest missing step of each path.
///
/// A path whose leaf exists is kept as is. A path with a missing step is cut right after that
/// step and carries the whole `new_data` subtree below it, so one write creates the missing
/// intermediate maps. Only paths whose leaf exists keep their `append` flag.
pub(crate) fn find_new_paths(
    item: &Value,
    new_data: &Value,
    paths: &[AttributePath],
    append: &[bool],
) -> Vec<Leaf> {
    let mut leaves: Vec<Leaf> = Vec::with_capacity(paths.len());
    for (position, path) in paths.iter().enumerate() {
        let missing_len =
            (1..=path.len()).find(|len| walk(item, &path.prefix(*len)).is_none());
        let (path, append) = match missing_len {
            Some(len) => (path.prefix(len), false),
            None => (path.clone(), append.get(position).copied().unwrap_or(false)),
        };
        if leaves.iter().any(|leaf| leaf.path == path) {
            continue;
        }
        let value = walk(new_data, &path).cloned().unwrap_or(Value::Null);
        leaves.push(Leaf {
            path,
            value,
            append,
        });
    }
    leaves
}
