use crate::common::{self, path};

/// Attributes to return from a read, compiled into a projection expression.
///
/// ```rust
/// use dynamodb_resource::common::{path::AttributePath, selection::Projection};
///
/// let projection = Projection::from(vec![
///     AttributePath::from(["primary_partition_key"]),
///     AttributePath::from(["some_dict", "key1"]),
/// ]);
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Projection(Vec<path::AttributePath>);

impl From<Vec<path::AttributePath>> for Projection {
    fn from(paths: Vec<path::AttributePath>) -> Self {
        Self(paths)
    }
}

impl Projection {
    /// Whether nothing is selected, i.e. the whole item is returned.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Projection> for common::ExpressionInput {
    fn from(projection: Projection) -> Self {
        let mut names = common::NamePlaceholders::default();
        let expressions: Vec<_> = projection
            .0
            .iter()
            .map(|path| names.assign_path(path))
            .collect();
        common::ExpressionInput {
            expression: expressions.join(", "),
            expression_attribute_names: names.expression_attribute_names(),
            ..Default::default()
        }
    }
}
