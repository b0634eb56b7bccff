use crate::{schema, store};

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by table operations.
///
/// Each variant maps to an HTTP-like status code through [`Error::status_code`] and renders
/// a user-safe body through its `Display` implementation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The primary key misses one of the table's key attributes.
    #[error("Wrong primary for {table}: required for table is {required:?}; missing {missing:?}")]
    MissingPrimaryKey {
        /// Logical table name.
        table: String,
        /// Key attributes of the table.
        required: Vec<String>,
        /// Key attributes absent from the given key.
        missing: Vec<String>,
    },
    /// The primary key carries attributes the table's key does not have.
    #[error("Wrong primary for {table}: required for table is {required:?}; given {given:?}")]
    WrongPrimaryKey {
        /// Logical table name.
        table: String,
        /// Key attributes of the table.
        required: Vec<String>,
        /// What was given instead.
        given: Vec<String>,
    },
    /// The payload violates the table schema.
    #[error("{}", validation_body(.table, .mode, .source))]
    Validation {
        /// Logical table name.
        table: String,
        /// The check that failed.
        mode: schema::ValidationMode,
        /// The validator's finding.
        source: schema::ValidationError,
    },
    /// No item under the given key.
    #[error("{key} not found in {table}")]
    NotFound {
        /// Logical table name.
        table: String,
        /// The key, rendered as JSON.
        key: String,
    },
    /// A put without overwrite hit an existing item.
    #[error("Item is already existing.\nTable: {table}\nItem: {item}")]
    AlreadyExists {
        /// Logical table name.
        table: String,
        /// The rejected item, rendered as JSON.
        item: String,
    },
    /// An update that requires new attributes found one of them set.
    #[error("attributes {paths:?} already exist in {key} of table {table}")]
    AttributeAlreadyExists {
        /// Logical table name.
        table: String,
        /// The key, rendered as JSON.
        key: String,
        /// The guarded paths.
        paths: Vec<String>,
    },
    /// An update that requires existing attributes found one of them unset.
    #[error("attributes {paths:?} do not exist in {key} of table {table}")]
    AttributeNotExists {
        /// Logical table name.
        table: String,
        /// The key, rendered as JSON.
        key: String,
        /// The guarded paths.
        paths: Vec<String>,
    },
    /// The caller's condition evaluated to false.
    #[error("condition not met for {key} in table {table}")]
    ConditionalCheckFailed {
        /// Logical table name.
        table: String,
        /// The key, rendered as JSON.
        key: String,
    },
    /// A list-position removal targeted a position the list does not have.
    #[error("{path} of {key} in table {table} has no position {position}")]
    IndexOutOfRange {
        /// Logical table name.
        table: String,
        /// The key, rendered as JSON.
        key: String,
        /// Path of the list.
        path: String,
        /// The requested position.
        position: usize,
    },
    /// A query named an index the table does not declare.
    #[error("{index} is not an index of table {table}")]
    UnknownIndex {
        /// Logical table name.
        table: String,
        /// The requested index.
        index: String,
    },
    /// An update or remove without any path.
    #[error("nothing to update in table {table}")]
    EmptyUpdate {
        /// Logical table name.
        table: String,
    },
    /// The table schema could not be loaded or is malformed.
    #[error("invalid schema for table {table}: {message}")]
    Schema {
        /// Logical table name.
        table: String,
        /// What is wrong with it.
        message: String,
    },
    /// Missing or invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A value could not be converted between host and store representation.
    #[error(transparent)]
    Serialization(#[from] serde_dynamo::Error),
    /// The store rejected the request.
    #[error(transparent)]
    Store(#[from] store::StoreError),
}

impl Error {
    /// HTTP-like status code of the error.
    ///
    /// ```rust
    /// use dynamodb_resource::Error;
    ///
    /// let error = Error::NotFound {
    ///     table: "TableForTests".to_string(),
    ///     key: r#"{"primary_partition_key":"a"}"#.to_string(),
    /// };
    /// assert_eq!(error.status_code(), 404);
    /// ```
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingPrimaryKey { .. }
            | Self::WrongPrimaryKey { .. }
            | Self::UnknownIndex { .. }
            | Self::EmptyUpdate { .. } => 400,
            Self::Validation { source, .. } => match source.kind {
                schema::ValidatorKind::Type => 415,
                schema::ValidatorKind::Required | schema::ValidatorKind::AdditionalProperties => {
                    400
                }
                _ => 500,
            },
            Self::NotFound { .. } => 404,
            Self::AlreadyExists { .. }
            | Self::AttributeAlreadyExists { .. }
            | Self::AttributeNotExists { .. } => 409,
            Self::ConditionalCheckFailed { .. } => 412,
            Self::IndexOutOfRange { .. } => 416,
            Self::Schema { .. } | Self::Config(_) | Self::Serialization(_) | Self::Store(_) => 500,
        }
    }

    /// User-facing body of the error.
    pub fn body(&self) -> String {
        self.to_string()
    }
}

fn validation_body(
    table: &str,
    mode: &schema::ValidationMode,
    error: &schema::ValidationError,
) -> String {
    match error.kind {
        schema::ValidatorKind::Type => {
            let mut body = format!(
                "Wrong value type in {table} for key={}:\n{}.",
                error.path.join("/"),
                error.message
            );
            if !error.enum_values.is_empty() {
                let enum_values = serde_json::Value::Array(error.enum_values.clone());
                body.push_str(&format!("\nenum: {enum_values}"));
            }
            body
        }
        schema::ValidatorKind::Required if *mode == schema::ValidationMode::Remove => {
            format!("{} for table {table} and cannot be removed", error.message)
        }
        schema::ValidatorKind::Required => {
            format!("{} for table {table} and is missing", error.message)
        }
        schema::ValidatorKind::AdditionalProperties => format!(
            "{} for table {table}\npath to unexpected property: {:?}",
            error.message, error.path
        ),
        _ => format!(
            "unexpected database validation error for table {table}: {}",
            error.message
        ),
    }
}
