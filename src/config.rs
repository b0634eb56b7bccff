//! Resource configuration.

use crate::error::{Error, Result};

use aws_sdk_dynamodb::{
    Client,
    config::{BehaviorVersion, Credentials, Region},
};
use std::{env, path};

/// Deployment stage, prefixed to every physical table name.
pub const STAGE_VAR: &str = "STAGE";
/// Directory holding one `<table>.json` schema per table.
pub const SCHEMA_DIRECTORY_VAR: &str = "DYNAMO_DB_RESOURCE_SCHEMA_DIRECTORY";
/// Region of the store.
pub const REGION_VAR: &str = "AWS_REGION";
/// Endpoint of a local store, such as DynamoDB Local.
pub const ENDPOINT_URL_VAR: &str = "DYNAMO_DB_ENDPOINT_URL";

/// Region reported to a local store.
const LOCAL_REGION: &str = "dummy";

/// Where schemas live and which store the tables talk to.
///
/// ```rust
/// use dynamodb_resource::ResourceConfig;
///
/// let config = ResourceConfig::local("http://localhost:8000", "tests/data/schemas");
/// assert_eq!(config.physical_name("TableForTests"), "TableForTests");
///
/// let staged = ResourceConfig {
///     stage: Some("TEST".to_string()),
///     ..config
/// };
/// assert_eq!(staged.physical_name("TableForTests"), "TEST-TableForTests");
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceConfig {
    /// Deployment stage, if any.
    pub stage: Option<String>,
    /// Directory of the table schemas.
    pub schema_directory: path::PathBuf,
    /// Region override; the default provider chain decides otherwise.
    pub region: Option<String>,
    /// Endpoint of a local store; the cloud endpoint otherwise.
    pub endpoint_url: Option<String>,
}

impl ResourceConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| env::var(name).ok())
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let present = |name: &str| lookup(name).filter(|value| !value.is_empty());
        let schema_directory = present(SCHEMA_DIRECTORY_VAR)
            .ok_or_else(|| Error::Config(format!("{SCHEMA_DIRECTORY_VAR} is not set")))?;
        Ok(Self {
            stage: present(STAGE_VAR),
            schema_directory: schema_directory.into(),
            region: present(REGION_VAR),
            endpoint_url: present(ENDPOINT_URL_VAR),
        })
    }

    /// Profile for a local store with dummy credentials.
    pub fn local(endpoint_url: impl Into<String>, schema_directory: impl Into<path::PathBuf>) -> Self {
        Self {
            stage: None,
            schema_directory: schema_directory.into(),
            region: Some(LOCAL_REGION.to_string()),
            endpoint_url: Some(endpoint_url.into()),
        }
    }

    /// Name of a logical table in the store.
    pub fn physical_name(&self, name: &str) -> String {
        match &self.stage {
            Some(stage) => format!("{stage}-{name}"),
            None => name.to_string(),
        }
    }

    /// Schema file of a logical table.
    pub fn schema_path(&self, name: &str) -> path::PathBuf {
        self.schema_directory.join(format!("{name}.json"))
    }

    /// Build a store client for this configuration.
    pub async fn build_client(&self) -> Client {
        match &self.endpoint_url {
            Some(endpoint_url) => {
                let region = self.region.clone().unwrap_or_else(|| LOCAL_REGION.to_string());
                let credentials =
                    Credentials::new("dummy", "dummy", None, None, "dynamodb-resource-local");
                let config = aws_sdk_dynamodb::config::Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .region(Region::new(region))
                    .credentials_provider(credentials)
                    .endpoint_url(endpoint_url)
                    .build();
                Client::from_conf(config)
            }
            None => {
                let mut loader = aws_config::defaults(BehaviorVersion::latest());
                if let Some(region) = &self.region {
                    loader = loader.region(Region::new(region.clone()));
                }
                Client::new(&loader.load().await)
            }
        }
    }
}
