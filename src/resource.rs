//! Table cache.

use crate::{
    config::ResourceConfig,
    error::{Error, Result},
    schema::JsonSchema,
    store::Store,
    table::Table,
};

use parking_lot::Mutex;
use std::{
    collections,
    sync::{Arc, OnceLock},
};

static GLOBAL: OnceLock<Resource> = OnceLock::new();

/// Hands out one [`Table`] per logical table name.
///
/// Tables are built on first use from the schema file named after them and kept for the
/// lifetime of the resource; nothing is ever evicted.
///
/// ```rust,no_run
/// use dynamodb_resource::{Resource, ResourceConfig};
///
/// # async fn example() -> Result<(), dynamodb_resource::Error> {
/// Resource::init_global(Resource::from_config(ResourceConfig::from_env()?).await)?;
/// let table = Resource::global()?.table("TableForTests")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Resource {
    config: ResourceConfig,
    store: Arc<dyn Store>,
    tables: Mutex<collections::HashMap<String, Arc<Table>>>,
}

impl Resource {
    /// A resource over the given store.
    pub fn new(config: ResourceConfig, store: Arc<dyn Store>) -> Self {
        Self {
            config,
            store,
            tables: Mutex::default(),
        }
    }

    /// A resource over a store client built from the configuration.
    pub async fn from_config(config: ResourceConfig) -> Self {
        let client = config.build_client().await;
        Self::new(config, Arc::new(client))
    }

    /// The configuration of this resource.
    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    /// The table named `name`, built on first use.
    pub fn table(&self, name: &str) -> Result<Arc<Table>> {
        let mut tables = self.tables.lock();
        if let Some(table) = tables.get(name) {
            return Ok(table.clone());
        }
        let schema = JsonSchema::from_path(self.config.schema_path(name))?;
        let table = Arc::new(Table::new(
            name,
            self.config.physical_name(name),
            Arc::new(schema),
            self.store.clone(),
        )?);
        tracing::debug!(table = name, physical_name = %table.physical_name(), "table loaded");
        tables.insert(name.to_string(), table.clone());
        Ok(table)
    }

    /// Install the process-wide resource; only the first call succeeds.
    pub fn init_global(resource: Resource) -> Result<&'static Resource> {
        let mut installed = false;
        let global = GLOBAL.get_or_init(|| {
            installed = true;
            resource
        });
        if installed {
            Ok(global)
        } else {
            Err(Error::Config(
                "the global resource is already initialised".to_string(),
            ))
        }
    }

    /// The process-wide resource.
    pub fn global() -> Result<&'static Resource> {
        GLOBAL
            .get()
            .ok_or_else(|| Error::Config("the global resource is not initialised".to_string()))
    }
}
