//! Storage collaborator: document-store operations over raw field mappings.

mod filter;
pub mod memory;
pub mod postgres;

pub use filter::{Filter, IncludeItem};
pub use memory::MemoryDatasource;
pub use postgres::PostgresDatasource;

use crate::config::{Connector, DatasourceConfig};
use crate::error::{AppError, ConfigError};
use crate::value::{Value, ID_FIELD, M};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Document store used by models. Filters are passed through unchanged; results are
/// raw documents carrying their identifier under [`ID_FIELD`].
#[async_trait]
pub trait Datasource: Send + Sync {
    fn name(&self) -> &str;

    async fn find_many(&self, collection: &str, filter: &Filter) -> Result<Vec<M>, AppError>;

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<M>, AppError> {
        let mut filter = filter.clone();
        filter.limit = Some(1);
        Ok(self.find_many(collection, &filter).await?.into_iter().next())
    }

    async fn find_by_id(&self, collection: &str, id: &Value) -> Result<Option<M>, AppError> {
        self.find_one(collection, &Filter::new().where_eq(ID_FIELD, id.clone()))
            .await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, AppError>;

    /// Insert one document; an identifier is generated when absent. Returns the stored document.
    async fn create(&self, collection: &str, data: M) -> Result<M, AppError>;

    /// Merge `data` into the document. `None` when no document has this id.
    async fn update_by_id(&self, collection: &str, id: &Value, data: &M) -> Result<Option<M>, AppError>;

    /// Returns the number of deleted documents.
    async fn delete_by_id(&self, collection: &str, id: &Value) -> Result<u64, AppError>;
}

/// Connect every configured datasource, keyed by its entry key in datasources.json.
pub async fn connect_all(
    configs: &BTreeMap<String, DatasourceConfig>,
) -> Result<HashMap<String, Arc<dyn Datasource>>, ConfigError> {
    let mut out: HashMap<String, Arc<dyn Datasource>> = HashMap::new();
    for (key, cfg) in configs {
        let name = cfg.name.clone().unwrap_or_else(|| key.clone());
        let ds: Arc<dyn Datasource> = match cfg.connector() {
            Some(Connector::Memory) => Arc::new(MemoryDatasource::new(&name)),
            Some(Connector::Postgres) => {
                let url = cfg
                    .url
                    .clone()
                    .or_else(|| std::env::var("DATABASE_URL").ok())
                    .ok_or_else(|| ConfigError::Validation(format!("datasource {} requires url", name)))?;
                Arc::new(PostgresDatasource::connect(&name, &url, cfg.schema.as_deref()).await?)
            }
            None => return Err(ConfigError::UnsupportedConnector(cfg.connector.clone())),
        };
        tracing::info!(datasource = %name, connector = %cfg.connector, "datasource ready");
        out.insert(key.clone(), ds);
    }
    Ok(out)
}
