use anyhow::Context;
use tally_config::TallyConfig;
use tally_core::{Ident, QualifiedName};
use tally_db::{LibsqlStore, SchemaInference, UpsertPlanner};

/// Shared application resources initialized once at startup.
pub struct AppContext {
    pub store: LibsqlStore,
    pub config: TallyConfig,
    pub schema: Ident,
}

impl AppContext {
    /// Open the configured database.
    pub async fn init(config: TallyConfig) -> anyhow::Result<Self> {
        let schema = Ident::new(config.database.schema.as_str())
            .context("invalid database.schema")?;
        let store = LibsqlStore::open(&config.database)
            .await
            .with_context(|| format!("failed to open database {}", config.database.path))?
            .with_batch_size(config.ingest.batch_size)
            .with_audit_limit(config.audit.default_limit);

        tracing::debug!(path = %config.database.path, "database opened");
        Ok(Self {
            store,
            config,
            schema,
        })
    }

    /// Resolve a table name in `schema`, or the configured schema.
    pub fn table(&self, name: &str, schema: Option<&str>) -> anyhow::Result<QualifiedName> {
        let schema = schema.unwrap_or_else(|| self.schema.as_str());
        QualifiedName::parse(schema, name).with_context(|| format!("invalid table name '{name}'"))
    }

    pub fn inference(&self) -> SchemaInference<LibsqlStore> {
        SchemaInference::new(self.store.clone(), self.schema.clone())
    }

    pub fn planner(&self) -> anyhow::Result<UpsertPlanner<LibsqlStore>> {
        let prefix = Ident::new(self.config.ingest.staging_prefix.as_str())
            .context("invalid ingest.staging_prefix")?;
        Ok(UpsertPlanner::new(self.store.clone(), prefix))
    }
}
