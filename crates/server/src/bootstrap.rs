use std::sync::Arc;

use sitescope_core::config::{AppConfig, ConfigError, LoadOptions, SiteLifecycleConfig};
use sitescope_core::workflow::{NoopSiteLifecycle, ScopingWorkflow, SiteLifecycle, WorkflowSettings};
use sitescope_db::{
    connect_with_config, migrations, DbPool, SqlApprovalStore, SqlCatalogRepository,
};
use thiserror::Error;
use tracing::info;

use crate::lifecycle::HttpSiteLifecycle;

pub type ServerWorkflow =
    ScopingWorkflow<SqlApprovalStore, SqlCatalogRepository, Arc<dyn SiteLifecycle>>;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub workflow: Arc<ServerWorkflow>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("site lifecycle client could not be built: {0}")]
    SiteLifecycle(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let lifecycle = site_lifecycle(&config)?;
    let workflow = ScopingWorkflow::new(
        SqlApprovalStore::new(db_pool.clone()),
        SqlCatalogRepository::new(db_pool.clone()),
        lifecycle,
        WorkflowSettings {
            lifecycle_timeout: config.workflow.lifecycle_timeout(),
            dashboard_activity_limit: config.workflow.dashboard_activity_limit,
        },
    );

    Ok(Application { config, db_pool, workflow: Arc::new(workflow) })
}

fn site_lifecycle(config: &AppConfig) -> Result<Arc<dyn SiteLifecycle>, BootstrapError> {
    let SiteLifecycleConfig { enabled, base_url, api_token } = &config.site_lifecycle;
    match (enabled, base_url) {
        (true, Some(base_url)) => {
            let client = HttpSiteLifecycle::new(
                base_url,
                api_token.clone(),
                config.workflow.lifecycle_timeout(),
            )
            .map_err(BootstrapError::SiteLifecycle)?;
            info!(
                event_name = "system.bootstrap.site_lifecycle",
                correlation_id = "bootstrap",
                mode = "http",
                base_url = %base_url,
                "site lifecycle client configured"
            );
            Ok(Arc::new(client))
        }
        _ => {
            info!(
                event_name = "system.bootstrap.site_lifecycle",
                correlation_id = "bootstrap",
                mode = "noop",
                "site lifecycle updates disabled"
            );
            Ok(Arc::new(NoopSiteLifecycle))
        }
    }
}
