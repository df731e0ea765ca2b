use std::sync::Arc;

use courier_agent::AgentRuntime;
use courier_bus::{PublishError, PublisherContext};
use courier_core::config::AppConfig;
use courier_db::{connect_with_settings, migrations, DbPool, SqlEmployeeDirectory};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub context: Arc<PublisherContext>,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("publisher context could not be created: {0}")]
    Publisher(#[source] PublishError),
    #[error("agents could not be initialized: {0}")]
    Agents(#[source] anyhow::Error),
}

/// Builds everything the intake endpoint needs. The publisher context is created
/// once here and shared by every invocation.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
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

    let context = Arc::new(PublisherContext::connect(&config).map_err(BootstrapError::Publisher)?);
    info!(
        event_name = "system.bootstrap.publisher_ready",
        correlation_id = "bootstrap",
        registry_mode = ?config.registry.mode,
        bus_transport = ?config.bus.transport,
        "publisher context created"
    );

    let directory = Arc::new(SqlEmployeeDirectory::new(db_pool.clone()));
    let runtime = AgentRuntime::from_config(&config, Arc::clone(&context), directory)
        .await
        .map_err(BootstrapError::Agents)?;
    info!(
        event_name = "system.bootstrap.agents_ready",
        correlation_id = "bootstrap",
        agents = %runtime.agent_names().join(","),
        "agents registered"
    );

    Ok(Application { config, db_pool, context, runtime: Arc::new(runtime) })
}
