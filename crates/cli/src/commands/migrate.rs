use courier_core::config::DatabaseConfig;
use courier_db::{connect_with_settings, migrations, DbPool};

use crate::commands::{async_runtime, exit, load_config, CommandFailure, CommandResult};

pub fn run() -> CommandResult {
    CommandResult::from_outcome("migrate", migrate())
}

fn migrate() -> Result<String, CommandFailure> {
    let config = load_config()?;
    let runtime = async_runtime()?;

    runtime.block_on(async {
        let pool = open_migrated(&config.database).await?;
        pool.close().await;
        Ok(format!("employee directory schema is current at `{}`", config.database.url))
    })
}

/// Connects to the directory database and applies pending migrations.
pub(crate) async fn open_migrated(database: &DatabaseConfig) -> Result<DbPool, CommandFailure> {
    let pool =
        connect_with_settings(&database.url, database.max_connections, database.timeout_secs)
            .await
            .map_err(|error| {
                CommandFailure::new("db_connectivity", error.to_string(), exit::DATABASE)
            })?;

    if let Err(error) = migrations::run_pending(&pool).await {
        pool.close().await;
        return Err(CommandFailure::new("migration", error.to_string(), exit::SCHEMA));
    }
    Ok(pool)
}
