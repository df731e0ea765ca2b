mod bootstrap;
mod health;
mod intake;

use std::time::Duration;

use anyhow::Result;
use courier_core::config::{AppConfig, LoadOptions};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use courier_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.port,
        health::ServiceState { db_pool: app.db_pool.clone(), runtime: app.runtime.clone() },
    )
    .await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        port = app.config.server.port,
        "courier-server started"
    );
    wait_for_shutdown().await?;

    let outstanding =
        app.context.shutdown(Duration::from_millis(app.config.bus.flush_timeout_ms)).await;
    if outstanding > 0 {
        tracing::warn!(
            event_name = "system.server.unflushed",
            correlation_id = "shutdown",
            outstanding,
            "messages still in flight at shutdown"
        );
    }
    app.db_pool.close().await;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "courier-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
