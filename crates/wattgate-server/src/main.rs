//! Wattgate — power-budget throttling agent for an ASIC fleet.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

mod agent;
mod routes;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = wattgate_core::Config::from_env();
    let port = config.port;

    info!("Database: {}", config.db_path.display());
    let registry = Arc::new(
        wattgate_store::SqliteRegistry::open(&config.db_path)
            .map_err(|e| anyhow::anyhow!("Failed to open registry: {}", e))?,
    );

    // The loop bootstraps the fleet into the safe state, then cycles.
    agent::start_control_loop(&config, registry.clone());

    let state = Arc::new(AppState::new(config, registry));
    let app = routes::build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Wattgate API listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
