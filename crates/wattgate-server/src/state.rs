//! Shared application state.

use std::sync::Arc;

use parking_lot::RwLock;
use wattgate_core::Config;
use wattgate_rpc::DragonMiner;
use wattgate_runtime::StatusFetcher;
use wattgate_store::SqliteRegistry;

/// State shared by every route handler.
pub struct AppState {
    pub config: Config,
    pub registry: Arc<SqliteRegistry>,
    pub status: StatusFetcher<DragonMiner>,
    /// Budget served by `GET /api/power`; the loop's default feed URL points
    /// there, so this doubles as the manual power source.
    pub manual_power: RwLock<u64>,
}

impl AppState {
    pub fn new(config: Config, registry: Arc<SqliteRegistry>) -> Self {
        let status = StatusFetcher::new(
            registry.clone(),
            DragonMiner::new(config.miner_timeout),
            config.status_workers,
            config.summary_ttl,
        );
        Self {
            config,
            registry,
            status,
            manual_power: RwLock::new(0),
        }
    }
}
