//! Background control-loop task.

use std::sync::Arc;

use tracing::info;

use wattgate_core::Config;
use wattgate_feed::HttpPowerFeed;
use wattgate_rpc::{DragonMiner, RestRouter};
use wattgate_runtime::{ActuationGateway, ControlLoop};
use wattgate_store::SqliteRegistry;
use wattgate_telemetry::InfluxSink;

/// Build the loop's collaborators from config and spawn it. The loop runs
/// its bootstrap safe-state pass before the first cycle and never returns.
pub fn start_control_loop(config: &Config, registry: Arc<SqliteRegistry>) {
    let feed = HttpPowerFeed::new(config.feed_url.clone());
    let router = RestRouter::new(
        &config.router.host,
        config.router.port,
        config.router.username.clone(),
        config.router.password.clone(),
        config.router.blocklist.clone(),
        config.router.timeout,
    );
    let miner = DragonMiner::new(config.miner_timeout);
    let sink = InfluxSink::new(config.influx.clone());

    let gateway = ActuationGateway::new(registry.clone(), router, miner);
    let control = ControlLoop::new(registry, feed, gateway, sink, config.poll_interval);

    info!(
        "Starting control loop: feed={}, poll interval={:?}",
        config.feed_url, config.poll_interval
    );
    tokio::spawn(control.run());
}
