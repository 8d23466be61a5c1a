//! Environment-sourced configuration with hardcoded fallbacks.
//!
//! Every knob can be overridden via a `WATTGATE_*` environment variable;
//! the defaults are suitable for a single-host deployment where the agent
//! and its HTTP surface share a process.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Router firewall session parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Router management host.
    pub host: String,
    /// Router REST API port.
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Name of the firewall address list used as the blocklist.
    pub blocklist: String,
    /// Connect + total timeout for a single router operation.
    #[serde(with = "secs")]
    pub timeout: Duration,
}

/// Metrics-export endpoint parameters (InfluxDB v2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    pub url: String,
    /// Empty token disables telemetry export.
    pub token: String,
    pub org: String,
    pub bucket: String,
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP API port.
    pub port: u16,
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Time between control cycles.
    #[serde(with = "secs")]
    pub poll_interval: Duration,
    /// URL serving the available-power JSON feed.
    pub feed_url: String,
    pub router: RouterConfig,
    /// Per-call timeout for miner management RPCs.
    #[serde(with = "secs")]
    pub miner_timeout: Duration,
    pub influx: InfluxConfig,
    /// Concurrent workers for the fleet status fan-out.
    pub status_workers: usize,
    /// How long a cached miner summary stays fresh.
    #[serde(with = "secs")]
    pub summary_ttl: Duration,
}

impl Config {
    /// Build configuration from environment variables and defaults.
    pub fn from_env() -> Self {
        let port = env_parse("PORT", 3900u16);

        Self {
            port,
            db_path: std::env::var("WATTGATE_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/wattgate.db")),
            poll_interval: Duration::from_secs(env_parse("WATTGATE_POLL_SECS", 1u64)),
            feed_url: std::env::var("WATTGATE_FEED_URL")
                .unwrap_or_else(|_| format!("http://127.0.0.1:{}/api/power", port)),
            router: RouterConfig {
                host: env_str("WATTGATE_ROUTER_HOST", "192.168.88.1"),
                port: env_parse("WATTGATE_ROUTER_PORT", 80u16),
                username: env_str("WATTGATE_ROUTER_USER", "admin"),
                password: env_str("WATTGATE_ROUTER_PASSWORD", ""),
                blocklist: env_str("WATTGATE_BLOCKLIST", "wattgate-blocked"),
                timeout: Duration::from_secs(env_parse("WATTGATE_ROUTER_TIMEOUT_SECS", 5u64)),
            },
            miner_timeout: Duration::from_secs(env_parse("WATTGATE_MINER_TIMEOUT_SECS", 10u64)),
            influx: InfluxConfig {
                url: env_str("WATTGATE_INFLUX_URL", "http://127.0.0.1:8086"),
                token: env_str("WATTGATE_INFLUX_TOKEN", ""),
                org: env_str("WATTGATE_INFLUX_ORG", "wattgate"),
                bucket: env_str("WATTGATE_INFLUX_BUCKET", "power"),
            },
            status_workers: env_parse("WATTGATE_STATUS_WORKERS", 36usize),
            summary_ttl: Duration::from_secs(env_parse("WATTGATE_SUMMARY_TTL_SECS", 60u64)),
        }
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Serde helper: durations as whole seconds.
mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
