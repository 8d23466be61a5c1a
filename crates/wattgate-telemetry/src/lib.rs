//! Wattgate Telemetry — best-effort cycle metrics export.
//!
//! Telemetry is observability, not correctness: publish failures are logged
//! and dropped, never retried, and never block a cycle.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use wattgate_core::InfluxConfig;

/// Metrics snapshot from one control cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub available_watts: i64,
    pub active_watts: i64,
    /// Per-device online flags, keyed by management address.
    pub device_online: Vec<(String, bool)>,
}

/// Destination for cycle metrics.
pub trait TelemetrySink: Send + Sync {
    /// Publish a cycle report. Infallible by contract; failures are handled
    /// (logged) inside the sink.
    fn publish(&self, report: &CycleReport) -> impl Future<Output = ()> + Send;
}

/// InfluxDB v2 writer. An empty token leaves the sink disabled.
pub struct InfluxSink {
    client: reqwest::Client,
    config: InfluxConfig,
}

impl InfluxSink {
    pub fn new(config: InfluxConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    fn enabled(&self) -> bool {
        !self.config.token.is_empty()
    }
}

impl TelemetrySink for InfluxSink {
    async fn publish(&self, report: &CycleReport) {
        if !self.enabled() {
            debug!("Telemetry disabled (no token configured)");
            return;
        }

        let timestamp_ns = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default();
        let body = line_protocol(report, timestamp_ns);

        let url = format!("{}/api/v2/write", self.config.url.trim_end_matches('/'));
        let result = self
            .client
            .post(&url)
            .query(&[
                ("org", self.config.org.as_str()),
                ("bucket", self.config.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header("Authorization", format!("Token {}", self.config.token))
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("Published cycle metrics to {}", self.config.bucket);
            }
            Ok(response) => {
                warn!("Telemetry write rejected: HTTP {}", response.status());
            }
            Err(e) => {
                warn!("Telemetry write failed: {}", e);
            }
        }
    }
}

/// Sink that discards every report.
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    async fn publish(&self, _report: &CycleReport) {}
}

/// Render a cycle report as InfluxDB line protocol.
///
/// One `power` point for the budget, one `device_online` point per device.
pub fn line_protocol(report: &CycleReport, timestamp_ns: i64) -> String {
    let mut lines = vec![format!(
        "power available={}i,active={}i {}",
        report.available_watts, report.active_watts, timestamp_ns
    )];
    for (addr, online) in &report.device_online {
        lines.push(format!(
            "device_online,addr={} online={} {}",
            addr,
            if *online { 1 } else { 0 },
            timestamp_ns
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> CycleReport {
        CycleReport {
            available_watts: 2200,
            active_watts: 2000,
            device_online: vec![
                ("10.0.0.1".into(), true),
                ("10.0.0.2".into(), false),
            ],
        }
    }

    #[test]
    fn line_protocol_shape() {
        let rendered = line_protocol(&report(), 1_700_000_000_000_000_000);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "power available=2200i,active=2000i 1700000000000000000"
        );
        assert_eq!(
            lines[1],
            "device_online,addr=10.0.0.1 online=1 1700000000000000000"
        );
        assert_eq!(
            lines[2],
            "device_online,addr=10.0.0.2 online=0 1700000000000000000"
        );
    }

    #[tokio::test]
    async fn disabled_sink_drops_report() {
        let sink = InfluxSink::new(InfluxConfig {
            url: "http://127.0.0.1:1".into(),
            token: String::new(),
            org: "wattgate".into(),
            bucket: "power".into(),
        });
        // Must return without attempting a network call.
        sink.publish(&report()).await;
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_swallowed() {
        let sink = InfluxSink::new(InfluxConfig {
            url: "http://127.0.0.1:1".into(),
            token: "secret".into(),
            org: "wattgate".into(),
            bucket: "power".into(),
        });
        sink.publish(&report()).await;
    }
}
