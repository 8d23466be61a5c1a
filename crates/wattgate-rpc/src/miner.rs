//! Miner management RPC client (DragonMint-style HTTP API).
//!
//! Auth is a form login returning a JWT, which authorizes the summary and
//! restart endpoints. Restart is fire-and-forget: the caller treats a
//! failure as loggable, never fatal.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use wattgate_core::{Error, Result};

/// Connection parameters for one device's management API.
#[derive(Debug, Clone)]
pub struct MinerTarget {
    pub addr: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl MinerTarget {
    fn base_url(&self) -> String {
        format!("http://{}:{}", self.addr, self.port)
    }
}

/// Telemetry snapshot from a miner's summary endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerSummary {
    /// Average hashrate in MH/s, if reported.
    pub hashrate_mhs: Option<f64>,
    pub temperature_c: Option<f64>,
    pub uptime_secs: Option<u64>,
}

/// Management operations against a single miner.
pub trait MinerRpc: Send + Sync {
    fn summary(&self, target: &MinerTarget) -> impl Future<Output = Result<MinerSummary>> + Send;
    fn restart(&self, target: &MinerTarget) -> impl Future<Output = Result<()>> + Send;
}

/// HTTP client for the DragonMint management API.
pub struct DragonMiner {
    client: reqwest::Client,
}

impl DragonMiner {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// POST /api/auth — form login, returns a JWT.
    async fn auth(&self, target: &MinerTarget) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/auth", target.base_url()))
            .form(&[
                ("username", target.username.as_str()),
                ("password", target.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Miner(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Miner(format!(
                "auth against {} failed with HTTP {}",
                target.addr,
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Miner(e.to_string()))?;

        body.get("jwt")
            .and_then(|t| t.as_str())
            .map(String::from)
            .ok_or_else(|| Error::Miner(format!("no jwt in auth response from {}", target.addr)))
    }
}

impl MinerRpc for DragonMiner {
    async fn summary(&self, target: &MinerTarget) -> Result<MinerSummary> {
        let jwt = self.auth(target).await?;
        let response = self
            .client
            .get(format!("{}/api/summary", target.base_url()))
            .bearer_auth(jwt)
            .send()
            .await
            .map_err(|e| Error::Miner(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Miner(format!(
                "summary from {} failed with HTTP {}",
                target.addr,
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Miner(e.to_string()))?;

        debug!("Fetched summary from {}", target.addr);
        Ok(parse_summary(&body))
    }

    async fn restart(&self, target: &MinerTarget) -> Result<()> {
        let jwt = self.auth(target).await?;
        let response = self
            .client
            .post(format!("{}/api/restartCgMiner", target.base_url()))
            .bearer_auth(jwt)
            .send()
            .await
            .map_err(|e| Error::Miner(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Miner(format!(
                "restart of {} failed with HTTP {}",
                target.addr,
                response.status()
            )));
        }
        Ok(())
    }
}

/// Extract the interesting fields from a DragonMint summary payload.
///
/// The payload shape is `{"DEVS": [{"MHS av": .., "Temperature": ..}],
/// "STATUS": [{"When": ..}], ...}`; every field is optional.
pub fn parse_summary(body: &serde_json::Value) -> MinerSummary {
    let dev = body.get("DEVS").and_then(|d| d.get(0));
    MinerSummary {
        hashrate_mhs: dev.and_then(|d| d.get("MHS av")).and_then(|v| v.as_f64()),
        temperature_c: dev
            .and_then(|d| d.get("Temperature"))
            .and_then(|v| v.as_f64()),
        uptime_secs: body
            .get("SUMMARY")
            .and_then(|s| s.get(0))
            .and_then(|s| s.get("Elapsed"))
            .and_then(|v| v.as_u64()),
    }
}
