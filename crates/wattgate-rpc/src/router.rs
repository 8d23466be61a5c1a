//! Router firewall client — a named address-list used as the blocklist.
//!
//! Sessions are opened per operation and dropped immediately, bounded by the
//! configured access timeout, so an unreachable router costs one operation
//! rather than hanging the control loop.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use wattgate_core::{Error, Result};

/// One rule in the router's blocklist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclEntry {
    /// Router-assigned rule ID, needed for removal.
    pub rule_id: String,
    /// Blocked device address.
    pub address: String,
}

/// Raw router operations against the named blocklist.
pub trait RouterRpc: Send + Sync {
    fn list(&self) -> impl Future<Output = Result<Vec<AclEntry>>> + Send;
    fn add(&self, address: &str) -> impl Future<Output = Result<()>> + Send;
    fn remove(&self, rule_id: &str) -> impl Future<Output = Result<()>> + Send;
}

/// RouterOS-style REST client (`/rest/ip/firewall/address-list`).
pub struct RestRouter {
    base_url: String,
    username: String,
    password: String,
    list_name: String,
    timeout: Duration,
}

impl RestRouter {
    pub fn new(
        host: &str,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        list_name: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: format!("http://{}:{}/rest/ip/firewall/address-list", host, port),
            username: username.into(),
            password: password.into(),
            list_name: list_name.into(),
            timeout,
        }
    }

    /// Fresh short-lived client per operation; the connection is not reused.
    fn session(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .build()
            .map_err(|e| Error::Router(e.to_string()))
    }
}

impl RouterRpc for RestRouter {
    async fn list(&self) -> Result<Vec<AclEntry>> {
        let response = self
            .session()?
            .get(&self.base_url)
            .query(&[("list", self.list_name.as_str())])
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| Error::Router(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Router(format!(
                "list failed with HTTP {}",
                response.status()
            )));
        }

        let rules: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| Error::Router(e.to_string()))?;

        Ok(rules
            .iter()
            .filter_map(|rule| {
                Some(AclEntry {
                    rule_id: rule.get(".id")?.as_str()?.to_string(),
                    address: rule.get("address")?.as_str()?.to_string(),
                })
            })
            .collect())
    }

    async fn add(&self, address: &str) -> Result<()> {
        let response = self
            .session()?
            .put(&self.base_url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&serde_json::json!({
                "list": self.list_name,
                "address": address,
            }))
            .send()
            .await
            .map_err(|e| Error::Router(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Router(format!(
                "add {} failed with HTTP {}",
                address,
                response.status()
            )));
        }
        Ok(())
    }

    async fn remove(&self, rule_id: &str) -> Result<()> {
        let response = self
            .session()?
            .delete(format!("{}/{}", self.base_url, rule_id))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| Error::Router(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Router(format!(
                "remove {} failed with HTTP {}",
                rule_id,
                response.status()
            )));
        }
        Ok(())
    }
}

/// In-memory router for tests and routerless deployments.
pub struct MemoryRouter {
    entries: Mutex<Vec<AclEntry>>,
    next_id: Mutex<u64>,
}

impl MemoryRouter {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
        }
    }

    /// Snapshot of the blocked addresses, for assertions.
    pub fn blocked_addresses(&self) -> Vec<String> {
        self.entries.lock().iter().map(|e| e.address.clone()).collect()
    }
}

impl Default for MemoryRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterRpc for MemoryRouter {
    async fn list(&self) -> Result<Vec<AclEntry>> {
        Ok(self.entries.lock().clone())
    }

    async fn add(&self, address: &str) -> Result<()> {
        let mut next_id = self.next_id.lock();
        let rule_id = format!("*{:X}", *next_id);
        *next_id += 1;
        self.entries.lock().push(AclEntry {
            rule_id,
            address: address.to_string(),
        });
        Ok(())
    }

    async fn remove(&self, rule_id: &str) -> Result<()> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.rule_id != rule_id);
        if entries.len() == before {
            return Err(Error::Router(format!("no such rule: {}", rule_id)));
        }
        Ok(())
    }
}

/// Idempotent blocklist operations layered over the raw router RPCs.
pub struct Blocklist<R: RouterRpc> {
    router: R,
}

impl<R: RouterRpc> Blocklist<R> {
    pub fn new(router: R) -> Self {
        Self { router }
    }

    /// Deny internet access to `address`. Already-blocked is a no-op.
    pub async fn block(&self, address: &str) -> Result<()> {
        let entries = self.router.list().await?;
        if entries.iter().any(|e| e.address == address) {
            debug!("{} already blocklisted", address);
            return Ok(());
        }
        self.router.add(address).await?;
        info!("Blocklisted {}", address);
        Ok(())
    }

    /// Restore internet access to `address`. Absent is a no-op.
    pub async fn unblock(&self, address: &str) -> Result<()> {
        let entries = self.router.list().await?;
        match entries.iter().find(|e| e.address == address) {
            Some(entry) => {
                self.router.remove(&entry.rule_id).await?;
                info!("Removed {} from blocklist", address);
                Ok(())
            }
            None => {
                debug!("{} not in blocklist", address);
                Ok(())
            }
        }
    }

    /// Remove every rule from the blocklist.
    pub async fn flush(&self) -> Result<()> {
        let entries = self.router.list().await?;
        let count = entries.len();
        for entry in entries {
            self.router.remove(&entry.rule_id).await?;
        }
        info!("Flushed {} blocklist entries", count);
        Ok(())
    }

    pub fn router(&self) -> &R {
        &self.router
    }
}
