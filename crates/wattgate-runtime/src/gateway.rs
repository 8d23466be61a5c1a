//! Actuation gateway — applies admit/evict decisions to a group's devices.
//!
//! Ordering within a member is fixed: status update, then the restart
//! attempt (evict only), then the network ACL change, so a device sees its
//! own shutdown trigger before connectivity is cut. Per-member RPC failures
//! are logged and never stop the pass, which means recorded state can
//! diverge from physical state until the device is actuated again.

use std::sync::Arc;

use tracing::{error, info, warn};

use wattgate_core::Result;
use wattgate_rpc::{Blocklist, MinerRpc, MinerTarget, RouterRpc};
use wattgate_store::{Device, SqliteRegistry};

pub struct ActuationGateway<R: RouterRpc, M: MinerRpc> {
    registry: Arc<SqliteRegistry>,
    blocklist: Blocklist<R>,
    miner: M,
}

impl<R: RouterRpc, M: MinerRpc> ActuationGateway<R, M> {
    pub fn new(registry: Arc<SqliteRegistry>, router: R, miner: M) -> Self {
        Self {
            registry,
            blocklist: Blocklist::new(router),
            miner,
        }
    }

    /// Bring every member of `group_id` online and restore its network
    /// access. All-or-nothing at the group level: every member is walked in
    /// one pass.
    pub async fn admit(&self, group_id: i64) -> Result<()> {
        let members = self.registry.group_members(group_id)?;
        info!("Admitting group {} ({} devices)", group_id, members.len());

        for member in &members {
            info!("Starting device {}:{}", member.addr, member.port);
            if let Err(e) = self.registry.set_online(&member.addr, true) {
                error!("Failed to mark {} online: {}", member.addr, e);
            }
            if let Err(e) = self.blocklist.unblock(&member.addr).await {
                warn!("Failed to unblock {}: {}", member.addr, e);
            }
        }
        Ok(())
    }

    /// Take every member of `group_id` offline: mark it, ask it to restart
    /// (best-effort), then cut its network access.
    pub async fn evict(&self, group_id: i64) -> Result<()> {
        let members = self.registry.group_members(group_id)?;
        info!("Evicting group {} ({} devices)", group_id, members.len());

        for member in &members {
            info!("Shutting down device {}:{}", member.addr, member.port);
            if let Err(e) = self.registry.set_online(&member.addr, false) {
                error!("Failed to mark {} offline: {}", member.addr, e);
            }
            if let Err(e) = self.miner.restart(&target_of(member)).await {
                error!("Restart of {} failed: {}", member.addr, e);
            }
            if let Err(e) = self.blocklist.block(&member.addr).await {
                warn!("Failed to block {}: {}", member.addr, e);
            }
        }
        Ok(())
    }

    /// Force the fleet into the known-safe state: flush the blocklist, then
    /// mark every device offline and block it. Runs once at process start so
    /// a crash or redeploy never leaves a stale online flag trusted.
    pub async fn bootstrap(&self) -> Result<()> {
        info!("Bootstrapping: forcing all devices offline and blocked");

        if let Err(e) = self.blocklist.flush().await {
            warn!("Blocklist flush failed: {}", e);
        }

        let count = self.registry.set_all_offline()?;
        info!("Marked {} devices offline", count);

        for device in self.registry.list_devices()? {
            if let Err(e) = self.blocklist.block(&device.addr).await {
                warn!("Failed to block {}: {}", device.addr, e);
            }
        }
        Ok(())
    }
}

fn target_of(device: &Device) -> MinerTarget {
    MinerTarget {
        addr: device.addr.clone(),
        port: device.port,
        username: device.username.clone(),
        password: device.password.clone(),
    }
}
