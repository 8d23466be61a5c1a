//! The power-allocation control loop.
//!
//! One lock-step cycle: read active power, fetch the budget, rebuild the
//! derived groups, decide, actuate, publish telemetry, sleep. At most one
//! group changes state per cycle, which bounds the rate of physical
//! actuation no matter how large the surplus or deficit is. No collaborator
//! failure terminates the loop; each degrades to its fail-safe default so
//! the cycle always completes.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{error, info, warn};

use crate::gateway::ActuationGateway;
use wattgate_feed::PowerFeed;
use wattgate_rpc::{MinerRpc, RouterRpc};
use wattgate_store::{PowerGroup, SqliteRegistry};
use wattgate_telemetry::{CycleReport, TelemetrySink};

/// Outcome of the per-cycle decision rule.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Bring this offline group online; it fits the headroom entirely.
    Admit(PowerGroup),
    /// Take this online group offline to close the deficit.
    Evict(PowerGroup),
    Hold(HoldReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldReason {
    /// Headroom exists but no group is offline.
    NoOfflineGroups,
    /// The randomly drawn candidate does not fit the headroom. No second
    /// candidate is tried; admission is rate-limited to one attempt per
    /// cycle.
    CandidateTooLarge { group_id: i64, total_watts: i64 },
    /// Deficit exists but nothing is online to shed.
    NoOnlineGroups,
}

/// What one cycle saw and did, for logging and tests.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub available_watts: i64,
    pub active_watts: i64,
    pub decision: Decision,
}

/// Per-cycle decision rule.
///
/// Surplus: draw one offline group uniformly at random and admit it only if
/// `available - active > total_watts` (all-or-nothing, never partial).
/// Deficit: draw one online group uniformly at random and evict it entirely.
/// There is no hysteresis around the threshold; a budget hovering near a
/// group's total can admit and evict it on alternating cycles.
pub fn decide(
    available_watts: i64,
    active_watts: i64,
    offline_groups: &[PowerGroup],
    online_groups: &[PowerGroup],
    rng: &mut StdRng,
) -> Decision {
    if available_watts >= active_watts {
        if offline_groups.is_empty() {
            return Decision::Hold(HoldReason::NoOfflineGroups);
        }
        let candidate = &offline_groups[rng.random_range(0..offline_groups.len())];
        if available_watts - active_watts > candidate.total_watts {
            Decision::Admit(candidate.clone())
        } else {
            Decision::Hold(HoldReason::CandidateTooLarge {
                group_id: candidate.id,
                total_watts: candidate.total_watts,
            })
        }
    } else {
        if online_groups.is_empty() {
            return Decision::Hold(HoldReason::NoOnlineGroups);
        }
        let victim = &online_groups[rng.random_range(0..online_groups.len())];
        Decision::Evict(victim.clone())
    }
}

/// The scheduler driving the admit/evict cycle.
pub struct ControlLoop<F, R, M, S>
where
    F: PowerFeed,
    R: RouterRpc,
    M: MinerRpc,
    S: TelemetrySink,
{
    registry: Arc<SqliteRegistry>,
    feed: F,
    gateway: ActuationGateway<R, M>,
    sink: S,
    rng: StdRng,
    poll_interval: Duration,
}

impl<F, R, M, S> ControlLoop<F, R, M, S>
where
    F: PowerFeed,
    R: RouterRpc,
    M: MinerRpc,
    S: TelemetrySink,
{
    pub fn new(
        registry: Arc<SqliteRegistry>,
        feed: F,
        gateway: ActuationGateway<R, M>,
        sink: S,
        poll_interval: Duration,
    ) -> Self {
        Self {
            registry,
            feed,
            gateway,
            sink,
            rng: StdRng::from_os_rng(),
            poll_interval,
        }
    }

    /// Fix the group-selection RNG, for deterministic tests.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Run the bootstrap safe-state pass, then cycle forever.
    pub async fn run(mut self) {
        if let Err(e) = self.gateway.bootstrap().await {
            error!("Bootstrap failed: {}", e);
        }

        loop {
            self.run_cycle().await;
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Execute one complete cycle. Never fails: collaborator errors degrade
    /// to fail-safe defaults (0 W budget, empty group lists) and the cycle
    /// still publishes telemetry and returns.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let active_watts = self.registry.active_watts().unwrap_or_else(|e| {
            error!("Failed to read active power: {}", e);
            0
        });
        let available_watts = self.feed.fetch().await as i64;

        if let Err(e) = self.registry.rebuild_groups() {
            error!("Power group rebuild failed: {}", e);
        }
        let offline_groups = self.registry.list_groups_by_online(false).unwrap_or_else(|e| {
            error!("Failed to list offline groups: {}", e);
            Vec::new()
        });
        let online_groups = self.registry.list_groups_by_online(true).unwrap_or_else(|e| {
            error!("Failed to list online groups: {}", e);
            Vec::new()
        });

        info!(
            "Available power: {} W, active power: {} W",
            available_watts, active_watts
        );

        let decision = decide(
            available_watts,
            active_watts,
            &offline_groups,
            &online_groups,
            &mut self.rng,
        );

        match &decision {
            Decision::Admit(group) => {
                info!(
                    "Admitting group {} ({} W) into {} W headroom",
                    group.id,
                    group.total_watts,
                    available_watts - active_watts
                );
                if let Err(e) = self.gateway.admit(group.id).await {
                    error!("Admission of group {} failed: {}", group.id, e);
                }
            }
            Decision::Evict(group) => {
                warn!(
                    "Evicting group {} ({} W) to close a {} W deficit",
                    group.id,
                    group.total_watts,
                    active_watts - available_watts
                );
                if let Err(e) = self.gateway.evict(group.id).await {
                    error!("Eviction of group {} failed: {}", group.id, e);
                }
            }
            Decision::Hold(reason) => {
                info!("Holding: {:?}", reason);
            }
        }

        self.publish_telemetry(available_watts, active_watts).await;

        CycleOutcome {
            available_watts,
            active_watts,
            decision,
        }
    }

    /// Report the power figures the decision was taken on, plus the online
    /// flags as they stand after actuation.
    async fn publish_telemetry(&self, available_watts: i64, active_watts: i64) {
        let devices = self.registry.list_devices().unwrap_or_default();
        let report = CycleReport {
            available_watts,
            active_watts,
            device_online: devices.iter().map(|d| (d.addr.clone(), d.online)).collect(),
        };
        self.sink.publish(&report).await;
    }
}
