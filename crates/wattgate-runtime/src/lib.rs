//! Wattgate Runtime — the power-allocation control loop and its actuation
//! machinery, plus the read-path fleet status fan-out used by the HTTP
//! surface.

pub mod control;
pub mod gateway;
pub mod status;

pub use control::{decide, ControlLoop, CycleOutcome, Decision, HoldReason};
pub use gateway::ActuationGateway;
pub use status::{DeviceStatus, StatusFetcher, SummaryCache};

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use wattgate_core::{Error, Result};
    use wattgate_feed::PowerFeed;
    use wattgate_rpc::{MinerRpc, MinerSummary, MinerTarget};
    use wattgate_store::{NewDevice, SqliteRegistry};

    pub fn test_registry() -> (Arc<SqliteRegistry>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let registry = SqliteRegistry::open(dir.path().join("test.db")).unwrap();
        (Arc::new(registry), dir)
    }

    pub fn device(addr: &str, watts: i64, group_id: i64) -> NewDevice {
        NewDevice {
            addr: addr.into(),
            port: 8080,
            username: "admin".into(),
            password: "admin".into(),
            model: "DM-T1".into(),
            rated_watts: watts,
            phase: "L1".into(),
            group_id,
        }
    }

    /// Feed that always reports a fixed budget.
    pub struct StaticFeed(pub u64);

    impl PowerFeed for StaticFeed {
        async fn fetch(&self) -> u64 {
            self.0
        }
    }

    /// Miner RPC double that records restarts and can be made to fail.
    pub struct RecordingMiner {
        pub restarts: Mutex<Vec<String>>,
        pub fail_restarts: bool,
    }

    impl RecordingMiner {
        pub fn new() -> Self {
            Self {
                restarts: Mutex::new(Vec::new()),
                fail_restarts: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                restarts: Mutex::new(Vec::new()),
                fail_restarts: true,
            }
        }
    }

    impl MinerRpc for RecordingMiner {
        async fn summary(&self, _target: &MinerTarget) -> Result<MinerSummary> {
            Ok(MinerSummary {
                hashrate_mhs: Some(44000.0),
                temperature_c: Some(70.0),
                uptime_secs: Some(60),
            })
        }

        async fn restart(&self, target: &MinerTarget) -> Result<()> {
            self.restarts.lock().push(target.addr.clone());
            if self.fail_restarts {
                Err(Error::Miner(format!("{} refused restart", target.addr)))
            } else {
                Ok(())
            }
        }
    }
}
