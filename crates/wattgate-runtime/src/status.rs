//! Fleet status fan-out for the HTTP surface.
//!
//! Read-only and decoupled from the control loop: summaries are fetched
//! over a bounded worker pool and cached per device for a short TTL, so
//! repeated status queries don't hammer a management API that answers
//! slower than clients refresh.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::debug;

use wattgate_rpc::{MinerRpc, MinerSummary, MinerTarget};
use wattgate_store::{Device, SqliteRegistry};

/// TTL cache of miner summaries, keyed by `addr:port`.
pub struct SummaryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

struct CacheEntry {
    summary: MinerSummary,
    inserted_at: Instant,
}

impl SummaryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Get a fresh summary. Expired entries are removed on lookup.
    pub fn lookup(&self, key: &str) -> Option<MinerSummary> {
        let mut entries = self.entries.lock();
        let expired = entries.get(key).map(|e| e.inserted_at.elapsed() >= self.ttl);
        match expired {
            Some(false) => entries.get(key).map(|e| e.summary.clone()),
            Some(true) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: String, summary: MinerSummary) {
        self.entries.lock().insert(
            key,
            CacheEntry {
                summary,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One device's registry row plus its live (or cached) summary.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub id: i64,
    pub addr: String,
    pub port: u16,
    pub model: String,
    pub rated_watts: i64,
    pub phase: String,
    pub group_id: i64,
    pub online: bool,
    /// None when the device did not answer within the timeout.
    pub summary: Option<MinerSummary>,
}

/// Parallel status queries over a bounded worker pool.
pub struct StatusFetcher<M: MinerRpc + 'static> {
    registry: Arc<SqliteRegistry>,
    miner: Arc<M>,
    cache: Arc<SummaryCache>,
    pool: Arc<Semaphore>,
}

impl<M: MinerRpc + 'static> StatusFetcher<M> {
    pub fn new(
        registry: Arc<SqliteRegistry>,
        miner: M,
        workers: usize,
        summary_ttl: Duration,
    ) -> Self {
        Self {
            registry,
            miner: Arc::new(miner),
            cache: Arc::new(SummaryCache::new(summary_ttl)),
            pool: Arc::new(Semaphore::new(workers)),
        }
    }

    /// Query every device, at most `workers` concurrently. A cache hit
    /// skips the network call entirely; an unresponsive device yields
    /// `summary: None`.
    pub async fn fleet_status(&self) -> Vec<DeviceStatus> {
        let devices = self.registry.list_devices().unwrap_or_default();

        let mut handles = Vec::with_capacity(devices.len());
        for device in devices {
            let miner = self.miner.clone();
            let cache = self.cache.clone();
            let pool = self.pool.clone();
            handles.push(tokio::spawn(async move {
                let _permit = pool.acquire_owned().await.ok();
                let summary = query_summary(&*miner, &cache, &device).await;
                to_status(device, summary)
            }));
        }

        let mut statuses = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(status) = handle.await {
                statuses.push(status);
            }
        }
        statuses
    }
}

async fn query_summary<M: MinerRpc>(
    miner: &M,
    cache: &SummaryCache,
    device: &Device,
) -> Option<MinerSummary> {
    let key = format!("{}:{}", device.addr, device.port);
    if let Some(summary) = cache.lookup(&key) {
        debug!("Summary cache hit for {}", key);
        return Some(summary);
    }

    let target = MinerTarget {
        addr: device.addr.clone(),
        port: device.port,
        username: device.username.clone(),
        password: device.password.clone(),
    };
    match miner.summary(&target).await {
        Ok(summary) => {
            cache.insert(key, summary.clone());
            Some(summary)
        }
        Err(e) => {
            debug!("No summary from {}: {}", key, e);
            None
        }
    }
}

fn to_status(device: Device, summary: Option<MinerSummary>) -> DeviceStatus {
    DeviceStatus {
        id: device.id,
        addr: device.addr,
        port: device.port,
        model: device.model,
        rated_watts: device.rated_watts,
        phase: device.phase,
        group_id: device.group_id,
        online: device.online,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{device, test_registry};
    use wattgate_core::{Error, Result};

    fn summary() -> MinerSummary {
        MinerSummary {
            hashrate_mhs: Some(44000.0),
            temperature_c: None,
            uptime_secs: None,
        }
    }

    /// Counts how many RPCs actually went out.
    struct CountingMiner {
        calls: Mutex<usize>,
        fail: bool,
    }

    impl MinerRpc for CountingMiner {
        async fn summary(&self, _target: &MinerTarget) -> Result<MinerSummary> {
            *self.calls.lock() += 1;
            if self.fail {
                Err(Error::Miner("unreachable".into()))
            } else {
                Ok(summary())
            }
        }

        async fn restart(&self, _target: &MinerTarget) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn cache_expires_entries() {
        let cache = SummaryCache::new(Duration::from_millis(1));
        cache.insert("10.0.0.1:8080".into(), summary());
        assert!(cache.lookup("10.0.0.1:8080").is_some());

        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.lookup("10.0.0.1:8080").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn fleet_status_covers_every_device() {
        let (registry, _dir) = test_registry();
        registry.add_device(&device("10.0.0.1", 1000, 1)).unwrap();
        registry.add_device(&device("10.0.0.2", 1000, 1)).unwrap();

        let fetcher = StatusFetcher::new(
            registry,
            CountingMiner {
                calls: Mutex::new(0),
                fail: false,
            },
            36,
            Duration::from_secs(60),
        );

        let statuses = fetcher.fleet_status().await;
        assert_eq!(statuses.len(), 2);
        assert!(statuses.iter().all(|s| s.summary.is_some()));
    }

    #[tokio::test]
    async fn repeated_queries_hit_the_cache() {
        let (registry, _dir) = test_registry();
        registry.add_device(&device("10.0.0.1", 1000, 1)).unwrap();

        let fetcher = StatusFetcher::new(
            registry,
            CountingMiner {
                calls: Mutex::new(0),
                fail: false,
            },
            36,
            Duration::from_secs(60),
        );

        fetcher.fleet_status().await;
        fetcher.fleet_status().await;
        assert_eq!(*fetcher.miner.calls.lock(), 1);
    }

    #[tokio::test]
    async fn unresponsive_device_yields_none() {
        let (registry, _dir) = test_registry();
        registry.add_device(&device("10.0.0.1", 1000, 1)).unwrap();

        let fetcher = StatusFetcher::new(
            registry,
            CountingMiner {
                calls: Mutex::new(0),
                fail: true,
            },
            36,
            Duration::from_secs(60),
        );

        let statuses = fetcher.fleet_status().await;
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].summary.is_none());
        // Failures are not cached; the next query retries.
        fetcher.fleet_status().await;
        assert_eq!(*fetcher.miner.calls.lock(), 2);
    }
}
