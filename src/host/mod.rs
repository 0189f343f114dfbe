// Host CPU, memory and disk introspection via sysinfo and /proc

mod linux;

use crate::models::DiskUsage;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use sysinfo::{Disks, System};
use tracing::instrument;

/// Cumulative tick counters of one core since boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub total: u64,
    pub free: u64,
}

#[async_trait]
pub trait HostProbe: Send + Sync {
    /// One entry per logical core.
    async fn cpu_times(&self) -> anyhow::Result<Vec<CpuTimes>>;
    async fn memory(&self) -> anyhow::Result<MemoryInfo>;
}

/// Source of the `disk` section of system snapshots.
#[async_trait]
pub trait DiskProbe: Send + Sync {
    async fn usage(&self) -> anyhow::Result<DiskUsage>;
}

/// `100 - idle/total * 100` over the summed counters of all cores.
///
/// Counters are cumulative since boot, so this is the average load since boot rather than
/// the load between two samples.
pub fn cpu_usage_percent(cores: &[CpuTimes]) -> f64 {
    let (idle, total) = cores
        .iter()
        .fold((0u64, 0u64), |(i, t), c| (i + c.idle, t + c.total));
    if total == 0 {
        return 0.0;
    }
    (100.0 - (idle as f64 / total as f64) * 100.0).clamp(0.0, 100.0)
}

pub struct SysinfoHost {
    sys: Arc<Mutex<System>>,
}

impl Default for SysinfoHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoHost {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();
        Self {
            sys: Arc::new(Mutex::new(sys)),
        }
    }
}

#[async_trait]
impl HostProbe for SysinfoHost {
    #[instrument(skip(self), fields(probe = "sysinfo", operation = "cpu_times"))]
    async fn cpu_times(&self) -> anyhow::Result<Vec<CpuTimes>> {
        let sys = self.sys.clone();
        tokio::task::spawn_blocking(move || {
            if let Some(cores) = linux::read_cpu_times() {
                return Ok(cores);
            }
            // No tick counters outside Linux: express sysinfo's usage as a 100-tick window.
            let mut sys = sys
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;
            sys.refresh_cpu_all();
            Ok(sys
                .cpus()
                .iter()
                .map(|c| CpuTimes {
                    idle: (100.0 - c.cpu_usage() as f64).clamp(0.0, 100.0) as u64,
                    total: 100,
                })
                .collect())
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    #[instrument(skip(self), fields(probe = "sysinfo", operation = "memory"))]
    async fn memory(&self) -> anyhow::Result<MemoryInfo> {
        let sys = self.sys.clone();
        tokio::task::spawn_blocking(move || {
            let mut sys = sys
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;
            sys.refresh_memory();
            Ok(MemoryInfo {
                total: sys.total_memory(),
                free: sys.free_memory(),
            })
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }
}

/// Sums mounted filesystems, counting each backing device once.
pub struct SysinfoDisks {
    disks: Arc<Mutex<Disks>>,
}

impl Default for SysinfoDisks {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoDisks {
    pub fn new() -> Self {
        Self {
            disks: Arc::new(Mutex::new(Disks::new_with_refreshed_list())),
        }
    }
}

#[async_trait]
impl DiskProbe for SysinfoDisks {
    #[instrument(skip(self), fields(probe = "sysinfo", operation = "disk_usage"))]
    async fn usage(&self) -> anyhow::Result<DiskUsage> {
        let disks = self.disks.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = disks
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo disks lock poisoned: {}", e))?;
            guard.refresh(true);
            let mut seen = HashSet::new();
            let (total, free) = guard
                .list()
                .iter()
                .filter(|d| seen.insert(d.name().to_os_string()))
                .fold((0u64, 0u64), |(t, f), d| {
                    (t + d.total_space(), f + d.available_space())
                });
            Ok(DiskUsage::from_total_and_free(total, free))
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }
}

/// Fixed disk figures, for hosts where filesystem introspection is unavailable.
#[derive(Debug, Clone, Copy)]
pub struct StaticDisks(pub DiskUsage);

#[async_trait]
impl DiskProbe for StaticDisks {
    async fn usage(&self) -> anyhow::Result<DiskUsage> {
        Ok(self.0)
    }
}
