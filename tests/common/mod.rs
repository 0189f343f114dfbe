// Shared test helpers: an in-memory container runtime and fixed host probes

#![allow(dead_code)]

use async_trait::async_trait;
use dockwatch::host::{CpuTimes, DiskProbe, HostProbe, MemoryInfo, StaticDisks};
use dockwatch::models::*;
use dockwatch::monitoring::{Monitor, MonitorSettings};
use dockwatch::runtime::{RuntimeClient, RuntimeError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn summary(id: &str, status: LifecycleStatus) -> ResourceSummary {
    ResourceSummary {
        id: id.into(),
        name: format!("{id}-name"),
        image: "alpine:3".into(),
        status,
    }
}

pub fn snapshot(cpu_percent: f64) -> StatsSnapshot {
    StatsSnapshot {
        cpu_percent,
        memory: MemoryUsage::new(50, 100),
        network: NetworkIo::default(),
        disk: DiskIo::default(),
        captured_at: now_millis(),
    }
}

pub fn log_line(timestamp: u64, message: &str) -> LogLine {
    LogLine {
        timestamp,
        stream: LogStream::Stdout,
        message: message.into(),
    }
}

#[derive(Default)]
struct FakeState {
    containers: Vec<ResourceSummary>,
    cpu: HashMap<ResourceId, f64>,
    failing: HashSet<ResourceId>,
    logs: HashMap<ResourceId, Vec<LogLine>>,
    listing_fails: bool,
}

/// Runtime whose containers, stats and logs are set by the test.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
    stats_calls: Mutex<HashMap<ResourceId, usize>>,
    stats_delay: Mutex<Option<Duration>>,
    list_calls: AtomicUsize,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, id: &str, status: LifecycleStatus, cpu_percent: f64) {
        let mut state = self.state.lock().unwrap();
        state.containers.retain(|c| c.id != id);
        state.containers.push(summary(id, status));
        state.cpu.insert(id.into(), cpu_percent);
    }

    pub fn set_status(&self, id: &str, status: LifecycleStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(c) = state.containers.iter_mut().find(|c| c.id == id) {
            c.status = status;
        }
    }

    pub fn remove(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        state.containers.retain(|c| c.id != id);
        state.cpu.remove(id);
    }

    /// Stats calls for `id` fail with an API error while the container stays listed.
    pub fn fail_stats(&self, id: &str) {
        self.state.lock().unwrap().failing.insert(id.into());
    }

    /// Every stats call waits this long before answering.
    pub fn delay_stats(&self, delay: Duration) {
        *self.stats_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_listing(&self, fails: bool) {
        self.state.lock().unwrap().listing_fails = fails;
    }

    pub fn push_logs(&self, id: &str, lines: impl IntoIterator<Item = LogLine>) {
        self.state
            .lock()
            .unwrap()
            .logs
            .entry(id.into())
            .or_default()
            .extend(lines);
    }

    pub fn stats_calls(&self, id: &str) -> usize {
        self.stats_calls
            .lock()
            .unwrap()
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuntimeClient for FakeRuntime {
    async fn list_resources(&self) -> Result<Vec<ResourceSummary>, RuntimeError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if state.listing_fails {
            return Err(RuntimeError::Api("daemon unreachable".into()));
        }
        Ok(state.containers.clone())
    }

    async fn resource_stats(&self, id: &str) -> Result<StatsSnapshot, RuntimeError> {
        *self
            .stats_calls
            .lock()
            .unwrap()
            .entry(id.into())
            .or_default() += 1;
        let delay = *self.stats_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock().unwrap();
        if state.failing.contains(id) {
            return Err(RuntimeError::Api(format!("stats for {id} failed")));
        }
        match state.cpu.get(id) {
            Some(cpu) => Ok(snapshot(*cpu)),
            None => Err(RuntimeError::NotFound(id.into())),
        }
    }

    async fn historical_logs(
        &self,
        id: &str,
        query: &LogQuery,
    ) -> Result<Vec<LogLine>, RuntimeError> {
        let state = self.state.lock().unwrap();
        if !state.containers.iter().any(|c| c.id == id) {
            return Err(RuntimeError::NotFound(id.into()));
        }
        let lines = state.logs.get(id).cloned().unwrap_or_default();
        let mut lines: Vec<LogLine> = match query.since {
            Some(secs) => lines
                .into_iter()
                .filter(|l| l.timestamp >= secs * 1000)
                .collect(),
            None => lines,
        };
        if let Some(tail) = query.tail {
            let skip = lines.len().saturating_sub(tail);
            lines.drain(..skip);
        }
        Ok(lines)
    }
}

/// Two cores at 25% busy, 8000 of 10000 bytes of memory in use.
pub struct FakeHost;

#[async_trait]
impl HostProbe for FakeHost {
    async fn cpu_times(&self) -> anyhow::Result<Vec<CpuTimes>> {
        Ok(vec![
            CpuTimes {
                idle: 750,
                total: 1000,
            };
            2
        ])
    }

    async fn memory(&self) -> anyhow::Result<MemoryInfo> {
        Ok(MemoryInfo {
            total: 10_000,
            free: 2_000,
        })
    }
}

pub fn fake_disks() -> Arc<dyn DiskProbe> {
    Arc::new(StaticDisks(DiskUsage::from_total_and_free(1_000, 250)))
}

pub fn test_settings() -> MonitorSettings {
    MonitorSettings {
        cache_ttl: Duration::from_secs(10),
        system_interval: Duration::from_secs(1),
        status_interval: Duration::from_secs(1),
        metrics_interval: Duration::from_secs(1),
        stream_interval: Duration::from_secs(1),
        log_interval: Duration::from_secs(1),
        log_tail: 3,
        fetch_timeout: Duration::from_secs(5),
        stream_buffer: 64,
    }
}

pub fn monitor_with(runtime: Arc<FakeRuntime>) -> Monitor {
    Monitor::new(runtime, Arc::new(FakeHost), fake_disks(), test_settings())
}
