//! Monitoring facade.
//!
//! [`Monitor`] combines on-demand queries (served from a TTL cache where possible) with
//! continuously running poll tasks that publish to the [`EventHub`]. It is cheap to clone and
//! is the only entry point the HTTP and WebSocket layers use.

mod cache;
mod poll;
mod status;
mod stream;
mod system;
mod tasks;

pub use cache::MetricsCache;
pub use poll::{PollKey, PollRegistry, TickOutcome};
pub use status::{Reconciliation, StatusTracker};
pub use stream::EventStream;

use crate::error::MonitorError;
use crate::events::{ChannelSink, EventHub, EventSink, Topic};
use crate::host::{DiskProbe, HostProbe};
use crate::models::{
    LogLine, LogQuery, PollKind, ResourceId, ResourceSummary, StatsSnapshot, SystemSnapshot,
    now_millis,
};
use crate::runtime::{RuntimeClient, with_timeout};
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use stream::StreamLease;
use tracing::{info, warn};

/// Timing and sizing of the monitor.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub cache_ttl: Duration,
    pub system_interval: Duration,
    pub status_interval: Duration,
    /// All-container metrics cadence while collection is on.
    pub metrics_interval: Duration,
    /// Per-container stats cadence for live streams.
    pub stream_interval: Duration,
    pub log_interval: Duration,
    /// Lines sent when a log stream opens.
    pub log_tail: usize,
    pub fetch_timeout: Duration,
    /// Per-stream channel capacity; a full buffer drops events for that stream only.
    pub stream_buffer: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            cache_ttl: MetricsCache::DEFAULT_TTL,
            system_interval: Duration::from_secs(5),
            status_interval: Duration::from_secs(5),
            metrics_interval: Duration::from_secs(10),
            stream_interval: Duration::from_secs(2),
            log_interval: Duration::from_secs(2),
            log_tail: 100,
            fetch_timeout: Duration::from_secs(15),
            stream_buffer: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStats {
    pub active_tasks: Vec<String>,
    pub subscribers: usize,
    pub cached_snapshots: usize,
    pub tracked_resources: usize,
    pub delivery_failures: u64,
}

pub(crate) struct Inner {
    runtime: Arc<dyn RuntimeClient>,
    host: Arc<dyn HostProbe>,
    disks: Arc<dyn DiskProbe>,
    cache: MetricsCache,
    /// Held while refilling one container's cache entry, so concurrent misses fetch once.
    fills: DashMap<ResourceId, Arc<tokio::sync::Mutex<()>>>,
    tracker: StatusTracker,
    hub: Arc<EventHub>,
    registry: PollRegistry,
    /// Open streams per per-container task.
    watchers: tokio::sync::Mutex<HashMap<PollKey, Watchers>>,
    next_epoch: AtomicU64,
    settings: MonitorSettings,
}

/// Streams holding one run of a per-container task. A task that stopped itself and was
/// started again gets a new epoch, so leases on the old run no longer count.
struct Watchers {
    epoch: u64,
    count: usize,
}

type MetricsRound = (
    HashMap<ResourceId, StatsSnapshot>,
    Vec<(ResourceId, MonitorError)>,
);

const COLLECTION_TASKS: [PollKind; 3] = [PollKind::System, PollKind::Status, PollKind::Metrics];

#[derive(Clone)]
pub struct Monitor {
    inner: Arc<Inner>,
}

impl Monitor {
    pub fn new(
        runtime: Arc<dyn RuntimeClient>,
        host: Arc<dyn HostProbe>,
        disks: Arc<dyn DiskProbe>,
        settings: MonitorSettings,
    ) -> Self {
        Self::with_hub(runtime, host, disks, Arc::new(EventHub::new()), settings)
    }

    pub fn with_hub(
        runtime: Arc<dyn RuntimeClient>,
        host: Arc<dyn HostProbe>,
        disks: Arc<dyn DiskProbe>,
        hub: Arc<EventHub>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                runtime,
                host,
                disks,
                cache: MetricsCache::new(settings.cache_ttl),
                fills: DashMap::new(),
                tracker: StatusTracker::new(),
                hub,
                registry: PollRegistry::new(),
                watchers: tokio::sync::Mutex::new(HashMap::new()),
                next_epoch: AtomicU64::new(1),
                settings,
            }),
        }
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.inner.hub
    }

    pub fn cache(&self) -> &MetricsCache {
        &self.inner.cache
    }

    pub fn tracker(&self) -> &StatusTracker {
        &self.inner.tracker
    }

    /// Cached snapshot if fresh, otherwise a synchronous fetch that refreshes the cache.
    pub async fn resource_metrics(&self, id: &str) -> Result<StatsSnapshot, MonitorError> {
        self.inner.resource_metrics(id).await
    }

    /// Always computed fresh.
    pub async fn system_metrics(&self) -> Result<SystemSnapshot, MonitorError> {
        self.inner.system_metrics().await
    }

    /// Metrics of every running container. Individual failures are logged and omitted.
    pub async fn all_resource_metrics(
        &self,
    ) -> Result<HashMap<ResourceId, StatsSnapshot>, MonitorError> {
        self.inner.all_resource_metrics().await
    }

    pub async fn list_resources(&self) -> Result<Vec<ResourceSummary>, MonitorError> {
        Ok(self.inner.list().await?)
    }

    /// Historical logs; without an explicit window the configured tail is returned.
    pub async fn resource_logs(
        &self,
        id: &str,
        query: LogQuery,
    ) -> Result<Vec<LogLine>, MonitorError> {
        let query = match query {
            LogQuery {
                tail: None,
                since: None,
            } => LogQuery {
                tail: Some(self.inner.settings.log_tail),
                since: None,
            },
            q => q,
        };
        let fetched = with_timeout(
            self.inner.settings.fetch_timeout,
            self.inner.runtime.historical_logs(id, &query),
        )
        .await;
        fetched.map_err(|source| MonitorError::ResourceUnavailable {
            id: id.to_string(),
            source,
        })
    }

    /// Starts the system, status and all-container metrics tasks. Returns false if all three
    /// were already running.
    pub fn start_collection(&self) -> bool {
        let s = &self.inner.settings;
        let mut started = false;
        for kind in COLLECTION_TASKS {
            let every = match kind {
                PollKind::System => s.system_interval,
                PollKind::Status => s.status_interval,
                _ => s.metrics_interval,
            };
            started |= spawn_poll(&self.inner, PollKey::system_wide(kind), every);
        }
        if started {
            info!("collection started");
        }
        started
    }

    /// Returns false if nothing was running.
    pub async fn stop_collection(&self) -> bool {
        let mut stopped = false;
        for kind in COLLECTION_TASKS {
            stopped |= self
                .inner
                .registry
                .stop(&PollKey::system_wide(kind))
                .await;
        }
        if stopped {
            info!("collection stopped");
        }
        stopped
    }

    pub fn is_collecting(&self) -> bool {
        COLLECTION_TASKS
            .iter()
            .any(|k| self.inner.registry.is_running(&PollKey::system_wide(*k)))
    }

    /// Live stats for one running container. Fails before starting anything if the container
    /// does not exist or is not running.
    pub async fn stream_resource_stats(&self, id: &str) -> Result<EventStream, MonitorError> {
        self.inner.ensure_running(id).await?;
        Ok(self
            .open_stream(
                PollKey::for_resource(PollKind::Stats, id),
                Topic::Container(id.to_string()),
            )
            .await)
    }

    /// Live log tail for one running container: the configured tail first, then new lines.
    pub async fn stream_resource_logs(&self, id: &str) -> Result<EventStream, MonitorError> {
        self.inner.ensure_running(id).await?;
        Ok(self
            .open_stream(
                PollKey::for_resource(PollKind::Logs, id),
                Topic::ContainerLogs(id.to_string()),
            )
            .await)
    }

    /// Plain topic subscription; starts no task.
    pub fn subscribe(&self, topics: impl IntoIterator<Item = Topic>) -> EventStream {
        let (sink, rx) = ChannelSink::channel(self.inner.settings.stream_buffer);
        let sink: Arc<dyn EventSink> = Arc::new(sink);
        let subscriber = self.inner.hub.attach(&sink);
        self.inner.hub.subscribe(subscriber, topics);
        EventStream::new(rx, sink, subscriber, self.inner.hub.clone(), None)
    }

    pub fn active_tasks(&self) -> Vec<PollKey> {
        self.inner.registry.active_keys()
    }

    pub fn stats(&self) -> MonitorStats {
        let mut active_tasks: Vec<String> = self
            .active_tasks()
            .iter()
            .map(ToString::to_string)
            .collect();
        active_tasks.sort();
        MonitorStats {
            active_tasks,
            subscribers: self.inner.hub.subscriber_count(),
            cached_snapshots: self.inner.cache.len(),
            tracked_resources: self.inner.tracker.len(),
            delivery_failures: self.inner.hub.delivery_failures(),
        }
    }

    /// Stops every poll task, collection and streams alike.
    pub async fn shutdown(&self) {
        self.inner.watchers.lock().await.clear();
        let n = self.inner.registry.stop_all().await;
        info!(tasks = n, "monitor shut down");
    }

    async fn open_stream(&self, key: PollKey, topic: Topic) -> EventStream {
        let s = &self.inner.settings;
        let (sink, rx) = ChannelSink::channel(s.stream_buffer);
        let sink: Arc<dyn EventSink> = Arc::new(sink);
        // Subscribe before the task starts so its first tick is not missed.
        let subscriber = self.inner.hub.attach(&sink);
        self.inner.hub.subscribe(subscriber, [topic]);

        let every = match key.kind {
            PollKind::Logs => s.log_interval,
            _ => s.stream_interval,
        };
        let epoch = {
            let mut watchers = self.inner.watchers.lock().await;
            let started = spawn_poll(&self.inner, key.clone(), every);
            let entry = watchers.entry(key.clone()).or_insert(Watchers { epoch: 0, count: 0 });
            if started {
                entry.epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);
                entry.count = 0;
            }
            entry.count += 1;
            entry.epoch
        };

        EventStream::new(
            rx,
            sink,
            subscriber,
            self.inner.hub.clone(),
            Some(StreamLease {
                inner: Arc::downgrade(&self.inner),
                key,
                epoch,
            }),
        )
    }
}

/// Registers a poll task whose ticks hold only a weak reference to the monitor; once the
/// monitor is dropped the task terminates on its next tick.
fn spawn_poll(inner: &Arc<Inner>, key: PollKey, every: Duration) -> bool {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let tick_key = key.clone();
    let log_cursor = Arc::new(tasks::LogCursor::default());
    inner.registry.start(key, every, move || {
        let weak = weak.clone();
        let key = tick_key.clone();
        let log_cursor = log_cursor.clone();
        async move {
            match weak.upgrade() {
                Some(inner) => tasks::run_tick(&inner, &key, &log_cursor).await,
                None => TickOutcome::Terminate,
            }
        }
    })
}

impl Inner {
    async fn list(&self) -> Result<Vec<ResourceSummary>, crate::runtime::RuntimeError> {
        with_timeout(self.settings.fetch_timeout, self.runtime.list_resources()).await
    }

    async fn resource_metrics(&self, id: &str) -> Result<StatsSnapshot, MonitorError> {
        if let Some(snapshot) = self.cache.get(id) {
            return Ok(snapshot);
        }
        let fill = self.fills.entry(id.to_string()).or_default().clone();
        let _filling = fill.lock().await;
        // Whoever held the lock before us may have refilled the entry.
        if let Some(snapshot) = self.cache.get(id) {
            return Ok(snapshot);
        }
        let fetched = with_timeout(self.settings.fetch_timeout, self.runtime.resource_stats(id)).await;
        let result = match fetched {
            Ok(snapshot) => {
                self.cache.put(id, snapshot.clone());
                Ok(snapshot)
            }
            Err(source) => Err(MonitorError::ResourceUnavailable {
                id: id.to_string(),
                source,
            }),
        };
        self.fills.remove_if(id, |_, f| Arc::ptr_eq(f, &fill));
        result
    }

    async fn system_metrics(&self) -> Result<SystemSnapshot, MonitorError> {
        let (cores, memory, disk, listing) = tokio::join!(
            self.host.cpu_times(),
            self.host.memory(),
            self.disks.usage(),
            self.list(),
        );
        let host_err = |e: anyhow::Error| MonitorError::Host(e.to_string());
        let cores = cores.map_err(host_err)?;
        let memory = memory.map_err(host_err)?;
        let disk = disk.map_err(host_err)?;
        let listing = listing?;
        Ok(system::build_snapshot(
            &cores,
            memory,
            disk,
            &listing,
            now_millis(),
        ))
    }

    async fn all_resource_metrics(
        &self,
    ) -> Result<HashMap<ResourceId, StatsSnapshot>, MonitorError> {
        let (out, failed) = self.collect_resource_metrics().await?;
        for (id, e) in failed {
            warn!(resource_id = %id, error = %e, "container metrics failed; omitted from aggregate");
        }
        Ok(out)
    }

    /// Metrics of every running container, with the containers whose fetch failed.
    async fn collect_resource_metrics(&self) -> Result<MetricsRound, MonitorError> {
        let running: Vec<ResourceId> = self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.status.is_running())
            .map(|r| r.id)
            .collect();

        let results = join_all(running.into_iter().map(|id| async move {
            let result = self.resource_metrics(&id).await;
            (id, result)
        }))
        .await;

        let mut out = HashMap::with_capacity(results.len());
        let mut failed = Vec::new();
        for (id, result) in results {
            match result {
                Ok(snapshot) => {
                    out.insert(id, snapshot);
                }
                Err(e) => failed.push((id, e)),
            }
        }
        Ok((out, failed))
    }

    async fn ensure_running(&self, id: &str) -> Result<ResourceSummary, MonitorError> {
        let summary = self
            .list()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| MonitorError::ResourceNotFound(id.to_string()))?;
        if !summary.status.is_running() {
            return Err(MonitorError::ResourceNotRunning {
                id: id.to_string(),
                status: summary.status,
            });
        }
        Ok(summary)
    }

    /// Drops one stream's hold on `key`; the last one stops the task.
    async fn release_watcher(&self, key: &PollKey, epoch: u64) {
        let mut watchers = self.watchers.lock().await;
        let last = match watchers.get_mut(key) {
            Some(w) if w.epoch != epoch => false,
            Some(w) if w.count > 1 => {
                w.count -= 1;
                false
            }
            Some(_) => {
                watchers.remove(key);
                true
            }
            None => false,
        };
        if last {
            self.registry.stop(key).await;
        }
    }
}
