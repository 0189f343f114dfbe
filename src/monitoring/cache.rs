// Time-bounded per-container stats cache

use crate::models::{ResourceId, StatsSnapshot};
use dashmap::DashMap;
use tokio::time::{Duration, Instant};

struct CacheEntry {
    snapshot: StatsSnapshot,
    inserted_at: Instant,
}

/// Entries expire a fixed TTL after insertion; reads never extend it.
pub struct MetricsCache {
    entries: DashMap<ResourceId, CacheEntry>,
    ttl: Duration,
}

impl MetricsCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// The cached snapshot, or None if absent or older than the TTL.
    pub fn get(&self, id: &str) -> Option<StatsSnapshot> {
        self.entries
            .get(id)
            .filter(|e| e.inserted_at.elapsed() < self.ttl)
            .map(|e| e.snapshot.clone())
    }

    /// Overwrites any entry for `id` and restarts its TTL.
    pub fn put(&self, id: &str, snapshot: StatsSnapshot) {
        self.entries.insert(
            id.to_string(),
            CacheEntry {
                snapshot,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Drops expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| e.inserted_at.elapsed() < self.ttl);
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MetricsCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}
