// Host-wide snapshot composition

use crate::host::{CpuTimes, MemoryInfo, cpu_usage_percent};
use crate::models::{
    ContainerCounts, CpuUsage, DiskUsage, MemoryTotals, ResourceSummary, SystemSnapshot,
};

pub(super) fn count_containers(listing: &[ResourceSummary]) -> ContainerCounts {
    let total = listing.len().min(u32::MAX as usize) as u32;
    let running = listing.iter().filter(|r| r.status.is_running()).count() as u32;
    ContainerCounts {
        total,
        running,
        stopped: total - running,
    }
}

pub(super) fn build_snapshot(
    cores: &[CpuTimes],
    memory: MemoryInfo,
    disk: DiskUsage,
    listing: &[ResourceSummary],
    captured_at: u64,
) -> SystemSnapshot {
    SystemSnapshot {
        cpu: CpuUsage {
            usage_percent: cpu_usage_percent(cores),
            core_count: cores.len() as u32,
        },
        memory: MemoryTotals::from_total_and_free(memory.total, memory.free),
        disk,
        containers: count_containers(listing),
        captured_at,
    }
}
