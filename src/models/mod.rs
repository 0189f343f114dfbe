// Domain models

mod container;
mod event;
mod system;
mod task;

pub use container::{
    DiskIo, LifecycleStatus, LogLine, LogQuery, LogStream, MemoryUsage, NetworkIo, ResourceId,
    ResourceSummary, StatsSnapshot,
};
pub use event::{EventKind, EventPayload, MonitorEvent, StatusTransition, TaskErrorInfo};
pub use system::{ContainerCounts, CpuUsage, DiskUsage, MemoryTotals, SystemSnapshot};
pub use task::PollKind;

/// Milliseconds since the Unix epoch (0 if the clock is set before it).
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "get_timestamp", "system time error");
            0
        })
}

pub(crate) fn percent_of(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        (part as f64 / whole as f64) * 100.0
    } else {
        0.0
    }
}
