// Reduce a raw Docker stats response to a StatsSnapshot.

use crate::models::{DiskIo, MemoryUsage, NetworkIo, StatsSnapshot};
use bollard::models::{ContainerBlkioStatEntry, ContainerStatsResponse};

/// Returns None when the response carries no CPU sample (e.g. container already stopped).
pub(crate) fn process_statistics(
    s: &ContainerStatsResponse,
    captured_at: u64,
) -> Option<StatsSnapshot> {
    let cpu_stats = s.cpu_stats.as_ref()?;
    let precpu_stats = s.precpu_stats.as_ref()?;
    let cpu_usage = cpu_stats.cpu_usage.as_ref()?;
    let precpu_usage = precpu_stats.cpu_usage.as_ref()?;

    let cpu_delta =
        cpu_usage.total_usage.unwrap_or(0) as i64 - precpu_usage.total_usage.unwrap_or(0) as i64;
    let system_delta = cpu_stats.system_cpu_usage.unwrap_or(0) as i64
        - precpu_stats.system_cpu_usage.unwrap_or(0) as i64;
    let online = cpu_stats.online_cpus.unwrap_or(1) as f64;
    let cpu_percent = if system_delta > 0 && online > 0.0 {
        (cpu_delta as f64 / system_delta as f64) * online * 100.0
    } else {
        0.0
    };

    let memory = s.memory_stats.as_ref().map_or_else(MemoryUsage::default, |m| {
        MemoryUsage::new(m.usage.unwrap_or(0), m.limit.unwrap_or(0))
    });

    let network = s
        .networks
        .as_ref()
        .map(|n| {
            n.values().fold(NetworkIo::default(), |acc, v| NetworkIo {
                rx_bytes: acc.rx_bytes + v.rx_bytes.unwrap_or(0),
                tx_bytes: acc.tx_bytes + v.tx_bytes.unwrap_or(0),
                rx_packets: acc.rx_packets + v.rx_packets.unwrap_or(0),
                tx_packets: acc.tx_packets + v.tx_packets.unwrap_or(0),
            })
        })
        .unwrap_or_default();

    let blkio = s.blkio_stats.as_ref();
    let (read_bytes, write_bytes) = sum_read_write(
        blkio.and_then(|b| b.io_service_bytes_recursive.as_deref()),
    );
    let (read_ops, write_ops) =
        sum_read_write(blkio.and_then(|b| b.io_serviced_recursive.as_deref()));

    Some(StatsSnapshot {
        cpu_percent: cpu_percent.max(0.0),
        memory,
        network,
        disk: DiskIo {
            read_bytes,
            write_bytes,
            read_ops,
            write_ops,
        },
        captured_at,
    })
}

/// Sums blkio entries by op; other ops (sync, async, discard, total) are ignored.
fn sum_read_write(entries: Option<&[ContainerBlkioStatEntry]>) -> (u64, u64) {
    let mut read = 0u64;
    let mut write = 0u64;
    for e in entries.unwrap_or_default() {
        let value = e.value.unwrap_or(0);
        match e.op.as_deref() {
            Some(op) if op.eq_ignore_ascii_case("read") => read += value,
            Some(op) if op.eq_ignore_ascii_case("write") => write += value,
            _ => {}
        }
    }
    (read, write)
}
