// Linux-specific helpers: cumulative per-core CPU ticks from /proc/stat.

use super::CpuTimes;

/// Per-core tick counters since boot, or None off Linux / when /proc is unreadable.
pub(super) fn read_cpu_times() -> Option<Vec<CpuTimes>> {
    #[cfg(target_os = "linux")]
    {
        let content = std::fs::read_to_string("/proc/stat").ok()?;
        let cores = parse_proc_stat(&content);
        if !cores.is_empty() {
            return Some(cores);
        }
    }
    None
}

/// Parses the `cpuN` lines of /proc/stat; the aggregate `cpu` line is skipped.
/// Columns: user nice system idle iowait irq softirq steal (guest columns are already
/// counted in user/nice). `idle` is the idle column alone.
pub(super) fn parse_proc_stat(content: &str) -> Vec<CpuTimes> {
    content
        .lines()
        .filter(|line| {
            line.strip_prefix("cpu")
                .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        })
        .filter_map(|line| {
            let ticks: Vec<u64> = line
                .split_whitespace()
                .skip(1)
                .take(8)
                .map(|v| v.parse().ok())
                .collect::<Option<_>>()?;
            let idle = *ticks.get(3)?;
            Some(CpuTimes {
                idle,
                total: ticks.iter().sum(),
            })
        })
        .collect()
}
