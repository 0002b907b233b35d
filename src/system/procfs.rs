//! Parsers for the Linux `/proc` text feeds.
//!
//! These are plain string functions so they can be exercised on any host;
//! the file reads themselves live in the Linux platform module.

use super::cpu::CpuTicks;
use super::error::{SourceError, SourceResult};
use super::memory::MemInfo;

/// Parse the aggregate `cpu` row of `/proc/stat`.
pub fn parse_proc_stat(contents: &str) -> SourceResult<CpuTicks> {
    let line = contents
        .lines()
        .next()
        .ok_or_else(|| SourceError::malformed("/proc/stat", "empty feed"))?;

    let mut fields = line.split_whitespace();
    // label row: "cpu  user nice system idle iowait irq softirq steal ..."
    fields
        .next()
        .ok_or_else(|| SourceError::malformed("/proc/stat", "missing label"))?;

    let values: Vec<u64> = fields.map_while(|f| f.parse().ok()).collect();
    if values.len() < 5 {
        return Err(SourceError::malformed(
            "/proc/stat",
            format!("expected at least 5 counters, found {}", values.len()),
        ));
    }

    Ok(CpuTicks {
        idle: values[3] + values[4],
        total: values.iter().sum(),
    })
}

/// First `cpu MHz` entry in `/proc/cpuinfo`.
pub fn parse_cpuinfo_mhz(contents: &str) -> Option<f32> {
    contents
        .lines()
        .filter(|line| line.starts_with("cpu MHz"))
        .find_map(|line| line.split_once(':')?.1.trim().parse().ok())
}

pub fn parse_meminfo(contents: &str) -> SourceResult<MemInfo> {
    let mut info = MemInfo::default();
    for line in contents.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(value) = value.parse::<u64>() else {
            continue;
        };
        match key {
            "MemTotal:" => info.total_kb = value,
            "MemAvailable:" => info.available_kb = value,
            "MemFree:" => info.free_kb = value,
            "Cached:" => info.cached_kb = value,
            "Buffers:" => info.buffers_kb = value,
            _ => {}
        }
    }

    if info.total_kb == 0 || info.available_kb == 0 {
        return Err(SourceError::malformed(
            "/proc/meminfo",
            "MemTotal or MemAvailable missing",
        ));
    }
    Ok(info)
}

/// `(Name, VmRSS kB)` from a `/proc/<pid>/status` file.
///
/// Kernel threads have no `VmRSS` line and yield `None`, as do processes
/// reporting zero resident memory.
pub fn parse_process_status(contents: &str) -> Option<(String, u64)> {
    let mut name = None;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("Name:") {
            name = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("VmRSS:") {
            let rss_kb: u64 = rest.split_whitespace().next()?.parse().ok()?;
            let name = name.filter(|n| !n.is_empty())?;
            return (rss_kb > 0).then_some((name, rss_kb));
        }
    }
    None
}

/// Interface carrying the default route in `/proc/net/route`.
pub fn parse_default_route(contents: &str) -> Option<String> {
    // Iface Destination Gateway Flags ...
    contents.lines().skip(1).find_map(|line| {
        let mut cols = line.split_whitespace();
        let iface = cols.next()?;
        let destination = cols.next()?;
        (destination == "00000000").then(|| iface.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "cpu  4705 356 584 3699 23 23 0 0 0 0\n\
                        cpu0 1393 280 290 3130 3 3 0 0 0 0\n\
                        intr 114930548 113199788 3 0 5 263 0 4 [... lots more numbers ...]\n";

    #[test]
    fn proc_stat_sums_idle_and_iowait() {
        let ticks = parse_proc_stat(STAT).unwrap();
        assert_eq!(ticks.idle, 3699 + 23);
        assert_eq!(ticks.total, 4705 + 356 + 584 + 3699 + 23 + 23);
    }

    #[test]
    fn proc_stat_rejects_short_rows() {
        let err = parse_proc_stat("cpu 1 2 3\n").unwrap_err();
        assert!(matches!(err, SourceError::Malformed { .. }));
        assert!(parse_proc_stat("").is_err());
    }

    #[test]
    fn cpuinfo_takes_first_core() {
        let info = "processor\t: 0\ncpu MHz\t\t: 2394.454\n\nprocessor\t: 1\ncpu MHz\t\t: 1800.000\n";
        assert_eq!(parse_cpuinfo_mhz(info), Some(2394.454));
        assert_eq!(parse_cpuinfo_mhz("processor : 0\n"), None);
    }

    #[test]
    fn meminfo_reads_known_keys() {
        let text = "MemTotal:        8000000 kB\n\
                    MemFree:          500000 kB\n\
                    MemAvailable:    2000000 kB\n\
                    Buffers:          100000 kB\n\
                    Cached:           900000 kB\n\
                    SwapCached:            0 kB\n";
        let info = parse_meminfo(text).unwrap();
        assert_eq!(info.total_kb, 8_000_000);
        assert_eq!(info.available_kb, 2_000_000);
        assert_eq!(info.free_kb, 500_000);
        assert_eq!(info.buffers_kb, 100_000);
        assert_eq!(info.cached_kb, 900_000);
    }

    #[test]
    fn meminfo_without_available_is_malformed() {
        let err = parse_meminfo("MemTotal: 100 kB\nMemFree: 10 kB\n").unwrap_err();
        assert!(matches!(err, SourceError::Malformed { .. }));
    }

    #[test]
    fn status_yields_name_and_rss() {
        let status = "Name:\tfirefox\nUmask:\t0022\nState:\tS (sleeping)\nVmRSS:\t  524288 kB\n";
        assert_eq!(
            parse_process_status(status),
            Some(("firefox".to_string(), 524_288))
        );
    }

    #[test]
    fn status_skips_kernel_threads() {
        let status = "Name:\tkworker/0:1\nState:\tI (idle)\nThreads:\t1\n";
        assert_eq!(parse_process_status(status), None);
        assert_eq!(parse_process_status("Name:\tzombie\nVmRSS:\t0 kB\n"), None);
    }

    #[test]
    fn default_route_picks_zero_destination() {
        let route = "Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\n\
                     docker0\t000011AC\t00000000\t0001\t0\t0\t0\t0000FFFF\n\
                     wlp2s0\t00000000\t0100A8C0\t0003\t0\t0\t600\t00000000\n";
        assert_eq!(parse_default_route(route), Some("wlp2s0".to_string()));
        assert_eq!(parse_default_route("Iface\tDestination\n"), None);
    }
}
