use std::fs;
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::system::cpu::{CpuMonitor, CpuSource, CpuTicks};
use crate::system::error::{SourceError, SourceResult};
use crate::system::memory::{MemInfo, MemoryMonitor, MemorySource, ProcessMemoryTable};
use crate::system::network::{
    CaptureNetwork, CapacityProbe, CounterNetwork, FrameSource, InterfaceIdentity, MacAddr,
    NetworkProbe, SysinfoAdapters, unknown_capacity,
};
use crate::system::options::{NetworkOptions, NetworkStrategy, SamplerOptions};
use crate::system::procfs;
use crate::system::sampler::SamplerSet;

fn read_feed(path: &'static str) -> SourceResult<String> {
    fs::read_to_string(path).map_err(|err| SourceError::unavailable(path, err))
}

fn is_numeric(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}

pub struct ProcCpu;

impl CpuSource for ProcCpu {
    fn ticks(&self) -> SourceResult<CpuTicks> {
        procfs::parse_proc_stat(&read_feed("/proc/stat")?)
    }

    fn frequency_mhz(&self) -> SourceResult<f32> {
        procfs::parse_cpuinfo_mhz(&read_feed("/proc/cpuinfo")?)
            .ok_or_else(|| SourceError::malformed("/proc/cpuinfo", "no `cpu MHz` entry"))
    }

    fn used_threads(&self) -> SourceResult<u32> {
        let entries = fs::read_dir("/proc/self/task")
            .map_err(|err| SourceError::unavailable("/proc/self/task", err))?;
        let count = entries
            .flatten()
            .filter(|entry| entry.file_name().to_str().is_some_and(is_numeric))
            .count();
        Ok(count as u32)
    }

    fn total_threads(&self) -> SourceResult<u32> {
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .map_err(|err| SourceError::unavailable("online processor count", err))
    }
}

pub struct ProcMemory;

impl MemorySource for ProcMemory {
    fn meminfo(&self) -> SourceResult<MemInfo> {
        procfs::parse_meminfo(&read_feed("/proc/meminfo")?)
    }

    fn processes(&self) -> SourceResult<ProcessMemoryTable> {
        let entries =
            fs::read_dir("/proc").map_err(|err| SourceError::unavailable("/proc", err))?;
        let rows = entries.flatten().filter_map(|entry| {
            let name = entry.file_name();
            if !name.to_str().is_some_and(is_numeric) {
                return None;
            }
            // Processes can exit between listing and reading.
            let status = fs::read_to_string(entry.path().join("status")).ok()?;
            procfs::parse_process_status(&status)
        });
        Ok(ProcessMemoryTable::from_entries(rows))
    }
}

fn default_route_interface() -> SourceResult<String> {
    procfs::parse_default_route(&read_feed("/proc/net/route")?)
        .ok_or_else(|| SourceError::malformed("/proc/net/route", "no default route"))
}

fn resolve_interface(configured: Option<&str>) -> SourceResult<InterfaceIdentity> {
    let name = match configured {
        Some(name) => name.to_string(),
        None => default_route_interface()?,
    };
    let address_path = Path::new("/sys/class/net").join(&name).join("address");
    let mac: MacAddr = fs::read_to_string(&address_path)
        .map_err(|err| SourceError::unavailable("interface hardware address", err))?
        .parse()?;
    if mac.is_zero() {
        return Err(SourceError::malformed(
            "interface hardware address",
            format!("{name} has no hardware address"),
        ));
    }
    Ok(InterfaceIdentity { name, mac })
}

/// Link speed of `interface` from sysfs. Down links report -1.
fn link_speed(interface: String) -> CapacityProbe {
    let path = Path::new("/sys/class/net").join(interface).join("speed");
    Box::new(move || -> SourceResult<f32> {
        let text = fs::read_to_string(&path)
            .map_err(|err| SourceError::unavailable("link speed", err))?;
        let mbps: f32 = text
            .trim()
            .parse()
            .map_err(|_| SourceError::malformed("link speed", text.trim().to_string()))?;
        Ok(mbps.max(0.0))
    })
}

#[cfg(feature = "pcap")]
fn open_capture(identity: &InterfaceIdentity) -> SourceResult<Box<dyn FrameSource>> {
    use crate::system::network::pcap_source::PcapSource;

    let source = PcapSource::open(&identity.name, std::time::Duration::from_secs(1))?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "pcap"))]
fn open_capture(_identity: &InterfaceIdentity) -> SourceResult<Box<dyn FrameSource>> {
    Err(SourceError::Unsupported {
        detail: "built without the `pcap` feature".to_string(),
    })
}

fn start_network(options: &NetworkOptions, token: CancellationToken) -> NetworkProbe {
    let strategy = options.strategy.resolve(super::packet_capture_compiled());
    let configured = options.interface.as_deref();

    match strategy {
        NetworkStrategy::Capture => {
            let identity = resolve_interface(configured);
            let capacity = match &identity {
                Ok(identity) => link_speed(identity.name.clone()),
                Err(_) => unknown_capacity(),
            };
            let opened = identity.and_then(|identity| {
                let source = open_capture(&identity)?;
                Ok((identity, source))
            });
            NetworkProbe::Capture(CaptureNetwork::start(
                opened,
                options.window,
                capacity,
                token,
            ))
        }
        _ => {
            let capacity = match configured {
                Some(name) => link_speed(name.to_string()),
                None => match default_route_interface() {
                    Ok(name) => link_speed(name),
                    Err(err) => {
                        warn!(%err, "no default interface; link capacity unknown");
                        unknown_capacity()
                    }
                },
            };
            NetworkProbe::Counters(CounterNetwork::start(
                Box::new(SysinfoAdapters::new()),
                options.window,
                capacity,
                token,
            ))
        }
    }
}

pub fn create_samplers(options: &SamplerOptions, token: &CancellationToken) -> Option<SamplerSet> {
    let cpu = CpuMonitor::new(ProcCpu, options.history_capacity);
    let memory = MemoryMonitor::start(ProcMemory, options.memory, token.child_token());
    let network = start_network(&options.network, token.child_token());
    info!(
        requested = options.network.strategy.label(),
        network = network.strategy_name(),
        "linux samplers ready"
    );

    Some(SamplerSet {
        cpu: Box::new(cpu),
        memory: Box::new(memory),
        network: Box::new(network),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proc_sources_read_live_feeds() {
        assert!(ProcCpu.ticks().is_ok());
        assert!(ProcCpu.total_threads().unwrap() >= 1);
        assert!(ProcCpu.used_threads().unwrap() >= 1);
        let info = ProcMemory.meminfo().unwrap();
        assert!(info.total_kb >= info.available_kb);
    }

    #[test]
    fn process_table_contains_entries() {
        let table = ProcMemory.processes().unwrap();
        assert!(!table.is_empty());
    }

    #[test]
    fn numeric_names_only() {
        assert!(is_numeric("1234"));
        assert!(!is_numeric("self"));
        assert!(!is_numeric(""));
    }

    #[test]
    fn unknown_interface_fails_to_resolve() {
        assert!(resolve_interface(Some("resmon-missing0")).is_err());
    }
}
