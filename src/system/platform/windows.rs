use std::io;

use parking_lot::Mutex;
use sysinfo::{CpuRefreshKind, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio_util::sync::CancellationToken;
use tracing::info;
use windows_sys::Win32::{
    Foundation::{CloseHandle, ERROR_BUFFER_OVERFLOW, FILETIME, INVALID_HANDLE_VALUE, NO_ERROR},
    NetworkManagement::IpHelper::{
        GAA_FLAG_SKIP_ANYCAST, GAA_FLAG_SKIP_DNS_SERVER, GAA_FLAG_SKIP_MULTICAST,
        GetAdaptersAddresses, IF_TYPE_SOFTWARE_LOOPBACK, IP_ADAPTER_ADDRESSES_LH,
    },
    NetworkManagement::Ndis::IfOperStatusUp,
    Networking::WinSock::AF_UNSPEC,
    System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, TH32CS_SNAPTHREAD, THREADENTRY32, Thread32First, Thread32Next,
    },
    System::SystemInformation::{GlobalMemoryStatusEx, MEMORYSTATUSEX},
    System::Threading::{GetCurrentProcessId, GetSystemTimes},
};

use crate::system::cpu::{CpuMonitor, CpuSource, CpuTicks};
use crate::system::error::{SourceError, SourceResult};
use crate::system::memory::{MemInfo, MemoryMonitor, MemorySource, ProcessMemoryTable};
use crate::system::network::{
    CapacityProbe, CaptureNetwork, CounterNetwork, NetworkProbe, SysinfoAdapters,
};
use crate::system::options::{NetworkOptions, NetworkStrategy, SamplerOptions};
use crate::system::sampler::SamplerSet;

fn filetime_ticks(time: &FILETIME) -> u64 {
    (u64::from(time.dwHighDateTime) << 32) | u64::from(time.dwLowDateTime)
}

/// Count threads in a ToolHelp snapshot, optionally restricted to one owner.
fn count_threads(owner: Option<u32>) -> SourceResult<u32> {
    unsafe {
        let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0);
        if snapshot == INVALID_HANDLE_VALUE {
            return Err(SourceError::unavailable(
                "thread snapshot",
                io::Error::last_os_error(),
            ));
        }
        let mut entry = std::mem::zeroed::<THREADENTRY32>();
        entry.dwSize = std::mem::size_of::<THREADENTRY32>() as u32;

        let mut count = 0u32;
        let mut more = Thread32First(snapshot, &mut entry) != 0;
        while more {
            if owner.is_none_or(|pid| entry.th32OwnerProcessID == pid) {
                count += 1;
            }
            more = Thread32Next(snapshot, &mut entry) != 0;
        }
        CloseHandle(snapshot);
        Ok(count)
    }
}

pub struct WinCpu {
    system: Mutex<System>,
}

impl WinCpu {
    fn new() -> Self {
        WinCpu {
            system: Mutex::new(System::new()),
        }
    }
}

impl CpuSource for WinCpu {
    fn ticks(&self) -> SourceResult<CpuTicks> {
        let mut idle = unsafe { std::mem::zeroed::<FILETIME>() };
        let mut kernel = unsafe { std::mem::zeroed::<FILETIME>() };
        let mut user = unsafe { std::mem::zeroed::<FILETIME>() };
        let ok = unsafe { GetSystemTimes(&mut idle, &mut kernel, &mut user) };
        if ok == 0 {
            return Err(SourceError::unavailable(
                "system times",
                io::Error::last_os_error(),
            ));
        }
        // Kernel time already includes idle time.
        Ok(CpuTicks {
            idle: filetime_ticks(&idle),
            total: filetime_ticks(&kernel).saturating_add(filetime_ticks(&user)),
        })
    }

    fn frequency_mhz(&self) -> SourceResult<f32> {
        let mut system = self.system.lock();
        system.refresh_cpu_specifics(CpuRefreshKind::nothing().with_frequency());
        system
            .cpus()
            .first()
            .map(|cpu| cpu.frequency() as f32)
            .ok_or_else(|| SourceError::malformed("processor frequency", "no processors listed"))
    }

    fn used_threads(&self) -> SourceResult<u32> {
        count_threads(Some(unsafe { GetCurrentProcessId() }))
    }

    fn total_threads(&self) -> SourceResult<u32> {
        count_threads(None)
    }
}

pub struct WinMemory {
    system: Mutex<System>,
}

impl WinMemory {
    fn new() -> Self {
        WinMemory {
            system: Mutex::new(System::new()),
        }
    }
}

impl MemorySource for WinMemory {
    fn meminfo(&self) -> SourceResult<MemInfo> {
        let mut status = unsafe { std::mem::zeroed::<MEMORYSTATUSEX>() };
        status.dwLength = std::mem::size_of::<MEMORYSTATUSEX>() as u32;
        if unsafe { GlobalMemoryStatusEx(&mut status) } == 0 {
            return Err(SourceError::unavailable(
                "memory status",
                io::Error::last_os_error(),
            ));
        }
        Ok(MemInfo {
            total_kb: status.ullTotalPhys / 1024,
            available_kb: status.ullAvailPhys / 1024,
            free_kb: status.ullAvailPhys / 1024,
            cached_kb: 0,
            buffers_kb: 0,
        })
    }

    fn processes(&self) -> SourceResult<ProcessMemoryTable> {
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        let rows = system.processes().values().map(|process| {
            (
                process.name().to_string_lossy().into_owned(),
                process.memory() / 1024,
            )
        });
        Ok(ProcessMemoryTable::from_entries(rows))
    }
}

const ADAPTER_BUFFER_BYTES: usize = 15 * 1024;

/// Sum of transmit link speeds, in Mbps, over adapters that are up and not
/// loopback.
fn adapter_link_speed_mbps() -> SourceResult<f32> {
    let flags = GAA_FLAG_SKIP_ANYCAST | GAA_FLAG_SKIP_MULTICAST | GAA_FLAG_SKIP_DNS_SERVER;
    let mut size = ADAPTER_BUFFER_BYTES as u32;
    // u64 backing keeps the adapter records aligned.
    let mut buffer: Vec<u64> = Vec::new();

    for _ in 0..3 {
        buffer.resize((size as usize).div_ceil(8), 0);
        let head = buffer.as_mut_ptr().cast::<IP_ADAPTER_ADDRESSES_LH>();
        let status = unsafe {
            GetAdaptersAddresses(u32::from(AF_UNSPEC), flags, std::ptr::null(), head, &mut size)
        };
        match status {
            NO_ERROR => {
                let mut total_mbps = 0.0f64;
                let mut cursor = head as *const IP_ADAPTER_ADDRESSES_LH;
                while let Some(adapter) = unsafe { cursor.as_ref() } {
                    if adapter.IfType != IF_TYPE_SOFTWARE_LOOPBACK
                        && adapter.OperStatus == IfOperStatusUp
                    {
                        total_mbps += adapter.TransmitLinkSpeed as f64 / 1_000_000.0;
                    }
                    cursor = adapter.Next;
                }
                return Ok(total_mbps as f32);
            }
            ERROR_BUFFER_OVERFLOW => continue,
            code => {
                return Err(SourceError::unavailable(
                    "adapter addresses",
                    io::Error::from_raw_os_error(code as i32),
                ));
            }
        }
    }
    Err(SourceError::malformed(
        "adapter addresses",
        "adapter list kept growing between calls",
    ))
}

fn adapter_link_capacity() -> CapacityProbe {
    Box::new(adapter_link_speed_mbps)
}

fn start_network(options: &NetworkOptions, token: CancellationToken) -> NetworkProbe {
    match options.strategy.resolve(false) {
        NetworkStrategy::Capture => NetworkProbe::Capture(CaptureNetwork::start(
            Err(SourceError::Unsupported {
                detail: "packet capture is only wired up on linux".to_string(),
            }),
            options.window,
            adapter_link_capacity(),
            token,
        )),
        _ => NetworkProbe::Counters(CounterNetwork::start(
            Box::new(SysinfoAdapters::new()),
            options.window,
            adapter_link_capacity(),
            token,
        )),
    }
}

pub fn create_samplers(options: &SamplerOptions, token: &CancellationToken) -> Option<SamplerSet> {
    let cpu = CpuMonitor::new(WinCpu::new(), options.history_capacity);
    let memory = MemoryMonitor::start(WinMemory::new(), options.memory, token.child_token());
    let network = start_network(&options.network, token.child_token());
    info!(
        requested = options.network.strategy.label(),
        network = network.strategy_name(),
        "windows samplers ready"
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
    fn filetime_combines_halves() {
        let time = FILETIME {
            dwLowDateTime: 1,
            dwHighDateTime: 2,
        };
        assert_eq!(filetime_ticks(&time), (2u64 << 32) | 1);
    }

    #[test]
    fn native_sources_read() {
        let cpu = WinCpu::new();
        let ticks = cpu.ticks().unwrap();
        assert!(ticks.total >= ticks.idle);
        assert!(cpu.used_threads().unwrap() >= 1);
        assert!(cpu.total_threads().unwrap() >= cpu.used_threads().unwrap());
        let info = WinMemory::new().meminfo().unwrap();
        assert!(info.total_kb >= info.available_kb);
    }

    #[test]
    fn link_speed_sums_without_error() {
        let mbps = adapter_link_speed_mbps().unwrap();
        assert!(mbps.is_finite());
        assert!(mbps >= 0.0);
    }
}
