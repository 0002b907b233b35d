pub mod capture;
pub mod counters;
mod identity;
#[cfg(feature = "pcap")]
pub mod pcap_source;

use std::time::Duration;

use tracing::debug;

pub use capture::{CaptureNetwork, CaptureStatus, Frame, FrameSource};
pub use counters::{AdapterCounters, AdapterTotals, CounterNetwork, SysinfoAdapters};
pub use identity::{InterfaceIdentity, MacAddr};

use super::error::SourceResult;
use super::options::NetworkStrategy;
use super::sampler::{NetworkReading, NetworkSampler};

pub const BYTES_PER_MB: f64 = 1_000_000.0;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Best-effort link capacity lookup in Mbps.
pub type CapacityProbe = Box<dyn Fn() -> SourceResult<f32> + Send + Sync>;

pub fn unknown_capacity() -> CapacityProbe {
    Box::new(|| -> SourceResult<f32> { Ok(0.0) })
}

/// Rates and totals published by an aggregation round.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrafficState {
    pub upload_mb_s: f32,
    pub download_mb_s: f32,
    pub highest_upload_mb_s: f32,
    pub highest_download_mb_s: f32,
    pub total_bytes: u64,
    pub rounds: u64,
}

impl TrafficState {
    /// Convert the bytes moved during `elapsed` into rates and fold them in.
    /// Returns `false` (publishing nothing) for an empty interval.
    pub fn publish(&mut self, sent: u64, received: u64, elapsed: Duration) -> bool {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return false;
        }
        self.upload_mb_s = (sent as f64 / secs / BYTES_PER_MB) as f32;
        self.download_mb_s = (received as f64 / secs / BYTES_PER_MB) as f32;
        self.highest_upload_mb_s = self.highest_upload_mb_s.max(self.upload_mb_s);
        self.highest_download_mb_s = self.highest_download_mb_s.max(self.download_mb_s);
        self.total_bytes = self.total_bytes.saturating_add(sent.saturating_add(received));
        self.rounds += 1;
        true
    }

    /// Upload plus download from the latest round.
    pub fn total_used_mb_s(&self) -> f32 {
        self.upload_mb_s + self.download_mb_s
    }

    /// Everything moved since the sampler started.
    pub fn transferred_mb(&self) -> f32 {
        (self.total_bytes as f64 / BYTES_PER_MB) as f32
    }

    pub fn reading(&self, total_bandwidth_mbps: f32) -> NetworkReading {
        NetworkReading {
            upload_mb_s: self.upload_mb_s,
            download_mb_s: self.download_mb_s,
            highest_upload_mb_s: self.highest_upload_mb_s,
            highest_download_mb_s: self.highest_download_mb_s,
            total_used_mb_s: self.total_used_mb_s(),
            transferred_mb: self.transferred_mb(),
            total_bandwidth_mbps,
        }
    }
}

fn probe_capacity(probe: &CapacityProbe) -> f32 {
    match probe() {
        Ok(mbps) if mbps.is_finite() && mbps > 0.0 => mbps,
        Ok(_) => 0.0,
        Err(err) => {
            debug!(%err, "link capacity unavailable");
            0.0
        }
    }
}

/// The two interchangeable throughput measurement strategies.
pub enum NetworkProbe {
    Capture(CaptureNetwork),
    Counters(CounterNetwork),
}

impl NetworkProbe {
    fn traffic(&self) -> TrafficState {
        match self {
            NetworkProbe::Capture(capture) => capture.traffic(),
            NetworkProbe::Counters(counters) => counters.traffic(),
        }
    }

    fn capacity(&self) -> &CapacityProbe {
        match self {
            NetworkProbe::Capture(capture) => capture.capacity(),
            NetworkProbe::Counters(counters) => counters.capacity(),
        }
    }

    pub fn strategy(&self) -> NetworkStrategy {
        match self {
            NetworkProbe::Capture(_) => NetworkStrategy::Capture,
            NetworkProbe::Counters(_) => NetworkStrategy::Counters,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy().label()
    }
}

impl NetworkSampler for NetworkProbe {
    fn upload_rate(&self) -> f32 {
        self.traffic().upload_mb_s
    }

    fn download_rate(&self) -> f32 {
        self.traffic().download_mb_s
    }

    fn highest_upload_rate(&self) -> f32 {
        self.traffic().highest_upload_mb_s
    }

    fn highest_download_rate(&self) -> f32 {
        self.traffic().highest_download_mb_s
    }

    fn total_used_bandwidth(&self) -> f32 {
        self.traffic().total_used_mb_s()
    }

    fn total_bandwidth(&self) -> f32 {
        probe_capacity(self.capacity())
    }

    fn reading(&self) -> NetworkReading {
        let capacity = self.total_bandwidth();
        self.traffic().reading(capacity)
    }
}
