//! Throughput derived from the OS per-adapter byte counters.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sysinfo::Networks;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CapacityProbe, TrafficState};
use crate::shutdown::spawn_periodic;
use crate::system::error::SourceResult;

/// Bytes moved across all active adapters since the previous sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterTotals {
    pub sent: u64,
    pub received: u64,
}

pub trait AdapterCounters: Send {
    fn sample(&mut self) -> SourceResult<AdapterTotals>;
}

/// Adapter counters as exposed by `sysinfo`.
pub struct SysinfoAdapters {
    networks: Networks,
}

impl Default for SysinfoAdapters {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoAdapters {
    pub fn new() -> Self {
        SysinfoAdapters {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

pub fn is_loopback(name: &str) -> bool {
    name == "lo" || name.starts_with("lo:") || name.to_ascii_lowercase().contains("loopback")
}

impl AdapterCounters for SysinfoAdapters {
    fn sample(&mut self) -> SourceResult<AdapterTotals> {
        self.networks.refresh(true);
        let totals = self
            .networks
            .list()
            .iter()
            .filter(|(name, _)| !is_loopback(name))
            .fold(AdapterTotals::default(), |acc, (_, data)| AdapterTotals {
                sent: acc.sent.saturating_add(data.transmitted()),
                received: acc.received.saturating_add(data.received()),
            });
        Ok(totals)
    }
}

pub struct CounterNetwork {
    traffic: Arc<Mutex<TrafficState>>,
    token: CancellationToken,
    worker: Option<JoinHandle<()>>,
    capacity: CapacityProbe,
}

impl CounterNetwork {
    pub fn start(
        mut counters: Box<dyn AdapterCounters>,
        window: Duration,
        capacity: CapacityProbe,
        token: CancellationToken,
    ) -> Self {
        let traffic = Arc::new(Mutex::new(TrafficState::default()));

        // Baseline: the first sample covers everything since boot.
        if let Err(err) = counters.sample() {
            warn!(%err, "adapter counters unavailable at startup");
        }

        let published = Arc::clone(&traffic);
        let mut last = Instant::now();
        let worker = spawn_periodic("resmon-adapters", window, token.clone(), move || {
            let now = Instant::now();
            match counters.sample() {
                Ok(totals) => {
                    let elapsed = now.saturating_duration_since(last);
                    let mut state = published.lock();
                    if state.publish(totals.sent, totals.received, elapsed) {
                        debug!(
                            upload = state.upload_mb_s,
                            download = state.download_mb_s,
                            "adapter round published"
                        );
                    }
                }
                Err(err) => warn!(%err, "failed to read adapter counters"),
            }
            last = now;
        });

        let worker = match worker {
            Ok(handle) => {
                info!("adapter counter sampling active");
                Some(handle)
            }
            Err(err) => {
                warn!(%err, "failed to start adapter sampler; network rates will read zero");
                None
            }
        };

        CounterNetwork {
            traffic,
            token,
            worker,
            capacity,
        }
    }

    pub(super) fn traffic(&self) -> TrafficState {
        *self.traffic.lock()
    }

    pub(super) fn capacity(&self) -> &CapacityProbe {
        &self.capacity
    }
}

impl Drop for CounterNetwork {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("adapter sampler thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_adapters_are_recognised() {
        assert!(is_loopback("lo"));
        assert!(is_loopback("Loopback Pseudo-Interface 1"));
        assert!(!is_loopback("eth0"));
        assert!(!is_loopback("wlan0"));
        assert!(!is_loopback("lo0x"));
    }

    #[test]
    fn sysinfo_adapters_sample_without_error() {
        let mut adapters = SysinfoAdapters::new();
        assert!(adapters.sample().is_ok());
    }
}
