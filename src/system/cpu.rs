use parking_lot::Mutex;
use tracing::{debug, warn};

use super::error::SourceResult;
use super::history::{UsageHistory, clamp_percent};
use super::sampler::CpuSampler;

/// Cumulative CPU time counters as reported by the OS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTicks {
    pub idle: u64,
    pub total: u64,
}

/// Raw per-OS CPU readings.
pub trait CpuSource: Send + Sync {
    fn ticks(&self) -> SourceResult<CpuTicks>;
    fn frequency_mhz(&self) -> SourceResult<f32>;
    fn used_threads(&self) -> SourceResult<u32>;
    fn total_threads(&self) -> SourceResult<u32>;
}

#[derive(Debug)]
pub struct CpuState {
    previous: Option<CpuTicks>,
    history: UsageHistory,
}

impl CpuState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            previous: None,
            history: UsageHistory::new(history_capacity),
        }
    }

    /// Fold a new counter reading into the state and return the usage over
    /// the interval since the previous one.
    ///
    /// The first reading only establishes a baseline. A zero-length interval
    /// returns 0 without touching the history.
    pub fn advance(&mut self, ticks: CpuTicks) -> f32 {
        let Some(previous) = self.previous.replace(ticks) else {
            return 0.0;
        };

        let delta_total = ticks.total.saturating_sub(previous.total);
        let delta_idle = ticks.idle.saturating_sub(previous.idle);
        if delta_total == 0 {
            debug!("cpu counters did not advance; skipping sample");
            return 0.0;
        }

        let busy = delta_total.saturating_sub(delta_idle);
        let usage = clamp_percent(busy as f32 / delta_total as f32 * 100.0);
        self.history.push(usage);
        usage
    }

    pub fn history(&self) -> &UsageHistory {
        &self.history
    }
}

/// CPU sampler computing usage from consecutive counter reads.
///
/// Usage is derived synchronously on each `total_usage` call; the counter
/// read happens while the state lock is held so concurrent callers never
/// interleave their previous-counter updates.
pub struct CpuMonitor<S> {
    source: S,
    state: Mutex<CpuState>,
}

impl<S: CpuSource> CpuMonitor<S> {
    pub fn new(source: S, history_capacity: usize) -> Self {
        let mut state = CpuState::new(history_capacity);
        match source.ticks() {
            Ok(ticks) => {
                state.advance(ticks);
            }
            Err(err) => warn!(%err, "cpu counters unavailable at startup"),
        }
        Self {
            source,
            state: Mutex::new(state),
        }
    }
}

impl<S: CpuSource> CpuSampler for CpuMonitor<S> {
    fn total_usage(&self) -> f32 {
        let mut state = self.state.lock();
        match self.source.ticks() {
            Ok(ticks) => state.advance(ticks),
            Err(err) => {
                warn!(%err, "failed to read cpu counters");
                0.0
            }
        }
    }

    fn clock_frequency(&self) -> f32 {
        match self.source.frequency_mhz() {
            Ok(mhz) if mhz > 0.0 => mhz / 1000.0,
            Ok(_) => {
                warn!("cpu frequency reported as zero");
                0.0
            }
            Err(err) => {
                warn!(%err, "failed to read cpu frequency");
                0.0
            }
        }
    }

    fn used_threads(&self) -> u32 {
        self.source.used_threads().unwrap_or_else(|err| {
            warn!(%err, "failed to count process threads");
            0
        })
    }

    fn total_threads(&self) -> u32 {
        self.source.total_threads().unwrap_or_else(|err| {
            warn!(%err, "failed to count total threads");
            0
        })
    }

    fn highest_usage(&self) -> f32 {
        self.state.lock().history().peak()
    }

    fn average_usage(&self) -> f32 {
        self.state.lock().history().average()
    }
}
