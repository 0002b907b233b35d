use std::time::Duration;

use super::history::DEFAULT_CAPACITY;
use super::memory::MemoryOptions;
use super::network::DEFAULT_WINDOW;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkStrategy {
    #[default]
    Auto,
    Capture,
    Counters,
}

impl NetworkStrategy {
    pub fn from_str_config(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "capture" | "pcap" => NetworkStrategy::Capture,
            "counters" | "counter" => NetworkStrategy::Counters,
            _ => NetworkStrategy::Auto,
        }
    }

    /// Settle `Auto` given whether packet capture is available on this build.
    pub fn resolve(self, capture_available: bool) -> Self {
        match self {
            NetworkStrategy::Auto if capture_available => NetworkStrategy::Capture,
            NetworkStrategy::Auto => NetworkStrategy::Counters,
            explicit => explicit,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            NetworkStrategy::Auto => "auto",
            NetworkStrategy::Capture => "capture",
            NetworkStrategy::Counters => "counters",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetworkOptions {
    pub strategy: NetworkStrategy,
    /// Overrides the default-route interface lookup.
    pub interface: Option<String>,
    pub window: Duration,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        NetworkOptions {
            strategy: NetworkStrategy::Auto,
            interface: None,
            window: DEFAULT_WINDOW,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SamplerOptions {
    pub history_capacity: usize,
    pub memory: MemoryOptions,
    pub network: NetworkOptions,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        SamplerOptions {
            history_capacity: DEFAULT_CAPACITY,
            memory: MemoryOptions::default(),
            network: NetworkOptions::default(),
        }
    }
}
