use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::system::memory::MemoryOptions;
use crate::system::options::{NetworkOptions, NetworkStrategy, SamplerOptions};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub history: HistoryConfig,
    pub memory: MemoryConfig,
    pub network: NetworkConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub refresh_rate_ms: u64,
    pub log_level: String,
    /// Empty means stderr.
    pub log_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            refresh_rate_ms: 1000,
            log_level: "info".to_string(),
            log_file: String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            capacity: crate::system::history::DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub process_cache_secs: u64,
    pub refresh_interval_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            process_cache_secs: 5,
            refresh_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub strategy: String,
    /// Empty means the default-route interface.
    pub interface: String,
    pub window_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            strategy: "auto".to_string(),
            interface: String::new(),
            window_ms: 1000,
        }
    }
}

impl Config {
    pub fn log_file(&self) -> Option<PathBuf> {
        let trimmed = self.general.log_file.trim();
        (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
    }

    /// Sampler tuning derived from the file. Zero durations and capacities
    /// are bumped to the smallest usable value.
    pub fn to_sampler_options(&self) -> SamplerOptions {
        let history_capacity = self.history.capacity.max(1);
        let interface = self.network.interface.trim();
        SamplerOptions {
            history_capacity,
            memory: MemoryOptions {
                history_capacity,
                process_cache_age: Duration::from_secs(self.memory.process_cache_secs),
                refresh_interval: Duration::from_millis(self.memory.refresh_interval_ms.max(1)),
            },
            network: NetworkOptions {
                strategy: NetworkStrategy::from_str_config(&self.network.strategy),
                interface: (!interface.is_empty()).then(|| interface.to_string()),
                window: Duration::from_millis(self.network.window_ms.max(1)),
            },
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("resmon").join("config.toml"))
}

pub fn load_config() -> Config {
    match config_path() {
        Some(path) if path.exists() => load_config_from_path(&path),
        _ => Config::default(),
    }
}

pub fn load_config_from_path(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
        Err(_) => Config::default(),
    }
}
