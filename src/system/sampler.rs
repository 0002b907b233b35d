use serde::Serialize;

pub const NOT_AVAILABLE: &str = "N/A";
pub const NOT_IMPLEMENTED: &str = "Not Implemented";

/// One poll round of CPU values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CpuReading {
    pub usage_percent: f32,
    pub frequency_ghz: f32,
    pub used_threads: u32,
    pub total_threads: u32,
    pub highest_percent: f32,
    pub average_percent: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryReading {
    pub usage_percent: f32,
    pub remaining_mb: f32,
    pub average_percent: f32,
    pub top_process: String,
}

/// Network values taken from a single aggregation round.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkReading {
    pub upload_mb_s: f32,
    pub download_mb_s: f32,
    pub highest_upload_mb_s: f32,
    pub highest_download_mb_s: f32,
    /// Upload plus download, MB/s.
    pub total_used_mb_s: f32,
    /// MB moved in both directions since the sampler started.
    pub transferred_mb: f32,
    pub total_bandwidth_mbps: f32,
}

pub trait CpuSampler: Send + Sync {
    /// Busy share of CPU time since the previous call, in percent.
    fn total_usage(&self) -> f32;
    fn clock_frequency(&self) -> f32;
    fn used_threads(&self) -> u32;
    fn total_threads(&self) -> u32;
    fn highest_usage(&self) -> f32;
    fn average_usage(&self) -> f32;

    fn reading(&self) -> CpuReading {
        let usage_percent = self.total_usage();
        CpuReading {
            usage_percent,
            frequency_ghz: self.clock_frequency(),
            used_threads: self.used_threads(),
            total_threads: self.total_threads(),
            highest_percent: self.highest_usage(),
            average_percent: self.average_usage(),
        }
    }
}

pub trait MemorySampler: Send + Sync {
    fn total_usage(&self) -> f32;
    /// Available memory in MB.
    fn remaining_ram(&self) -> f32;
    fn average_usage(&self) -> f32;
    /// `"name (X.XX MB)"`, or [`NOT_AVAILABLE`].
    fn most_using_process(&self) -> String;

    fn reading(&self) -> MemoryReading {
        MemoryReading {
            usage_percent: self.total_usage(),
            remaining_mb: self.remaining_ram(),
            average_percent: self.average_usage(),
            top_process: self.most_using_process(),
        }
    }
}

pub trait NetworkSampler: Send + Sync {
    fn upload_rate(&self) -> f32;
    fn download_rate(&self) -> f32;
    fn highest_upload_rate(&self) -> f32;
    fn highest_download_rate(&self) -> f32;
    /// Upload plus download rate from the same round, MB/s.
    fn total_used_bandwidth(&self) -> f32;
    /// Link capacity in Mbps; zero when it cannot be determined.
    fn total_bandwidth(&self) -> f32;
    fn top_bandwidth_process(&self) -> String {
        NOT_IMPLEMENTED.to_string()
    }

    /// Consistent view of the published fields.
    fn reading(&self) -> NetworkReading;
}

/// Concrete samplers for the running platform.
pub struct SamplerSet {
    pub cpu: Box<dyn CpuSampler>,
    pub memory: Box<dyn MemorySampler>,
    pub network: Box<dyn NetworkSampler>,
}
