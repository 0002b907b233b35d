pub mod cpu;
pub mod error;
pub mod history;
pub mod memory;
pub mod network;
pub mod options;
pub mod platform;
pub mod procfs;
pub mod sampler;

pub use options::{NetworkOptions, NetworkStrategy, SamplerOptions};
pub use platform::create_samplers;
pub use sampler::{
    CpuReading, CpuSampler, MemoryReading, MemorySampler, NetworkReading, NetworkSampler,
    SamplerSet,
};
