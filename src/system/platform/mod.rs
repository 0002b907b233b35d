//! Per-OS data acquisition and the sampler factory.
//!
//! Everything that depends on the target OS lives under this module; the
//! rest of the crate only sees the sampler traits.

use tokio_util::sync::CancellationToken;

use super::options::SamplerOptions;
use super::sampler::SamplerSet;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(not(any(target_os = "linux", target_os = "windows")))]
mod unsupported;
#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "linux")]
use linux as platform_impl;
#[cfg(not(any(target_os = "linux", target_os = "windows")))]
use unsupported as platform_impl;
#[cfg(target_os = "windows")]
use windows as platform_impl;

/// Build the sampler set for the running OS.
///
/// Returns `None` on an unsupported OS; callers must treat that as fatal.
/// Background loops run on children of `token`.
pub fn create_samplers(options: &SamplerOptions, token: &CancellationToken) -> Option<SamplerSet> {
    platform_impl::create_samplers(options, token)
}

pub fn packet_capture_compiled() -> bool {
    cfg!(feature = "pcap")
}
