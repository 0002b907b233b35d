//! Foreground orchestration: poll every sampler once per round and hand the
//! values to a sink.

use std::io::{self, Write};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::format::{format_bandwidth, format_megabytes, format_percent, format_rate};
use crate::system::options::SamplerOptions;
use crate::system::platform;
use crate::system::sampler::{CpuReading, MemoryReading, NetworkReading, SamplerSet};

/// Everything read during one poll round.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollRound {
    pub round: u64,
    pub cpu: CpuReading,
    pub memory: MemoryReading,
    pub network: NetworkReading,
    pub top_bandwidth_process: String,
}

pub struct Monitor {
    samplers: SamplerSet,
    token: CancellationToken,
    rounds: u64,
}

impl Monitor {
    pub fn new(samplers: SamplerSet, token: CancellationToken) -> Self {
        Monitor {
            samplers,
            token,
            rounds: 0,
        }
    }

    /// Build samplers for the running OS. `None` when the OS is unsupported.
    pub fn for_platform(options: &SamplerOptions) -> Option<Self> {
        let token = CancellationToken::new();
        let samplers = platform::create_samplers(options, &token)?;
        Some(Self::new(samplers, token))
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    pub fn poll(&mut self) -> PollRound {
        self.rounds += 1;
        let round = PollRound {
            round: self.rounds,
            cpu: self.samplers.cpu.reading(),
            memory: self.samplers.memory.reading(),
            network: self.samplers.network.reading(),
            top_bandwidth_process: self.samplers.network.top_bandwidth_process(),
        };
        debug!(round = round.round, cpu = round.cpu.usage_percent, "poll round");
        round
    }

    /// Cancel background loops and join them.
    pub fn shutdown(self) {
        self.token.cancel();
        drop(self.samplers);
    }
}

/// Destination for poll rounds.
pub trait RoundSink {
    fn emit(&mut self, round: &PollRound) -> io::Result<()>;
}

pub fn summary_line(round: &PollRound) -> String {
    let PollRound {
        cpu,
        memory,
        network,
        ..
    } = round;
    format!(
        "#{} cpu {} (peak {}, avg {}) {:.2} GHz {}/{} threads | mem {} {:.0} MB free (avg {}) top {} | net up {} down {} (peak {} / {}) used {} moved {} link {}",
        round.round,
        format_percent(cpu.usage_percent),
        format_percent(cpu.highest_percent),
        format_percent(cpu.average_percent),
        cpu.frequency_ghz,
        cpu.used_threads,
        cpu.total_threads,
        format_percent(memory.usage_percent),
        memory.remaining_mb,
        format_percent(memory.average_percent),
        memory.top_process,
        format_rate(network.upload_mb_s),
        format_rate(network.download_mb_s),
        format_rate(network.highest_upload_mb_s),
        format_rate(network.highest_download_mb_s),
        format_rate(network.total_used_mb_s),
        format_megabytes(network.transferred_mb),
        format_bandwidth(network.total_bandwidth_mbps),
    )
}

/// One human-readable line per round.
pub struct TextSink<W> {
    out: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(out: W) -> Self {
        TextSink { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RoundSink for TextSink<W> {
    fn emit(&mut self, round: &PollRound) -> io::Result<()> {
        writeln!(self.out, "{}", summary_line(round))?;
        self.out.flush()
    }
}

/// One JSON object per line.
pub struct JsonSink<W> {
    out: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        JsonSink { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RoundSink for JsonSink<W> {
    fn emit(&mut self, round: &PollRound) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, round)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}
