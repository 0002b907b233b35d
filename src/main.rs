mod logging;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::info;

use resmon::config::{self, load_config, load_config_from_path};
use resmon::monitor::{JsonSink, Monitor, RoundSink, TextSink};

#[derive(Parser)]
#[command(
    name = "resmon",
    about = "Samples CPU, memory and network usage once per interval"
)]
struct Cli {
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Refresh rate in milliseconds
    #[arg(long)]
    refresh_rate: Option<u64>,

    /// Network strategy: auto, capture, counters
    #[arg(long)]
    strategy: Option<String>,

    /// Network interface to measure instead of the default route
    #[arg(long)]
    interface: Option<String>,

    /// Stop after this many rounds
    #[arg(long)]
    rounds: Option<u64>,

    /// Print rounds as JSON lines
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Emit log records as JSON
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = load_config_for_cli(&cli);
    logging::init(&config, cli.log_json)?;

    let options = config.to_sampler_options();
    let mut monitor = Monitor::for_platform(&options)
        .ok_or_else(|| eyre!("unsupported platform: {}", std::env::consts::OS))?;

    let mut sink: Box<dyn RoundSink> = if cli.json {
        Box::new(JsonSink::new(io::stdout()))
    } else {
        Box::new(TextSink::new(io::stdout()))
    };

    let period = Duration::from_millis(config.general.refresh_rate_ms.max(1));
    let result = run(&mut monitor, sink.as_mut(), period, cli.rounds).await;

    info!(rounds = monitor.rounds(), "shutting down");
    monitor.shutdown();
    result
}

async fn run(
    monitor: &mut Monitor,
    sink: &mut dyn RoundSink,
    period: Duration,
    limit: Option<u64>,
) -> Result<()> {
    // First poll after one full period so the CPU delta spans real time.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        if limit.is_some_and(|limit| monitor.rounds() >= limit) {
            return Ok(());
        }
        tokio::select! {
            _ = ticker.tick() => {
                let round = monitor.poll();
                sink.emit(&round)?;
            }
            signal = &mut ctrl_c => {
                signal?;
                info!("interrupted");
                return Ok(());
            }
        }
    }
}

fn load_config_for_cli(cli: &Cli) -> config::Config {
    let mut config = match &cli.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    };

    if let Some(rate) = cli.refresh_rate {
        config.general.refresh_rate_ms = rate;
    }
    if let Some(ref strategy) = cli.strategy {
        config.network.strategy = strategy.clone();
    }
    if let Some(ref interface) = cli.interface {
        config.network.interface = interface.clone();
    }

    config
}
